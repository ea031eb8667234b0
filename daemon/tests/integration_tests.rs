//! End-to-end engine tests with a scripted supervisor and forest source

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use memwarden_daemon::collector::{ForestSource, ProcessForest, ProcessRecord};
use memwarden_daemon::config::{Config, HandlerConfig, PollConfig, ServiceConfig};
use memwarden_daemon::event::{Event, Payload, Reaction};
use memwarden_daemon::monitor::Engine;
use memwarden_daemon::supervisor::{ServiceHandle, Supervisor, SupervisorError};

/// Supervisor whose pid lookups replay a fixed script, one entry per tick.
struct ScriptedSupervisor {
    script: Vec<Option<u32>>,
}

impl Supervisor for ScriptedSupervisor {
    fn attach(&self, unit: &str) -> Result<Box<dyn ServiceHandle>, SupervisorError> {
        if unit == "missing" {
            return Err(SupervisorError::Lookup {
                unit: unit.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such unit"),
            });
        }
        Ok(Box::new(ScriptedHandle {
            unit: unit.to_string(),
            script: self.script.clone(),
            cursor: AtomicUsize::new(0),
        }))
    }
}

struct ScriptedHandle {
    unit: String,
    script: Vec<Option<u32>>,
    cursor: AtomicUsize,
}

impl ServiceHandle for ScriptedHandle {
    fn current_pid(&self) -> Result<u32, SupervisorError> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        match self.script.get(index).copied().flatten() {
            Some(pid) => Ok(pid),
            None => Err(SupervisorError::NotRunning {
                unit: self.unit.clone(),
            }),
        }
    }
}

/// Forest source that hands out pre-built snapshots, one per tick, then
/// empty snapshots once the script runs dry.
struct ScriptedSource {
    forests: Mutex<VecDeque<ProcessForest>>,
}

impl ScriptedSource {
    fn new(forests: Vec<ProcessForest>) -> Self {
        Self {
            forests: Mutex::new(forests.into()),
        }
    }
}

impl ForestSource for ScriptedSource {
    fn discover(&self) -> io::Result<ProcessForest> {
        Ok(self.forests.lock().unwrap().pop_front().unwrap_or_default())
    }
}

struct FailingSource;

impl ForestSource for FailingSource {
    fn discover(&self) -> io::Result<ProcessForest> {
        Err(io::Error::new(io::ErrorKind::Other, "proc unavailable"))
    }
}

#[derive(Default)]
struct Recorder {
    entries: Mutex<Vec<String>>,
}

impl Recorder {
    fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

impl Reaction for Recorder {
    fn invoke(&self, event: &Event) -> anyhow::Result<()> {
        let entry = match event.payload {
            Some(Payload::Pid(pid)) => format!("{}:{}", event.kind, pid),
            Some(Payload::Bytes(bytes)) => format!("{}:{}", event.kind, bytes),
            None => event.kind.to_string(),
        };
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

fn forest(entries: &[(u32, u32, u64)]) -> ProcessForest {
    ProcessForest::from_records(
        entries
            .iter()
            .map(|&(pid, ppid, rss_bytes)| ProcessRecord {
                pid,
                ppid,
                name: format!("proc-{}", pid),
                rss_bytes,
            })
            .collect(),
    )
}

fn one_service_config(memory: Option<&str>, handlers: Vec<HandlerConfig>) -> Config {
    Config {
        poll: PollConfig {
            seconds: 1,
            samples: 5,
            significant: 0,
        },
        services: vec![ServiceConfig {
            name: "web".to_string(),
            memory: memory.map(str::to_string),
            handlers,
        }],
    }
}

#[test]
fn test_full_lifecycle_event_sequence() {
    let supervisor = ScriptedSupervisor {
        script: vec![Some(10), Some(10), Some(10), Some(10), None],
    };
    // Tick 1 is under the 100-byte ceiling, ticks 2-4 breach it; with
    // significance 3 the alarm fires on tick 4 and only there.
    let source = ScriptedSource::new(vec![
        forest(&[(10, 1, 30), (11, 10, 20)]),
        forest(&[(10, 1, 100), (11, 10, 50)]),
        forest(&[(10, 1, 100), (11, 10, 50)]),
        forest(&[(10, 1, 100), (11, 10, 50)]),
        forest(&[]),
    ]);
    let recorder = Arc::new(Recorder::default());
    let taps: Vec<Arc<dyn Reaction>> = vec![Arc::clone(&recorder) as Arc<dyn Reaction>];

    let config = one_service_config(Some("100"), Vec::new());
    let mut engine = Engine::new(&config, &supervisor, Box::new(source), &taps).unwrap();

    engine.start();
    for _ in 0..5 {
        engine.poll_once().unwrap();
    }

    assert_eq!(
        recorder.entries(),
        vec![
            "monitor/start",
            "monitoring/up:10",
            "memory/measured:50",
            "memory/measured:150",
            "memory/measured:150",
            "memory/measured:150",
            "memory/limit:150",
            "monitoring/down",
        ]
    );
}

#[test]
fn test_pid_change_is_reported() {
    let supervisor = ScriptedSupervisor {
        script: vec![Some(10), Some(10), Some(77)],
    };
    let source = ScriptedSource::new(vec![
        forest(&[(10, 1, 10)]),
        forest(&[(10, 1, 10)]),
        forest(&[(77, 1, 10)]),
    ]);
    let recorder = Arc::new(Recorder::default());
    let taps: Vec<Arc<dyn Reaction>> = vec![Arc::clone(&recorder) as Arc<dyn Reaction>];

    let config = one_service_config(None, Vec::new());
    let mut engine = Engine::new(&config, &supervisor, Box::new(source), &taps).unwrap();
    for _ in 0..3 {
        engine.poll_once().unwrap();
    }

    assert_eq!(
        recorder.entries(),
        vec![
            "monitoring/up:10",
            "memory/measured:10",
            "memory/measured:10",
            "monitoring/pid-change:77",
            "memory/measured:10",
        ]
    );
}

#[test]
fn test_pid_absent_from_snapshot_skips_sample() {
    let supervisor = ScriptedSupervisor {
        script: vec![Some(10), Some(10)],
    };
    // The snapshot raced the pid lookup on tick 1.
    let source = ScriptedSource::new(vec![forest(&[(99, 1, 10)]), forest(&[(10, 1, 40)])]);
    let recorder = Arc::new(Recorder::default());
    let taps: Vec<Arc<dyn Reaction>> = vec![Arc::clone(&recorder) as Arc<dyn Reaction>];

    let config = one_service_config(Some("100"), Vec::new());
    let mut engine = Engine::new(&config, &supervisor, Box::new(source), &taps).unwrap();
    engine.poll_once().unwrap();
    engine.poll_once().unwrap();

    assert_eq!(
        recorder.entries(),
        vec!["monitoring/up:10", "memory/measured:40"]
    );
}

#[test]
fn test_unparseable_memory_limit_disables_alarms() {
    let supervisor = ScriptedSupervisor {
        script: vec![Some(10); 6],
    };
    let source = ScriptedSource::new(
        (0..6)
            .map(|_| forest(&[(10, 1, 1_000_000_000)]))
            .collect(),
    );
    let recorder = Arc::new(Recorder::default());
    let taps: Vec<Arc<dyn Reaction>> = vec![Arc::clone(&recorder) as Arc<dyn Reaction>];

    // Bad ceiling string plus an unknown action: both are warned about and
    // skipped, startup still succeeds.
    let config = one_service_config(
        Some("lots"),
        vec![HandlerConfig {
            event: "memory/limit".to_string(),
            action: "page".to_string(),
        }],
    );
    let mut engine = Engine::new(&config, &supervisor, Box::new(source), &taps).unwrap();
    for _ in 0..6 {
        engine.poll_once().unwrap();
    }

    let entries = recorder.entries();
    assert!(entries.iter().all(|e| !e.starts_with("memory/limit")));
    assert_eq!(
        entries.iter().filter(|e| e.starts_with("memory/measured")).count(),
        6
    );
}

#[test]
fn test_attach_failure_is_fatal_at_construction() {
    let supervisor = ScriptedSupervisor { script: Vec::new() };
    let source = ScriptedSource::new(Vec::new());
    let config = Config {
        poll: PollConfig::default(),
        services: vec![ServiceConfig {
            name: "missing".to_string(),
            memory: None,
            handlers: Vec::new(),
        }],
    };
    let result = Engine::new(&config, &supervisor, Box::new(source), &[]);
    assert!(result.is_err());
}

#[test]
fn test_forest_failure_is_fatal() {
    let supervisor = ScriptedSupervisor {
        script: vec![Some(10)],
    };
    let config = one_service_config(None, Vec::new());
    let mut engine = Engine::new(&config, &supervisor, Box::new(FailingSource), &[]).unwrap();
    assert!(engine.poll_once().is_err());
}

#[test]
fn test_start_emits_one_event_per_service_in_config_order() {
    let supervisor = ScriptedSupervisor { script: Vec::new() };
    let source = ScriptedSource::new(Vec::new());
    let recorder = Arc::new(Recorder::default());
    let taps: Vec<Arc<dyn Reaction>> = vec![Arc::clone(&recorder) as Arc<dyn Reaction>];

    let config = Config {
        poll: PollConfig::default(),
        services: vec![
            ServiceConfig {
                name: "web".to_string(),
                memory: None,
                handlers: Vec::new(),
            },
            ServiceConfig {
                name: "worker".to_string(),
                memory: None,
                handlers: Vec::new(),
            },
        ],
    };
    let engine = Engine::new(&config, &supervisor, Box::new(source), &taps).unwrap();
    engine.start();

    assert_eq!(recorder.entries(), vec!["monitor/start", "monitor/start"]);
}
