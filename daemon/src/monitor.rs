//! The poll-loop engine

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use crate::collector::ForestSource;
use crate::config::{parse_bytes, Config};
use crate::detector::ThresholdDetector;
use crate::event::{Event, EventBus, EventKind, Payload, Reaction};
use crate::identity::{IdentityState, IdentityTracker, Transition};
use crate::reactions;
use crate::supervisor::{ServiceHandle, Supervisor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(pub usize);

/// Resolved identity of one monitored service. Built once from config,
/// immutable for the run, shared into every event it originates.
#[derive(Debug)]
pub struct ServiceSpec {
    pub id: ServiceId,
    pub name: String,
    pub memory_limit: Option<u64>,
}

struct ServiceWatch {
    spec: Arc<ServiceSpec>,
    handle: Box<dyn ServiceHandle>,
    tracker: IdentityTracker,
    detector: ThresholdDetector,
}

/// Owns the tracked services, the dispatch registry, and the poll cadence.
/// All engine state lives on the single task driving `run`; nothing else
/// observes or mutates it.
pub struct Engine {
    source: Box<dyn ForestSource>,
    bus: EventBus,
    watches: Vec<ServiceWatch>,
    interval: Duration,
}

impl Engine {
    /// Build the engine from configuration. Fails when a service's
    /// supervisor entry cannot be attached; an unparseable memory ceiling
    /// or an unknown handler binding only disables that piece.
    ///
    /// `taps` are registered for every (service, kind) pair ahead of the
    /// config-bound handlers, so observers see each event before its side
    /// effects run.
    pub fn new(
        config: &Config,
        supervisor: &dyn Supervisor,
        source: Box<dyn ForestSource>,
        taps: &[Arc<dyn Reaction>],
    ) -> Result<Self> {
        let poll = config.poll.effective();
        let mut bus = EventBus::new();
        let mut watches = Vec::with_capacity(config.services.len());

        for (index, service) in config.services.iter().enumerate() {
            let handle = supervisor
                .attach(&service.name)
                .with_context(|| format!("attaching service {}", service.name))?;

            let memory_limit = service.memory.as_deref().and_then(|raw| {
                let bytes = parse_bytes(raw);
                if bytes.is_none() {
                    warn!(
                        "Unparseable memory limit {:?} for {}, limit disabled",
                        raw, service.name
                    );
                }
                bytes
            });

            let spec = Arc::new(ServiceSpec {
                id: ServiceId(index),
                name: service.name.clone(),
                memory_limit,
            });

            for kind in EventKind::ALL {
                for tap in taps {
                    bus.register(spec.id, kind, Arc::clone(tap));
                }
            }

            for handler in &service.handlers {
                let Ok(kind) = handler.event.parse::<EventKind>() else {
                    warn!(
                        "Unknown event kind {:?} for {}, handler skipped",
                        handler.event, service.name
                    );
                    continue;
                };
                match reactions::resolve(&handler.action) {
                    Some(reaction) => bus.register(spec.id, kind, reaction),
                    None => warn!(
                        "Unknown action {:?} for {}, handler skipped",
                        handler.action, service.name
                    ),
                }
            }

            watches.push(ServiceWatch {
                spec,
                handle,
                tracker: IdentityTracker::new(),
                detector: ThresholdDetector::new(memory_limit, poll.samples, poll.significant),
            });
        }

        Ok(Self {
            source,
            bus,
            watches,
            interval: Duration::from_secs(poll.seconds),
        })
    }

    pub fn service_count(&self) -> usize {
        self.watches.len()
    }

    /// Dispatch the one-time `monitor/start` event to every service, in
    /// configuration order, regardless of pid state.
    pub fn start(&self) {
        for watch in &self.watches {
            self.bus.dispatch(&Event::new(
                EventKind::MonitorStart,
                Arc::clone(&watch.spec),
                None,
            ));
        }
    }

    /// One poll tick: a fresh forest snapshot, then each service in
    /// configuration order. Only a snapshot failure is fatal.
    pub fn poll_once(&mut self) -> Result<()> {
        let forest = self
            .source
            .discover()
            .context("discovering process forest")?;

        for watch in &mut self.watches {
            // Any resolution failure counts as "not running"; the tracker
            // turns repeats into a single down transition.
            let resolved = watch.handle.current_pid().ok();

            match watch.tracker.advance(resolved) {
                Some(Transition::Up(pid)) => self.bus.dispatch(&Event::new(
                    EventKind::Up,
                    Arc::clone(&watch.spec),
                    Some(Payload::Pid(pid)),
                )),
                Some(Transition::PidChange(pid)) => self.bus.dispatch(&Event::new(
                    EventKind::PidChange,
                    Arc::clone(&watch.spec),
                    Some(Payload::Pid(pid)),
                )),
                Some(Transition::Down) => self.bus.dispatch(&Event::new(
                    EventKind::Down,
                    Arc::clone(&watch.spec),
                    None,
                )),
                None => {}
            }

            let IdentityState::Running(pid) = watch.tracker.state() else {
                continue;
            };

            // The pid can race the snapshot; skip the sample for this tick.
            let Some(bytes) = forest.subtree_rss(pid) else {
                warn!("No process stats for pid {} ({})", pid, watch.spec.name);
                continue;
            };

            self.bus.dispatch(&Event::new(
                EventKind::MemoryMeasured,
                Arc::clone(&watch.spec),
                Some(Payload::Bytes(bytes)),
            ));
            if watch.detector.observe(bytes) {
                self.bus.dispatch(&Event::new(
                    EventKind::MemoryLimit,
                    Arc::clone(&watch.spec),
                    Some(Payload::Bytes(bytes)),
                ));
            }
        }
        Ok(())
    }

    /// Dispatch start events, then poll forever at the configured interval.
    /// Returns only on a fatal error.
    pub async fn run(mut self) -> Result<()> {
        self.start();
        let mut interval = tokio::time::interval(self.interval);
        loop {
            interval.tick().await;
            self.poll_once()?;
        }
    }
}
