//! Built-in reactions and the taps backing the IPC surface

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::info;

use crate::event::{Event, EventKind, Payload, Reaction};
use crate::executor;
use crate::notifier;
use crate::protocol::{EventData, Response};

/// Resolve a config action name to its reaction. Unknown names are the
/// caller's problem (warn and skip the binding).
pub fn resolve(action: &str) -> Option<Arc<dyn Reaction>> {
    match action {
        "restart" => Some(Arc::new(RestartReaction)),
        "notify" => Some(Arc::new(NotifyReaction)),
        "log" => Some(Arc::new(LogReaction)),
        _ => None,
    }
}

fn describe(event: &Event) -> String {
    match event.payload {
        Some(Payload::Pid(pid)) => format!("{} (pid {})", event.kind, pid),
        Some(Payload::Bytes(bytes)) => format!("{} ({} bytes)", event.kind, bytes),
        None => event.kind.to_string(),
    }
}

/// Asks the supervisor to restart the originating service.
pub struct RestartReaction;

impl Reaction for RestartReaction {
    fn invoke(&self, event: &Event) -> Result<()> {
        info!("Restarting {} after {}", event.service.name, event.kind);
        executor::restart_unit(&event.service.name)
            .with_context(|| format!("restarting {}", event.service.name))
    }
}

/// Sends a desktop notification describing the event.
pub struct NotifyReaction;

impl Reaction for NotifyReaction {
    fn invoke(&self, event: &Event) -> Result<()> {
        let summary = format!("memwarden: {}", event.service.name);
        notifier::notify(&summary, &describe(event))
            .map_err(|e| anyhow::anyhow!("desktop notification failed: {}", e))?;
        Ok(())
    }
}

/// Writes a structured log line for the event.
pub struct LogReaction;

impl Reaction for LogReaction {
    fn invoke(&self, event: &Event) -> Result<()> {
        info!("{}: {}", event.service.name, describe(event));
        Ok(())
    }
}

/// Latest observed status of one service, maintained from the event stream.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatus {
    pub pid: Option<u32>,
    pub last_rss: Option<u64>,
    pub events: u64,
    pub alarms: u64,
}

/// Bus tap that folds every event into a per-service status map. The
/// engine task writes through `invoke`; the socket side only reads
/// snapshots.
#[derive(Default)]
pub struct StatusBoard {
    inner: Mutex<HashMap<String, ServiceStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> HashMap<String, ServiceStatus> {
        self.inner.lock().unwrap().clone()
    }
}

impl Reaction for StatusBoard {
    fn invoke(&self, event: &Event) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let status = inner.entry(event.service.name.clone()).or_default();
        status.events += 1;
        match event.kind {
            EventKind::Up | EventKind::PidChange => status.pid = event.pid(),
            EventKind::Down => {
                status.pid = None;
                status.last_rss = None;
            }
            EventKind::MemoryMeasured => status.last_rss = event.bytes(),
            EventKind::MemoryLimit => status.alarms += 1,
            EventKind::MonitorStart => {}
        }
        Ok(())
    }
}

/// Bus tap that pushes every event to connected IPC clients.
pub struct BroadcastReaction {
    tx: broadcast::Sender<String>,
}

impl BroadcastReaction {
    pub fn new(tx: broadcast::Sender<String>) -> Self {
        Self { tx }
    }
}

impl Reaction for BroadcastReaction {
    fn invoke(&self, event: &Event) -> Result<()> {
        let message = Response::Event {
            data: EventData::from(event),
        };
        if let Ok(json) = serde_json::to_string(&message) {
            // No receivers connected is fine.
            let _ = self.tx.send(json);
        }
        Ok(())
    }
}
