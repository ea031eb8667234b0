//! Event vocabulary and synchronous dispatch

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::error;

use crate::monitor::{ServiceId, ServiceSpec};

/// The stable event vocabulary. The string forms are what config files bind
/// handlers to and what the IPC surface reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MonitorStart,
    Up,
    Down,
    PidChange,
    MemoryMeasured,
    MemoryLimit,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::MonitorStart,
        EventKind::Up,
        EventKind::Down,
        EventKind::PidChange,
        EventKind::MemoryMeasured,
        EventKind::MemoryLimit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::MonitorStart => "monitor/start",
            EventKind::Up => "monitoring/up",
            EventKind::Down => "monitoring/down",
            EventKind::PidChange => "monitoring/pid-change",
            EventKind::MemoryMeasured => "memory/measured",
            EventKind::MemoryLimit => "memory/limit",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Pid(u32),
    Bytes(u64),
}

/// One occurrence, created transiently by the engine and consumed
/// synchronously by dispatch. Never persisted.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub service: Arc<ServiceSpec>,
    pub payload: Option<Payload>,
}

impl Event {
    pub fn new(kind: EventKind, service: Arc<ServiceSpec>, payload: Option<Payload>) -> Self {
        Self {
            kind,
            service,
            payload,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        match self.payload {
            Some(Payload::Pid(pid)) => Some(pid),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Option<u64> {
        match self.payload {
            Some(Payload::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }
}

pub trait Reaction: Send + Sync {
    fn invoke(&self, event: &Event) -> anyhow::Result<()>;
}

/// Registry of (service, event kind) -> ordered reactions.
///
/// Registration order is invocation order. Dispatch runs every matching
/// reaction in the calling task; a failing reaction is logged and does not
/// stop the ones after it.
#[derive(Default)]
pub struct EventBus {
    reactions: HashMap<(ServiceId, EventKind), Vec<Arc<dyn Reaction>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, service: ServiceId, kind: EventKind, reaction: Arc<dyn Reaction>) {
        self.reactions
            .entry((service, kind))
            .or_default()
            .push(reaction);
    }

    pub fn dispatch(&self, event: &Event) {
        let Some(bound) = self.reactions.get(&(event.service.id, event.kind)) else {
            // Most kinds have zero or one reaction bound; nothing to do.
            return;
        };
        for reaction in bound {
            if let Err(e) = reaction.invoke(event) {
                error!(
                    "Reaction for {} on {} failed: {:#}",
                    event.kind, event.service.name, e
                );
            }
        }
    }
}
