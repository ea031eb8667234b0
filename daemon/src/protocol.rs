//! IPC protocol definitions (JSON messages)

use serde::{Deserialize, Serialize};

use crate::event::Event;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    Ping,
    ListServices,
    GetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Response {
        id: Option<String>,
        data: serde_json::Value,
    },
    Event {
        data: EventData,
    },
}

/// Wire form of an engine event pushed to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub kind: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}

impl From<&Event> for EventData {
    fn from(event: &Event) -> Self {
        Self {
            kind: event.kind.to_string(),
            service: event.service.name.clone(),
            pid: event.pid(),
            bytes: event.bytes(),
        }
    }
}
