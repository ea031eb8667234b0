//! Supervisor client: maps service names to live processes

use std::io;
use thiserror::Error;

pub mod systemd;
pub use systemd::Systemd;

#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The service exists but has no active process right now. This is a
    /// normal lookup outcome, not a query failure.
    #[error("service {unit} is not running")]
    NotRunning { unit: String },
    #[error("failed to query supervisor for {unit}")]
    Lookup {
        unit: String,
        #[source]
        source: io::Error,
    },
}

/// A supervisor entry for one named service, attached once at startup.
pub trait ServiceHandle: Send {
    fn current_pid(&self) -> Result<u32, SupervisorError>;
}

pub trait Supervisor {
    fn attach(&self, unit: &str) -> Result<Box<dyn ServiceHandle>, SupervisorError>;
}
