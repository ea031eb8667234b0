use super::{ServiceHandle, Supervisor, SupervisorError};
use std::io;
use std::process::Command;

/// Resolves service pids through `systemctl`.
pub struct Systemd;

impl Systemd {
    fn show_property(unit: &str, property: &str) -> Result<String, SupervisorError> {
        let output = Command::new("systemctl")
            .args(["show", "--property", property, "--value", unit])
            .output()
            .map_err(|source| SupervisorError::Lookup {
                unit: unit.to_string(),
                source,
            })?;
        if !output.status.success() {
            return Err(SupervisorError::Lookup {
                unit: unit.to_string(),
                source: io::Error::new(
                    io::ErrorKind::Other,
                    format!("systemctl exited with {}", output.status),
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Supervisor for Systemd {
    fn attach(&self, unit: &str) -> Result<Box<dyn ServiceHandle>, SupervisorError> {
        let load_state = Self::show_property(unit, "LoadState")?;
        if load_state != "loaded" {
            return Err(SupervisorError::Lookup {
                unit: unit.to_string(),
                source: io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("unit load state is {:?}", load_state),
                ),
            });
        }
        Ok(Box::new(SystemdUnit {
            unit: unit.to_string(),
        }))
    }
}

pub struct SystemdUnit {
    unit: String,
}

impl ServiceHandle for SystemdUnit {
    fn current_pid(&self) -> Result<u32, SupervisorError> {
        // MainPID is 0 while the unit is inactive.
        let value = Systemd::show_property(&self.unit, "MainPID")?;
        match value.parse::<u32>() {
            Ok(0) | Err(_) => Err(SupervisorError::NotRunning {
                unit: self.unit.clone(),
            }),
            Ok(pid) => Ok(pid),
        }
    }
}
