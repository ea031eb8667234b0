//! Service control actions (systemctl wrappers)

use std::io;
use std::process::Command;

pub fn restart_unit(unit: &str) -> io::Result<()> {
    let status = Command::new("systemctl").args(["restart", unit]).status()?;
    if !status.success() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("systemctl restart {} exited with {}", unit, status),
        ));
    }
    Ok(())
}
