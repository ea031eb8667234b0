//! Configuration management (TOML)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::detector::default_significant;

pub const DEFAULT_POLL_SECONDS: u64 = 5;
pub const DEFAULT_POLL_SAMPLES: usize = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// Poll parameters as written in the config file. A zero means "unset";
/// `effective` resolves zeros to the documented defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default)]
    pub seconds: u64,
    #[serde(default)]
    pub samples: usize,
    #[serde(default)]
    pub significant: usize,
}

impl PollConfig {
    pub fn effective(&self) -> PollConfig {
        let seconds = if self.seconds == 0 {
            DEFAULT_POLL_SECONDS
        } else {
            self.seconds
        };
        let samples = if self.samples == 0 {
            DEFAULT_POLL_SAMPLES
        } else {
            self.samples
        };
        let significant = if self.significant == 0 {
            default_significant(samples)
        } else {
            self.significant
        };
        PollConfig {
            seconds,
            samples,
            significant,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    /// Human-readable memory ceiling, e.g. "500MB". Absent or unparseable
    /// means the service is measured but never alarmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    pub event: String,
    pub action: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> std::path::PathBuf {
        directories::ProjectDirs::from("", "", "memwarden")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| std::path::PathBuf::from("config.toml"))
    }
}

/// Parse a human-readable size string into bytes.
///
/// Accepts plain integers, decimal units (k/m/g/t, base 1000) and binary
/// units (ki/mi/gi/ti, base 1024), case-insensitive, with an optional
/// trailing `b` and fractional values ("1.5GB").
pub fn parse_bytes(s: &str) -> Option<u64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    if t.chars().all(|c| c.is_ascii_digit()) {
        return t.parse().ok();
    }
    let idx = t.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
    if idx == 0 {
        return None;
    }
    let (num_s, unit_s) = t.split_at(idx);
    let num: f64 = num_s.parse().ok()?;
    if !num.is_finite() || num < 0.0 {
        return None;
    }
    let mut unit = unit_s.trim().to_ascii_lowercase();
    if unit.len() > 1 && unit.ends_with('b') {
        unit.pop();
    }
    let mult: f64 = match unit.as_str() {
        "" | "b" => 1.0,
        "k" => 1000.0,
        "m" => 1000.0_f64.powi(2),
        "g" => 1000.0_f64.powi(3),
        "t" => 1000.0_f64.powi(4),
        "ki" => 1024.0,
        "mi" => 1024.0_f64.powi(2),
        "gi" => 1024.0_f64.powi(3),
        "ti" => 1024.0_f64.powi(4),
        _ => return None,
    };
    Some((num * mult) as u64)
}
