use super::{ForestSource, ProcessForest, ProcessRecord};
use std::fs;
use std::io;
use std::path::Path;

pub struct LinuxForestSource {
    page_size: u64,
}

impl LinuxForestSource {
    pub fn new() -> Self {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u64 };
        Self { page_size }
    }

    fn parse_process(&self, pid: u32) -> Option<ProcessRecord> {
        let proc_path = format!("/proc/{}", pid);
        let proc_dir = Path::new(&proc_path);

        let stat_content = fs::read_to_string(proc_dir.join("stat")).ok()?;
        let stat_parts: Vec<&str> = stat_content.split_whitespace().collect();
        if stat_parts.len() < 24 {
            return None;
        }

        let name = stat_parts[1].trim_matches(|c| c == '(' || c == ')').to_string();
        let ppid: u32 = stat_parts[3].parse().ok()?;
        let rss_pages: u64 = stat_parts[23].parse().unwrap_or(0);

        Some(ProcessRecord {
            pid,
            ppid,
            name,
            rss_bytes: rss_pages * self.page_size,
        })
    }
}

impl Default for LinuxForestSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ForestSource for LinuxForestSource {
    fn discover(&self) -> io::Result<ProcessForest> {
        let mut records = Vec::new();
        // Processes can vanish mid-walk; unreadable entries are skipped.
        for entry in fs::read_dir("/proc")?.flatten() {
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(pid) = name.parse::<u32>() {
                    if let Some(record) = self.parse_process(pid) {
                        records.push(record);
                    }
                }
            }
        }
        Ok(ProcessForest::from_records(records))
    }
}
