//! `/proc/diskstats` — keyed by `(major, minor)`; new devices are appended,
//! existing ones updated in place.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::collector::CollectorSink;
use crate::error::Result;
use crate::scheduler::Lane;
use crate::sources::DataSource;
use crate::wire::monitor::{data::Payload, DiskStatsEntry, SysProcDiskStats as WireSysProcDiskStats};

fn parse_line(line: &str) -> Option<DiskStatsEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 14 {
        return None;
    }
    Some(DiskStatsEntry {
        major: fields[0].parse().ok()?,
        minor: fields[1].parse().ok()?,
        device: fields[2].to_owned(),
        reads_completed: fields[3].parse().ok()?,
        reads_merged: fields[4].parse().ok()?,
        sectors_read: fields[5].parse().ok()?,
        time_reading_ms: fields[6].parse().ok()?,
        writes_completed: fields[7].parse().ok()?,
        writes_merged: fields[8].parse().ok()?,
        sectors_written: fields[9].parse().ok()?,
        time_writing_ms: fields[10].parse().ok()?,
        ios_in_progress: fields[11].parse().ok()?,
        time_io_ms: fields[12].parse().ok()?,
        weighted_time_io_ms: fields[13].parse().ok()?,
    })
}

pub struct SysProcDiskStatsSource {
    entries: Vec<DiskStatsEntry>,
    update_pending: AtomicBool,
}

impl SysProcDiskStatsSource {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            update_pending: AtomicBool::new(false),
        }
    }

    fn refresh(&mut self) {
        let Ok(contents) = fs::read_to_string("/proc/diskstats") else {
            return;
        };
        for line in contents.lines() {
            let Some(parsed) = parse_line(line) else {
                continue;
            };
            match self
                .entries
                .iter_mut()
                .find(|e| e.major == parsed.major && e.minor == parsed.minor)
            {
                Some(existing) => *existing = parsed,
                None => self.entries.push(parsed),
            }
        }
    }
}

impl Default for SysProcDiskStatsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for SysProcDiskStatsSource {
    fn update(&mut self, lane: Lane) {
        if lane != Lane::Pace {
            return;
        }
        if self.update_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        self.refresh();
        self.update_pending.store(false, Ordering::Release);
    }

    fn collect_and_send(&mut self, sink: &mut dyn CollectorSink) -> Result<()> {
        sink.send_data(
            crate::wire::monitor::data::What::SysProcDiskStats,
            Payload::SysProcDiskStats(WireSysProcDiskStats {
                entry: self.entries.clone(),
            }),
        )
    }

    fn name(&self) -> &'static str {
        "SysProcDiskStats"
    }
}
