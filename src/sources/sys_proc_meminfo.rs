//! `/proc/meminfo`. Canonical name matching the dispatcher's
//! `GetSysProcMemInfo` action; see SPEC_FULL.md 9 for the duplicate-name
//! open question this resolves.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::collector::CollectorSink;
use crate::error::Result;
use crate::scheduler::Lane;
use crate::sources::DataSource;
use crate::wire::monitor::{data::Payload, SysProcMemInfo as WireSysProcMemInfo};

fn parse_meminfo(contents: &str) -> HashMap<String, u64> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let value_kb = rest
            .trim()
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(v) = value_kb {
            map.insert(key.to_owned(), v);
        }
    }
    map
}

fn percent(numerator: u64, denominator: u64) -> u32 {
    if denominator == 0 {
        0
    } else {
        ((numerator * 100) / denominator) as u32
    }
}

pub struct SysProcMemInfoSource {
    current: WireSysProcMemInfo,
    update_pending: AtomicBool,
}

impl SysProcMemInfoSource {
    pub fn new() -> Self {
        Self {
            current: WireSysProcMemInfo::default(),
            update_pending: AtomicBool::new(false),
        }
    }

    fn refresh(&mut self) {
        let Ok(contents) = fs::read_to_string("/proc/meminfo") else {
            return;
        };
        let fields = parse_meminfo(&contents);
        let get = |key: &str| fields.get(key).copied().unwrap_or(0);

        let mem_total = get("MemTotal");
        let mem_available = get("MemAvailable");
        let swap_total = get("SwapTotal");
        let swap_free = get("SwapFree");

        self.current = WireSysProcMemInfo {
            mem_total,
            mem_free: get("MemFree"),
            mem_available,
            mem_cached: get("Cached"),
            swap_total,
            swap_free,
            swap_cached: get("SwapCached"),
            mem_percent: percent(mem_available, mem_total),
            swap_percent: percent(swap_free, swap_total),
        };
    }
}

impl Default for SysProcMemInfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for SysProcMemInfoSource {
    fn update(&mut self, lane: Lane) {
        if lane != Lane::Fast {
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
            crate::wire::monitor::data::What::SysProcMemInfo,
            Payload::SysProcMemInfo(self.current.clone()),
        )
    }

    fn name(&self) -> &'static str {
        "SysProcMemInfo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_guards_against_zero_denominator() {
        assert_eq!(percent(10, 0), 0);
    }

    #[test]
    fn parses_kb_values() {
        let fields = parse_meminfo("MemTotal:       16384000 kB\nMemFree:         1000 kB\n");
        assert_eq!(fields.get("MemTotal"), Some(&16384000));
        assert_eq!(fields.get("MemFree"), Some(&1000));
    }
}
