//! `/proc/net/wireless` — keyed by interface name. Quality link/level/noise
//! fields may carry a trailing '.' which must be stripped before parsing.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::collector::CollectorSink;
use crate::error::Result;
use crate::scheduler::Lane;
use crate::sources::DataSource;
use crate::wire::monitor::{data::Payload, SysProcWireless as WireSysProcWireless, WirelessEntry};

fn strip_trailing_dot(value: &str) -> &str {
    value.strip_suffix('.').unwrap_or(value)
}

fn parse_line(line: &str) -> Option<WirelessEntry> {
    let (iface, rest) = line.split_once(':')?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() < 4 {
        return None;
    }
    Some(WirelessEntry {
        interface: iface.trim().to_owned(),
        status: i32::from_str_radix(strip_trailing_dot(fields[0]).trim_start_matches("0x"), 16)
            .unwrap_or(0),
        link: strip_trailing_dot(fields[1]).parse().unwrap_or(0.0),
        level: strip_trailing_dot(fields[2]).parse().unwrap_or(0.0),
        noise: strip_trailing_dot(fields[3]).parse().unwrap_or(0.0),
    })
}

pub struct SysProcWirelessSource {
    entries: Vec<WirelessEntry>,
    update_pending: AtomicBool,
}

impl SysProcWirelessSource {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            update_pending: AtomicBool::new(false),
        }
    }

    fn refresh(&mut self) {
        let Ok(contents) = fs::read_to_string("/proc/net/wireless") else {
            return;
        };
        // First two lines are headers.
        for line in contents.lines().skip(2) {
            let Some(parsed) = parse_line(line) else {
                continue;
            };
            match self.entries.iter_mut().find(|e| e.interface == parsed.interface) {
                Some(existing) => *existing = parsed,
                None => self.entries.push(parsed),
            }
        }
    }
}

impl Default for SysProcWirelessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for SysProcWirelessSource {
    fn update(&mut self, lane: Lane) {
        if lane != Lane::Slow {
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
            crate::wire::monitor::data::What::SysProcWireless,
            Payload::SysProcWireless(WireSysProcWireless {
                entry: self.entries.clone(),
            }),
        )
    }

    fn name(&self) -> &'static str {
        "SysProcWireless"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_dot() {
        assert_eq!(strip_trailing_dot("59."), "59");
        assert_eq!(strip_trailing_dot("59"), "59");
    }

    #[test]
    fn parses_entry() {
        let entry = parse_line("  wlan0: 0000   59.  -256.  -10.        0      0      0      0      0        0").unwrap();
        assert_eq!(entry.interface, "wlan0");
        assert_eq!(entry.link, 59.0);
    }
}
