//! `/proc/buddyinfo` — keyed by `(node, zone)`; the per-order free-page
//! counts are rendered as one space-separated string, matching the
//! reference implementation's wire payload.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::collector::CollectorSink;
use crate::error::Result;
use crate::scheduler::Lane;
use crate::sources::DataSource;
use crate::wire::monitor::{data::Payload, BuddyInfoEntry, SysProcBuddyInfo as WireSysProcBuddyInfo};

fn parse_line(line: &str) -> Option<BuddyInfoEntry> {
    // "Node 0, zone      DMA      1      0      1 ..."
    let rest = line.strip_prefix("Node ")?;
    let (node, rest) = rest.split_once(',')?;
    let rest = rest.trim().strip_prefix("zone")?;
    let mut fields = rest.split_whitespace();
    let zone = fields.next()?.to_owned();
    let free_pages = fields.collect::<Vec<_>>().join(" ");
    Some(BuddyInfoEntry {
        node: node.trim().to_owned(),
        zone,
        free_pages,
    })
}

pub struct SysProcBuddyInfoSource {
    entries: Vec<BuddyInfoEntry>,
    update_pending: AtomicBool,
}

impl SysProcBuddyInfoSource {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            update_pending: AtomicBool::new(false),
        }
    }

    fn refresh(&mut self) {
        let Ok(contents) = fs::read_to_string("/proc/buddyinfo") else {
            return;
        };
        for line in contents.lines() {
            let Some(parsed) = parse_line(line) else {
                continue;
            };
            match self
                .entries
                .iter_mut()
                .find(|e| e.node == parsed.node && e.zone == parsed.zone)
            {
                Some(existing) => *existing = parsed,
                None => self.entries.push(parsed),
            }
        }
    }
}

impl Default for SysProcBuddyInfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for SysProcBuddyInfoSource {
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
            crate::wire::monitor::data::What::SysProcBuddyInfo,
            Payload::SysProcBuddyInfo(WireSysProcBuddyInfo {
                entry: self.entries.clone(),
            }),
        )
    }

    fn name(&self) -> &'static str {
        "SysProcBuddyInfo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_node_and_zone() {
        let entry = parse_line("Node 0, zone      DMA      1      0      1      2").unwrap();
        assert_eq!(entry.node, "0");
        assert_eq!(entry.zone, "DMA");
        assert_eq!(entry.free_pages, "1 0 1 2");
    }
}
