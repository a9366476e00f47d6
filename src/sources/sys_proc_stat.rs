//! `/proc/stat` — per-CPU jiffy counters, reported as percentages of the
//! delta against the previous sample. The first observation after startup
//! establishes a baseline and reports zero.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::collector::CollectorSink;
use crate::error::Result;
use crate::scheduler::Lane;
use crate::sources::DataSource;
use crate::wire::monitor::{data::Payload, CpuStat as CPUStat, SysProcStat as WireSysProcStat};

#[derive(Clone, Copy, Default)]
struct Jiffies {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
    iowait: u64,
    irq: u64,
    softirq: u64,
    steal: u64,
    guest: u64,
    guest_nice: u64,
}

impl Jiffies {
    fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
            + self.guest
            + self.guest_nice
    }

    fn busy(&self) -> u64 {
        self.total() - self.idle - self.iowait
    }

    /// All ten counters are required, matching the reference implementation's
    /// `sscanf` format string, which fails the whole line (`cnt < 11`,
    /// counting the leading `cpu`/`cpuN` label) rather than defaulting any
    /// of them — a line this short means a kernel that doesn't report the
    /// full jiffy breakdown, and reporting partial percentages against an
    /// incomplete total would be worse than dropping the sample.
    fn parse(fields: &[&str]) -> Option<Self> {
        Some(Self {
            user: fields.first()?.parse().ok()?,
            nice: fields.get(1)?.parse().ok()?,
            system: fields.get(2)?.parse().ok()?,
            idle: fields.get(3)?.parse().ok()?,
            iowait: fields.get(4)?.parse().ok()?,
            irq: fields.get(5)?.parse().ok()?,
            softirq: fields.get(6)?.parse().ok()?,
            steal: fields.get(7)?.parse().ok()?,
            guest: fields.get(8)?.parse().ok()?,
            guest_nice: fields.get(9)?.parse().ok()?,
        })
    }
}

fn cpu_stat(name: &str, prev: Option<&Jiffies>, cur: &Jiffies) -> CPUStat {
    let Some(prev) = prev else {
        return CPUStat {
            name: name.to_owned(),
            usr: 0,
            sys: 0,
            iow: 0,
            all: 0,
        };
    };
    let delta_total = cur.total().saturating_sub(prev.total());
    if delta_total == 0 {
        return CPUStat {
            name: name.to_owned(),
            usr: 0,
            sys: 0,
            iow: 0,
            all: 0,
        };
    }
    let pct = |delta: u64| ((delta * 100) / delta_total) as u32;
    CPUStat {
        name: name.to_owned(),
        usr: pct((cur.user + cur.nice).saturating_sub(prev.user + prev.nice)),
        sys: pct(cur.system.saturating_sub(prev.system)),
        iow: pct(cur.iowait.saturating_sub(prev.iowait)),
        all: pct(cur.busy().saturating_sub(prev.busy())),
    }
}

pub struct SysProcStatSource {
    last: HashMap<String, Jiffies>,
    current: WireSysProcStat,
    update_pending: AtomicBool,
}

impl SysProcStatSource {
    pub fn new() -> Self {
        Self {
            last: HashMap::new(),
            current: WireSysProcStat::default(),
            update_pending: AtomicBool::new(false),
        }
    }

    fn refresh(&mut self) {
        let Ok(contents) = fs::read_to_string("/proc/stat") else {
            return;
        };

        let mut cpu = CPUStat::default();
        let mut cores = Vec::new();

        for line in contents.lines() {
            let mut fields = line.split_whitespace();
            let Some(label) = fields.next() else { continue };
            if !label.starts_with("cpu") {
                continue;
            }
            // A malformed/short counter line drops just that one CPU's
            // sample rather than the whole update; the previous sample for
            // that label (if any) is kept until the next successful parse.
            let rest: Vec<&str> = fields.collect();
            let Some(jiffies) = Jiffies::parse(&rest) else {
                log::warn!("dropping malformed /proc/stat line for {}", label);
                continue;
            };
            let prev = self.last.get(label).copied();
            let stat = cpu_stat(label, prev.as_ref(), &jiffies);
            if label == "cpu" {
                cpu = stat;
            } else {
                cores.push(stat);
            }
            self.last.insert(label.to_owned(), jiffies);
        }

        self.current = WireSysProcStat {
            cpu: Some(cpu),
            core: cores,
        };
    }
}

impl Default for SysProcStatSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for SysProcStatSource {
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
            crate::wire::monitor::data::What::SysProcStat,
            Payload::SysProcStat(self.current.clone()),
        )
    }

    fn name(&self) -> &'static str {
        "SysProcStat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_is_zeroed() {
        let stat = cpu_stat("cpu", None, &Jiffies::default());
        assert_eq!(stat.all, 0);
        assert_eq!(stat.usr, 0);
    }

    #[test]
    fn delta_percent_sums_to_all() {
        let prev = Jiffies {
            user: 100,
            nice: 0,
            system: 50,
            idle: 850,
            iowait: 0,
            irq: 0,
            softirq: 0,
            steal: 0,
            guest: 0,
            guest_nice: 0,
        };
        let cur = Jiffies {
            user: 150,
            nice: 0,
            system: 70,
            idle: 870,
            iowait: 10,
            irq: 0,
            softirq: 0,
            steal: 0,
            guest: 0,
            guest_nice: 0,
        };
        let stat = cpu_stat("cpu", Some(&prev), &cur);
        assert_eq!(stat.all, stat.usr + stat.sys + stat.iow);
    }

    #[test]
    fn parse_reads_all_ten_counters() {
        let fields = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "10"];
        let jiffies = Jiffies::parse(&fields).unwrap();
        assert_eq!(jiffies.guest, 9);
        assert_eq!(jiffies.guest_nice, 10);
        assert_eq!(jiffies.total(), 55);
    }

    #[test]
    fn parse_fails_a_line_missing_guest_counters() {
        let fields = ["1", "2", "3", "4", "5", "6", "7", "8"];
        assert!(Jiffies::parse(&fields).is_none());
    }
}
