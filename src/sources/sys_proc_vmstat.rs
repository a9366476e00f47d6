//! `/proc/vmstat` — a fixed whitelist of counters; unknown lines are
//! skipped rather than rejected, since the kernel adds new ones over time.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::collector::CollectorSink;
use crate::error::Result;
use crate::scheduler::Lane;
use crate::sources::DataSource;
use crate::wire::monitor::{data::Payload, SysProcVmStat as WireSysProcVMStat};

pub struct SysProcVMStatSource {
    current: WireSysProcVMStat,
    update_pending: AtomicBool,
}

impl SysProcVMStatSource {
    pub fn new() -> Self {
        Self {
            current: WireSysProcVMStat::default(),
            update_pending: AtomicBool::new(false),
        }
    }

    fn refresh(&mut self) {
        let Ok(contents) = fs::read_to_string("/proc/vmstat") else {
            return;
        };

        let mut values = std::collections::HashMap::new();
        for line in contents.lines() {
            let mut parts = line.split_whitespace();
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            if let Ok(v) = value.parse::<u64>() {
                values.insert(key, v);
            }
        }
        let get = |key: &str| values.get(key).copied().unwrap_or(0);

        self.current = WireSysProcVMStat {
            pgpgin: get("pgpgin"),
            pgpgout: get("pgpgout"),
            pswpin: get("pswpin"),
            pswpout: get("pswpout"),
            pgmajfault: get("pgmajfault"),
            pgsteal_kswapd: get("pgsteal_kswapd"),
            pgsteal_direct: get("pgsteal_direct"),
            pgscan_kswapd: get("pgscan_kswapd"),
            pgscan_direct: get("pgscan_direct"),
            oom_kill: get("oom_kill"),
            compact_stall: get("compact_stall"),
            thp_fault_alloc: get("thp_fault_alloc"),
            thp_collapse_alloc: get("thp_collapse_alloc"),
        };
    }
}

impl Default for SysProcVMStatSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for SysProcVMStatSource {
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
            crate::wire::monitor::data::What::SysProcVmStat,
            Payload::SysProcVmStat(self.current.clone()),
        )
    }

    fn name(&self) -> &'static str {
        "SysProcVMStat"
    }
}
