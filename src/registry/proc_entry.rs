use crate::wire::monitor::{ProcAcct, ProcInfo};

/// A live process as tracked by the registry. Created on fork/exec or initial
/// `/proc` scan; mutated only by the registry's own worker; destroyed on a
/// matching exit event or when `/proc/<pid>` disappears during a refresh.
#[derive(Clone, Debug)]
pub struct ProcEntry {
    pub pid: i32,
    pub tgid: i32,
    pub name: String,
    pub ctx_id: u64,
    pub ctx_name: String,
    pub last_utime: u64,
    pub last_stime: u64,
    pub info: ProcInfo,
    pub acct: ProcAcct,
    pub acct_pending: bool,
}

impl ProcEntry {
    pub fn new(pid: i32, tgid: i32, name: String, ctx_id: u64, ctx_name: String) -> Self {
        Self {
            pid,
            tgid,
            name,
            ctx_id,
            ctx_name,
            last_utime: 0,
            last_stime: 0,
            info: ProcInfo {
                pid,
                name: String::new(),
                ctx_id,
                ctx_name: String::new(),
                cpu_percent: 0,
                cpu_time: 0,
                mem_vmrss: 0,
                mem_vmsize: 0,
            },
            acct: ProcAcct::default(),
            acct_pending: false,
        }
    }

    /// `((utime+stime) - lastCPUTime) * 100 / pollIntervalJiffies`, clamped
    /// so a first sample (no prior jiffies recorded) never overflows.
    pub fn cpu_percent(&self, utime: u64, stime: u64, interval_jiffies: u64) -> u32 {
        if interval_jiffies == 0 {
            return 0;
        }
        let prior = self.last_utime + self.last_stime;
        let current = utime + stime;
        let delta = current.saturating_sub(prior);
        ((delta * 100) / interval_jiffies).min(100) as u32
    }
}
