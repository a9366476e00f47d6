//! Canonical set of live processes and the container-context aggregates
//! derived from them. All mutation happens on the registry's own worker;
//! external callers (the process-event source, the initial `/proc` scan,
//! the accounting callback) issue commands that land on its work queue.

pub mod context_entry;
pub mod proc_entry;

pub use context_entry::ContextEntry;
pub use proc_entry::ProcEntry;

use std::fs;
use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::container_runtime::ContainerRuntime;
use crate::scheduler::Lane;
use crate::util::SafeList;

const ROOT_PID: i32 = 1;
const UNSET_CTX_ID: u64 = u64::MAX;

pub struct ProcRegistry {
    procs: SafeList<ProcEntry>,
    contexts: SafeList<ContextEntry>,
    blacklist: Vec<String>,
    root_ctx_id: AtomicU64,
}

impl ProcRegistry {
    pub fn new(blacklist: Vec<String>) -> Self {
        Self {
            procs: SafeList::new(),
            contexts: SafeList::new(),
            blacklist,
            root_ctx_id: AtomicU64::new(UNSET_CTX_ID),
        }
    }

    pub fn is_blacklisted(&self, name: &str) -> bool {
        self.blacklist.iter().any(|entry| name.contains(entry.as_str()))
    }

    /// First whitespace-separated token after `Name:` in `/proc/<pid>/status`.
    pub fn resolve_name(pid: i32) -> Option<String> {
        let file = fs::File::open(format!("/proc/{}/status", pid)).ok()?;
        for line in BufReader::new(file).lines() {
            let line = line.ok()?;
            if let Some(rest) = line.strip_prefix("Name:") {
                return Some(rest.trim().split_whitespace().next()?.to_owned());
            }
        }
        None
    }

    /// Reads the trailing decimal inode out of the `/proc/<pid>/ns/pid`
    /// symlink target, e.g. `pid:[4026531836]`.
    pub fn resolve_ctx_id(pid: i32) -> Option<u64> {
        let target = fs::read_link(format!("/proc/{}/ns/pid", pid)).ok()?;
        let target = target.to_str()?;
        let digits: String = target.chars().filter(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }

    pub fn resolve_ctx_name(&self, pid: i32, ctx_id: u64, runtime: &dyn ContainerRuntime) -> String {
        if pid == ROOT_PID {
            self.root_ctx_id.store(ctx_id, Ordering::Relaxed);
            return "root".to_owned();
        }
        if self.root_ctx_id.load(Ordering::Relaxed) == ctx_id {
            return "root".to_owned();
        }
        runtime.resolve(ctx_id).unwrap_or_else(|| "unknown".to_owned())
    }

    pub fn add_proc_entry(&self, pid: i32, tgid: i32, runtime: &dyn ContainerRuntime) {
        let Some(name) = Self::resolve_name(pid) else {
            return;
        };
        if self.is_blacklisted(&name) {
            return;
        }
        if self.procs.find(|e| e.pid == pid).is_some() {
            return;
        }
        let ctx_id = Self::resolve_ctx_id(pid).unwrap_or(0);
        let ctx_name = self.resolve_ctx_name(pid, ctx_id, runtime);

        self.procs
            .append(ProcEntry::new(pid, tgid, name, ctx_id, ctx_name.clone()));
        self.procs.commit();

        if self.contexts.find(|c| c.ctx_id == ctx_id).is_none() {
            self.contexts.append(ContextEntry::new(ctx_id, ctx_name));
            self.contexts.commit();
        }
    }

    pub fn upd_proc_entry(&self, pid: i32) {
        let Some(name) = Self::resolve_name(pid) else {
            return;
        };
        if self.is_blacklisted(&name) {
            self.rem_proc_entry(pid);
            return;
        }
        self.procs.remove(|e| e.pid == pid && e.name != name);
        if let Some(mut entry) = self.procs.find(|e| e.pid == pid) {
            if entry.name != name {
                entry.name = name;
                self.procs.append(entry);
            }
        }
        self.procs.commit();
    }

    pub fn rem_proc_entry(&self, pid: i32) {
        self.procs.remove(|e| e.pid == pid);
        self.procs.commit();
    }

    pub fn rem_proc_entry_by_name(&self, name: &str) {
        self.procs.remove(|e| e.name == name);
        self.procs.commit();
    }

    pub fn get_proc_entry(&self, pid: i32) -> Option<ProcEntry> {
        self.procs.find(|e| e.pid == pid)
    }

    /// Latches `acct_pending` so the accounting source doesn't re-request a
    /// taskstats reply that's already in flight.
    pub fn mark_acct_pending(&self, pid: i32) {
        if let Some(mut entry) = self.procs.find(|e| e.pid == pid) {
            entry.acct_pending = true;
            self.procs.remove(|e| e.pid == pid);
            self.procs.append(entry);
            self.procs.commit();
        }
    }

    /// Records a taskstats reply against the matching entry and clears its
    /// pending latch.
    pub fn set_proc_acct(&self, pid: i32, acct: crate::wire::monitor::ProcAcct) {
        if let Some(mut entry) = self.procs.find(|e| e.pid == pid) {
            entry.acct = acct;
            entry.acct_pending = false;
            self.procs.remove(|e| e.pid == pid);
            self.procs.append(entry);
            self.procs.commit();
        }
    }

    pub fn get_proc_entry_by_name(&self, name: &str) -> Option<ProcEntry> {
        self.procs.find(|e| e.name == name)
    }

    pub fn proc_count(&self) -> usize {
        self.procs.len()
    }

    pub fn foreach_proc<F: FnMut(&ProcEntry)>(&self, f: F) {
        self.procs.foreach(f)
    }

    /// Enumerate `/proc/<numeric>`, skip blacklisted names, create entries.
    /// Gated at the call site by the `ReadProcAtInit` config flag.
    pub fn init_from_proc(&self, runtime: &dyn ContainerRuntime) {
        let Ok(entries) = fs::read_dir("/proc") else {
            return;
        };
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let Some(pid_str) = file_name.to_str() else {
                continue;
            };
            let Ok(pid) = pid_str.parse::<i32>() else {
                continue;
            };
            self.add_proc_entry(pid, pid, runtime);
        }
    }

    /// Pace lane: refresh `ProcInfo` for every entry. Slow lane: the caller
    /// is expected to issue taskstats requests per entry instead (handled
    /// by the `sources::proc_acct` worker, which owns the netlink socket).
    pub fn update(&self, lane: Lane, interval_jiffies: u64) {
        if lane != Lane::Pace {
            return;
        }
        let snapshot = self.procs.snapshot();
        for entry in snapshot.iter() {
            let Some(mut updated) = self.refresh_proc_info(entry, interval_jiffies) else {
                self.procs.remove(|e| e.pid == entry.pid);
                continue;
            };
            updated.acct = entry.acct.clone();
            updated.acct_pending = entry.acct_pending;
            self.procs.remove(|e| e.pid == entry.pid);
            self.procs.append(updated);
        }
        self.procs.commit();
    }

    fn refresh_proc_info(&self, entry: &ProcEntry, interval_jiffies: u64) -> Option<ProcEntry> {
        let stat = fs::read_to_string(format!("/proc/{}/stat", entry.pid)).ok()?;
        let after_comm = stat.rsplit_once(')')?.1;
        let fields: Vec<&str> = after_comm.split_whitespace().collect();
        // utime is field 14, stime is field 15 counting from `pid` as field 1;
        // after stripping "pid (comm)" what remains starts at field 3 (state).
        let utime: u64 = fields.get(11).and_then(|v| v.parse().ok())?;
        let stime: u64 = fields.get(12).and_then(|v| v.parse().ok())?;

        let statm = fs::read_to_string(format!("/proc/{}/statm", entry.pid)).ok()?;
        let statm_fields: Vec<&str> = statm.split_whitespace().collect();
        let page_size = 4096u64;
        let vmsize = statm_fields
            .first()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            * page_size;
        let vmrss = statm_fields
            .get(1)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            * page_size;

        // First observation of this process: seed the baseline instead of
        // computing a delta against zero, which would otherwise report a
        // spurious near-100% spike for the lifetime-accumulated jiffies of
        // every process `init_from_proc` picks up at startup.
        let cpu_percent = if entry.last_utime == 0 && entry.last_stime == 0 {
            0
        } else {
            entry.cpu_percent(utime, stime, interval_jiffies)
        };

        let mut updated = entry.clone();
        updated.last_utime = utime;
        updated.last_stime = stime;
        updated.info.cpu_percent = cpu_percent;
        updated.info.cpu_time = utime + stime;
        updated.info.mem_vmrss = vmrss;
        updated.info.mem_vmsize = vmsize;
        updated.info.pid = entry.pid;
        updated.info.name = entry.name.clone();
        updated.info.ctx_id = entry.ctx_id;
        updated.info.ctx_name = entry.ctx_name.clone();
        Some(updated)
    }

    /// Zero every context, sum matching process fields into it, then drop
    /// contexts left with no members. Runs only when context info is
    /// actually requested by a collector.
    pub fn refresh_contexts(&self) {
        let procs = self.procs.snapshot();
        let contexts = self.contexts.snapshot();

        let mut rebuilt: Vec<ContextEntry> = contexts
            .iter()
            .map(|c| {
                let mut c = c.clone();
                c.reset();
                c
            })
            .collect();

        for proc_entry in procs.iter() {
            if let Some(ctx) = rebuilt.iter_mut().find(|c| c.ctx_id == proc_entry.ctx_id) {
                ctx.total_cpu_time += proc_entry.info.cpu_time;
                ctx.total_cpu_percent += proc_entry.info.cpu_percent;
                ctx.total_mem_vmrss += proc_entry.info.mem_vmrss;
            }
        }

        rebuilt.retain(|c| procs.iter().any(|p| p.ctx_id == c.ctx_id));

        self.contexts.remove(|_| true);
        for ctx in rebuilt {
            self.contexts.append(ctx);
        }
        self.contexts.commit();
    }

    pub fn foreach_context<F: FnMut(&ContextEntry)>(&self, f: F) {
        self.contexts.foreach(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container_runtime::NullContainerRuntime;

    #[test]
    fn blacklist_substring_match() {
        let registry = ProcRegistry::new(vec!["kworker".to_owned()]);
        assert!(registry.is_blacklisted("kworker/0:1"));
        assert!(!registry.is_blacklisted("sshd"));
    }

    #[test]
    fn pid_one_resolves_to_root() {
        let registry = ProcRegistry::new(vec![]);
        let runtime = NullContainerRuntime;
        let name = registry.resolve_ctx_name(1, 4026531836, &runtime);
        assert_eq!(name, "root");
    }

    #[test]
    fn unmatched_context_resolves_unknown() {
        let registry = ProcRegistry::new(vec![]);
        let runtime = NullContainerRuntime;
        let name = registry.resolve_ctx_name(42, 999, &runtime);
        assert_eq!(name, "unknown");
    }
}
