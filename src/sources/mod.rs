//! Data sources: each owns one kernel-facing record, refreshes it on its
//! assigned lane, and answers fan-out requests by writing its last
//! committed state to a collector. See SPEC_FULL.md 4.3.

pub mod proc_acct;
pub mod proc_event;
pub mod sys_proc_buddyinfo;
pub mod sys_proc_diskstats;
pub mod sys_proc_meminfo;
pub mod sys_proc_pressure;
pub mod sys_proc_stat;
pub mod sys_proc_vmstat;
pub mod sys_proc_wireless;

use crate::collector::CollectorSink;
use crate::error::Result;
use crate::scheduler::Lane;

/// Capability interface every source implements. Left open (a trait, not a
/// closed enum) since new `SysProc*` modules are expected to keep arriving.
pub trait DataSource {
    /// Invoked by the lane scheduler. Decides whether this lane should
    /// trigger a refresh and, if so, performs it (or enqueues it — sources
    /// with asynchronous answers, like taskstats, only arm a request here).
    fn update(&mut self, lane: Lane);

    /// Packages the source's last committed state into a `Data` message and
    /// writes it to `sink`. Never mutates source state.
    fn collect_and_send(&mut self, sink: &mut dyn CollectorSink) -> Result<()>;

    fn name(&self) -> &'static str;
}
