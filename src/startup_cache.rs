//! Bounded cache of the earliest CPU/memory/pressure samples, replayed to a
//! collector that asks for `GetStartupData` before it's caught up with the
//! live lane cadence. Unlike every other `Data` payload, entries here are
//! stamped with wall-clock and monotonic time at capture, not at send time —
//! the point is to preserve when the sample was actually taken.

use std::collections::VecDeque;

use crate::collector::CollectorSink;
use crate::error::Result;
use crate::util::{monotonic_secs, wall_clock_secs};
use crate::wire::monitor::{
    data::{Payload, What},
    SysProcMemInfo, SysProcPressure, SysProcStat, StartupData,
};

struct Sample<T> {
    system_time_sec: i64,
    monotonic_time_sec: i64,
    value: T,
}

pub struct StartupCache {
    capacity: usize,
    cpu: VecDeque<Sample<SysProcStat>>,
    mem: VecDeque<Sample<SysProcMemInfo>>,
    psi: VecDeque<Sample<SysProcPressure>>,
}

impl StartupCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            cpu: VecDeque::new(),
            mem: VecDeque::new(),
            psi: VecDeque::new(),
        }
    }

    fn push<T>(queue: &mut VecDeque<Sample<T>>, capacity: usize, value: T) {
        if queue.len() >= capacity {
            queue.pop_front();
        }
        queue.push_back(Sample {
            system_time_sec: wall_clock_secs(),
            monotonic_time_sec: monotonic_secs(),
            value,
        });
    }

    pub fn add_cpu_data(&mut self, value: SysProcStat) {
        Self::push(&mut self.cpu, self.capacity, value);
    }

    pub fn add_mem_data(&mut self, value: SysProcMemInfo) {
        Self::push(&mut self.mem, self.capacity, value);
    }

    pub fn add_psi_data(&mut self, value: SysProcPressure) {
        Self::push(&mut self.psi, self.capacity, value);
    }

    /// Fires once, on the `StartupDataCleanupTime` one-shot timer: after the
    /// window during which a collector would plausibly still be catching up
    /// has passed, the cache no longer serves any purpose.
    pub fn drop_data(&mut self) {
        self.cpu.clear();
        self.mem.clear();
        self.psi.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_empty() && self.mem.is_empty() && self.psi.is_empty()
    }

    /// Sends the whole cached window as one `StartupData` message, stamped
    /// with the oldest sample's own capture time rather than the moment of
    /// the send — the point of this cache is to backfill what a collector
    /// missed before it connected.
    pub fn replay(&self, sink: &mut dyn CollectorSink) -> Result<()> {
        let data = StartupData {
            cpu: self.cpu.iter().map(|s| s.value.clone()).collect(),
            mem: self.mem.iter().map(|s| s.value.clone()).collect(),
            psi: self.psi.iter().map(|s| s.value.clone()).collect(),
        };

        let oldest = self
            .cpu
            .front()
            .map(|s| (s.system_time_sec, s.monotonic_time_sec))
            .into_iter()
            .chain(self.mem.front().map(|s| (s.system_time_sec, s.monotonic_time_sec)))
            .chain(self.psi.front().map(|s| (s.system_time_sec, s.monotonic_time_sec)))
            .min_by_key(|(_, mono)| *mono);

        match oldest {
            Some((system_time_sec, monotonic_time_sec)) => sink.send_data_at(
                What::StartupData,
                Payload::StartupData(data),
                system_time_sec,
                monotonic_time_sec,
            ),
            None => sink.send_data(What::StartupData, Payload::StartupData(data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut cache = StartupCache::new(2);
        cache.add_cpu_data(SysProcStat::default());
        cache.add_cpu_data(SysProcStat::default());
        cache.add_cpu_data(SysProcStat::default());
        assert_eq!(cache.cpu.len(), 2);
    }

    #[test]
    fn drop_data_clears_everything() {
        let mut cache = StartupCache::new(4);
        cache.add_mem_data(SysProcMemInfo::default());
        cache.drop_data();
        assert!(cache.is_empty());
    }
}
