//! `/proc/pressure/{cpu,memory,io}`. Each resource has "some" and "full"
//! PSI lines; a resource's two lines are present or absent together.
//! Individually gated by the `pressure.WithCPU`/`WithMemory`/`WithIO`
//! config flags.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::collector::CollectorSink;
use crate::error::Result;
use crate::scheduler::Lane;
use crate::sources::DataSource;
use crate::wire::monitor::{
    data::Payload, PressureResource, PsiData, SysProcPressure as WireSysProcPressure,
};

#[derive(Clone, Copy, Debug)]
pub struct PressureFlags {
    pub with_cpu: bool,
    pub with_memory: bool,
    pub with_io: bool,
}

fn parse_psi_line(line: &str) -> Option<PsiData> {
    let mut data = PsiData::default();
    for field in line.split_whitespace().skip(1) {
        let (key, value) = field.split_once('=')?;
        match key {
            "avg10" => data.avg10 = value.parse().ok()?,
            "avg60" => data.avg60 = value.parse().ok()?,
            "avg300" => data.avg300 = value.parse().ok()?,
            "total" => data.total = value.parse().ok()?,
            _ => {}
        }
    }
    Some(data)
}

fn parse_resource(path: &str) -> Option<PressureResource> {
    let contents = fs::read_to_string(path).ok()?;
    let mut some = None;
    let mut full = None;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("some ") {
            some = parse_psi_line(&format!("some {}", rest));
        } else if let Some(rest) = line.strip_prefix("full ") {
            full = parse_psi_line(&format!("full {}", rest));
        }
    }
    Some(PressureResource { some, full })
}

pub struct SysProcPressureSource {
    flags: PressureFlags,
    current: WireSysProcPressure,
    update_pending: AtomicBool,
}

impl SysProcPressureSource {
    pub fn new(flags: PressureFlags) -> Self {
        Self {
            flags,
            current: WireSysProcPressure::default(),
            update_pending: AtomicBool::new(false),
        }
    }

    fn refresh(&mut self) {
        self.current = WireSysProcPressure {
            cpu: self
                .flags
                .with_cpu
                .then(|| parse_resource("/proc/pressure/cpu"))
                .flatten(),
            memory: self
                .flags
                .with_memory
                .then(|| parse_resource("/proc/pressure/memory"))
                .flatten(),
            io: self
                .flags
                .with_io
                .then(|| parse_resource("/proc/pressure/io"))
                .flatten(),
        };
    }
}

impl DataSource for SysProcPressureSource {
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
            crate::wire::monitor::data::What::SysProcPressure,
            Payload::SysProcPressure(self.current.clone()),
        )
    }

    fn name(&self) -> &'static str {
        "SysProcPressure"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_psi_line() {
        let data =
            parse_psi_line("some avg10=0.00 avg60=0.00 avg300=0.00 total=12345").unwrap();
        assert_eq!(data.total, 12345);
        assert_eq!(data.avg10, 0.0);
    }
}
