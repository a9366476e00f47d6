//! Periodic and one-shot timers registered as ordinary pollable fds, via
//! `timerfd` — the same treatment as any socket, per SPEC_FULL.md 4.1.

use std::os::fd::{AsFd, AsRawFd};
use std::time::Duration;

use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};

use crate::error::Result;

pub struct Timer {
    fd: TimerFd,
}

impl Timer {
    pub fn repeating(period: Duration) -> Result<Self> {
        let fd = TimerFd::new(ClockId::CLOCK_MONOTONIC, TimerFlags::TFD_NONBLOCK)?;
        let spec = TimeSpec::from_duration(period);
        fd.set(
            Expiration::IntervalDelayed(spec, spec),
            TimerSetTimeFlags::empty(),
        )?;
        Ok(Self { fd })
    }

    pub fn one_shot(delay: Duration) -> Result<Self> {
        let fd = TimerFd::new(ClockId::CLOCK_MONOTONIC, TimerFlags::TFD_NONBLOCK)?;
        let spec = TimeSpec::from_duration(delay);
        fd.set(Expiration::OneShot(spec), TimerSetTimeFlags::empty())?;
        Ok(Self { fd })
    }

    /// Drain the expiration counter. Must be called after every readiness
    /// wake or the fd stays level-triggered-ready forever.
    pub fn drain(&self) {
        let _ = self.fd.wait();
    }
}

impl AsRawFd for Timer {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.fd.as_fd().as_raw_fd()
    }
}
