//! Orderly-shutdown and watchdog wiring. `SIGPIPE` is ignored outright (a
//! collector socket dying mid-write must surface as an `io::Error`, not
//! kill the process); `SIGINT`/`SIGTERM` request a clean reactor shutdown
//! instead of the default terminate-immediately behavior.

use std::os::fd::AsRawFd;
use std::rc::Rc;
use std::time::Duration;

use nix::sys::signal::{self, SigHandler, Signal};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook_mio::v1_0::Signals;

use crate::error::Result;
use crate::reactor::Reactor;

/// Ignores `SIGPIPE` for the whole process. Must run before any socket I/O.
pub fn ignore_sigpipe() -> Result<()> {
    // SAFETY: installing a well-known, async-signal-safe disposition
    // (ignore) for SIGPIPE before any other threads exist.
    unsafe {
        signal::signal(Signal::SIGPIPE, SigHandler::SigIgn)?;
    }
    Ok(())
}

/// Registers `SIGINT`/`SIGTERM` on the reactor; either one calls
/// `Reactor::request_shutdown` instead of terminating the process outright.
pub fn install_shutdown_signals(reactor: &Rc<Reactor>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let raw_fd = signals.as_raw_fd();
    let reactor_for_handler = reactor.clone();
    reactor.register_raw_fd(raw_fd, move || {
        for sig in signals.pending() {
            log::info!("received signal {}, shutting down", sig);
            reactor_for_handler.request_shutdown();
        }
        true
    })?;
    Ok(())
}

/// If `WATCHDOG_USEC` is set (systemd `Type=notify` with `WatchdogSec=`),
/// installs a timer that pings `sd_notify(WATCHDOG=1)` at half that
/// interval. A no-op when the variable isn't set, which is the common case
/// outside of a systemd unit with watchdog support enabled.
pub fn install_watchdog(reactor: &Reactor) -> Result<()> {
    let Ok(raw) = std::env::var("WATCHDOG_USEC") else {
        return Ok(());
    };
    let Ok(usec) = raw.parse::<u64>() else {
        log::warn!("WATCHDOG_USEC={:?} is not a valid integer, watchdog disabled", raw);
        return Ok(());
    };
    let period = Duration::from_micros(usec / 2);
    reactor.register_repeating_timer(period, || {
        notify_watchdog();
        true
    })?;
    Ok(())
}

/// Hand-rolled `sd_notify` call: writes `WATCHDOG=1\n` to the socket named
/// by `NOTIFY_SOCKET`, which is all the watchdog keepalive protocol needs.
/// Avoids pulling in a dedicated systemd crate for one message type.
fn notify_watchdog() {
    use std::os::unix::net::UnixDatagram;

    let Ok(path) = std::env::var("NOTIFY_SOCKET") else {
        return;
    };
    let Ok(socket) = UnixDatagram::unbound() else {
        return;
    };
    if let Err(e) = socket.connect(&path) {
        log::debug!("watchdog notify socket {} unreachable: {}", path, e);
        return;
    }
    let _ = socket.send(b"WATCHDOG=1\n");
}
