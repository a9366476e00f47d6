//! Listening sockets for TCP and Unix-domain collector connections. Each
//! pollable handler accepts one connection per wake, configures the 3s
//! handshake receive timeout, and hands the new `Collector` to the state
//! manager.

use std::net::{TcpListener, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixListener;
use std::time::Duration;

use nix::sys::socket::{setsockopt, sockopt};

use crate::collector::{Collector, Stream, Transport};
use crate::config::LaneIntervals;
use crate::error::Result;

pub fn bind_tcp(address: &str, port: u16) -> Result<TcpListener> {
    let bind_addr = if address.eq_ignore_ascii_case("any") {
        "0.0.0.0".to_owned()
    } else {
        address.to_owned()
    };
    let listener = TcpListener::bind((bind_addr.as_str(), port))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

pub fn bind_uds(path: &str) -> Result<UnixListener> {
    let _ = std::fs::remove_file(path);
    let listener = UnixListener::bind(path)?;
    listener.set_nonblocking(true)?;
    let perms = std::fs::Permissions::from_mode(0o666);
    std::fs::set_permissions(path, perms)?;
    Ok(listener)
}

fn configure_tcp_keepalive(stream: &TcpStream) -> Result<()> {
    use std::os::fd::AsFd;
    let fd = stream.as_fd();
    setsockopt(&fd, sockopt::KeepAlive, &true)?;
    setsockopt(&fd, sockopt::TcpKeepIdle, &1)?;
    setsockopt(&fd, sockopt::TcpKeepInterval, &2)?;
    setsockopt(&fd, sockopt::TcpKeepCount, &5)?;
    Ok(())
}

/// Accepts one pending connection, if any, and returns a fresh `Collector`
/// ready to read its handshake descriptor. `EAGAIN`/`EWOULDBLOCK` is mapped
/// to `Ok(None)` by the caller treating an `io::ErrorKind::WouldBlock` as
/// benign.
pub fn accept_tcp(listener: &TcpListener, intervals: &LaneIntervals) -> Result<Option<Collector>> {
    match listener.accept() {
        Ok((stream, _addr)) => {
            configure_tcp_keepalive(&stream)?;
            stream.set_read_timeout(Some(Duration::from_secs(
                crate::defaults::HANDSHAKE_RECV_TIMEOUT_SECS as u64,
            )))?;
            Ok(Some(Collector::new(
                Transport::Tcp,
                Stream::Tcp(stream),
                intervals.fast_usec,
                intervals.pace_usec,
                intervals.slow_usec,
            )))
        }
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn accept_uds(listener: &UnixListener, intervals: &LaneIntervals) -> Result<Option<Collector>> {
    match listener.accept() {
        Ok((stream, _addr)) => {
            stream.set_read_timeout(Some(Duration::from_secs(
                crate::defaults::HANDSHAKE_RECV_TIMEOUT_SECS as u64,
            )))?;
            Ok(Some(Collector::new(
                Transport::Uds,
                Stream::Uds(stream),
                intervals.fast_usec,
                intervals.pace_usec,
                intervals.slow_usec,
            )))
        }
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
        Err(e) => Err(e.into()),
    }
}
