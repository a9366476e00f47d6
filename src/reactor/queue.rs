//! Bounded MPMC work queue bound to the reactor. Producers on any thread
//! enqueue a `Request`; the loop drains everything pending on one wake and
//! invokes the queue's handler once per item.

use std::io::{Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use mio::unix::pipe;

use crate::error::{Error, Result};

/// The producer side. Cheap to clone; hands items to the loop thread and
/// nudges its wake pipe so `Poll` returns even if nothing else is ready.
#[derive(Clone)]
pub struct QueueHandle<T> {
    tx: Sender<T>,
    wake: Arc<pipe::Sender>,
}

impl<T> QueueHandle<T> {
    /// Fails fast (`Error::QueueClosed`) if the loop side has been dropped —
    /// there is no user-visible cancellation beyond that, per SPEC_FULL.md 5.
    pub fn push(&mut self, item: T) -> Result<()> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) | TrySendError::Disconnected(_) => Error::QueueClosed,
        })?;
        // Best-effort wake; if the pipe is full the loop is already awake.
        let _ = (&*self.wake).write(&[1u8]);
        Ok(())
    }
}

/// The consumer side, owned by whichever subsystem registers it with the
/// reactor. `drain` is called once per readiness wake.
pub struct WorkQueue<T> {
    rx: Receiver<T>,
    wake: pipe::Receiver,
}

impl<T> WorkQueue<T> {
    pub fn bounded(capacity: usize) -> Result<(QueueHandle<T>, Self)> {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let (wake_tx, wake_rx) = pipe::new()?;
        Ok((
            QueueHandle {
                tx,
                wake: Arc::new(wake_tx),
            },
            WorkQueue { rx, wake: wake_rx },
        ))
    }

    /// Drain every pending item, invoking `handler` for each. Returning
    /// `false` from `handler` stops draining early for this wake (used by
    /// the reactor's pollable contract, not per-item failure).
    pub fn drain<F>(&mut self, mut handler: F)
    where
        F: FnMut(T),
    {
        let mut ack = [0u8; 64];
        while let Ok(n) = self.wake.read(&mut ack) {
            if n == 0 {
                break;
            }
        }
        while let Ok(item) = self.rx.try_recv() {
            handler(item);
        }
    }
}

impl<T> AsRawFd for WorkQueue<T> {
    fn as_raw_fd(&self) -> RawFd {
        self.wake.as_raw_fd()
    }
}

impl<T> mio::event::Source for WorkQueue<T> {
    fn register(
        &mut self,
        registry: &mio::Registry,
        token: mio::Token,
        interests: mio::Interest,
    ) -> std::io::Result<()> {
        self.wake.register(registry, token, interests)
    }

    fn reregister(
        &mut self,
        registry: &mio::Registry,
        token: mio::Token,
        interests: mio::Interest,
    ) -> std::io::Result<()> {
        self.wake.reregister(registry, token, interests)
    }

    fn deregister(&mut self, registry: &mio::Registry) -> std::io::Result<()> {
        self.wake.deregister(registry)
    }
}
