//! Single-threaded reactor multiplexing pollable fds, timers, and work
//! queues. There is no implicit thread pool: every handler in this process
//! runs on the thread that calls [`Reactor::run`].
//!
//! Registration methods take `&self`, not `&mut self`: a handler invoked
//! from `tick` (e.g. a listening socket's accept handler) routinely needs to
//! register the fd it just accepted, and that call happens while `tick` is
//! still executing. Interior mutability on `registrations`/`next_token`
//! keeps that legal without wrapping the whole reactor in a `RefCell`.

pub mod pollable;
pub mod queue;
pub mod timer;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use mio::{Events, Interest, Poll, Token};

pub use pollable::Pollable;
pub use queue::{QueueHandle, WorkQueue};
pub use timer::Timer;

use crate::error::Result;

/// A registered fd together with the handler invoked when it's readable.
/// `raw_fd` is kept for diagnostics; timers additionally need `drain()`
/// called every wake before their handler runs.
enum Registration {
    Fd {
        #[allow(dead_code)]
        raw_fd: RawFd,
        handler: Box<dyn FnMut() -> bool>,
    },
    Timer {
        timer: Timer,
        handler: Box<dyn FnMut() -> bool>,
    },
}

pub struct Reactor {
    poll: RefCell<Poll>,
    events: RefCell<Events>,
    next_token: Cell<usize>,
    registrations: RefCell<HashMap<Token, Registration>>,
    running: Cell<bool>,
}

impl Reactor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            poll: RefCell::new(Poll::new()?),
            events: RefCell::new(Events::with_capacity(256)),
            next_token: Cell::new(0),
            registrations: RefCell::new(HashMap::new()),
            running: Cell::new(true),
        })
    }

    fn alloc_token(&self) -> Token {
        let token = Token(self.next_token.get());
        self.next_token.set(token.0 + 1);
        token
    }

    /// Register a source that implements `mio::event::Source` itself (a
    /// `WorkQueue`, most notably). `source` only needs to live through this
    /// call; the fd it wraps must already be owned somewhere that outlives
    /// the registration (typically inside `handler`'s captures).
    pub fn register_fd<S, H>(&self, source: &mut S, handler: H) -> Result<Token>
    where
        S: mio::event::Source + AsRawFd,
        H: FnMut() -> bool + 'static,
    {
        let token = self.alloc_token();
        let raw_fd = source.as_raw_fd();
        self.poll
            .borrow()
            .registry()
            .register(source, token, Interest::READABLE)?;
        self.registrations.borrow_mut().insert(
            token,
            Registration::Fd {
                raw_fd,
                handler: Box::new(handler),
            },
        );
        Ok(token)
    }

    /// Register a bare raw fd (a std socket, a libc-opened netlink socket)
    /// that doesn't implement `mio::event::Source` itself. The caller keeps
    /// the underlying object alive by moving it into `handler`; only the fd
    /// number is needed to register with epoll.
    pub fn register_raw_fd<H>(&self, raw_fd: RawFd, handler: H) -> Result<Token>
    where
        H: FnMut() -> bool + 'static,
    {
        let token = self.alloc_token();
        self.poll.borrow().registry().register(
            &mut mio::unix::SourceFd(&raw_fd),
            token,
            Interest::READABLE,
        )?;
        self.registrations.borrow_mut().insert(
            token,
            Registration::Fd {
                raw_fd,
                handler: Box::new(handler),
            },
        );
        Ok(token)
    }

    pub fn register_repeating_timer<H>(&self, period: Duration, handler: H) -> Result<Token>
    where
        H: FnMut() -> bool + 'static,
    {
        self.register_timer(Timer::repeating(period)?, handler)
    }

    pub fn register_one_shot_timer<H>(&self, delay: Duration, handler: H) -> Result<Token>
    where
        H: FnMut() -> bool + 'static,
    {
        self.register_timer(Timer::one_shot(delay)?, handler)
    }

    fn register_timer<H>(&self, timer: Timer, handler: H) -> Result<Token>
    where
        H: FnMut() -> bool + 'static,
    {
        let token = self.alloc_token();
        let raw_fd = timer.as_raw_fd();
        self.poll.borrow().registry().register(
            &mut mio::unix::SourceFd(&raw_fd),
            token,
            Interest::READABLE,
        )?;
        self.registrations.borrow_mut().insert(
            token,
            Registration::Timer {
                timer,
                handler: Box::new(handler),
            },
        );
        Ok(token)
    }

    /// Deregister and drop a previously-registered fd or timer, e.g. when a
    /// collector's session closes before the reactor itself decides to.
    pub fn deregister(&self, token: Token) {
        if let Some(registration) = self.registrations.borrow_mut().remove(&token) {
            let raw_fd = match &registration {
                Registration::Fd { raw_fd, .. } => *raw_fd,
                Registration::Timer { timer, .. } => timer.as_raw_fd(),
            };
            let _ = self
                .poll
                .borrow()
                .registry()
                .deregister(&mut mio::unix::SourceFd(&raw_fd));
        }
    }

    pub fn request_shutdown(&self) {
        self.running.set(false);
    }

    /// Run until a handler triggers [`Reactor::request_shutdown`].
    pub fn run(&self) -> Result<()> {
        while self.running.get() {
            self.tick(None)?;
        }
        Ok(())
    }

    /// One poll-and-dispatch cycle; exposed for tests.
    pub fn tick(&self, timeout: Option<Duration>) -> Result<()> {
        let ready: Vec<Token> = {
            let mut poll = self.poll.borrow_mut();
            let mut events = self.events.borrow_mut();
            match poll.poll(&mut events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => return Ok(()),
                Err(e) => return Err(e.into()),
            }
            events.iter().map(|e| e.token()).collect()
        };

        for token in ready {
            // Drain the timer (if any) and take the handler out before
            // invoking it, so a handler that registers a new fd/timer of
            // its own doesn't re-borrow `registrations` while it's already
            // borrowed here.
            let mut handler = match self.registrations.borrow_mut().get_mut(&token) {
                Some(Registration::Fd { handler, .. }) => std::mem::replace(handler, Box::new(|| true)),
                Some(Registration::Timer { timer, handler }) => {
                    timer.drain();
                    std::mem::replace(handler, Box::new(|| true))
                }
                None => continue,
            };

            let keep = handler();

            if !keep {
                drop(handler);
                self.deregister(token);
                continue;
            }

            let mut registrations = self.registrations.borrow_mut();
            if let Some(slot) = registrations.get_mut(&token) {
                match slot {
                    Registration::Fd { handler: slot_handler, .. } => *slot_handler = handler,
                    Registration::Timer { handler: slot_handler, .. } => *slot_handler = handler,
                }
            }
        }
        Ok(())
    }
}
