//! Owns every live collector session: accepts new connections off the
//! listening sockets, walks each through its handshake, routes its requests
//! to the dispatcher, and evicts anyone who's gone quiet past
//! `CollectorInactiveTimeout`.

use std::cell::RefCell;
use std::net::TcpListener;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixListener;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::collector::{acceptor, Collector, SessionState};
use crate::config::LaneIntervals;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::reactor::Reactor;

pub struct StateManager {
    reactor: Rc<Reactor>,
    dispatcher: Rc<Dispatcher>,
    collectors: Rc<RefCell<Vec<Rc<RefCell<Collector>>>>>,
    inactive_timeout: Duration,
}

impl StateManager {
    pub fn new(reactor: Rc<Reactor>, dispatcher: Rc<Dispatcher>, inactive_timeout: Duration) -> Self {
        Self {
            reactor,
            dispatcher,
            collectors: Rc::new(RefCell::new(Vec::new())),
            inactive_timeout,
        }
    }

    pub fn collector_count(&self) -> usize {
        self.collectors.borrow().len()
    }

    pub fn register_tcp_listener(&self, listener: TcpListener, intervals: LaneIntervals) -> Result<()> {
        let raw_fd = listener.as_raw_fd();
        let state = self.handle();
        self.reactor.register_raw_fd(raw_fd, move || {
            loop {
                match acceptor::accept_tcp(&listener, &intervals) {
                    Ok(Some(collector)) => state.adopt(collector),
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("tcp accept failed: {}", e);
                        break;
                    }
                }
            }
            true
        })?;
        Ok(())
    }

    pub fn register_uds_listener(&self, listener: UnixListener, intervals: LaneIntervals) -> Result<()> {
        let raw_fd = listener.as_raw_fd();
        let state = self.handle();
        self.reactor.register_raw_fd(raw_fd, move || {
            loop {
                match acceptor::accept_uds(&listener, &intervals) {
                    Ok(Some(collector)) => state.adopt(collector),
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("uds accept failed: {}", e);
                        break;
                    }
                }
            }
            true
        })?;
        Ok(())
    }

    fn handle(&self) -> StateHandle {
        StateHandle {
            reactor: self.reactor.clone(),
            dispatcher: self.dispatcher.clone(),
            collectors: self.collectors.clone(),
        }
    }

    /// Drops every collector whose `last_update_time` is older than
    /// `inactive_timeout`. Installed as the periodic eviction handler.
    pub fn evict_inactive(&self) {
        let now = Instant::now();
        let timeout = self.inactive_timeout;
        self.collectors.borrow_mut().retain(|c| {
            let elapsed = now.duration_since(c.borrow().last_update_time);
            if elapsed > timeout {
                log::info!("evicting collector idle for {:?}", elapsed);
                false
            } else {
                true
            }
        });
    }
}

/// The part of `StateManager` a per-connection closure needs to reach back
/// into: adopting a newly-accepted collector, and (indirectly, via
/// `collectors`) letting eviction find it later.
#[derive(Clone)]
struct StateHandle {
    reactor: Rc<Reactor>,
    dispatcher: Rc<Dispatcher>,
    collectors: Rc<RefCell<Vec<Rc<RefCell<Collector>>>>>,
}

impl StateHandle {
    /// Reads the handshake descriptor synchronously (bounded by the 3s
    /// socket timeout the acceptor set) then registers the collector's fd
    /// for its steady-state request/reply traffic.
    fn adopt(&self, mut collector: Collector) {
        if let Err(e) = collector.read_descriptor() {
            log::warn!("collector handshake failed: {}", e);
            return;
        }
        let raw_fd = collector.as_raw_fd();
        let handle = Rc::new(RefCell::new(collector));
        self.collectors.borrow_mut().push(handle.clone());

        let dispatcher = self.dispatcher.clone();
        let collectors = self.collectors.clone();
        let reactor = self.reactor.clone();
        let token_cell: Rc<RefCell<Option<mio::Token>>> = Rc::new(RefCell::new(None));
        let token_cell_for_handler = token_cell.clone();

        let result = reactor.register_raw_fd(raw_fd, move || {
            Self::on_readable(&handle, &dispatcher, &collectors, &reactor, &token_cell_for_handler)
        });
        match result {
            Ok(token) => *token_cell.borrow_mut() = Some(token),
            Err(e) => log::warn!("failed to register collector fd: {}", e),
        }
    }

    fn on_readable(
        collector: &Rc<RefCell<Collector>>,
        dispatcher: &Rc<Dispatcher>,
        collectors: &Rc<RefCell<Vec<Rc<RefCell<Collector>>>>>,
        reactor: &Rc<Reactor>,
        token_cell: &Rc<RefCell<Option<mio::Token>>>,
    ) -> bool {
        let request = {
            let mut c = collector.borrow_mut();
            c.read_request()
        };

        match request {
            Ok(Some(request)) => {
                let mut c = collector.borrow_mut();
                let request_type = match crate::wire::collector::request::Type::try_from(request.r#type) {
                    Ok(t) => t,
                    Err(_) => {
                        log::warn!("dropping request with unknown type {}", request.r#type);
                        return true;
                    }
                };
                if let Err(e) = dispatcher.dispatch(request_type, &mut *c) {
                    log::debug!("request {:?} not answered: {}", request_type, e);
                }
                true
            }
            Ok(None) => true,
            Err(e) => {
                log::info!("closing collector session: {}", e);
                collector.borrow_mut().state = SessionState::Closed;
                collectors
                    .borrow_mut()
                    .retain(|c| !Rc::ptr_eq(c, collector));
                if let Some(token) = token_cell.borrow_mut().take() {
                    reactor.deregister(token);
                }
                false
            }
        }
    }
}
