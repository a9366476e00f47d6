//! Three periodic timers (Fast/Pace/Slow) driving `update(lane)` on every
//! registered source. The scheduler never blocks: it only fires timers and
//! lets each source decide whether to enqueue work on its own queue.

use std::time::Duration;

use crate::config::LaneIntervals;
use crate::error::Result;
use crate::reactor::Reactor;
use crate::sources::DataSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lane {
    Fast,
    Pace,
    Slow,
}

/// Registers one repeating reactor timer per lane. Sources are held behind
/// `Rc<RefCell<_>>` at the call site (see `app.rs`) since the scheduler
/// needs to invoke the same source object the dispatcher and lane each hold
/// a handle to.
///
/// `has_clients` backs the `SkipIfNoClients` config flag: when set, a lane
/// tick with zero connected collectors is a no-op rather than refreshing
/// state nobody will read.
pub fn install(
    reactor: &Reactor,
    intervals: &LaneIntervals,
    sources: Vec<std::rc::Rc<std::cell::RefCell<dyn DataSource>>>,
    skip_if_no_clients: bool,
    has_clients: std::rc::Rc<dyn Fn() -> bool>,
) -> Result<()> {
    install_lane(
        reactor,
        Duration::from_micros(intervals.fast_usec),
        Lane::Fast,
        sources.clone(),
        skip_if_no_clients,
        has_clients.clone(),
    )?;
    install_lane(
        reactor,
        Duration::from_micros(intervals.pace_usec),
        Lane::Pace,
        sources.clone(),
        skip_if_no_clients,
        has_clients.clone(),
    )?;
    install_lane(
        reactor,
        Duration::from_micros(intervals.slow_usec),
        Lane::Slow,
        sources,
        skip_if_no_clients,
        has_clients,
    )?;
    Ok(())
}

fn install_lane(
    reactor: &Reactor,
    period: Duration,
    lane: Lane,
    sources: Vec<std::rc::Rc<std::cell::RefCell<dyn DataSource>>>,
    skip_if_no_clients: bool,
    has_clients: std::rc::Rc<dyn Fn() -> bool>,
) -> Result<()> {
    reactor.register_repeating_timer(period, move || {
        if skip_if_no_clients && !has_clients() {
            return true;
        }
        for source in &sources {
            source.borrow_mut().update(lane);
        }
        true
    })?;
    Ok(())
}
