//! Dispatcher routing against real `DataSource` impls, without going through
//! a socket: a `RecordingSink`-style capture is built locally here since the
//! real one is private to `dispatcher.rs`.

use std::cell::RefCell;
use std::rc::Rc;

use taskmonitor::collector::CollectorSink;
use taskmonitor::container_runtime::NullContainerRuntime;
use taskmonitor::dispatcher::Dispatcher;
use taskmonitor::registry::ProcRegistry;
use taskmonitor::sources::sys_proc_stat::SysProcStatSource;
use taskmonitor::sources::DataSource;
use taskmonitor::startup_cache::StartupCache;
use taskmonitor::wire::collector::request::Type as RequestType;
use taskmonitor::wire::monitor::data::{Payload, What};

struct CaptureSink {
    captured: Vec<(What, Payload)>,
}

impl CollectorSink for CaptureSink {
    fn send_data(&mut self, what: What, payload: Payload) -> taskmonitor::error::Result<()> {
        self.captured.push((what, payload));
        Ok(())
    }

    fn send_data_at(
        &mut self,
        what: What,
        payload: Payload,
        _system_time_sec: i64,
        _monotonic_time_sec: i64,
    ) -> taskmonitor::error::Result<()> {
        self.send_data(what, payload)
    }
}

fn dispatcher_with_sys_proc_stat() -> Dispatcher {
    let registry = Rc::new(ProcRegistry::new(vec![]));
    let startup_cache = Rc::new(RefCell::new(StartupCache::new(4)));
    let source: Rc<RefCell<dyn DataSource>> = Rc::new(RefCell::new(SysProcStatSource::new()));
    Dispatcher::new(
        vec![(RequestType::GetSysProcStat, source)],
        registry,
        Some(startup_cache),
    )
}

#[test]
fn a_request_for_a_disabled_source_is_dropped_not_panicked() {
    let registry = Rc::new(ProcRegistry::new(vec![]));
    let startup_cache = Rc::new(RefCell::new(StartupCache::new(4)));
    let dispatcher = Dispatcher::new(vec![], registry, Some(startup_cache));
    let mut sink = CaptureSink { captured: Vec::new() };

    let err = dispatcher
        .dispatch(RequestType::GetSysProcStat, &mut sink)
        .unwrap_err();
    assert!(matches!(err, taskmonitor::error::Error::SourceDisabled(_)));
    assert!(sink.captured.is_empty());
}

#[test]
fn an_enabled_source_answers_its_own_request_type() {
    let dispatcher = dispatcher_with_sys_proc_stat();
    let mut sink = CaptureSink { captured: Vec::new() };

    dispatcher.dispatch(RequestType::GetSysProcStat, &mut sink).unwrap();

    assert_eq!(sink.captured.len(), 1);
    assert_eq!(sink.captured[0].0, What::SysProcStat);
}

#[test]
fn get_proc_info_fans_out_one_message_per_tracked_process() {
    let registry = Rc::new(ProcRegistry::new(vec![]));
    let runtime = NullContainerRuntime;
    let pid = std::process::id() as i32;
    registry.add_proc_entry(pid, pid, &runtime);

    let startup_cache = Rc::new(RefCell::new(StartupCache::new(4)));
    let dispatcher = Dispatcher::new(vec![], registry, Some(startup_cache));
    let mut sink = CaptureSink { captured: Vec::new() };

    dispatcher.dispatch(RequestType::GetProcInfo, &mut sink).unwrap();

    assert_eq!(sink.captured.len(), 1);
    assert_eq!(sink.captured[0].0, What::ProcInfo);
}

#[test]
fn get_startup_data_replays_an_empty_cache_without_error() {
    let registry = Rc::new(ProcRegistry::new(vec![]));
    let startup_cache = Rc::new(RefCell::new(StartupCache::new(4)));
    let dispatcher = Dispatcher::new(vec![], registry, Some(startup_cache));
    let mut sink = CaptureSink { captured: Vec::new() };

    dispatcher.dispatch(RequestType::GetStartupData, &mut sink).unwrap();

    assert_eq!(sink.captured.len(), 1);
    assert_eq!(sink.captured[0].0, What::StartupData);
}

#[test]
fn get_startup_data_is_a_disabled_source_when_the_cache_was_never_built() {
    let registry = Rc::new(ProcRegistry::new(vec![]));
    let dispatcher = Dispatcher::new(vec![], registry, None);
    let mut sink = CaptureSink { captured: Vec::new() };

    let err = dispatcher
        .dispatch(RequestType::GetStartupData, &mut sink)
        .unwrap_err();
    assert!(matches!(err, taskmonitor::error::Error::SourceDisabled(_)));
}

#[test]
fn sample_into_startup_cache_captures_the_enabled_sources_state() {
    let dispatcher = dispatcher_with_sys_proc_stat();
    let mut cache = StartupCache::new(4);

    dispatcher.sample_into_startup_cache(&mut cache);

    assert!(!cache.is_empty());
}
