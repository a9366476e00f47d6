//! Routes one collector's `Request` to whatever answers it: a `DataSource`
//! for most request types, or the registry/startup cache directly for the
//! two request types that have no standalone source (`GetProcInfo`,
//! `GetContextInfo`) and the one backed by an accumulator instead of a
//! kernel read (`GetStartupData`).

use std::cell::RefCell;
use std::rc::Rc;

use crate::collector::CollectorSink;
use crate::error::{Error, Result};
use crate::registry::ProcRegistry;
use crate::sources::DataSource;
use crate::startup_cache::StartupCache;
use crate::wire::collector::request::Type as RequestType;
use crate::wire::monitor::data::{Payload, What};
use crate::wire::monitor::{ContextInfo, ContextInfoEntry};

pub struct Dispatcher {
    sources: Vec<(RequestType, Rc<RefCell<dyn DataSource>>)>,
    registry: Rc<ProcRegistry>,
    startup_cache: Option<Rc<RefCell<StartupCache>>>,
}

impl Dispatcher {
    /// `startup_cache` is `None` when `EnableStartupData` is off; a
    /// `GetStartupData` request then falls through the same
    /// unconstructed-source policy as any other disabled source.
    pub fn new(
        sources: Vec<(RequestType, Rc<RefCell<dyn DataSource>>)>,
        registry: Rc<ProcRegistry>,
        startup_cache: Option<Rc<RefCell<StartupCache>>>,
    ) -> Self {
        Self {
            sources,
            registry,
            startup_cache,
        }
    }

    /// `CreateSession` never reaches here — `Collector::read_request`
    /// answers it before handing anything back to the caller.
    pub fn dispatch(&self, request_type: RequestType, sink: &mut dyn CollectorSink) -> Result<()> {
        match request_type {
            RequestType::GetProcInfo => self.send_proc_info(sink),
            RequestType::GetContextInfo => self.send_context_info(sink),
            RequestType::GetStartupData => match &self.startup_cache {
                Some(cache) => cache.borrow().replay(sink),
                None => {
                    log::debug!("dropping StartupData request: source not enabled");
                    Err(Error::SourceDisabled(request_name(request_type)))
                }
            },
            RequestType::CreateSession => Ok(()),
            other => self.dispatch_source(other, sink),
        }
    }

    /// A request naming a source the config disabled (so it was never
    /// constructed) is logged and dropped rather than treated as a protocol
    /// violation — the collector just gets no reply for that `What`.
    fn dispatch_source(&self, request_type: RequestType, sink: &mut dyn CollectorSink) -> Result<()> {
        match self.sources.iter().find(|(t, _)| *t == request_type) {
            Some((_, source)) => source.borrow_mut().collect_and_send(sink),
            None => {
                let name = request_name(request_type);
                log::debug!("dropping {} request: source not enabled", name);
                Err(Error::SourceDisabled(name))
            }
        }
    }

    fn send_proc_info(&self, sink: &mut dyn CollectorSink) -> Result<()> {
        let mut result = Ok(());
        self.registry.foreach_proc(|entry| {
            if result.is_err() {
                return;
            }
            result = sink.send_data(What::ProcInfo, Payload::ProcInfo(entry.info.clone()));
        });
        result
    }

    fn send_context_info(&self, sink: &mut dyn CollectorSink) -> Result<()> {
        self.registry.refresh_contexts();
        let mut entries = Vec::new();
        self.registry.foreach_context(|ctx| {
            entries.push(ContextInfoEntry {
                ctx_id: ctx.ctx_id,
                ctx_name: ctx.ctx_name.clone(),
                total_cpu_time: ctx.total_cpu_time,
                total_cpu_percent: ctx.total_cpu_percent,
                total_mem_vmrss: ctx.total_mem_vmrss,
            });
        });
        sink.send_data(
            What::ContextInfo,
            Payload::ContextInfo(ContextInfo { entry: entries }),
        )
    }
    /// Snapshots the CPU/memory/pressure sources' last-committed state into
    /// the startup cache, bypassing any collector socket. Used by the
    /// Pace-lane startup-cache feed in `app.rs`, not by request handling.
    pub fn sample_into_startup_cache(&self, cache: &mut crate::startup_cache::StartupCache) {
        if let Some(Payload::SysProcStat(v)) = self.capture(RequestType::GetSysProcStat) {
            cache.add_cpu_data(v);
        }
        if let Some(Payload::SysProcMemInfo(v)) = self.capture(RequestType::GetSysProcMemInfo) {
            cache.add_mem_data(v);
        }
        if let Some(Payload::SysProcPressure(v)) = self.capture(RequestType::GetSysProcPressure) {
            cache.add_psi_data(v);
        }
    }

    fn capture(&self, request_type: RequestType) -> Option<Payload> {
        let (_, source) = self.sources.iter().find(|(t, _)| *t == request_type)?;
        let mut sink = RecordingSink { captured: None };
        source.borrow_mut().collect_and_send(&mut sink).ok()?;
        sink.captured
    }
}

/// An in-memory `CollectorSink` that records the last payload handed to it
/// instead of writing it to a socket. Lets the dispatcher reuse a source's
/// normal `collect_and_send` path to feed the startup cache.
struct RecordingSink {
    captured: Option<Payload>,
}

impl CollectorSink for RecordingSink {
    fn send_data(&mut self, _what: What, payload: Payload) -> Result<()> {
        self.captured = Some(payload);
        Ok(())
    }

    fn send_data_at(
        &mut self,
        _what: What,
        payload: Payload,
        _system_time_sec: i64,
        _monotonic_time_sec: i64,
    ) -> Result<()> {
        self.captured = Some(payload);
        Ok(())
    }
}

fn request_name(request_type: RequestType) -> &'static str {
    match request_type {
        RequestType::CreateSession => "CreateSession",
        RequestType::GetProcAcct => "ProcAcct",
        RequestType::GetProcInfo => "ProcInfo",
        RequestType::GetProcEventStats => "ProcEvent",
        RequestType::GetSysProcMemInfo => "SysProcMemInfo",
        RequestType::GetSysProcDiskStats => "SysProcDiskStats",
        RequestType::GetSysProcStat => "SysProcStat",
        RequestType::GetSysProcPressure => "SysProcPressure",
        RequestType::GetSysProcBuddyInfo => "SysProcBuddyInfo",
        RequestType::GetSysProcWireless => "SysProcWireless",
        RequestType::GetSysProcVmStat => "SysProcVmStat",
        RequestType::GetContextInfo => "ContextInfo",
        RequestType::GetStartupData => "StartupData",
    }
}
