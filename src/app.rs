//! Wires every subsystem together from a loaded `Config` and owns the
//! reactor for the life of the process. One `App` per process: a second
//! construction attempt is a programming error, not a runtime condition to
//! recover from.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::collector::acceptor;
use crate::config::{Config, LaneIntervals};
use crate::container_runtime::{ContainerRuntime, FsContainerRuntime, NullContainerRuntime};
use crate::defaults;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::reactor::Reactor;
use crate::registry::ProcRegistry;
use crate::scheduler::Lane;
use crate::signals;
use crate::sources::{
    proc_acct::ProcAcctSource, proc_event::ProcEventSource, sys_proc_buddyinfo::SysProcBuddyInfoSource,
    sys_proc_diskstats::SysProcDiskStatsSource, sys_proc_meminfo::SysProcMemInfoSource,
    sys_proc_pressure::{PressureFlags, SysProcPressureSource},
    sys_proc_stat::SysProcStatSource, sys_proc_vmstat::SysProcVMStatSource,
    sys_proc_wireless::SysProcWirelessSource, DataSource,
};
use crate::startup_cache::StartupCache;
use crate::state_manager::StateManager;
use crate::wire::collector::request::Type as RequestType;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

pub struct App {
    reactor: Rc<Reactor>,
    state_manager: Rc<StateManager>,
    registry: Rc<ProcRegistry>,
}

impl App {
    /// Loads config, constructs every enabled source, binds the listening
    /// sockets, and installs the three lane timers plus the eviction and
    /// startup-cache-cleanup timers. Nothing runs until `run()` is called.
    pub fn new(config: Config) -> Result<Self> {
        if INITIALIZED.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyInitialized);
        }

        let intervals = LaneIntervals::resolve(&config);
        let reactor = Rc::new(Reactor::new()?);

        let blacklist = config.blacklist();
        let registry = Rc::new(ProcRegistry::new(blacklist));

        let containers_path = config.get_string("monitor", "ContainersPath", defaults::CONTAINERS_PATH);
        let runtime: Rc<dyn ContainerRuntime> = if std::path::Path::new(&containers_path).is_dir() {
            Rc::new(FsContainerRuntime::new(containers_path))
        } else {
            Rc::new(NullContainerRuntime)
        };

        if config.get_bool("monitor", "ReadProcAtInit", true) {
            registry.init_from_proc(runtime.as_ref());
        }

        let mut tagged_sources: Vec<(RequestType, Rc<RefCell<dyn DataSource>>)> = Vec::new();

        if config.get_bool("monitor", "EnableProcEvent", true) {
            match ProcEventSource::new(registry.clone(), runtime.clone()) {
                Ok(source) => {
                    let source: Rc<RefCell<dyn DataSource>> = Rc::new(RefCell::new(source));
                    tagged_sources.push((RequestType::GetProcEventStats, source));
                }
                Err(e) => log::warn!("process-event source disabled: {}", e),
            }
        }

        if config.get_bool("monitor", "EnableProcAcct", true) {
            let rx = config.get_u64("monitor", "RxBufferSize", defaults::RX_BUFFER_SIZE as u64) as usize;
            let tx = config.get_u64("monitor", "TxBufferSize", defaults::TX_BUFFER_SIZE as u64) as usize;
            match ProcAcctSource::new(registry.clone(), rx, tx) {
                Ok(source) => {
                    let source: Rc<RefCell<dyn DataSource>> = Rc::new(RefCell::new(source));
                    tagged_sources.push((RequestType::GetProcAcct, source));
                }
                Err(e) => log::warn!("process-accounting source disabled: {}", e),
            }
        }

        if config.get_bool("monitor", "EnableSysStat", true) {
            let source: Rc<RefCell<dyn DataSource>> = Rc::new(RefCell::new(SysProcStatSource::new()));
            tagged_sources.push((RequestType::GetSysProcStat, source));
        }
        if config.get_bool("monitor", "EnableSysMeminfo", true) {
            let source: Rc<RefCell<dyn DataSource>> = Rc::new(RefCell::new(SysProcMemInfoSource::new()));
            tagged_sources.push((RequestType::GetSysProcMemInfo, source));
        }
        // VMStat, DiskStats, BuddyInfo, and Wireless have no disable switch:
        // always constructed.
        {
            let source: Rc<RefCell<dyn DataSource>> = Rc::new(RefCell::new(SysProcVMStatSource::new()));
            tagged_sources.push((RequestType::GetSysProcVmStat, source));
        }
        {
            let source: Rc<RefCell<dyn DataSource>> = Rc::new(RefCell::new(SysProcDiskStatsSource::new()));
            tagged_sources.push((RequestType::GetSysProcDiskStats, source));
        }
        {
            let source: Rc<RefCell<dyn DataSource>> = Rc::new(RefCell::new(SysProcBuddyInfoSource::new()));
            tagged_sources.push((RequestType::GetSysProcBuddyInfo, source));
        }
        {
            let source: Rc<RefCell<dyn DataSource>> = Rc::new(RefCell::new(SysProcWirelessSource::new()));
            tagged_sources.push((RequestType::GetSysProcWireless, source));
        }
        // `SysProcPressure` has no single top-level switch; it's gated
        // per-resource by the `pressure.With{CPU,Memory,IO}` flags instead.
        {
            let flags = PressureFlags {
                with_cpu: config.get_bool("pressure", "WithCPU", true),
                with_memory: config.get_bool("pressure", "WithMemory", true),
                with_io: config.get_bool("pressure", "WithIO", true),
            };
            let source: Rc<RefCell<dyn DataSource>> =
                Rc::new(RefCell::new(SysProcPressureSource::new(flags)));
            tagged_sources.push((RequestType::GetSysProcPressure, source));
        }

        let startup_cache = if config.get_bool("monitor", "EnableStartupData", true) {
            let startup_capacity = config.get_u64(
                "monitor",
                "StartupDataCapacity",
                defaults::STARTUP_DATA_CAPACITY as u64,
            ) as usize;
            Some(Rc::new(RefCell::new(StartupCache::new(startup_capacity))))
        } else {
            None
        };

        let lane_sources: Vec<Rc<RefCell<dyn DataSource>>> =
            tagged_sources.iter().map(|(_, s)| s.clone()).collect();

        let dispatcher = Rc::new(Dispatcher::new(tagged_sources, registry.clone(), startup_cache.clone()));

        let inactive_timeout_usec = config.get_u64(
            "monitor",
            "CollectorInactiveTimeout",
            defaults::COLLECTOR_INACTIVE_TIMEOUT_USEC,
        );
        let state_manager = Rc::new(StateManager::new(
            reactor.clone(),
            dispatcher.clone(),
            Duration::from_micros(inactive_timeout_usec),
        ));

        let skip_if_no_clients = config.get_bool("monitor", "SkipIfNoClients", false);
        let has_clients_manager = state_manager.clone();
        let has_clients: Rc<dyn Fn() -> bool> =
            Rc::new(move || has_clients_manager.collector_count() > 0);
        crate::scheduler::install(&reactor, &intervals, lane_sources, skip_if_no_clients, has_clients)?;

        if let Some(startup_cache) = &startup_cache {
            Self::install_startup_cache_feed(&reactor, startup_cache, &dispatcher, &intervals);
        }
        Self::install_registry_refresh(&reactor, &registry, &intervals)?;

        if config.get_bool("monitor", "EnableTCPServer", true) {
            let address = config.get_string("monitor", "TCPServerAddress", defaults::TCP_SERVER_ADDRESS);
            let port = config.get_u16("monitor", "TCPServerPort", defaults::TCP_SERVER_PORT);
            match acceptor::bind_tcp(&address, port) {
                Ok(listener) => state_manager.register_tcp_listener(listener, intervals.clone())?,
                Err(e) => log::warn!("tcp server disabled: failed to bind {}:{}: {}", address, port, e),
            }
        }

        if config.get_bool("monitor", "EnableUDSServer", true) {
            let path = config.get_string(
                "monitor",
                "UDSServerSocketPath",
                defaults::UDS_SERVER_SOCKET_PATH,
            );
            match acceptor::bind_uds(&path) {
                Ok(listener) => state_manager.register_uds_listener(listener, intervals.clone())?,
                Err(e) => log::warn!("uds server disabled: failed to bind {}: {}", path, e),
            }
        }

        let eviction_manager = state_manager.clone();
        reactor.register_repeating_timer(Duration::from_secs(5), move || {
            eviction_manager.evict_inactive();
            true
        })?;

        signals::ignore_sigpipe()?;
        signals::install_shutdown_signals(&reactor)?;
        signals::install_watchdog(&reactor)?;

        Ok(Self {
            reactor,
            state_manager,
            registry,
        })
    }

    /// Every Pace-lane tick, snapshots the CPU/mem/pressure sources into the
    /// startup cache; a one-shot timer drops the cache after
    /// `StartupDataCleanupTime` has elapsed since process start.
    fn install_startup_cache_feed(
        reactor: &Rc<Reactor>,
        startup_cache: &Rc<RefCell<StartupCache>>,
        dispatcher: &Rc<Dispatcher>,
        intervals: &LaneIntervals,
    ) {
        let cache = startup_cache.clone();
        let dispatcher = dispatcher.clone();
        let _ = reactor.register_repeating_timer(Duration::from_micros(intervals.pace_usec), move || {
            dispatcher.sample_into_startup_cache(&mut cache.borrow_mut());
            true
        });

        let cleanup_cache = startup_cache.clone();
        let cleanup_usec = crate::defaults::STARTUP_DATA_CLEANUP_TIME_USEC;
        let _ = reactor.register_one_shot_timer(Duration::from_micros(cleanup_usec), move || {
            cleanup_cache.borrow_mut().drop_data();
            false
        });
    }

    /// `ProcEntry::cpu_percent` wants the poll interval expressed in
    /// jiffies, not microseconds, to match `/proc/<pid>/stat`'s utime/stime
    /// units. `_SC_CLK_TCK` is the number of jiffies per second the kernel
    /// reports them in (100 on every architecture Linux currently ships).
    fn install_registry_refresh(
        reactor: &Rc<Reactor>,
        registry: &Rc<ProcRegistry>,
        intervals: &LaneIntervals,
    ) -> Result<()> {
        let clk_tck = unsafe { libc::sysconf(libc::_SC_CLK_TCK) }.max(1) as u64;
        let interval_jiffies = intervals.pace_usec * clk_tck / 1_000_000;
        let registry = registry.clone();
        reactor.register_repeating_timer(Duration::from_micros(intervals.pace_usec), move || {
            registry.update(Lane::Pace, interval_jiffies);
            true
        })?;
        Ok(())
    }

    pub fn run(&self) -> Result<()> {
        log::info!(
            "taskmonitor running, {} processes tracked at startup",
            self.registry.proc_count()
        );
        self.reactor.run()
    }

    pub fn collector_count(&self) -> usize {
        self.state_manager.collector_count()
    }
}
