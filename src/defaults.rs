//! Hard-coded fallbacks used whenever a config value is missing or malformed.
//! Every constant here corresponds to one documented `Options::Key` default
//! from the reference implementation.

pub const MIN_LANE_INTERVAL_USEC: u64 = 1_000_000;

pub const PROD_FAST_LANE_INTERVAL_USEC: u64 = 2_000_000;
pub const PROD_PACE_LANE_INTERVAL_USEC: u64 = 5_000_000;
pub const PROD_SLOW_LANE_INTERVAL_USEC: u64 = 30_000_000;

pub const PROF_FAST_LANE_INTERVAL_USEC: u64 = 1_000_000;
pub const PROF_PACE_LANE_INTERVAL_USEC: u64 = 1_000_000;
pub const PROF_SLOW_LANE_INTERVAL_USEC: u64 = 2_000_000;

pub const RX_BUFFER_SIZE: usize = 1024 * 1024;
pub const TX_BUFFER_SIZE: usize = 1024 * 1024;
pub const MSG_BUFFER_SIZE: usize = 1024 * 1024;

pub const TCP_SERVER_PORT: u16 = 5400;
pub const TCP_SERVER_ADDRESS: &str = "any";

pub const UDS_SERVER_SOCKET_PATH: &str = "/run/taskmonitor/taskmonitor.sock";

pub const COLLECTOR_INACTIVE_TIMEOUT_USEC: u64 = 60_000_000;
pub const UDS_COLLECTOR_INACTIVE_TIMEOUT_USEC: u64 = 60_000_000;
pub const STARTUP_DATA_CLEANUP_TIME_USEC: u64 = 120_000_000;
pub const STARTUP_DATA_CAPACITY: usize = 32;

pub const HANDSHAKE_RECV_TIMEOUT_SECS: i64 = 3;

pub const WORK_QUEUE_CAPACITY: usize = 256;

pub const RUNTIME_DIRECTORY: &str = "/run/taskmonitor";
pub const CONTAINERS_PATH: &str = "/run/taskmonitor/containers";
