//! Config lookups never propagate a parse failure to the caller — a missing
//! or malformed key logs a warning and falls back to the caller's default.
//! See SPEC_FULL.md section 7.

use std::io::Write;

use taskmonitor::config::{Config, LaneIntervals};

fn write_ini(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn missing_key_uses_the_default() {
    let file = write_ini("[monitor]\nfoo = bar\n");
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.get_u64("monitor", "TCPServerPort", 5400), 5400);
}

#[test]
fn malformed_integer_falls_back_rather_than_erroring() {
    let file = write_ini("[monitor]\nRxBufferSize = not-a-number\n");
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.get_u64("monitor", "RxBufferSize", 1024), 1024);
}

#[test]
fn valid_integer_is_parsed() {
    let file = write_ini("[monitor]\nRxBufferSize = 2048\n");
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.get_u64("monitor", "RxBufferSize", 1024), 2048);
}

#[test]
fn boolean_accepts_common_spellings() {
    let file = write_ini("[monitor]\nEnableTCPServer = off\n");
    let config = Config::load(file.path()).unwrap();
    assert!(!config.get_bool("monitor", "EnableTCPServer", true));
}

#[test]
fn lane_interval_below_the_floor_falls_back() {
    let file = write_ini("[monitor]\nProdModeFastLaneInt = 10\n");
    let config = Config::load(file.path()).unwrap();
    assert_eq!(
        config.get_lane_interval("monitor", "ProdModeFastLaneInt", 2_000_000),
        2_000_000
    );
}

#[test]
fn blacklist_section_collects_every_value() {
    let file = write_ini("[blacklist]\na = kworker\nb = ksoftirqd\n");
    let config = Config::load(file.path()).unwrap();
    let mut blacklist = config.blacklist();
    blacklist.sort();
    assert_eq!(blacklist, vec!["ksoftirqd".to_owned(), "kworker".to_owned()]);
}

#[test]
fn missing_config_file_is_a_distinct_error() {
    let err = Config::load(std::path::Path::new("/nonexistent/taskmonitor.conf")).unwrap_err();
    assert!(matches!(err, taskmonitor::error::Error::ConfigUnreadable { .. }));
}

#[test]
fn prod_mode_is_the_default_when_no_profile_marker_exists() {
    let file = write_ini("[monitor]\nProfModeIfPath = /nonexistent/marker\n");
    let config = Config::load(file.path()).unwrap();
    let intervals = LaneIntervals::resolve(&config);
    assert_eq!(intervals.fast_usec, 2_000_000);
}
