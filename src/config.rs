//! INI-backed configuration with documented, typed fallbacks.
//!
//! Every lookup goes through `get_str`/`get_u64`/`get_bool`, which fall back
//! to the caller-supplied default and log a warning when a key is missing or
//! fails to parse. Callers never see a parse error directly; see SPEC_FULL.md
//! section 7.

use std::path::Path;

use ini::Ini;

use crate::defaults;
use crate::error::{Error, Result};

pub struct Config {
    ini: Ini,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(inner) => Error::ConfigUnreadable {
                path: path.display().to_string(),
                inner,
            },
            ini::Error::Parse(p) => Error::ConfigParse(ini::Error::Parse(p)),
        })?;
        Ok(Self { ini })
    }

    fn get_str(&self, section: &str, key: &str) -> Option<String> {
        self.ini.get_from(Some(section), key).map(str::to_owned)
    }

    pub fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        match self.get_str(section, key) {
            Some(v) => v,
            None => default.to_owned(),
        }
    }

    pub fn get_u64(&self, section: &str, key: &str, default: u64) -> u64 {
        match self.get_str(section, key) {
            Some(v) => match v.parse::<u64>() {
                Ok(n) => n,
                Err(_) => {
                    log::warn!(
                        "config [{}] {} = {:?} is not a valid integer, using default {}",
                        section,
                        key,
                        v,
                        default
                    );
                    default
                }
            },
            None => default,
        }
    }

    pub fn get_u16(&self, section: &str, key: &str, default: u16) -> u16 {
        match self.get_str(section, key) {
            Some(v) => match v.parse::<u16>() {
                Ok(n) => n,
                Err(_) => {
                    log::warn!(
                        "config [{}] {} = {:?} is not a valid port, using default {}",
                        section,
                        key,
                        v,
                        default
                    );
                    default
                }
            },
            None => default,
        }
    }

    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.get_str(section, key) {
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    log::warn!(
                        "config [{}] {} = {:?} is not a valid boolean, using default {}",
                        section,
                        key,
                        v,
                        default
                    );
                    default
                }
            },
            None => default,
        }
    }

    /// Lane interval with the documented 1-second floor.
    pub fn get_lane_interval(&self, section: &str, key: &str, default: u64) -> u64 {
        let v = self.get_u64(section, key, default);
        if v < defaults::MIN_LANE_INTERVAL_USEC {
            log::warn!(
                "config [{}] {} = {} is below the {}us floor, using default {}",
                section,
                key,
                v,
                defaults::MIN_LANE_INTERVAL_USEC,
                default
            );
            default
        } else {
            v
        }
    }

    pub fn blacklist(&self) -> Vec<String> {
        match self.ini.section(Some("blacklist")) {
            Some(section) => section.iter().map(|(_, v)| v.to_owned()).collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LaneIntervals {
    pub fast_usec: u64,
    pub pace_usec: u64,
    pub slow_usec: u64,
}

impl LaneIntervals {
    pub fn resolve(config: &Config) -> Self {
        let profile_mode = config
            .get_str("monitor", "ProfModeIfPath")
            .map(|p| Path::new(&p).exists())
            .unwrap_or(false);

        if profile_mode {
            Self {
                fast_usec: config.get_lane_interval(
                    "monitor",
                    "ProfModeFastLaneInt",
                    defaults::PROF_FAST_LANE_INTERVAL_USEC,
                ),
                pace_usec: config.get_lane_interval(
                    "monitor",
                    "ProfModePaceLaneInt",
                    defaults::PROF_PACE_LANE_INTERVAL_USEC,
                ),
                slow_usec: config.get_lane_interval(
                    "monitor",
                    "ProfModeSlowLaneInt",
                    defaults::PROF_SLOW_LANE_INTERVAL_USEC,
                ),
            }
        } else {
            Self {
                fast_usec: config.get_lane_interval(
                    "monitor",
                    "ProdModeFastLaneInt",
                    defaults::PROD_FAST_LANE_INTERVAL_USEC,
                ),
                pace_usec: config.get_lane_interval(
                    "monitor",
                    "ProdModePaceLaneInt",
                    defaults::PROD_PACE_LANE_INTERVAL_USEC,
                ),
                slow_usec: config.get_lane_interval(
                    "monitor",
                    "ProdModeSlowLaneInt",
                    defaults::PROD_SLOW_LANE_INTERVAL_USEC,
                ),
            }
        }
    }
}
