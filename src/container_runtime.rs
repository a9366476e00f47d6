//! Resolves a context id (PID-namespace inode) to a display name. The
//! reference implementation queries a live LXC daemon; this implementation
//! instead inventories a directory of one file per known container, which
//! is the equivalent any container runtime can be made to produce without
//! a running daemon dependency.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub trait ContainerRuntime: Send + Sync {
    fn resolve(&self, ctx_id: u64) -> Option<String>;
    fn rescan(&self) {}
}

/// Always answers "unknown" — used when no containers path is configured or
/// in unit tests that don't care about container resolution.
pub struct NullContainerRuntime;

impl ContainerRuntime for NullContainerRuntime {
    fn resolve(&self, _ctx_id: u64) -> Option<String> {
        None
    }
}

/// Each regular file directly under `containers_path` names one container;
/// its contents are the decimal PID-namespace inode it was started in.
pub struct FsContainerRuntime {
    containers_path: PathBuf,
    inventory: RwLock<HashMap<u64, String>>,
}

impl FsContainerRuntime {
    pub fn new(containers_path: impl Into<PathBuf>) -> Self {
        let runtime = Self {
            containers_path: containers_path.into(),
            inventory: RwLock::new(HashMap::new()),
        };
        runtime.rescan();
        runtime
    }

    fn scan(path: &Path) -> HashMap<u64, String> {
        let mut map = HashMap::new();
        let Ok(entries) = fs::read_dir(path) else {
            return map;
        };
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Ok(contents) = fs::read_to_string(entry.path()) else {
                continue;
            };
            if let Ok(ctx_id) = contents.trim().parse::<u64>() {
                map.insert(ctx_id, name);
            }
        }
        map
    }
}

impl ContainerRuntime for FsContainerRuntime {
    fn resolve(&self, ctx_id: u64) -> Option<String> {
        self.inventory.read().unwrap().get(&ctx_id).cloned()
    }

    fn rescan(&self) {
        let fresh = Self::scan(&self.containers_path);
        *self.inventory.write().unwrap() = fresh;
    }
}
