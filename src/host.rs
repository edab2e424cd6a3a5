//! Host resource queries: logical cores, memory pressure, platform identification.

use std::path::Path;
use std::sync::Mutex;

/// Upper bound for automatically chosen worker counts.
///
/// Leaves cores free for the encoder process and the OS, and avoids oversubscribing the
/// efficiency cores on heterogeneous CPUs.
pub const MAX_AUTO_WORKERS: usize = 6;

/// One reading of host memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemorySnapshot {
    /// Total physical memory in bytes.
    pub total_bytes: u64,
    /// Memory available for new allocations in bytes.
    pub available_bytes: u64,
}

impl MemorySnapshot {
    /// Utilization in percent (`0.0` when the total is unknown).
    pub fn used_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.available_bytes);
        (used as f64) * 100.0 / (self.total_bytes as f64)
    }
}

/// Operating system and CPU family.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Platform {
    /// `std::env::consts::OS` value (`linux`, `macos`, ...).
    pub os: String,
    /// `std::env::consts::ARCH` value.
    pub arch: String,
    /// Human readable OS version, when known.
    pub version: Option<String>,
}

impl Platform {
    /// Platform of the running process.
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            version: sysinfo::System::long_os_version(),
        }
    }

    /// Apple silicon (macOS on arm64).
    pub fn is_apple_silicon(&self) -> bool {
        self.os == "macos" && self.arch == "aarch64"
    }
}

/// Source of host facts used for sizing pools and scratch space.
pub trait HostProbe: Send + Sync {
    /// Number of logical CPUs.
    fn logical_cpus(&self) -> usize;
    /// Current memory reading.
    fn memory(&self) -> MemorySnapshot;
    /// Platform identification.
    fn platform(&self) -> Platform;
    /// Free bytes on the filesystem holding `path`, when known.
    fn free_space(&self, _path: &Path) -> Option<u64> {
        None
    }
}

/// [`HostProbe`] backed by `sysinfo`.
pub struct SystemHost {
    sys: Mutex<sysinfo::System>,
    platform: Platform,
}

impl SystemHost {
    /// Create a probe for the running host.
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(sysinfo::System::new()),
            platform: Platform::current(),
        }
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SystemHost {
    fn logical_cpus(&self) -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    fn memory(&self) -> MemorySnapshot {
        let Ok(mut sys) = self.sys.lock() else {
            return MemorySnapshot {
                total_bytes: 0,
                available_bytes: 0,
            };
        };
        sys.refresh_memory();
        MemorySnapshot {
            total_bytes: sys.total_memory(),
            available_bytes: sys.available_memory(),
        }
    }

    fn platform(&self) -> Platform {
        self.platform.clone()
    }

    fn free_space(&self, path: &Path) -> Option<u64> {
        let disks = sysinfo::Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|d| path.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().components().count())
            .map(|d| d.available_space())
    }
}

/// Worker count used when the config asks for automatic sizing.
///
/// Apple silicon gets `min(cores, 6)`; other hosts use 75% of the cores, capped at 6.
pub fn auto_worker_count(cpus: usize, platform: &Platform) -> usize {
    let n = if platform.is_apple_silicon() {
        cpus
    } else {
        cpus * 3 / 4
    };
    n.clamp(1, MAX_AUTO_WORKERS)
}

/// Resolve a configured worker count (`0` = automatic) against the host.
pub fn resolve_worker_count(requested: usize, host: &dyn HostProbe) -> usize {
    let cpus = host.logical_cpus().max(1);
    if requested == 0 {
        auto_worker_count(cpus, &host.platform())
    } else {
        requested.min(cpus).max(1)
    }
}

/// Summary of the host printed at the start of a run.
#[derive(Clone, Debug)]
pub struct HostReport {
    /// Logical CPUs.
    pub cpus: usize,
    /// Memory reading at report time.
    pub memory: MemorySnapshot,
    /// Platform identification.
    pub platform: Platform,
    /// Workers the pool will use.
    pub workers: usize,
}

impl HostReport {
    /// Gather a report for `requested_workers` (`0` = automatic).
    pub fn gather(host: &dyn HostProbe, requested_workers: usize) -> Self {
        Self {
            cpus: host.logical_cpus(),
            memory: host.memory(),
            platform: host.platform(),
            workers: resolve_worker_count(requested_workers, host),
        }
    }

    /// Emit the report as one structured `info` event.
    pub fn log(&self) {
        tracing::info!(
            cpus = self.cpus,
            workers = self.workers,
            memory_total_gib = format!("{:.1}", gib(self.memory.total_bytes)),
            memory_used_pct = format!("{:.1}", self.memory.used_percent()),
            os = %self.platform.os,
            arch = %self.platform.arch,
            os_version = self.platform.version.as_deref().unwrap_or("unknown"),
            apple_silicon = self.platform.is_apple_silicon(),
            "host report"
        );
    }
}

fn gib(bytes: u64) -> f64 {
    (bytes as f64) / (1024.0 * 1024.0 * 1024.0)
}

#[cfg(test)]
#[path = "../tests/unit/host.rs"]
mod tests;
