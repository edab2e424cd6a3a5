use super::*;

struct FixedHost {
    cpus: usize,
    platform: Platform,
}

impl HostProbe for FixedHost {
    fn logical_cpus(&self) -> usize {
        self.cpus
    }

    fn memory(&self) -> MemorySnapshot {
        MemorySnapshot {
            total_bytes: 16 << 30,
            available_bytes: 4 << 30,
        }
    }

    fn platform(&self) -> Platform {
        self.platform.clone()
    }
}

fn linux() -> Platform {
    Platform {
        os: "linux".to_string(),
        arch: "x86_64".to_string(),
        version: None,
    }
}

fn apple() -> Platform {
    Platform {
        os: "macos".to_string(),
        arch: "aarch64".to_string(),
        version: None,
    }
}

#[test]
fn auto_worker_count_is_capped() {
    assert_eq!(auto_worker_count(1, &linux()), 1);
    assert_eq!(auto_worker_count(4, &linux()), 3);
    assert_eq!(auto_worker_count(32, &linux()), MAX_AUTO_WORKERS);

    assert_eq!(auto_worker_count(4, &apple()), 4);
    assert_eq!(auto_worker_count(10, &apple()), MAX_AUTO_WORKERS);
}

#[test]
fn explicit_worker_count_is_bounded_by_cpus() {
    let host = FixedHost {
        cpus: 4,
        platform: linux(),
    };
    assert_eq!(resolve_worker_count(2, &host), 2);
    assert_eq!(resolve_worker_count(64, &host), 4);
    assert_eq!(resolve_worker_count(0, &host), 3);
}

#[test]
fn memory_used_percent() {
    let snap = MemorySnapshot {
        total_bytes: 200,
        available_bytes: 50,
    };
    assert!((snap.used_percent() - 75.0).abs() < 1e-9);

    let unknown = MemorySnapshot {
        total_bytes: 0,
        available_bytes: 0,
    };
    assert_eq!(unknown.used_percent(), 0.0);
}

#[test]
fn report_gathers_from_probe() {
    let host = FixedHost {
        cpus: 10,
        platform: apple(),
    };
    let report = HostReport::gather(&host, 0);
    assert_eq!(report.cpus, 10);
    assert_eq!(report.workers, 6);
    assert!(report.platform.is_apple_silicon());
    assert!(report.memory.used_percent() > 70.0);
}

#[test]
fn system_host_reports_something_sane() {
    let host = SystemHost::new();
    assert!(host.logical_cpus() >= 1);
    let mem = host.memory();
    assert!(mem.available_bytes <= mem.total_bytes || mem.total_bytes == 0);
}
