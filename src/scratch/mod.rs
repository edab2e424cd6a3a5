//! Scratch storage for intermediate frame files.
//!
//! RAM-backed storage is preferred when requested and large enough: a directory under
//! `/dev/shm` on Linux, an `hdiutil` RAM disk on macOS. Anything that goes wrong there falls
//! back to an ordinary temporary directory, including writes that fail after the RAM scratch
//! was handed out (see [`ScratchManager::acquire_with`]). Dropping a [`ScratchSpace`] releases it; release
//! failures are logged and never reported to the caller.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use crate::encode::run_with_timeout;
use crate::foundation::error::{TileslideError, TileslideResult};
use crate::host::HostProbe;

/// Upper bound for RAM-backed scratch.
pub const MAX_RAM_SCRATCH_BYTES: u64 = 4 << 30;

/// Share of currently available memory a RAM scratch may take, in percent.
pub const RAM_SCRATCH_SHARE_PCT: u64 = 40;

const HDIUTIL_TIMEOUT: Duration = Duration::from_secs(30);

/// Kind of storage behind a [`ScratchSpace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScratchKind {
    /// Directory on a tmpfs mount (`/dev/shm`).
    SharedMemory,
    /// Dedicated RAM disk (macOS `hdiutil`).
    RamDisk,
    /// Ordinary temporary directory on disk.
    Disk,
}

impl ScratchKind {
    /// Whether the storage lives in memory.
    pub fn is_ram(self) -> bool {
        !matches!(self, Self::Disk)
    }
}

enum Backing {
    Temp(tempfile::TempDir),
    RamDisk { device: String, mount: PathBuf },
}

/// An acquired scratch directory. Released on drop.
pub struct ScratchSpace {
    kind: ScratchKind,
    path: PathBuf,
    backing: Option<Backing>,
}

impl std::fmt::Debug for ScratchSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchSpace")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .finish()
    }
}

impl ScratchSpace {
    /// Directory to write into.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Storage kind.
    pub fn kind(&self) -> ScratchKind {
        self.kind
    }

    /// Release now and report the outcome.
    pub fn release(mut self) -> TileslideResult<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> TileslideResult<()> {
        match self.backing.take() {
            None => Ok(()),
            Some(Backing::Temp(dir)) => dir.close().map_err(|e| {
                TileslideError::resource_acquisition(format!(
                    "failed to remove scratch dir '{}': {e}",
                    self.path.display()
                ))
            }),
            Some(Backing::RamDisk { device, mount }) => detach_ram_disk(&device, &mount),
        }
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            tracing::warn!(error = %e, "scratch release failed");
        }
    }
}

/// RAM budget for a host with `available_bytes` free: 40% of it, at most 4 GiB.
pub fn ram_budget(available_bytes: u64) -> u64 {
    (available_bytes / 100 * RAM_SCRATCH_SHARE_PCT).min(MAX_RAM_SCRATCH_BYTES)
}

/// Hands out [`ScratchSpace`]s.
pub struct ScratchManager {
    host: Arc<dyn HostProbe>,
    prefer_ram: bool,
    shm_root: Option<PathBuf>,
    disk_root: Option<PathBuf>,
}

impl ScratchManager {
    /// Manager using the platform's RAM storage when `prefer_ram`.
    pub fn new(host: Arc<dyn HostProbe>, prefer_ram: bool) -> Self {
        let shm_root = Path::new("/dev/shm");
        Self {
            host,
            prefer_ram,
            shm_root: (cfg!(target_os = "linux") && shm_root.is_dir())
                .then(|| shm_root.to_path_buf()),
            disk_root: None,
        }
    }

    /// Use `root` as the tmpfs mount instead of `/dev/shm`.
    pub fn with_shm_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.shm_root = Some(root.into());
        self
    }

    /// Create disk scratch under `root` instead of the system temp dir.
    pub fn with_disk_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.disk_root = Some(root.into());
        self
    }

    /// Kind a request of `requested_bytes` would try first.
    ///
    /// Shared memory also needs that much free space on the tmpfs itself, which is often far
    /// smaller than the memory budget (containers default to 64 MiB).
    pub fn preferred_kind(&self, requested_bytes: u64) -> ScratchKind {
        if !self.prefer_ram || requested_bytes > ram_budget(self.host.memory().available_bytes) {
            ScratchKind::Disk
        } else if let Some(root) = &self.shm_root {
            match self.host.free_space(root) {
                Some(free) if free < requested_bytes => {
                    tracing::debug!(
                        root = %root.display(),
                        free_mib = free >> 20,
                        requested_mib = requested_bytes >> 20,
                        "shared memory too small"
                    );
                    ScratchKind::Disk
                }
                _ => ScratchKind::SharedMemory,
            }
        } else if cfg!(target_os = "macos") {
            ScratchKind::RamDisk
        } else {
            ScratchKind::Disk
        }
    }

    /// Acquire scratch space for about `requested_bytes`.
    ///
    /// RAM failures fall back to disk with a warning. Only a disk failure is an error.
    pub fn acquire(&self, requested_bytes: u64) -> TileslideResult<ScratchSpace> {
        let kind = self.preferred_kind(requested_bytes);
        let ram = match kind {
            ScratchKind::SharedMemory => self.acquire_shm(),
            ScratchKind::RamDisk => acquire_ram_disk(requested_bytes),
            ScratchKind::Disk => {
                if self.prefer_ram {
                    tracing::info!(
                        requested_mib = requested_bytes >> 20,
                        "ram scratch not available for this request, using disk"
                    );
                }
                return self.acquire_disk();
            }
        };
        match ram {
            Ok(space) => {
                tracing::info!(kind = ?space.kind, path = %space.path.display(), "scratch acquired");
                Ok(space)
            }
            Err(e) => {
                tracing::warn!(error = %e, "ram scratch failed, falling back to disk");
                self.acquire_disk()
            }
        }
    }

    /// Acquire scratch and run `fill` on its directory.
    ///
    /// When `fill` fails on RAM-backed scratch (a full tmpfs, an ejected RAM disk) the space is
    /// released and `fill` runs once more on disk. A failure on disk is returned as is.
    pub fn acquire_with<T>(
        &self,
        requested_bytes: u64,
        mut fill: impl FnMut(&Path) -> TileslideResult<T>,
    ) -> TileslideResult<(ScratchSpace, T)> {
        let space = self.acquire(requested_bytes)?;
        if !space.kind().is_ram() {
            let value = fill(space.path())?;
            return Ok((space, value));
        }
        match fill(space.path()) {
            Ok(value) => Ok((space, value)),
            Err(e) => {
                tracing::warn!(
                    kind = ?space.kind(),
                    error = %e,
                    "writing to ram scratch failed, retrying on disk"
                );
                if let Err(e) = space.release() {
                    tracing::warn!(error = %e, "scratch release failed");
                }
                let disk = self.acquire_disk()?;
                let value = fill(disk.path())?;
                Ok((disk, value))
            }
        }
    }

    fn acquire_shm(&self) -> TileslideResult<ScratchSpace> {
        let root = self
            .shm_root
            .as_deref()
            .ok_or_else(|| TileslideError::resource_acquisition("no shared-memory mount"))?;
        let dir = tempfile::Builder::new()
            .prefix("tileslide-")
            .tempdir_in(root)
            .map_err(|e| {
                TileslideError::resource_acquisition(format!(
                    "cannot create scratch in '{}': {e}",
                    root.display()
                ))
            })?;
        Ok(ScratchSpace {
            kind: ScratchKind::SharedMemory,
            path: dir.path().to_path_buf(),
            backing: Some(Backing::Temp(dir)),
        })
    }

    fn acquire_disk(&self) -> TileslideResult<ScratchSpace> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("tileslide-");
        let dir = match &self.disk_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .context("create scratch directory")?;
        Ok(ScratchSpace {
            kind: ScratchKind::Disk,
            path: dir.path().to_path_buf(),
            backing: Some(Backing::Temp(dir)),
        })
    }
}

fn acquire_ram_disk(requested_bytes: u64) -> TileslideResult<ScratchSpace> {
    let sectors = requested_bytes.div_ceil(512).max(2048);
    let mut attach = Command::new("hdiutil");
    attach.args(["attach", "-nomount", &format!("ram://{sectors}")]);
    let out = run_with_timeout(attach, HDIUTIL_TIMEOUT)
        .map_err(|e| TileslideError::resource_acquisition(format!("hdiutil attach: {e}")))?;
    if !out.status.success() {
        return Err(TileslideError::resource_acquisition(format!(
            "hdiutil attach exited with {}",
            out.status
        )));
    }
    let device = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if device.is_empty() {
        return Err(TileslideError::resource_acquisition(
            "hdiutil attach returned no device",
        ));
    }

    let name = format!("TILESLIDE_{}", std::process::id());
    let mut erase = Command::new("diskutil");
    erase.args(["erasevolume", "HFS+", &name, &device]);
    let formatted = run_with_timeout(erase, HDIUTIL_TIMEOUT);
    let mount = PathBuf::from("/Volumes").join(&name);
    match formatted {
        Ok(out) if out.status.success() && mount.is_dir() => Ok(ScratchSpace {
            kind: ScratchKind::RamDisk,
            path: mount.clone(),
            backing: Some(Backing::RamDisk { device, mount }),
        }),
        other => {
            let _ = detach_ram_disk(&device, &mount);
            let reason = match other {
                Ok(out) => format!("diskutil exited with {}", out.status),
                Err(e) => e.to_string(),
            };
            Err(TileslideError::resource_acquisition(format!(
                "ram disk format failed: {reason}"
            )))
        }
    }
}

fn detach_ram_disk(device: &str, mount: &Path) -> TileslideResult<()> {
    let mut detach = Command::new("hdiutil");
    detach.args(["detach", device, "-force"]);
    match run_with_timeout(detach, HDIUTIL_TIMEOUT) {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => Err(TileslideError::resource_acquisition(format!(
            "hdiutil detach '{}' exited with {}",
            mount.display(),
            out.status
        ))),
        Err(e) => Err(TileslideError::resource_acquisition(format!(
            "hdiutil detach '{}': {e}",
            mount.display()
        ))),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scratch.rs"]
mod tests;
