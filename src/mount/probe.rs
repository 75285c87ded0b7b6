//! Mount point inspection
//!
//! Derives the current [`MountState`] of a path from `stat` and the host
//! mount table. Nothing here is cached.

use async_trait::async_trait;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Current state of a path in the host mount table
#[derive(Debug)]
pub enum MountState {
    /// Path exists and nothing is mounted on it
    NotMounted,
    /// Path is a mount point
    Mounted,
    /// Path does not exist
    Missing,
    /// `stat` failed in a way that indicates a broken mount
    Corrupted(io::Error),
    /// `stat` or the mount table read failed for another reason
    Failed(io::Error),
}

impl MountState {
    /// Classify a `stat` error
    pub fn from_stat_error(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::Missing
        } else if is_corrupted_mount(&err) {
            Self::Corrupted(err)
        } else {
            Self::Failed(err)
        }
    }
}

/// Errnos `stat` returns on a mount point whose backing daemon is gone
pub fn is_corrupted_mount(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENOTCONN) | Some(libc::ESTALE) | Some(libc::EIO) | Some(libc::EACCES)
            | Some(libc::EHOSTDOWN)
    )
}

/// "Transport endpoint is not connected": the FUSE daemon behind the mount died
pub fn is_transport_disconnected(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOTCONN)
}

/// Reports the mount state of a path
#[async_trait]
pub trait MountProbe: Send + Sync {
    /// Inspect `path`
    async fn probe(&self, path: &Path) -> MountState;

    /// Plain `stat` of `path`, without consulting the mount table
    async fn stat(&self, path: &Path) -> io::Result<()>;
}

/// Probe backed by the host filesystem and `/proc/mounts`
pub struct HostMountProbe {
    mounts_file: PathBuf,
}

impl HostMountProbe {
    /// Create a probe reading `/proc/mounts`
    pub fn new() -> Self {
        Self::with_mounts_file(PathBuf::from("/proc/mounts"))
    }

    /// Create a probe reading an alternate mount table
    pub fn with_mounts_file(mounts_file: PathBuf) -> Self {
        Self { mounts_file }
    }

    /// A device change against the parent means something is mounted here
    async fn crosses_device(path: &Path, dev: u64) -> bool {
        let Some(parent) = path.parent() else {
            return false;
        };
        match fs::metadata(parent).await {
            Ok(meta) => meta.dev() != dev,
            Err(_) => false,
        }
    }
}

impl Default for HostMountProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MountProbe for HostMountProbe {
    async fn probe(&self, path: &Path) -> MountState {
        let meta = match fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) => return MountState::from_stat_error(e),
        };

        if Self::crosses_device(path, meta.dev()).await {
            return MountState::Mounted;
        }

        // Bind mounts from the same filesystem keep the device number, so
        // the mount table is authoritative.
        match fs::read_to_string(&self.mounts_file).await {
            Ok(table) if mount_points(&table).any(|p| p == path) => MountState::Mounted,
            Ok(_) => MountState::NotMounted,
            Err(e) => MountState::Failed(e),
        }
    }

    async fn stat(&self, path: &Path) -> io::Result<()> {
        fs::metadata(path).await.map(|_| ())
    }
}

/// Mount points listed in a `/proc/mounts` formatted table
fn mount_points(table: &str) -> impl Iterator<Item = PathBuf> + '_ {
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(|field| PathBuf::from(unescape_octal(field)))
}

/// Decode the `\040`-style escapes the kernel uses for whitespace
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escaped = bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b));
        if escaped {
            if let Ok(value) = u8::from_str_radix(&field[i + 1..i + 4], 8) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
