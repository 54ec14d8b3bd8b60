//! Host queries backing the disk source.
//!
//! Linux reads the mount table from `/proc/mounts` via procfs; other
//! platforms fall back to sysinfo's disk list. Usage comes from `statvfs` on
//! unix and from sysinfo elsewhere.

use crate::disk::{Partition, UsageStat};
use crate::error::SourceError;

/// Read the mounted filesystem table.
#[cfg(target_os = "linux")]
pub fn partitions() -> Result<Vec<Partition>, SourceError> {
    let mounts = procfs::mounts()?;

    Ok(mounts
        .into_iter()
        .map(|m| Partition::new(m.fs_spec, m.fs_vfstype, m.fs_file))
        .collect())
}

/// Read the mounted filesystem table.
#[cfg(not(target_os = "linux"))]
pub fn partitions() -> Result<Vec<Partition>, SourceError> {
    let disks = sysinfo::Disks::new_with_refreshed_list();

    Ok(disks
        .list()
        .iter()
        .map(|d| {
            Partition::new(
                d.name().to_string_lossy(),
                d.file_system().to_string_lossy(),
                d.mount_point().to_string_lossy(),
            )
        })
        .collect())
}

/// Query usage of the filesystem mounted at `mount_point`.
///
/// Blocks on filesystem I/O; a hung mount blocks here indefinitely.
#[cfg(unix)]
pub fn usage(mount_point: &str) -> Result<UsageStat, SourceError> {
    let stat =
        nix::sys::statvfs::statvfs(mount_point).map_err(|e| SourceError::usage(mount_point, e))?;

    Ok(UsageStat::from_blocks(
        stat.blocks() as u64,
        stat.blocks_free() as u64,
        stat.blocks_available() as u64,
        stat.fragment_size() as u64,
    ))
}

/// Query usage of the filesystem mounted at `mount_point`.
#[cfg(not(unix))]
pub fn usage(mount_point: &str) -> Result<UsageStat, SourceError> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new(mount_point))
        .ok_or_else(|| SourceError::usage(mount_point, "mount point not found"))?;

    let total = disk.total_space();
    let free = disk.available_space();
    Ok(UsageStat::new(total, total.saturating_sub(free), free))
}
