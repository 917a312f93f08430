// ============================================================================
// src/mount.rs – mount subsystem queries and zfs mount/umount calls
// ============================================================================

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::cmd::Cmd;
use crate::errors::{Error, Result};

const PROC_MOUNTS: &str = "/proc/self/mounts";

/// Dataset mounted at `mountpoint`, read from the mount table.
/// `NotFound` when nothing zfs-backed is mounted there.
pub fn mounted_dataset(mountpoint: &str) -> Result<String> {
    let table =
        fs::read_to_string(PROC_MOUNTS).map_err(|e| Error::io(PROC_MOUNTS, e))?;
    dataset_in_mount_table(&table, mountpoint)
        .map(str::to_string)
        .ok_or_else(|| Error::NotFound(format!("zfs dataset mounted at {mountpoint}")))
}

/// True if `path` appears as a mountpoint in the mount table.
pub fn is_mountpoint(path: &Path) -> bool {
    let Ok(table) = fs::read_to_string(PROC_MOUNTS) else {
        return false;
    };
    let needle = path.to_string_lossy();
    table
        .lines()
        .filter_map(mount_fields)
        .any(|(_, mp, _)| mp == needle)
}

/// Mount a zfs dataset at `target` (used for the boot-on-zfs staging tree
/// and for editing the new environment's fstab).
pub fn mount_dataset(dataset: &str, target: &Path, timeout: Duration) -> Result<()> {
    let cmd = Cmd::discover("mount", timeout).map_err(|e| Error::Backend(e.to_string()))?;
    let target_str = target.to_string_lossy();
    let out = cmd
        .run(&["-t", "zfs", "-o", "zfsutil", dataset, target_str.as_ref()], &[])
        .map_err(|e| Error::Backend(e.to_string()))?;
    if !out.success() {
        return Err(Error::Backend(format!(
            "mount of {dataset} at {target_str} failed: {}",
            out.stderr.trim()
        )));
    }
    Ok(())
}

pub fn umount(target: &Path, timeout: Duration) -> Result<()> {
    let cmd = Cmd::discover("umount", timeout).map_err(|e| Error::Backend(e.to_string()))?;
    let target_str = target.to_string_lossy();
    let out = cmd
        .run(&[target_str.as_ref()], &[])
        .map_err(|e| Error::Backend(e.to_string()))?;
    if !out.success() {
        return Err(Error::Backend(format!(
            "umount of {target_str} failed: {}",
            out.stderr.trim()
        )));
    }
    Ok(())
}

fn mount_fields(line: &str) -> Option<(&str, &str, &str)> {
    let mut cols = line.split_whitespace();
    Some((cols.next()?, cols.next()?, cols.next()?))
}

fn dataset_in_mount_table<'a>(table: &'a str, mountpoint: &str) -> Option<&'a str> {
    table
        .lines()
        .filter_map(mount_fields)
        .find(|(_, mp, fstype)| *mp == mountpoint && *fstype == "zfs")
        .map(|(source, _, _)| source)
}

#[cfg(test)]
mod tests {
    use super::dataset_in_mount_table;

    const TABLE: &str = "\
pool/ROOT/default / zfs rw,xattr,noacl 0 0
tmpfs /run tmpfs rw,nosuid,nodev 0 0
/dev/sda1 /boot ext4 rw,relatime 0 0
pool/home /home zfs rw,xattr,noacl 0 0
";

    #[test]
    fn finds_the_root_dataset() {
        assert_eq!(
            dataset_in_mount_table(TABLE, "/"),
            Some("pool/ROOT/default")
        );
        assert_eq!(dataset_in_mount_table(TABLE, "/home"), Some("pool/home"));
    }

    #[test]
    fn ignores_non_zfs_mounts() {
        assert_eq!(dataset_in_mount_table(TABLE, "/boot"), None);
        assert_eq!(dataset_in_mount_table(TABLE, "/run"), None);
    }
}
