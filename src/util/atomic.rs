// ============================================================================
// src/util/atomic.rs – durable atomic file replacement (fstab rewrite)
// ============================================================================

use anyhow::{bail, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

fn parent_dir(path: &Path) -> Result<PathBuf> {
    path.parent()
        .map(|p| p.to_path_buf())
        .context("Target path has no parent directory")
}

/// Fsync a directory to persist metadata (like rename).
fn fsync_dir(dir: &Path) -> Result<()> {
    let f = File::open(dir).with_context(|| format!("Open dir for fsync: {dir:?}"))?;
    f.sync_all()
        .with_context(|| format!("Fsync dir failed: {dir:?}"))?;
    Ok(())
}

/// Reject writes if target is a symlink (avoid TOCTOU surprises at the destination).
fn reject_symlink_target(path: &Path) -> Result<()> {
    if let Ok(meta) = fs::symlink_metadata(path) {
        if meta.file_type().is_symlink() {
            bail!("Refusing to write to symlink: {}", path.display());
        }
    }
    Ok(())
}

/// Replace `path` atomically: write to a temp file in the same directory,
/// fsync it, rename over the destination, then fsync the parent directory.
/// Applies exact POSIX mode (ignores umask).
pub fn replace_file_bytes(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    reject_symlink_target(path)?;

    let dir = parent_dir(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Target path missing file name")?;

    // Unique temp name beside the destination (low-collision approach)
    let mut tmp = dir.join(format!("{file_name}.tmp"));
    for _ in 0..8 {
        tmp.set_file_name(format!("{file_name}.tmp-{}", nanoid::nanoid!(8)));
        if !tmp.exists() {
            break;
        }
    }

    let mut f = OpenOptions::new()
        .create_new(true) // fail if exists
        .write(true)
        .mode(mode)
        .open(&tmp)
        .with_context(|| format!("Open temp file failed: {tmp:?}"))?;

    f.write_all(bytes).context("Write to temp file failed")?;
    f.sync_all().context("Fsync temp file failed")?;

    fs::rename(&tmp, path).with_context(|| {
        format!(
            "Atomic rename failed ({} -> {})",
            tmp.display(),
            path.display()
        )
    })?;

    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Set permissions failed for {}", path.display()))?;

    fsync_dir(&dir)?;

    Ok(())
}

/// Atomic replacement for world-readable system files such as fstab.
pub fn replace_file_text(path: &Path, contents: &str) -> Result<()> {
    replace_file_bytes(path, contents.as_bytes(), 0o644)
}

#[cfg(test)]
mod tests {
    use super::replace_file_text;
    use std::fs;

    #[test]
    fn replaces_contents_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fstab");
        fs::write(&path, "old\n").unwrap();

        replace_file_text(&path, "new\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        // No temp droppings left behind
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
