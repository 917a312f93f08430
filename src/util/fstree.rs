// ============================================================================
// src/util/fstree.rs – staged-tree copy and apply helpers
// ============================================================================

use std::fs;
use std::path::Path;

use crate::errors::{Error, Result};
use crate::ui::UX;

/// Recursively copy `src` into `dst` (created if missing). Symlinks are
/// recreated, not followed.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(|e| Error::io(dst, e))?;

    for entry in fs::read_dir(src).map_err(|e| Error::io(src, e))? {
        let entry = entry.map_err(|e| Error::io(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let ftype = entry.file_type().map_err(|e| Error::io(&from, e))?;

        if ftype.is_dir() {
            copy_tree(&from, &to)?;
        } else if ftype.is_symlink() {
            let target = fs::read_link(&from).map_err(|e| Error::io(&from, e))?;
            std::os::unix::fs::symlink(&target, &to).map_err(|e| Error::io(&to, e))?;
        } else {
            fs::copy(&from, &to).map_err(|e| Error::io(&to, e))?;
        }
    }
    Ok(())
}

/// Move the contents of the staged tree `src` into `dst`. Directories are
/// merged; an existing file at a destination is reported and left alone,
/// never replaced.
pub fn recurse_move(ui: &UX, src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(|e| Error::io(dst, e))?;

    for entry in fs::read_dir(src).map_err(|e| Error::io(src, e))? {
        let entry = entry.map_err(|e| Error::io(src, e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let ftype = entry.file_type().map_err(|e| Error::io(&from, e))?;

        if ftype.is_dir() && to.is_dir() {
            recurse_move(ui, &from, &to)?;
        } else if to.exists() {
            ui.warn(&format!(
                "Not overwriting existing file {}; staged copy skipped.",
                to.display()
            ));
        } else {
            move_entry(&from, &to)?;
        }
    }
    Ok(())
}

/// Rename when possible; staging lives in a temp directory that may be on
/// a different filesystem than the boot location, so fall back to
/// copy-and-remove on rename failure.
fn move_entry(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    if from.is_dir() {
        copy_tree(from, to)?;
        fs::remove_dir_all(from).map_err(|e| Error::io(from, e))?;
    } else {
        fs::copy(from, to).map_err(|e| Error::io(to, e))?;
        fs::remove_file(from).map_err(|e| Error::io(from, e))?;
    }
    Ok(())
}
