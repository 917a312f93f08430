// ============================================================================
// src/dataset.rs – pure helpers for dataset and snapshot path strings
// ============================================================================

use crate::errors::{Error, Result};

/// Snapshot delimiter within a dataset path (`pool/ROOT/default@zbe-...`).
pub const SNAP_DELIM: char = '@';

/// True if `target` names a snapshot rather than a filesystem dataset.
pub fn is_snapshot(target: &str) -> bool {
    target.contains(SNAP_DELIM)
}

/// Dataset a snapshot belongs to (`pool/ROOT/default@s` -> `pool/ROOT/default`).
pub fn snapshot_parent(snapshot: &str) -> &str {
    snapshot.splitn(2, SNAP_DELIM).next().unwrap_or(snapshot)
}

/// Suffix of a snapshot reference (`pool/ROOT/default@s` -> `s`).
pub fn snapshot_suffix(snapshot: &str) -> &str {
    snapshot
        .rsplitn(2, SNAP_DELIM)
        .next()
        .unwrap_or(snapshot)
}

/// Parent dataset of a path (`pool/ROOT/default` -> `pool/ROOT`).
pub fn parent(dataset: &str) -> Result<&str> {
    dataset
        .rsplitn(2, '/')
        .nth(1)
        .ok_or_else(|| Error::Backend(format!("dataset '{dataset}' has no parent")))
}

/// Final path component (`pool/ROOT/default` -> `default`).
pub fn child_name(dataset: &str) -> &str {
    dataset.rsplitn(2, '/').next().unwrap_or(dataset)
}

/// Path of `dataset` below `root`, or `None` when they are equal or
/// unrelated. `relative_to("p/ROOT/be/var/log", "p/ROOT/be")` -> `var/log`.
pub fn relative_to<'a>(dataset: &'a str, root: &str) -> Option<&'a str> {
    dataset
        .strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|rest| !rest.is_empty())
}

/// Boot environment names become path components, so a separator (or a
/// snapshot delimiter) inside one would corrupt every derived path. Checked
/// before any snapshot is taken.
pub fn validate_be_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidProperty {
            key: "boot_environment".into(),
            reason: "name must not be empty".into(),
        });
    }
    if name.contains('/') {
        return Err(Error::InvalidProperty {
            key: "boot_environment".into(),
            reason: format!("name '{name}' must not contain '/'"),
        });
    }
    if name.contains(SNAP_DELIM) {
        return Err(Error::InvalidProperty {
            key: "boot_environment".into(),
            reason: format!("name '{name}' must not contain '{SNAP_DELIM}'"),
        });
    }
    Ok(())
}
