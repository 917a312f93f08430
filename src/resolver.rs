// ============================================================================
// src/resolver.rs – resolve the clone-source set for a new boot environment
// ============================================================================

use chrono::Local;

use crate::dataset;
use crate::errors::{Error, Result};
use crate::ui::UX;
use crate::zfs::{DatasetBackend, DatasetKind};

/// Snapshot suffixes and bootloader entries share this prefix.
pub const SNAP_PREFIX: &str = "zbe";

/// Everything the creator needs to clone one dataset of the source tree:
/// the snapshot to clone from, the live properties to apply, and the
/// dataset's path below the source root (empty for the root itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneSource {
    pub snapshot: String,
    pub properties: Vec<String>,
    pub child: String,
}

fn fresh_suffix() -> String {
    format!("{SNAP_PREFIX}-{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.6f"))
}

/// Recursively snapshot `be_root/<be_name>` under a fresh timestamped
/// suffix. The name is validated first so an invalid one can never become
/// part of a snapshot target.
fn snapshot_boot_environment(
    backend: &dyn DatasetBackend,
    ui: &UX,
    be_name: &str,
    be_root: &str,
) -> Result<String> {
    dataset::validate_be_name(be_name)?;

    let dataset_name = format!("{be_root}/{be_name}");
    let suffix = fresh_suffix();

    ui.verbose(&format!("Snapshotting {dataset_name}@{suffix} (recursive)."));
    backend.snapshot(&dataset_name, &suffix, true)?;

    Ok(suffix)
}

/// Compute the ordered clone-source tuples for a creation request.
///
/// Source identity:
/// - `existing = None`: the currently mounted root (`root_dataset`) is
///   snapshotted now, together with its descendants.
/// - `existing` contains `@`: an explicit snapshot; reused, never recreated.
/// - otherwise: the name of a sibling boot environment; its tree is
///   snapshotted now.
///
/// The returned set is ordered root-first so parents are cloned before the
/// datasets nested inside them.
pub fn resolve_clone_sources(
    backend: &dyn DatasetBackend,
    ui: &UX,
    root_dataset: &str,
    existing: Option<&str>,
) -> Result<Vec<CloneSource>> {
    let be_root = dataset::parent(root_dataset)?;

    let (snap_suffix, list_root) = match existing {
        Some(reference) if dataset::is_snapshot(reference) => {
            if !backend.exists(reference, DatasetKind::Snapshot) {
                return Err(Error::NotFound(reference.to_string()));
            }
            ui.verbose(&format!("Reusing existing snapshot {reference}."));
            (
                dataset::snapshot_suffix(reference).to_string(),
                dataset::snapshot_parent(reference).to_string(),
            )
        }
        Some(be_name) => {
            let source = format!("{be_root}/{be_name}");
            if !backend.exists(&source, DatasetKind::Filesystem) {
                return Err(Error::NotFound(source));
            }
            let suffix = snapshot_boot_environment(backend, ui, be_name, be_root)?;
            (suffix, source)
        }
        None => {
            let suffix =
                snapshot_boot_environment(backend, ui, dataset::child_name(root_dataset), be_root)?;
            (suffix, root_dataset.to_string())
        }
    };

    let records = backend.list(&list_root, DatasetKind::Filesystem, true)?;

    let mut sources = Vec::with_capacity(records.len());
    for record in &records {
        let snapshot = format!("{}@{snap_suffix}", record.name);
        ui.verbose(&format!("Resolving clone of {snapshot}."));

        // A descendant without the expected snapshot means the tree changed
        // under us or the reference is stale; abort before any clone.
        if !backend.exists(&snapshot, DatasetKind::Snapshot) {
            return Err(Error::Backend(format!(
                "expected snapshot '{snapshot}' is missing"
            )));
        }

        let child = dataset::relative_to(&record.name, &list_root)
            .unwrap_or("")
            .to_string();

        sources.push(CloneSource {
            snapshot,
            // Properties come from the live dataset, not the snapshot.
            properties: backend.properties(&record.name)?,
            child,
        });
    }

    // Parents before children; stable, so list order is kept within a depth.
    sources.sort_by_key(|s| if s.child.is_empty() { 0 } else { s.child.split('/').count() });

    Ok(sources)
}
