// ============================================================================
// src/create.rs – clone a resolved source set into a new boot environment
// ============================================================================

use crate::dataset;
use crate::errors::{Error, Result};
use crate::resolver;
use crate::ui::UX;
use crate::zfs::{DatasetBackend, DatasetKind};

/// Create the boot environment `new_name` under `parent_dataset`.
///
/// The destination must not exist when cloning starts; on a conflict the
/// operation aborts with zero datasets created. Cloning itself is not
/// transactional across datasets: when a later clone fails, the earlier
/// ones stay behind and the error names the destination and snapshot so
/// the operator can clean up by hand.
pub fn create_boot_environment(
    backend: &dyn DatasetBackend,
    ui: &UX,
    parent_dataset: &str,
    root_dataset: &str,
    new_name: &str,
    existing: Option<&str>,
) -> Result<()> {
    dataset::validate_be_name(new_name)?;

    ui.verbose("Creating boot environment:");
    let clone_sources = resolver::resolve_clone_sources(backend, ui, root_dataset, existing)?;

    let be_dataset = format!("{parent_dataset}/{new_name}");
    if backend.exists(&be_dataset, DatasetKind::Filesystem) {
        return Err(Error::Conflict(be_dataset));
    }

    for source in &clone_sources {
        let destination = if source.child.is_empty() {
            be_dataset.clone()
        } else {
            format!("{be_dataset}/{}", source.child)
        };

        if ui.is_verbose() {
            ui.verbose(&format!(
                "Cloning {} -> {destination} [{}]",
                source.snapshot,
                source.properties.join(", ")
            ));
        }

        backend
            .clone(&source.snapshot, &destination, &source.properties)
            .map_err(|e| {
                Error::Backend(format!(
                    "failed to create {destination} from {}: {e}",
                    source.snapshot
                ))
            })?;
    }

    ui.success(&format!("Created boot environment {be_dataset}."));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeBackend;

    fn quiet() -> UX {
        UX::new(false)
    }

    #[test]
    fn create_from_root_with_one_child() {
        let backend = FakeBackend::new()
            .with_dataset("pool/ROOT/default", &["mountpoint=/"])
            .with_dataset("pool/ROOT/default/var", &["mountpoint=/var"]);

        create_boot_environment(
            &backend,
            &quiet(),
            "pool/ROOT",
            "pool/ROOT/default",
            "default-2",
            None,
        )
        .unwrap();

        assert!(backend.exists("pool/ROOT/default-2", DatasetKind::Filesystem));
        assert!(backend.exists("pool/ROOT/default-2/var", DatasetKind::Filesystem));
        // The properties actually handed to `zfs clone` carry exactly one
        // canmount=off, whatever the source datasets had set.
        for ds in ["pool/ROOT/default-2", "pool/ROOT/default-2/var"] {
            let props = backend.applied_properties(ds);
            let canmount: Vec<&String> =
                props.iter().filter(|p| p.starts_with("canmount=")).collect();
            assert_eq!(canmount, vec!["canmount=off"], "on {ds}");
        }
    }

    #[test]
    fn round_trip_preserves_nested_structure() {
        let backend = FakeBackend::new()
            .with_dataset("pool/ROOT/default", &[])
            .with_dataset("pool/ROOT/default/var", &[])
            .with_dataset("pool/ROOT/default/var/log", &[])
            .with_dataset("pool/ROOT/default/usr", &[]);

        create_boot_environment(
            &backend,
            &quiet(),
            "pool/ROOT",
            "pool/ROOT/default",
            "copy",
            None,
        )
        .unwrap();

        for ds in [
            "pool/ROOT/copy",
            "pool/ROOT/copy/usr",
            "pool/ROOT/copy/var",
            "pool/ROOT/copy/var/log",
        ] {
            assert!(backend.exists(ds, DatasetKind::Filesystem), "missing {ds}");
        }
    }

    #[test]
    fn existing_destination_is_a_conflict_with_no_new_datasets() {
        let backend = FakeBackend::new()
            .with_dataset("pool/ROOT/default", &[])
            .with_dataset("pool/ROOT/default/var", &[])
            .with_dataset("pool/ROOT/taken", &[]);
        let before = backend.dataset_names();

        let result = create_boot_environment(
            &backend,
            &quiet(),
            "pool/ROOT",
            "pool/ROOT/default",
            "taken",
            None,
        );

        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(backend.dataset_names(), before);
    }

    #[test]
    fn invalid_name_is_rejected_before_any_snapshot() {
        let backend = FakeBackend::new().with_dataset("pool/ROOT/default", &[]);

        let result = create_boot_environment(
            &backend,
            &quiet(),
            "pool/ROOT",
            "pool/ROOT/default",
            "bad/name",
            None,
        );

        assert!(matches!(result, Err(Error::InvalidProperty { .. })));
        assert_eq!(backend.snapshot_count(), 0);
    }

    #[test]
    fn failed_later_clone_reports_destination_and_snapshot() {
        let backend = FakeBackend::new()
            .with_dataset("pool/ROOT/default", &[])
            .with_dataset("pool/ROOT/default/var", &[]);
        backend.fail_clone_to("pool/ROOT/next/var");

        let err = create_boot_environment(
            &backend,
            &quiet(),
            "pool/ROOT",
            "pool/ROOT/default",
            "next",
            None,
        )
        .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("pool/ROOT/next/var"), "got: {msg}");
        assert!(msg.contains("@zbe-"), "got: {msg}");
        // Documented limitation: the earlier clone is left in place.
        assert!(backend.exists("pool/ROOT/next", DatasetKind::Filesystem));
    }
}
