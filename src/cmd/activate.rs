// ============================================================================
// src/cmd/activate.rs – `zbe activate` workflow
// ============================================================================

use anyhow::Result;
use std::time::Duration;

use crate::bootloader::{plugin_for, schema_for, Activation, PluginContext};
use crate::config::Config;
use crate::dataset;
use crate::errors::Error;
use crate::mount;
use crate::ui::UX;
use crate::zfs::{DatasetBackend, DatasetKind, Zfs};

/// Activate the boot environment `be_name`: rewrite its fstab boot entry,
/// stage and apply the bootloader files, and regenerate configuration.
pub fn run_activate(ui: &UX, cfg: &Config, be_name: &str) -> Result<()> {
    dataset::validate_be_name(be_name)?;

    let timeout = Duration::from_secs(cfg.policy.timeout_secs);
    let zfs = match &cfg.policy.zfs_path {
        Some(path) => Zfs::with_path(path, timeout)?,
        None => Zfs::discover(timeout)?,
    };

    let root_dataset = mount::mounted_dataset("/")?;
    let be_root = match &cfg.policy.be_root {
        Some(root) => root.clone(),
        None => dataset::parent(&root_dataset)?.to_string(),
    };
    let old_be = dataset::child_name(&root_dataset).to_string();

    let be_dataset = format!("{be_root}/{be_name}");
    if !zfs.exists(&be_dataset, DatasetKind::Filesystem) {
        return Err(Error::NotFound(be_dataset).into());
    }

    // Plugin construction validates its properties; nothing below runs on
    // an invalid configuration.
    let plugin = plugin_for(
        &cfg.bootloader.kind,
        PluginContext {
            backend: &zfs,
            be_root: &be_root,
            active_root: &root_dataset,
            old_be: &old_be,
            new_be: be_name,
            properties: &cfg.bootloader.properties,
            timeout,
        },
    )?;

    if ui.is_verbose() {
        for property in schema_for(&cfg.bootloader.kind)? {
            let value = cfg
                .bootloader
                .properties
                .get(property.name)
                .map(String::as_str)
                .unwrap_or(property.default);
            ui.verbose(&format!(
                "{}={value} ({})",
                property.name, property.description
            ));
        }
    }

    ui.info(&format!(
        "Activating {be_dataset} via {}.",
        cfg.bootloader.kind
    ));

    let mut activation = Activation::new(plugin.as_ref());
    activation.run(ui, |plugin, ui| {
        // The new environment's fstab is edited inside its own tree, so
        // mount it at a throwaway location for the duration of the edit.
        let mount_dir = tempfile::Builder::new()
            .prefix("zbe-mount-")
            .tempdir()
            .map_err(|e| Error::io("mount directory", e))?;

        mount::mount_dataset(&be_dataset, mount_dir.path(), timeout)?;
        let outcome = plugin.mid_activate(ui, mount_dir.path());

        if let Err(e) = mount::umount(mount_dir.path(), timeout) {
            ui.warn(&format!(
                "Failed unmounting {}: {e}.",
                mount_dir.path().display()
            ));
        }
        outcome
    })?;

    ui.success(&format!("Activated boot environment {be_dataset}."));
    Ok(())
}
