// ============================================================================
// src/cmd/create.rs – `zbe create` workflow
// ============================================================================

use anyhow::Result;
use std::time::Duration;

use crate::config::Config;
use crate::create::create_boot_environment;
use crate::dataset;
use crate::mount;
use crate::ui::UX;
use crate::zfs::Zfs;

/// Create a boot environment named `new_name`, cloned from the current
/// root or from `existing` (a sibling environment name or an explicit
/// snapshot reference).
pub fn run_create(ui: &UX, cfg: &Config, new_name: &str, existing: Option<&str>) -> Result<()> {
    let timeout = Duration::from_secs(cfg.policy.timeout_secs);

    let zfs = match &cfg.policy.zfs_path {
        Some(path) => Zfs::with_path(path, timeout)?,
        None => Zfs::discover(timeout)?,
    };

    let root_dataset = mount::mounted_dataset("/")?;
    let parent_dataset = match &cfg.policy.be_root {
        Some(root) => root.clone(),
        None => dataset::parent(&root_dataset)?.to_string(),
    };

    ui.verbose(&format!(
        "Boot environment root: {parent_dataset}; active root dataset: {root_dataset}."
    ));

    create_boot_environment(&zfs, ui, &parent_dataset, &root_dataset, new_name, existing)?;
    Ok(())
}
