// ============================================================================
// src/bootloader/grub.rs – GRUB plugin for boot environment activation
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;

use crate::bootloader::{
    modify_fstab, parse_bool_property, require_dir_property, validate_properties, Bootloader,
    PluginContext, PluginProperty,
};
use crate::cmd::Cmd;
use crate::dataset;
use crate::errors::{Error, Result};
use crate::mount;
use crate::resolver::SNAP_PREFIX;
use crate::ui::UX;
use crate::util::fstree;
use crate::zfs::{DatasetBackend, DatasetKind};

const BOOT_MOUNTPOINT: &str = "/boot";
const ENV_DIR: &str = "env";
const ZFS_ENV_DIR: &str = "zfsenv";
const GRUB_CFG: &str = "grub/grub.cfg";

pub const ALLOWED_PROPERTIES: &[PluginProperty] = &[
    PluginProperty {
        name: "boot",
        description: "Set location for boot.",
        default: "/mnt/boot",
    },
    PluginProperty {
        name: "bootonzfs",
        description: "Use ZFS for /boot.",
        default: "no",
    },
];

pub struct Grub<'a> {
    backend: &'a dyn DatasetBackend,
    be_root: String,
    /// Dataset mounted at `/`, skipped when building the zfsenv tree.
    active_root: String,
    old_entry: String,
    new_entry: String,
    new_be: String,
    /// Real boot location ("boot" property), an existing directory.
    boot_dir: PathBuf,
    bootonzfs: bool,
    timeout: Duration,
}

impl<'a> Grub<'a> {
    /// Property validation runs here, before the plugin exists; no other
    /// method is callable on an invalid configuration.
    pub fn new(ctx: PluginContext<'a>) -> Result<Self> {
        let props = validate_properties(ALLOWED_PROPERTIES, ctx.properties)?;

        let bootonzfs = parse_bool_property("bootonzfs", &props["bootonzfs"])?;
        let boot_dir = require_dir_property("boot", &props["boot"])?;

        Ok(Self {
            backend: ctx.backend,
            be_root: ctx.be_root.to_string(),
            active_root: ctx.active_root.to_string(),
            old_entry: format!("{SNAP_PREFIX}-{}", ctx.old_be),
            new_entry: format!("{SNAP_PREFIX}-{}", ctx.new_be),
            new_be: ctx.new_be.to_string(),
            boot_dir,
            bootonzfs,
            timeout: ctx.timeout,
        })
    }

    fn grub_cfg_path(&self) -> PathBuf {
        Path::new(BOOT_MOUNTPOINT).join(GRUB_CFG)
    }

    fn mkconfig(&self, ui: &UX) -> Result<()> {
        ui.verbose("Generating the GRUB configuration.");

        let cfg_path = self.grub_cfg_path();
        let cfg_str = cfg_path.to_string_lossy();
        let cmd = Cmd::discover("grub-mkconfig", self.timeout)
            .map_err(|e| Error::Backend(e.to_string()))?;

        let out = cmd
            .run(&["-o", &cfg_str], &[("ZPOOL_VDEV_NAME_PATH", "1")])
            .map_err(|e| Error::Backend(e.to_string()))?;
        if !out.success() {
            return Err(Error::Backend(format!(
                "grub-mkconfig exited {}: {}",
                out.status,
                out.stderr.trim()
            )));
        }

        ui.verbose(&format!("Generated GRUB menu at {}.", cfg_path.display()));
        Ok(())
    }

    /// Mount every boot environment except the active root under
    /// `<boot>/zfsenv/<entry>` so grub-mkconfig can see their kernels.
    fn setup_boot_env_tree(&self, ui: &UX) -> Result<()> {
        let mount_root = self.boot_dir.join(ZFS_ENV_DIR);
        fs::create_dir_all(&mount_root).map_err(|e| Error::io(&mount_root, e))?;

        let records = self
            .backend
            .list(&self.be_root, DatasetKind::Filesystem, true)?;

        for record in &records {
            // Direct children of be_root only; nested datasets are reached
            // through their environment's mount.
            match dataset::relative_to(&record.name, &self.be_root) {
                Some(rel) if !rel.contains('/') => {}
                _ => continue,
            }

            // Compare against the dataset mounted at `/`, not the
            // mountpoint property: inactive environments report
            // `mountpoint=/` too.
            if record.name == self.active_root {
                ui.verbose(&format!("Dataset {} is the active root, skipping.", record.name));
                continue;
            }

            let be_name = dataset::child_name(&record.name);
            let be_boot_mount = mount_root.join(format!("{SNAP_PREFIX}-{be_name}"));
            fs::create_dir_all(&be_boot_mount).map_err(|e| Error::io(&be_boot_mount, e))?;

            let occupied = fs::read_dir(&be_boot_mount)
                .map_err(|e| Error::io(&be_boot_mount, e))?
                .next()
                .is_some();
            if occupied {
                ui.warn(&format!(
                    "Mount directory {} wasn't empty, skipping.",
                    be_boot_mount.display()
                ));
                continue;
            }

            ui.verbose(&format!("Mounting {} at {}.", record.name, be_boot_mount.display()));
            mount::mount_dataset(&record.name, &be_boot_mount, self.timeout)?;
        }

        Ok(())
    }

    /// Unmount and remove the zfsenv tree. Every failure is reported and
    /// tolerated; cleanup never escalates to a fatal error.
    fn teardown_boot_env_tree(&self, ui: &UX) {
        let mount_root = self.boot_dir.join(ZFS_ENV_DIR);
        if !mount_root.exists() {
            ui.verbose(&format!("Mount root {} doesn't exist.", mount_root.display()));
            return;
        }

        let entries = match fs::read_dir(&mount_root) {
            Ok(entries) => entries,
            Err(e) => {
                ui.warn(&format!("Couldn't read {}: {e}.", mount_root.display()));
                return;
            }
        };

        let mut cleanup = true;
        for entry in entries.flatten() {
            let mount_path = entry.path();

            if mount::is_mountpoint(&mount_path) {
                if let Err(e) = mount::umount(&mount_path, self.timeout) {
                    ui.warn(&format!(
                        "Failed unmounting {}: {e}.",
                        mount_path.display()
                    ));
                    cleanup = false;
                    continue;
                }
                ui.verbose(&format!("Unmounted {}.", mount_path.display()));
            }

            if let Err(e) = fs::remove_dir(&mount_path) {
                ui.warn(&format!(
                    "Couldn't remove directory {}: {e}.",
                    mount_path.display()
                ));
                cleanup = false;
            }
        }

        if cleanup {
            if let Err(e) = fs::remove_dir(&mount_root) {
                ui.warn(&format!(
                    "Couldn't remove directory {}: {e}.",
                    mount_root.display()
                ));
            }
        }
    }
}

impl Bootloader for Grub<'_> {
    fn name(&self) -> &'static str {
        "grub"
    }

    fn pre_activate(&self, ui: &UX) -> Result<()> {
        // Fail before any mutation if the config generator is missing.
        Cmd::discover("grub-mkconfig", self.timeout)
            .map_err(|e| Error::Backend(e.to_string()))?;
        ui.verbose("Running grub pre-activate checks.");
        Ok(())
    }

    fn stage(&self, ui: &UX, staging: &Path) -> Result<()> {
        let real_old_kernels = self.boot_dir.join(ENV_DIR).join(&self.old_entry);
        let staged_new_kernels = staging.join(ENV_DIR).join(&self.new_entry);

        if real_old_kernels.is_dir() {
            fstree::copy_tree(&real_old_kernels, &staged_new_kernels)
        } else {
            ui.warn(&format!(
                "No kernel directory found at {}; creating an empty entry. \
                 Don't forget to add your kernel to {}.",
                real_old_kernels.display(),
                self.boot_dir.join(ENV_DIR).join(&self.new_be).display()
            ));
            fs::create_dir_all(&staged_new_kernels)
                .map_err(|e| Error::io(&staged_new_kernels, e))
        }
    }

    fn apply(&self, ui: &UX, staging: &Path) -> Result<()> {
        fstree::recurse_move(ui, staging, &self.boot_dir)
    }

    fn configure(&self, ui: &UX) -> Result<()> {
        if self.bootonzfs {
            self.setup_boot_env_tree(ui)?;
        }
        self.mkconfig(ui)
    }

    fn teardown(&self, ui: &UX) -> Result<()> {
        if self.bootonzfs {
            self.teardown_boot_env_tree(ui);
        }
        Ok(())
    }

    fn mid_activate(&self, ui: &UX, be_mountpoint: &Path) -> Result<()> {
        ui.verbose("Running grub mid-activate.");

        let pattern = format!(
            r"(^{boot}/{env}/?)(\S+)(\s+.*{mountpoint}\s+.*$)",
            boot = regex::escape(&self.boot_dir.to_string_lossy()),
            env = ENV_DIR,
            mountpoint = regex::escape(BOOT_MOUNTPOINT),
        );
        let pattern = Regex::new(&pattern)
            .map_err(|e| Error::Backend(format!("fstab pattern: {e}")))?;

        modify_fstab(ui, be_mountpoint, &pattern, &self.new_entry)
    }
}
