// ============================================================================
// src/bootloader/mod.rs – plugin contract, property validation, activation
// ============================================================================

pub mod grub;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;

use crate::errors::{Error, Result};
use crate::ui::UX;
use crate::util::atomic;
use crate::zfs::DatasetBackend;

/// One declared configuration option of a bootloader plugin.
pub struct PluginProperty {
    pub name: &'static str,
    pub description: &'static str,
    pub default: &'static str,
}

/// Merge supplied options over declared defaults, rejecting unknown keys.
/// Shape checks for individual values (`parse_bool_property`,
/// `require_dir_property`) run in the plugin constructor, which must call
/// this first — no plugin method is reachable before validation passes.
pub fn validate_properties(
    schema: &[PluginProperty],
    supplied: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    for key in supplied.keys() {
        if !schema.iter().any(|p| p.name == key) {
            return Err(Error::InvalidProperty {
                key: key.clone(),
                reason: "not a recognized bootloader property".into(),
            });
        }
    }

    let mut validated = BTreeMap::new();
    for property in schema {
        let value = supplied
            .get(property.name)
            .cloned()
            .unwrap_or_else(|| property.default.to_string());
        validated.insert(property.name.to_string(), value);
    }
    Ok(validated)
}

/// Accepts the yes/no/1/0 token set; anything else names the key.
pub fn parse_bool_property(key: &str, value: &str) -> Result<bool> {
    match value {
        "yes" | "1" => Ok(true),
        "no" | "0" => Ok(false),
        other => Err(Error::InvalidProperty {
            key: key.to_string(),
            reason: format!("'{other}' should be 'yes', 'no', '1', or '0'"),
        }),
    }
}

/// Path-valued options must reference an existing directory.
pub fn require_dir_property(key: &str, value: &str) -> Result<PathBuf> {
    let path = PathBuf::from(value);
    if !path.is_dir() {
        return Err(Error::InvalidProperty {
            key: key.to_string(),
            reason: format!("'{value}' is not an existing directory"),
        });
    }
    Ok(path)
}

/// Capability set every bootloader plugin provides. Selected once at
/// configuration time via `plugin_for`; the `Activation` driver sequences
/// the calls.
pub trait Bootloader {
    fn name(&self) -> &'static str;

    /// Checks only, no mutation.
    fn pre_activate(&self, ui: &UX) -> Result<()>;

    /// Populate the staging directory with the new environment's boot
    /// artifacts (copying, never moving, the outgoing ones).
    fn stage(&self, ui: &UX, staging: &Path) -> Result<()>;

    /// Move the staged tree into the real boot location.
    fn apply(&self, ui: &UX, staging: &Path) -> Result<()>;

    /// Regenerate bootloader configuration. A failure here is downgraded
    /// to a warning by the driver: a stale config beats a half-moved boot
    /// directory, so the activation is not rolled back.
    fn configure(&self, ui: &UX) -> Result<()>;

    /// Best-effort cleanup of per-environment mounts; must tolerate
    /// leftover directories and unmount failures.
    fn teardown(&self, ui: &UX) -> Result<()>;

    /// Rewrite the new environment's fstab entry for the boot location.
    /// Runs inside the new environment's mounted tree.
    fn mid_activate(&self, ui: &UX, be_mountpoint: &Path) -> Result<()>;
}

/// Everything a plugin constructor needs.
pub struct PluginContext<'a> {
    pub backend: &'a dyn DatasetBackend,
    pub be_root: &'a str,
    /// Dataset actually mounted at `/` right now. Mount state, not the
    /// `mountpoint` property — every boot environment carries
    /// `mountpoint=/` whether or not it is the one booted.
    pub active_root: &'a str,
    pub old_be: &'a str,
    pub new_be: &'a str,
    pub properties: &'a BTreeMap<String, String>,
    pub timeout: Duration,
}

/// Plugin selection happens here, at configuration time.
pub fn plugin_for<'a>(kind: &str, ctx: PluginContext<'a>) -> Result<Box<dyn Bootloader + 'a>> {
    match kind {
        "grub" => Ok(Box::new(grub::Grub::new(ctx)?)),
        other => Err(Error::NotFound(format!("bootloader plugin '{other}'"))),
    }
}

/// Declared option schema of a plugin, for user-facing listings.
pub fn schema_for(kind: &str) -> Result<&'static [PluginProperty]> {
    match kind {
        "grub" => Ok(grub::ALLOWED_PROPERTIES),
        other => Err(Error::NotFound(format!("bootloader plugin '{other}'"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    Idle,
    PreActivate,
    Staged,
    Applied,
    Configured,
    TornDown,
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivationState::Idle => "idle",
            ActivationState::PreActivate => "pre-activate",
            ActivationState::Staged => "staged",
            ActivationState::Applied => "applied",
            ActivationState::Configured => "configured",
            ActivationState::TornDown => "torn-down",
        };
        f.write_str(s)
    }
}

/// Drives one activation through the plugin capability set. `TornDown` is
/// terminal and reached on success and failure alike; the staging
/// directory is removed whenever the staging block exits, by any path.
pub struct Activation<'a> {
    plugin: &'a dyn Bootloader,
    state: ActivationState,
}

impl<'a> Activation<'a> {
    pub fn new(plugin: &'a dyn Bootloader) -> Self {
        Self {
            plugin,
            state: ActivationState::Idle,
        }
    }

    pub fn state(&self) -> ActivationState {
        self.state
    }

    /// Run the full activation. `mid` executes between the pre-checks and
    /// staging, while the new environment is mounted for its fstab edit;
    /// a `mid` failure is fatal (configuration integrity).
    pub fn run<F>(&mut self, ui: &UX, mid: F) -> Result<()>
    where
        F: FnOnce(&dyn Bootloader, &UX) -> Result<()>,
    {
        let outcome = self.drive(ui, mid);

        if let Err(e) = self.plugin.teardown(ui) {
            ui.warn(&format!("Cleanup after activation incomplete: {e}"));
        }
        self.state = ActivationState::TornDown;
        ui.verbose("Activation state: torn-down.");

        outcome
    }

    fn drive<F>(&mut self, ui: &UX, mid: F) -> Result<()>
    where
        F: FnOnce(&dyn Bootloader, &UX) -> Result<()>,
    {
        self.advance(ui, ActivationState::PreActivate);
        self.plugin.pre_activate(ui)?;

        mid(self.plugin, ui)?;

        // The staging directory lives exactly as long as this block.
        let staging = tempfile::Builder::new()
            .prefix("zbe-")
            .suffix(self.plugin.name())
            .tempdir()
            .map_err(|e| Error::io("staging directory", e))?;
        ui.verbose(&format!("Created staging directory {}.", staging.path().display()));

        self.plugin.stage(ui, staging.path())?;
        self.advance(ui, ActivationState::Staged);

        self.plugin.apply(ui, staging.path())?;
        self.advance(ui, ActivationState::Applied);

        if let Err(e) = self.plugin.configure(ui) {
            ui.warn(&format!(
                "Bootloader configuration generation failed (activation kept): {e}"
            ));
        }
        self.advance(ui, ActivationState::Configured);

        Ok(())
    }

    fn advance(&mut self, ui: &UX, state: ActivationState) {
        self.state = state;
        ui.verbose(&format!("Activation state: {state}."));
    }
}

/// Substitute the boot-entry name in the single fstab line matching
/// `pattern`. The pattern must capture (prefix)(entry)(rest); exactly one
/// line may match — zero or several is a configuration-integrity error,
/// not a silent pattern-engine outcome.
pub fn rewrite_fstab(contents: &str, pattern: &Regex, new_entry: &str, path: &Path) -> Result<String> {
    let matched = contents.lines().filter(|l| pattern.is_match(l)).count();
    if matched != 1 {
        return Err(Error::ConfigIntegrity {
            path: path.to_path_buf(),
            matched,
        });
    }

    let rewritten: Vec<String> = contents
        .lines()
        .map(|line| {
            if pattern.is_match(line) {
                pattern
                    .replace(line, |caps: &regex::Captures<'_>| {
                        format!("{}{}{}", &caps[1], new_entry, &caps[3])
                    })
                    .into_owned()
            } else {
                line.to_string()
            }
        })
        .collect();

    Ok(rewritten.join("\n") + "\n")
}

/// Rewrite `<be_mountpoint>/etc/fstab` in place, atomically.
pub fn modify_fstab(
    ui: &UX,
    be_mountpoint: &Path,
    pattern: &Regex,
    new_entry: &str,
) -> Result<()> {
    let fstab = be_mountpoint.join("etc/fstab");
    let contents = fs::read_to_string(&fstab).map_err(|e| Error::io(&fstab, e))?;

    let rewritten = rewrite_fstab(&contents, pattern, new_entry, &fstab)?;
    if rewritten == contents {
        ui.verbose(&format!("{} already references {new_entry}.", fstab.display()));
        return Ok(());
    }

    atomic::replace_file_text(&fstab, &rewritten).map_err(|e| Error::Io {
        path: fstab.clone(),
        source: std::io::Error::other(format!("{e:#}")),
    })?;
    ui.verbose(&format!("Updated boot entry in {}.", fstab.display()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn quiet() -> UX {
        UX::new(false)
    }

    const SCHEMA: &[PluginProperty] = &[
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

    #[test]
    fn unsupplied_options_take_defaults() {
        let validated = validate_properties(SCHEMA, &BTreeMap::new()).unwrap();
        assert_eq!(validated["boot"], "/mnt/boot");
        assert_eq!(validated["bootonzfs"], "no");
    }

    #[test]
    fn unknown_keys_name_the_offender() {
        let supplied = BTreeMap::from([("bootzfs".to_string(), "yes".to_string())]);
        match validate_properties(SCHEMA, &supplied) {
            Err(Error::InvalidProperty { key, .. }) => assert_eq!(key, "bootzfs"),
            other => panic!("expected InvalidProperty, got {other:?}"),
        }
    }

    #[test]
    fn bool_tokens() {
        assert!(parse_bool_property("bootonzfs", "yes").unwrap());
        assert!(parse_bool_property("bootonzfs", "1").unwrap());
        assert!(!parse_bool_property("bootonzfs", "no").unwrap());
        assert!(!parse_bool_property("bootonzfs", "0").unwrap());
        assert!(matches!(
            parse_bool_property("bootonzfs", "maybe"),
            Err(Error::InvalidProperty { .. })
        ));
    }

    #[test]
    fn dir_property_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(require_dir_property("boot", &dir.path().to_string_lossy()).is_ok());
        assert!(matches!(
            require_dir_property("boot", "/no/such/location"),
            Err(Error::InvalidProperty { key, .. }) if key == "boot"
        ));
    }

    fn boot_pattern() -> Regex {
        Regex::new(r"(^/mnt/boot/env/?)(\S+)(\s+.*/boot\s+.*$)").unwrap()
    }

    const FSTAB: &str = "\
pool/ROOT/default / zfs rw 0 0
/mnt/boot/env/zbe-default /boot none rw,bind 0 0
tmpfs /tmp tmpfs rw 0 0
";

    #[test]
    fn fstab_rewrite_is_idempotent() {
        let path = Path::new("/etc/fstab");
        let once = rewrite_fstab(FSTAB, &boot_pattern(), "zbe-next", path).unwrap();
        assert!(once.contains("/mnt/boot/env/zbe-next /boot none rw,bind 0 0"));
        assert!(!once.contains("zbe-default"));

        let twice = rewrite_fstab(&once, &boot_pattern(), "zbe-next", path).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn fstab_rewrite_requires_exactly_one_match() {
        let path = Path::new("/etc/fstab");

        let none = "tmpfs /tmp tmpfs rw 0 0\n";
        assert!(matches!(
            rewrite_fstab(none, &boot_pattern(), "zbe-next", path),
            Err(Error::ConfigIntegrity { matched: 0, .. })
        ));

        let double = format!("{FSTAB}/mnt/boot/env/zbe-other /boot none rw,bind 0 0\n");
        assert!(matches!(
            rewrite_fstab(&double, &boot_pattern(), "zbe-next", path),
            Err(Error::ConfigIntegrity { matched: 2, .. })
        ));
    }

    /// Scripted plugin for exercising the activation state machine.
    struct ScriptedPlugin {
        fail_configure: bool,
        fail_stage: bool,
        calls: RefCell<Vec<&'static str>>,
    }

    impl ScriptedPlugin {
        fn new() -> Self {
            Self {
                fail_configure: false,
                fail_stage: false,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Bootloader for ScriptedPlugin {
        fn name(&self) -> &'static str {
            "scripted"
        }
        fn pre_activate(&self, _ui: &UX) -> Result<()> {
            self.calls.borrow_mut().push("pre");
            Ok(())
        }
        fn stage(&self, _ui: &UX, _staging: &Path) -> Result<()> {
            self.calls.borrow_mut().push("stage");
            if self.fail_stage {
                return Err(Error::Backend("stage failed".into()));
            }
            Ok(())
        }
        fn apply(&self, _ui: &UX, _staging: &Path) -> Result<()> {
            self.calls.borrow_mut().push("apply");
            Ok(())
        }
        fn configure(&self, _ui: &UX) -> Result<()> {
            self.calls.borrow_mut().push("configure");
            if self.fail_configure {
                return Err(Error::Backend("mkconfig exited 1".into()));
            }
            Ok(())
        }
        fn teardown(&self, _ui: &UX) -> Result<()> {
            self.calls.borrow_mut().push("teardown");
            Ok(())
        }
        fn mid_activate(&self, _ui: &UX, _be_mountpoint: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn happy_path_reaches_torn_down_in_order() {
        let plugin = ScriptedPlugin::new();
        let mut activation = Activation::new(&plugin);

        activation.run(&quiet(), |_, _| Ok(())).unwrap();

        assert_eq!(activation.state(), ActivationState::TornDown);
        assert_eq!(
            *plugin.calls.borrow(),
            vec!["pre", "stage", "apply", "configure", "teardown"]
        );
    }

    #[test]
    fn configure_failure_is_a_warning_not_an_error() {
        let mut plugin = ScriptedPlugin::new();
        plugin.fail_configure = true;
        let mut activation = Activation::new(&plugin);

        let result = activation.run(&quiet(), |_, _| Ok(()));

        assert!(result.is_ok(), "activation must survive a mkconfig failure");
        assert_eq!(activation.state(), ActivationState::TornDown);
        assert!(plugin.calls.borrow().contains(&"teardown"));
    }

    #[test]
    fn stage_failure_still_tears_down() {
        let mut plugin = ScriptedPlugin::new();
        plugin.fail_stage = true;
        let mut activation = Activation::new(&plugin);

        let result = activation.run(&quiet(), |_, _| Ok(()));

        assert!(result.is_err());
        assert_eq!(activation.state(), ActivationState::TornDown);
        assert!(plugin.calls.borrow().contains(&"teardown"));
        // The move into the boot location never started.
        assert!(!plugin.calls.borrow().contains(&"apply"));
    }

    #[test]
    fn mid_activation_failure_is_fatal_but_torn_down() {
        let plugin = ScriptedPlugin::new();
        let mut activation = Activation::new(&plugin);

        let result = activation.run(&quiet(), |_, _| {
            Err(Error::ConfigIntegrity {
                path: "/mnt/etc/fstab".into(),
                matched: 0,
            })
        });

        assert!(matches!(result, Err(Error::ConfigIntegrity { .. })));
        assert_eq!(activation.state(), ActivationState::TornDown);
    }
}
