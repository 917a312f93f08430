// ============================================================================
// src/config.rs – strict config loader
// ============================================================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/zbe.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Parent dataset for boot environments, commonly `pool/ROOT`.
    /// When unset, the parent of the dataset mounted at `/` is used.
    #[serde(default)]
    pub be_root: Option<String>,
    #[serde(default)]
    pub zfs_path: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            be_root: None,
            zfs_path: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootloaderCfg {
    /// Which bootloader plugin drives activation.
    #[serde(default = "default_bootloader")]
    pub kind: String,
    /// Plugin property overrides, validated against the plugin's schema
    /// before any other plugin method runs.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_bootloader() -> String {
    "grub".to_string()
}

impl Default for BootloaderCfg {
    fn default() -> Self {
        Self {
            kind: default_bootloader(),
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub bootloader: BootloaderCfg,
}

impl Config {
    pub fn load<P: AsRef<Path>>(p: P) -> Result<Self> {
        let s = fs::read_to_string(&p)
            .with_context(|| format!("read config: {}", p.as_ref().display()))?;
        let cfg: Self = if p.as_ref().extension().and_then(|e| e.to_str()) == Some("toml") {
            toml::from_str(&s).context("toml parse")?
        } else {
            serde_yaml::from_str(&s).context("yaml parse")?
        };
        Ok(cfg)
    }

    /// Load from the default location, falling back to defaults when the
    /// file is absent.
    pub fn load_or_default() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}
