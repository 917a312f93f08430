// ============================================================================
// src/zfs.rs – storage adapter over the `zfs` binary
// ============================================================================

use std::time::Duration;

use crate::cmd::Cmd;
use crate::errors::{Error, Result};

/// What a `list` call should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetKind {
    Filesystem,
    Snapshot,
}

impl DatasetKind {
    fn as_type_arg(self) -> &'static str {
        match self {
            DatasetKind::Filesystem => "filesystem",
            DatasetKind::Snapshot => "snapshot",
        }
    }
}

/// One row of `zfs list`, decoded at this boundary so nothing downstream
/// touches raw tab-delimited output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRecord {
    pub name: String,
    /// `None` when the dataset reports no mountpoint (`-` or `none`).
    pub mountpoint: Option<String>,
}

/// Narrow contract the resolver, creator, and bootloader plugins depend on.
/// `Zfs` is the production implementation; tests substitute an in-memory one.
pub trait DatasetBackend {
    fn list(&self, target: &str, kind: DatasetKind, recursive: bool) -> Result<Vec<DatasetRecord>>;

    /// Locally-set and received properties of the live dataset, as
    /// `key=value` strings. Always carries exactly one `canmount=off`.
    fn properties(&self, dataset: &str) -> Result<Vec<String>>;

    fn snapshot(&self, dataset: &str, suffix: &str, recursive: bool) -> Result<()>;

    fn clone(&self, snapshot: &str, destination: &str, properties: &[String]) -> Result<()>;

    fn exists(&self, target: &str, kind: DatasetKind) -> bool;
}

/// Clones must never auto-mount over the active root, so the captured
/// property list is rewritten to hold a single `canmount=off` entry no
/// matter what the source dataset carried.
pub fn force_canmount_off(properties: Vec<String>) -> Vec<String> {
    let mut props: Vec<String> = properties
        .into_iter()
        .filter(|p| !p.starts_with("canmount="))
        .collect();
    props.push("canmount=off".to_string());
    props
}

pub struct Zfs {
    cmd: Cmd,
}

impl Zfs {
    /// Locate the `zfs` binary among its allowlisted paths.
    pub fn discover(timeout: Duration) -> Result<Self> {
        let cmd = Cmd::discover("zfs", timeout).map_err(|e| Error::Backend(e.to_string()))?;
        Ok(Self { cmd })
    }

    pub fn with_path(path: &str, timeout: Duration) -> Result<Self> {
        let cmd =
            Cmd::new_allowlisted(path, timeout).map_err(|e| Error::Backend(e.to_string()))?;
        Ok(Self { cmd })
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let out = self
            .cmd
            .run(args, &[])
            .map_err(|e| Error::Backend(e.to_string()))?;
        if !out.success() {
            return Err(Error::Backend(format!(
                "zfs {} failed: {}",
                args.first().copied().unwrap_or_default(),
                out.stderr.trim()
            )));
        }
        Ok(out.stdout)
    }
}

impl DatasetBackend for Zfs {
    fn list(&self, target: &str, kind: DatasetKind, recursive: bool) -> Result<Vec<DatasetRecord>> {
        let mut args = vec!["list", "-H", "-o", "name,mountpoint"];
        if recursive {
            args.push("-r");
        }
        args.extend(["-t", kind.as_type_arg(), target]);

        let stdout = self.run(&args)?;
        Ok(stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                let mut cols = line.split('\t');
                let name = cols.next().unwrap_or_default().to_string();
                let mountpoint = match cols.next().unwrap_or("-") {
                    "-" | "none" => None,
                    mp => Some(mp.to_string()),
                };
                DatasetRecord { name, mountpoint }
            })
            .collect())
    }

    fn properties(&self, dataset: &str) -> Result<Vec<String>> {
        let stdout = self.run(&[
            "get",
            "-H",
            "-s",
            "local,received",
            "-o",
            "property,value",
            "all",
            dataset,
        ])?;

        let props = stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                let mut cols = line.split('\t');
                let key = cols.next().unwrap_or_default();
                let value = cols.next().unwrap_or_default();
                format!("{key}={value}")
            })
            .collect();

        Ok(force_canmount_off(props))
    }

    fn snapshot(&self, dataset: &str, suffix: &str, recursive: bool) -> Result<()> {
        let snap = format!("{dataset}@{suffix}");
        let mut args = vec!["snapshot"];
        if recursive {
            args.push("-r");
        }
        args.push(&snap);
        self.run(&args).map(|_| ())
    }

    fn clone(&self, snapshot: &str, destination: &str, properties: &[String]) -> Result<()> {
        let mut args = vec!["clone".to_string()];
        for p in properties {
            args.push("-o".to_string());
            args.push(p.clone());
        }
        args.push(snapshot.to_string());
        args.push(destination.to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs).map(|_| ())
    }

    fn exists(&self, target: &str, kind: DatasetKind) -> bool {
        let args = ["list", "-H", "-o", "name", "-t", kind.as_type_arg(), target];
        matches!(self.cmd.run(&args, &[]), Ok(out) if out.success())
    }
}

#[cfg(test)]
mod tests {
    use super::force_canmount_off;

    #[test]
    fn canmount_off_is_appended_when_absent() {
        let props = force_canmount_off(vec!["mountpoint=/".into(), "compression=lz4".into()]);
        assert_eq!(
            props,
            vec!["mountpoint=/", "compression=lz4", "canmount=off"]
        );
    }

    #[test]
    fn canmount_entries_are_collapsed_to_a_single_off() {
        let props = force_canmount_off(vec![
            "canmount=on".into(),
            "mountpoint=/".into(),
            "canmount=off".into(),
        ]);
        let canmount: Vec<&String> =
            props.iter().filter(|p| p.starts_with("canmount=")).collect();
        assert_eq!(canmount, vec!["canmount=off"]);
        assert_eq!(props.last().unwrap(), "canmount=off");
    }
}
