// ============================================================================
// src/cmd/base.rs – Allowlisted external command runner (for system utilities)
// ============================================================================

use anyhow::{anyhow, Context, Result};
use std::process::Command;
use std::thread;
use std::time::Duration;

/// Safe wrapper for external process execution.
/// Used for invoking allowlisted system tools like `zfs`, `mount`,
/// `umount`, and `grub-mkconfig`.
#[derive(Debug, Clone)]
pub struct Cmd {
    pub path: String,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct OutputData {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl OutputData {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

// Known locations of the binaries this tool is allowed to spawn.
const ALLOWED: &[&str] = &[
    // zfs binary locations (must stay in sync with zfs::Zfs::discover)
    "/sbin/zfs",
    "/usr/sbin/zfs",
    "/usr/local/sbin/zfs",
    "/bin/zfs",
    // mount/umount for the boot-on-zfs staging tree
    "/bin/mount",
    "/usr/bin/mount",
    "/bin/umount",
    "/usr/bin/umount",
    // bootloader configuration generators
    "/usr/sbin/grub-mkconfig",
    "/sbin/grub-mkconfig",
    "/usr/bin/grub-mkconfig",
];

impl Cmd {
    /// Create a new allowlisted command runner for an exact binary path.
    pub fn new_allowlisted<S: Into<String>>(path: S, timeout: Duration) -> Result<Self> {
        let path_str = path.into();
        if !ALLOWED.contains(&path_str.as_str()) {
            return Err(anyhow!("Command '{}' not in allowlist", path_str));
        }

        Ok(Self {
            path: path_str,
            timeout,
        })
    }

    /// Find a binary by name among its allowlisted locations.
    pub fn discover(name: &str, timeout: Duration) -> Result<Self> {
        for candidate in ALLOWED {
            let is_named = std::path::Path::new(candidate)
                .file_name()
                .map(|f| f == name)
                .unwrap_or(false);
            if is_named && std::path::Path::new(candidate).exists() {
                return Self::new_allowlisted(*candidate, timeout);
            }
        }
        Err(anyhow!("'{name}' not found in any allowlisted location"))
    }

    /// Run the command with arguments and optional extra environment,
    /// returning `OutputData`.
    pub fn run(&self, args: &[&str], env: &[(&str, &str)]) -> Result<OutputData> {
        let mut cmd = Command::new(&self.path);
        cmd.args(args);
        for (k, v) in env {
            cmd.env(k, v);
        }

        let child = cmd
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn {}", self.path))?;

        self.wait_with_timeout(child)
    }

    fn wait_with_timeout(&self, mut child: std::process::Child) -> Result<OutputData> {
        let timeout = self.timeout;
        let start = std::time::Instant::now();

        loop {
            match child.try_wait()? {
                Some(status) => {
                    let output = child.wait_with_output()?;
                    return Ok(OutputData {
                        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                        status: status.code().unwrap_or(-1),
                    });
                }
                None => {
                    if start.elapsed() > timeout {
                        let _ = child.kill();
                        return Err(anyhow!("Command timed out after {:?}", timeout));
                    }
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }
}
