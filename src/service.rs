//! Background service installation.
//!
//! The agent runs as a bus-activated service: a systemd user unit of
//! `Type=dbus` plus a D-Bus activation file naming that unit, so the first
//! call to `org.hwangsaeul.Hwangsae1` starts the agent.

use crate::config::APPLICATION_ID;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

const UNIT_NAME: &str = "hwangsae-agent.service";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Could not locate the home directory")]
    NoHomeDir,

    #[error("Could not find the agent executable: {0}")]
    ExecutableNotFound(std::io::Error),

    #[error("Service not installed")]
    NotInstalled,

    #[error("systemctl --user {command} failed: {stderr}")]
    Systemctl { command: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Locations of the systemd unit and the D-Bus activation file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFiles {
    pub unit: PathBuf,
    pub activation: PathBuf,
}

impl ServiceFiles {
    /// Per-user locations (`~/.config/systemd/user`, `~/.local/share/dbus-1/services`).
    pub fn user() -> Result<Self, ServiceError> {
        let dirs = directories::BaseDirs::new().ok_or(ServiceError::NoHomeDir)?;
        Ok(Self::under(dirs.config_dir(), dirs.data_dir()))
    }

    /// Locations below the given config and data directories.
    pub fn under(config_dir: &Path, data_dir: &Path) -> Self {
        Self {
            unit: config_dir.join("systemd/user").join(UNIT_NAME),
            activation: data_dir
                .join("dbus-1/services")
                .join(format!("{}.service", APPLICATION_ID)),
        }
    }

    /// Write both files for `executable`.
    pub fn write(&self, executable: &Path) -> Result<(), ServiceError> {
        write_file(&self.unit, &unit_file(executable))?;
        write_file(&self.activation, &activation_file(executable))
    }

    /// Remove both files. Fails with [`ServiceError::NotInstalled`] if the unit is missing.
    pub fn remove(&self) -> Result<(), ServiceError> {
        if !self.unit.exists() {
            return Err(ServiceError::NotInstalled);
        }
        fs_remove(&self.unit)?;
        if self.activation.exists() {
            fs_remove(&self.activation)?;
        }
        Ok(())
    }

    /// Status as seen on disk; `active` is filled in by [`status`].
    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            unit: self.unit.exists().then(|| self.unit.clone()),
            activation: self.activation.exists().then(|| self.activation.clone()),
            active: false,
        }
    }
}

/// Installation and run state of the agent service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub unit: Option<PathBuf>,
    pub activation: Option<PathBuf>,
    pub active: bool,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(unit) = &self.unit else {
            return writeln!(f, "Service: not installed");
        };
        writeln!(f, "Service: installed ({})", unit.display())?;
        match &self.activation {
            Some(path) => writeln!(f, "Bus activation: {}", path.display())?,
            None => writeln!(f, "Bus activation: missing")?,
        }
        writeln!(f, "Active: {}", if self.active { "yes" } else { "no" })
    }
}

fn unit_file(executable: &Path) -> String {
    format!(
        r#"[Unit]
Description=Hwangsae Recorder Agent

[Service]
Type=dbus
BusName={}
ExecStart={} run
Restart=on-failure
RestartSec=5

[Install]
WantedBy=default.target
"#,
        APPLICATION_ID,
        executable.display()
    )
}

fn activation_file(executable: &Path) -> String {
    format!(
        "[D-BUS Service]\nName={}\nExec={} run\nSystemdService={}\n",
        APPLICATION_ID,
        executable.display(),
        UNIT_NAME
    )
}

fn write_file(path: &Path, content: &str) -> Result<(), ServiceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

fn fs_remove(path: &Path) -> Result<(), ServiceError> {
    std::fs::remove_file(path)?;
    debug!("Removed {}", path.display());
    Ok(())
}

fn systemctl(args: &[&str]) -> Result<bool, ServiceError> {
    let output = Command::new("systemctl").arg("--user").args(args).output()?;
    if !output.status.success() {
        debug!(
            "systemctl --user {} exited with {}",
            args.join(" "),
            output.status
        );
    }
    Ok(output.status.success())
}

fn systemctl_checked(args: &[&str]) -> Result<(), ServiceError> {
    let output = Command::new("systemctl").arg("--user").args(args).output()?;
    if output.status.success() {
        return Ok(());
    }
    Err(ServiceError::Systemctl {
        command: args.join(" "),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Install the systemd user unit and the D-Bus activation file, then enable the unit.
pub fn install() -> Result<(), ServiceError> {
    let executable = std::env::current_exe().map_err(ServiceError::ExecutableNotFound)?;
    let files = ServiceFiles::user()?;
    files.write(&executable)?;

    systemctl_checked(&["daemon-reload"])?;
    systemctl_checked(&["enable", UNIT_NAME])?;

    println!("Systemd user service installed: {}", files.unit.display());
    println!("D-Bus activation file: {}", files.activation.display());
    println!("\nTo start now: systemctl --user start {}", UNIT_NAME);
    Ok(())
}

/// Stop and disable the unit, then remove both files.
pub fn uninstall() -> Result<(), ServiceError> {
    let files = ServiceFiles::user()?;
    if !files.unit.exists() {
        return Err(ServiceError::NotInstalled);
    }

    // Best effort: the unit may already be stopped or disabled.
    systemctl(&["stop", UNIT_NAME])?;
    systemctl(&["disable", UNIT_NAME])?;
    files.remove()?;
    systemctl(&["daemon-reload"])?;

    println!("Systemd user service removed.");
    Ok(())
}

/// Report whether the service is installed and currently active.
pub fn status() -> Result<ServiceStatus, ServiceError> {
    let mut status = ServiceFiles::user()?.status();
    if status.unit.is_some() {
        status.active = systemctl(&["is-active", "--quiet", UNIT_NAME])?;
    }
    Ok(status)
}
