//! A throwaway `dbus-daemon` for tests that need a real message bus.

#![allow(dead_code)]

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use tempfile::TempDir;
use zbus::connection::Builder;
use zbus::Connection;

/// A private bus daemon, killed on drop.
pub struct PrivateBus {
    daemon: Child,
    address: String,
    _dir: TempDir,
}

impl PrivateBus {
    /// Start a bus daemon. `None` when `dbus-daemon` is not installed.
    pub fn start() -> Option<Self> {
        let dir = TempDir::new().ok()?;
        let config = dir.path().join("bus.conf");
        std::fs::write(&config, bus_config(dir.path())).ok()?;

        let mut daemon = Command::new("dbus-daemon")
            .arg(format!("--config-file={}", config.display()))
            .args(["--nofork", "--print-address"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .ok()?;

        let mut address = String::new();
        let read = daemon
            .stdout
            .take()
            .map(|out| BufReader::new(out).read_line(&mut address));
        if !matches!(read, Some(Ok(n)) if n > 0) {
            let _ = daemon.kill();
            let _ = daemon.wait();
            return None;
        }

        Some(Self {
            daemon,
            address: address.trim().to_string(),
            _dir: dir,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Open a new connection to this bus.
    pub async fn connect(&self) -> Connection {
        Builder::address(self.address())
            .unwrap()
            .build()
            .await
            .unwrap()
    }
}

impl Drop for PrivateBus {
    fn drop(&mut self) {
        let _ = self.daemon.kill();
        let _ = self.daemon.wait();
    }
}

fn bus_config(dir: &Path) -> String {
    format!(
        r#"<!DOCTYPE busconfig PUBLIC "-//freedesktop//DTD D-Bus Bus Configuration 1.0//EN"
 "http://www.freedesktop.org/standards/dbus/1.0/busconfig.dtd">
<busconfig>
  <type>session</type>
  <listen>unix:dir={}</listen>
  <auth>EXTERNAL</auth>
  <policy context="default">
    <allow send_destination="*" eavesdrop="true"/>
    <allow eavesdrop="true"/>
    <allow own="*"/>
  </policy>
</busconfig>
"#,
        dir.display()
    )
}
