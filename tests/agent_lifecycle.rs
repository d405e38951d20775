//! End-to-end tests running `hwangsae-agent run` on a private bus.
//!
//! Skipped when `dbus-daemon` is not installed.

mod common;

use assert_cmd::prelude::*;
use common::PrivateBus;
use hwangsae_agent::config::APPLICATION_ID;
use hwangsae_agent::dbus::{MANAGER_INTERFACE, MANAGER_PATH, RECORDER_INTERFACE, RECORDER_PATH};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use zbus::fdo::{DBusProxy, RequestNameFlags, RequestNameReply};
use zbus::names::BusName;
use zbus::zvariant::OwnedValue;
use zbus::Connection;

fn spawn_agent(bus: &PrivateBus, dir: &Path) -> Child {
    Command::cargo_bin("hwangsae-agent")
        .unwrap()
        .arg("--config")
        .arg(dir.join("config.toml"))
        .arg("run")
        .env("DBUS_SESSION_BUS_ADDRESS", bus.address())
        .env_remove("RUST_LOG")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

fn send_sigterm(child: &Child) {
    let _ = Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status();
}

/// Wait for `name` to get an owner and return the owner's unique name.
async fn wait_for_owner(client: &Connection, name: &str) -> String {
    let dbus = DBusProxy::new(client).await.unwrap();
    let name = BusName::try_from(name).unwrap();
    for _ in 0..100 {
        if let Ok(owner) = dbus.get_name_owner(name.clone()).await {
            return owner.to_string();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("agent never acquired {}", name);
}

async fn wait_for_exit(child: &mut Child) -> ExitStatus {
    for _ in 0..100 {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let _ = child.kill();
    panic!("agent did not exit after SIGTERM");
}

async fn get_status(client: &Connection, destination: &str) -> zbus::Result<i32> {
    let reply = client
        .call_method(
            Some(destination),
            MANAGER_PATH,
            Some("org.freedesktop.DBus.Properties"),
            "Get",
            &(MANAGER_INTERFACE, "Status"),
        )
        .await?;
    let value = reply.body().deserialize::<OwnedValue>()?;
    Ok(i32::try_from(value)?)
}

async fn call_start(client: &Connection, destination: &str, id: &str) -> zbus::Result<String> {
    let reply = client
        .call_method(
            Some(destination),
            RECORDER_PATH,
            Some(RECORDER_INTERFACE),
            "Start",
            &(id,),
        )
        .await?;
    reply.body().deserialize::<String>()
}

#[tokio::test]
async fn test_sigterm_stops_agent_cleanly() {
    let Some(bus) = PrivateBus::start() else {
        eprintln!("dbus-daemon not available, skipping");
        return;
    };
    let dir = TempDir::new().unwrap();
    let client = bus.connect().await;
    let mut agent = spawn_agent(&bus, dir.path());

    wait_for_owner(&client, APPLICATION_ID).await;
    assert_eq!(get_status(&client, APPLICATION_ID).await.unwrap(), 1);
    assert!(call_start(&client, APPLICATION_ID, "cam")
        .await
        .unwrap()
        .starts_with("cam-"));

    send_sigterm(&agent);
    send_sigterm(&agent);
    let status = wait_for_exit(&mut agent).await;
    assert!(status.success(), "agent exited with {status}");
}

#[tokio::test]
async fn test_lost_name_unpublishes_objects() {
    let Some(bus) = PrivateBus::start() else {
        eprintln!("dbus-daemon not available, skipping");
        return;
    };
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "[bus]\nallow_replacement = true\n",
    )
    .unwrap();

    let client = bus.connect().await;
    let mut agent = spawn_agent(&bus, dir.path());
    let owner = wait_for_owner(&client, APPLICATION_ID).await;
    assert_eq!(get_status(&client, &owner).await.unwrap(), 1);

    let reply = client
        .request_name_with_flags(
            APPLICATION_ID,
            RequestNameFlags::ReplaceExisting | RequestNameFlags::DoNotQueue,
        )
        .await
        .unwrap();
    assert_eq!(reply, RequestNameReply::PrimaryOwner);

    let mut unpublished = false;
    for _ in 0..50 {
        if get_status(&client, &owner).await.is_err() {
            unpublished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(unpublished, "Manager still reachable after losing the name");
    assert!(call_start(&client, &owner, "cam").await.is_err());
    assert!(agent.try_wait().unwrap().is_none());

    send_sigterm(&agent);
    let status = wait_for_exit(&mut agent).await;
    assert!(status.success(), "agent exited with {status}");
}
