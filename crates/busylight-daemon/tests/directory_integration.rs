//! Integration tests for device discovery, logical ids, and hot-plug removal.

use std::sync::Arc;
use std::time::Duration;

use busylight_core::logical_device_id;
use busylight_daemon::application::directory::DirectoryTiming;
use busylight_daemon::application::scheduler::StateRequest;
use busylight_daemon::application::service::{BusylightService, ServiceHandle};
use busylight_daemon::infrastructure::hid::SimulatedHidTransport;
use busylight_daemon::infrastructure::hotplug::watch_hotplug;
use tokio::time::sleep;

const POLL: Duration = Duration::from_millis(200);
const GRACE: Duration = Duration::from_millis(1000);

fn start(transport: &SimulatedHidTransport, aliases: &[&str]) -> ServiceHandle {
    let (service, handle) = BusylightService::new(
        Arc::new(transport.clone()),
        aliases.iter().map(|a| a.parse().unwrap()).collect(),
        DirectoryTiming {
            keepalive: Duration::from_secs(5),
            removal_grace: GRACE,
        },
    );
    tokio::spawn(service.run());
    handle
}

fn start_watching(transport: &SimulatedHidTransport, aliases: &[&str]) -> ServiceHandle {
    let handle = start(transport, aliases);
    watch_hotplug(Arc::new(transport.clone()), handle.clone(), POLL);
    handle
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_ids_without_aliases_are_folded_serial_hashes() {
    // Arrange
    let transport = SimulatedHidTransport::with_devices(2);
    let mut expected = vec![
        logical_device_id("SIM00001", &[]),
        logical_device_id("SIM00002", &[]),
    ];
    expected.sort();

    // Act
    let ids = start(&transport, &[]).list_device_ids().await.unwrap();

    // Assert
    assert_eq!(ids, expected);
    assert!(ids.iter().all(|id| id.len() == 4));
}

#[tokio::test(start_paused = true)]
async fn test_alias_applies_only_to_matching_serial() {
    let transport = SimulatedHidTransport::with_devices(2);

    let ids = start(&transport, &["desk:SIM00002"])
        .list_device_ids()
        .await
        .unwrap();

    assert!(ids.contains(&"desk".to_string()));
    assert!(ids.contains(&logical_device_id("SIM00001", &[])));
}

#[tokio::test(start_paused = true)]
async fn test_new_devices_start_off_and_keepalive() {
    // Arrange
    let transport = SimulatedHidTransport::with_devices(1);
    let handle = start(&transport, &["desk:SIM00001"]);
    handle.list_device_ids().await.unwrap();
    transport.clear_frames("sim-1");

    // Act
    sleep(Duration::from_millis(5100)).await;

    // Assert: one keepalive frame, command 0x8F.
    let frames = transport.frames("sim-1");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0][1], 0x8F);
}

#[tokio::test(start_paused = true)]
async fn test_unplugged_device_survives_grace_period_then_goes() {
    // Arrange
    let transport = SimulatedHidTransport::with_devices(2);
    let handle = start_watching(&transport, &["desk:SIM00001", "door:SIM00002"]);
    sleep(POLL / 2).await;

    // Act
    transport.detach("sim-2");
    sleep(POLL + GRACE / 2).await;
    let during = handle.list_device_ids().await.unwrap();
    sleep(GRACE).await;
    let after = handle.list_device_ids().await.unwrap();

    // Assert
    assert_eq!(during, vec!["desk".to_string(), "door".to_string()]);
    assert_eq!(after, vec!["desk".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_flicker_within_grace_keeps_device_but_drops_schedule() {
    // Arrange
    let transport = SimulatedHidTransport::with_devices(1);
    let handle = start_watching(&transport, &["desk:SIM00001"]);
    sleep(POLL / 2).await;
    handle
        .request_state(StateRequest::new("desk", "warning"))
        .unwrap();

    // Act: unplug for one poll, then plug back in before the grace expires.
    transport.detach("sim-1");
    sleep(POLL).await;
    transport.attach(SimulatedHidTransport::descriptor("sim-1", "SIM00001"));
    sleep(POLL + GRACE * 2).await;

    // Assert
    assert_eq!(handle.list_device_ids().await.unwrap(), vec!["desk".to_string()]);
    assert!(handle.schedules().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_removed_device_loses_its_schedule() {
    let transport = SimulatedHidTransport::with_devices(1);
    let handle = start_watching(&transport, &["desk:SIM00001"]);
    sleep(POLL / 2).await;
    handle
        .request_state(StateRequest::new("desk", "error"))
        .unwrap();

    transport.detach("sim-1");
    sleep(POLL + GRACE * 2).await;

    assert!(handle.list_device_ids().await.unwrap().is_empty());
    assert!(handle.schedules().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_request_during_grace_does_not_follow_device_back() {
    // Arrange: unplug, and ask for a state while the device is departing.
    let transport = SimulatedHidTransport::with_devices(1);
    let handle = start_watching(&transport, &["desk:SIM00001"]);
    sleep(POLL / 2).await;
    transport.detach("sim-1");
    sleep(POLL).await;
    handle
        .request_state(
            StateRequest::new("desk", "ok")
                .with_pattern("blink")
                .with_audio("quiet")
                .with_duration_ms(200_000),
        )
        .unwrap();
    sleep(GRACE * 2).await;
    let ids_after_grace = handle.list_device_ids().await.unwrap();
    let schedules_after_grace = handle.schedules().await.unwrap();

    // Act: plug the same serial back in and leave it alone.
    transport.attach(SimulatedHidTransport::descriptor("sim-1", "SIM00001"));
    sleep(POLL * 2).await;
    transport.clear_frames("sim-1");
    sleep(Duration::from_secs(100)).await;

    // Assert
    assert!(ids_after_grace.is_empty());
    assert!(schedules_after_grace.is_empty());
    assert_eq!(handle.list_device_ids().await.unwrap(), vec!["desk".to_string()]);
    let frames = transport.frames("sim-1");
    assert!(frames.iter().all(|f| f[1] == 0x8F), "re-plugged device got a program");
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_reconnects_on_next_keepalive() {
    // Arrange
    let transport = SimulatedHidTransport::with_devices(1);
    let handle = start(&transport, &["desk:SIM00001"]);
    handle.list_device_ids().await.unwrap();
    assert_eq!(transport.open_count("sim-1"), 1);

    // Act: a write fails, then the device recovers.
    transport.set_fail_write("sim-1", true);
    handle
        .request_state(StateRequest::new("desk", "ok"))
        .unwrap();
    let disconnected = handle.describe("desk").await.unwrap().unwrap().connected;
    transport.set_fail_write("sim-1", false);
    sleep(Duration::from_millis(5100)).await;

    // Assert
    assert!(!disconnected);
    assert_eq!(transport.open_count("sim-1"), 2);
    assert!(handle.describe("desk").await.unwrap().unwrap().connected);
}

#[tokio::test(start_paused = true)]
async fn test_device_plugged_in_later_is_discovered() {
    let transport = SimulatedHidTransport::new();
    let handle = start_watching(&transport, &["desk:SIM00001"]);
    sleep(POLL / 2).await;
    assert!(handle.list_device_ids().await.unwrap().is_empty());

    transport.attach(SimulatedHidTransport::descriptor("sim-1", "SIM00001"));
    sleep(POLL).await;

    assert_eq!(handle.list_device_ids().await.unwrap(), vec!["desk".to_string()]);
}
