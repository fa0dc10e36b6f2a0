//! End-to-end tests against a fake panel on loopback.
//!
//! These tests verify:
//! - press and long-press classification over a real socket
//! - LED writes follow zone state without duplicates, and forced refreshes
//! - at most one session per panel across disconnects and reconfiguration
//! - malformed input and a missing transport do not break the session


use std::time::Duration;

use button_controller::{
    CloseReason, ConnectionManager, ControllerEvent, LedColors, PressKind, SessionPhase,
};
use panel_protocol::KeyId;
use test_helpers::*;
use zone_transport::{
    ControlCommand, PlaybackState, TransportCall, TransportLink, ZoneRef,
};

fn kitchen() -> ZoneRef {
    ZoneRef::new("kitchen")
}

// ============================================================================
// Button classification
// ============================================================================

#[tokio::test]
async fn test_short_press_dispatches_press_action() {
    let panel = FakePanel::bind().await;
    let transport = kitchen_transport(PlaybackState::Stopped);
    let link = TransportLink::paired(transport.clone());
    let manager = ConnectionManager::start(test_config(panel.port()), kitchen_settings(), link).unwrap();
    let mut events = manager.subscribe();

    let mut conn = panel.accept().await;
    assert_eq!(conn.next_led().await, "#FFFFFF");
    conn.send_identity().await;

    conn.key("Key1", true).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    conn.key("Key1", false).await;

    let buttons = button_events(&mut events, Duration::from_millis(900)).await;
    assert_eq!(buttons.len(), 1, "got {buttons:?}");
    assert_eq!(buttons[0].key, KeyId::new(1));
    assert_eq!(buttons[0].kind, PressKind::Press);

    // Key 1 press toggles play on the bound zone
    assert_eq!(
        transport.calls(),
        vec![TransportCall::Control {
            zone: kitchen(),
            command: ControlCommand::PlayPause,
        }]
    );

    manager.shutdown().await;
}

#[tokio::test]
async fn test_held_key_dispatches_long_press_only() {
    let panel = FakePanel::bind().await;
    let transport = kitchen_transport(PlaybackState::Playing);
    let link = TransportLink::paired(transport.clone());
    let manager = ConnectionManager::start(test_config(panel.port()), kitchen_settings(), link).unwrap();
    let mut events = manager.subscribe();

    let mut conn = panel.accept().await;
    assert_eq!(conn.next_led().await, "#00FF00");
    conn.send_identity().await;

    let started = tokio::time::Instant::now();
    conn.key("Key1", true).await;

    let long_press = wait_for(&mut events, |e| matches!(e, ControllerEvent::Button { .. })).await;
    let elapsed = started.elapsed();
    match long_press {
        ControllerEvent::Button { event, .. } => assert_eq!(event.kind, PressKind::LongPress),
        other => panic!("unexpected {other:?}"),
    }
    assert!(elapsed >= Duration::from_millis(450), "fired after {elapsed:?}");

    tokio::time::sleep(Duration::from_millis(600).saturating_sub(started.elapsed())).await;
    conn.key("Key1", false).await;

    // The release after a long press is swallowed
    let rest = button_events(&mut events, Duration::from_millis(400)).await;
    assert!(rest.is_empty(), "got {rest:?}");

    // Key 1 long press stops the zone, which turns the LED back to stopped
    assert_eq!(
        transport.calls(),
        vec![TransportCall::Control {
            zone: kitchen(),
            command: ControlCommand::Stop,
        }]
    );
    assert_eq!(conn.next_led().await, "#FFFFFF");

    manager.shutdown().await;
}

#[tokio::test]
async fn test_repeated_down_does_not_restart_press() {
    let panel = FakePanel::bind().await;
    let link = TransportLink::paired(kitchen_transport(PlaybackState::Stopped));
    let manager = ConnectionManager::start(test_config(panel.port()), kitchen_settings(), link).unwrap();
    let mut events = manager.subscribe();

    let mut conn = panel.accept().await;
    conn.send_identity().await;

    conn.send_line(
        r#"{"events":[{"label":"Key2","state":"1"},{"label":"Key2","state":"1"}]}"#,
    )
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    conn.key("Key2", true).await;

    let buttons = button_events(&mut events, Duration::from_millis(500)).await;
    assert_eq!(buttons.len(), 1, "got {buttons:?}");
    assert_eq!(buttons[0].kind, PressKind::LongPress);
    assert_eq!(buttons[0].key, KeyId::new(2));

    manager.shutdown().await;
}

// ============================================================================
// LED synchronisation
// ============================================================================

#[tokio::test]
async fn test_led_follows_zone_state_once_per_change() {
    let panel = FakePanel::bind().await;
    let transport = kitchen_transport(PlaybackState::Stopped);
    let link = TransportLink::paired(transport.clone());
    let manager = ConnectionManager::start(test_config(panel.port()), kitchen_settings(), link).unwrap();

    let mut conn = panel.accept().await;
    assert_eq!(conn.next_led().await, "#FFFFFF");
    conn.send_identity().await;

    let mut writes = Vec::new();
    for (state, expected) in [
        (PlaybackState::Loading, "#00FFFF"),
        (PlaybackState::Playing, "#00FF00"),
        (PlaybackState::Stopped, "#FFFFFF"),
    ] {
        assert!(transport.set_state(&kitchen(), state));
        let color = conn.next_led().await;
        assert_eq!(color, expected);
        writes.push(color);
    }
    assert_eq!(writes.len(), 3);

    // Unchanged state: no writes, however often we ask
    manager.refresh_led(PANEL_IP, false).unwrap();
    manager.refresh_led(PANEL_IP, false).unwrap();
    assert!(transport.set_state(&kitchen(), PlaybackState::Paused));
    conn.expect_no_led(Duration::from_millis(300)).await;

    // Forced: written even though nothing changed
    manager.refresh_led(PANEL_IP, true).unwrap();
    assert_eq!(conn.next_led().await, "#FFFFFF");

    manager.shutdown().await;
}

#[tokio::test]
async fn test_colour_change_forces_preview_write() {
    let panel = FakePanel::bind().await;
    let link = TransportLink::paired(kitchen_transport(PlaybackState::Stopped));
    let manager = ConnectionManager::start(test_config(panel.port()), kitchen_settings(), link).unwrap();

    let mut conn = panel.accept().await;
    assert_eq!(conn.next_led().await, "#FFFFFF");

    let leds = LedColors::new(
        Some(color("#00FF00")),
        Some(color("#00FFFF")),
        Some(color("#123456")),
    );
    manager.apply_settings(settings_with_leds(leds)).unwrap();
    assert_eq!(conn.next_led().await, "#123456");

    // Same colours again is not a preview
    manager.apply_settings(manager.settings().as_ref().clone()).unwrap();
    conn.expect_no_led(Duration::from_millis(300)).await;

    manager.shutdown().await;
}

#[tokio::test]
async fn test_unconfigured_colour_is_not_written() {
    let panel = FakePanel::bind().await;
    let transport = kitchen_transport(PlaybackState::Stopped);
    let link = TransportLink::paired(transport.clone());
    let leds = LedColors::new(Some(color("#00FF00")), None, None);
    let manager =
        ConnectionManager::start(test_config(panel.port()), settings_with_leds(leds), link).unwrap();

    let mut conn = panel.accept().await;
    conn.expect_no_led(Duration::from_millis(300)).await;

    transport.set_state(&kitchen(), PlaybackState::Loading);
    conn.expect_no_led(Duration::from_millis(300)).await;

    transport.set_state(&kitchen(), PlaybackState::Playing);
    assert_eq!(conn.next_led().await, "#00FF00");

    manager.shutdown().await;
}

#[tokio::test]
async fn test_unpaired_transport_falls_back_and_skips_actions() {
    let panel = FakePanel::bind().await;
    let transport = kitchen_transport(PlaybackState::Playing);
    let link = TransportLink::new();
    let manager =
        ConnectionManager::start(test_config(panel.port()), kitchen_settings(), link.clone()).unwrap();
    let mut events = manager.subscribe();

    let mut conn = panel.accept().await;
    assert_eq!(conn.next_led().await, "#FFFFFF");
    conn.send_identity().await;

    conn.key("Key1", true).await;
    conn.key("Key1", false).await;
    let buttons = button_events(&mut events, Duration::from_millis(300)).await;
    assert_eq!(buttons.len(), 1);
    assert!(transport.calls().is_empty());

    // Pairing resyncs the LED to the zone's real state
    link.pair(transport.clone());
    assert_eq!(conn.next_led().await, "#00FF00");

    link.unpair();
    assert_eq!(conn.next_led().await, "#FFFFFF");

    manager.shutdown().await;
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn test_malformed_lines_keep_connection() {
    let panel = FakePanel::bind().await;
    let link = TransportLink::paired(kitchen_transport(PlaybackState::Stopped));
    let manager = ConnectionManager::start(test_config(panel.port()), kitchen_settings(), link).unwrap();
    let mut events = manager.subscribe();

    let mut conn = panel.accept().await;
    conn.send_line("# booting").await;
    conn.send_line("{not json").await;
    conn.send_identity().await;
    conn.send_line("led=#FFFFFF").await;
    conn.send_line(r#"{"events":"garbage"}"#).await;
    conn.send_line("[1,2,3]").await;

    let feedback = wait_for(&mut events, |e| matches!(e, ControllerEvent::LedFeedback { .. })).await;
    match feedback {
        ControllerEvent::LedFeedback { value, .. } => assert_eq!(value, "#FFFFFF"),
        other => panic!("unexpected {other:?}"),
    }

    conn.key("Key3", true).await;
    conn.key("Key3", false).await;
    let buttons = button_events(&mut events, Duration::from_millis(300)).await;
    assert_eq!(buttons.len(), 1);
    assert_eq!(buttons[0].key, KeyId::new(3));

    let sessions = manager.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].phase, SessionPhase::Ready);
    assert_eq!(sessions[0].identity.as_ref().unwrap().device_id, "A1");
    assert_eq!(manager.status().connected, 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_bad_event_entry_keeps_rest_of_batch() {
    let panel = FakePanel::bind().await;
    let link = TransportLink::paired(kitchen_transport(PlaybackState::Stopped));
    let manager = ConnectionManager::start(test_config(panel.port()), kitchen_settings(), link).unwrap();
    let mut events = manager.subscribe();

    let mut conn = panel.accept().await;
    conn.send_identity().await;
    conn.send_line(
        r#"{"events":[{"label":"Key3","state":"1"},{"state":"0"},{"label":"Key3","state":"0"}]}"#,
    )
    .await;

    let buttons = button_events(&mut events, Duration::from_millis(300)).await;
    assert_eq!(buttons.len(), 1, "got {buttons:?}");
    assert_eq!(buttons[0].key, KeyId::new(3));
    assert_eq!(buttons[0].kind, PressKind::Press);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_long_press_timer_dies_with_its_session() {
    let panel = FakePanel::bind().await;
    let transport = kitchen_transport(PlaybackState::Stopped);
    let link = TransportLink::paired(transport.clone());
    let manager = ConnectionManager::start(test_config(panel.port()), kitchen_settings(), link).unwrap();
    let mut events = manager.subscribe();

    let mut conn = panel.accept().await;
    conn.send_identity().await;
    wait_for(&mut events, |e| matches!(e, ControllerEvent::IdentityReceived { .. })).await;

    // Key held, then the panel drops well inside the 500ms timeout
    conn.key("Key1", true).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    conn.close().await;

    let deadline = tokio::time::Instant::now() + Duration::from_millis(900);
    let mut closed = false;
    let mut buttons = Vec::new();
    while let Ok(received) = tokio::time::timeout_at(deadline, events.recv()).await {
        match received {
            Ok(ControllerEvent::SessionClosed { reason, .. }) => {
                assert_eq!(reason, CloseReason::EndOfStream);
                closed = true;
            }
            Ok(ControllerEvent::Button { event, .. }) => buttons.push(event),
            Ok(_) => {}
            Err(e) => panic!("event stream failed: {e}"),
        }
    }

    assert!(closed, "session was not torn down");
    assert!(buttons.is_empty(), "got {buttons:?}");
    assert!(transport.calls().is_empty(), "got {:?}", transport.calls());

    manager.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_without_duplicate_sessions() {
    let panel = FakePanel::bind().await;
    let link = TransportLink::paired(kitchen_transport(PlaybackState::Stopped));
    let manager = ConnectionManager::start(test_config(panel.port()), kitchen_settings(), link).unwrap();
    let mut events = manager.subscribe();

    for _ in 0..3 {
        let mut conn = panel.accept().await;
        conn.send_identity().await;
        wait_for(&mut events, |e| matches!(e, ControllerEvent::IdentityReceived { .. })).await;
        assert_eq!(manager.session_count(), 1);

        conn.close().await;
        let closed = wait_for(&mut events, |e| matches!(e, ControllerEvent::SessionClosed { .. })).await;
        match closed {
            ControllerEvent::SessionClosed { reason, .. } => {
                assert_eq!(reason, CloseReason::EndOfStream)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // Every open was preceded by the previous close
    manager.shutdown().await;
    assert_eq!(manager.session_count(), 0);
}

#[tokio::test]
async fn test_removed_device_is_closed_and_not_reopened() {
    let panel = FakePanel::bind().await;
    let link = TransportLink::paired(kitchen_transport(PlaybackState::Stopped));
    let manager = ConnectionManager::start(test_config(panel.port()), kitchen_settings(), link).unwrap();
    let mut events = manager.subscribe();

    let mut conn = panel.accept().await;
    conn.send_identity().await;
    wait_for(&mut events, |e| matches!(e, ControllerEvent::IdentityReceived { .. })).await;

    let mut settings = kitchen_settings();
    settings.devices[0].ip = String::new();
    manager.apply_settings(settings).unwrap();

    let closed = wait_for(&mut events, |e| matches!(e, ControllerEvent::SessionClosed { .. })).await;
    match closed {
        ControllerEvent::SessionClosed { reason, .. } => assert_eq!(reason, CloseReason::Closed),
        other => panic!("unexpected {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!manager.has_session(PANEL_IP));
    assert!(!manager.status().is_configured());

    manager.shutdown().await;
}

#[tokio::test]
async fn test_moved_device_reopens_at_new_slot() {
    let panel = FakePanel::bind().await;
    let link = TransportLink::paired(kitchen_transport(PlaybackState::Stopped));
    let manager = ConnectionManager::start(test_config(panel.port()), kitchen_settings(), link).unwrap();
    let mut events = manager.subscribe();

    let _first = panel.accept().await;

    let mut settings = kitchen_settings();
    settings.devices[0].index = 2;
    manager.apply_settings(settings).unwrap();

    let _second = panel.accept().await;
    let opened = wait_for(&mut events, |e| {
        matches!(e, ControllerEvent::SessionOpened { device_index: 2, .. })
    })
    .await;
    assert!(matches!(opened, ControllerEvent::SessionOpened { .. }));

    let sessions = manager.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].device_index, 2);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_keepalive_probe() {
    let panel = FakePanel::bind().await;
    let config = test_config(panel.port()).with_keepalive_interval(Duration::from_millis(100));
    let manager = ConnectionManager::start(config, kitchen_settings(), TransportLink::new()).unwrap();

    let mut conn = panel.accept().await;
    conn.next_probe().await;
    conn.next_probe().await;

    manager.shutdown().await;
}
