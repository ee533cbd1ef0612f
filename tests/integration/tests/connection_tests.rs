//! Connection manager lifecycle tests
//!
//! Every test runs on paused time, so backoff and health-check periods elapse
//! instantly while keeping their relative order.

use std::time::Duration;

use integration_tests::*;
use sync_client::protocol::{MessageSeverity, ServerMessagePayload};
use sync_client::{
    methods, ConnectionManager, HubError, PushEvent, TransportError, TransportHandle, TransportSignal,
};
use sync_core::{
    ClientVersion, ConnectionState, Notification, Permission, PermissionChange, ProtocolVersion,
    SessionDescriptor, Severity, TokenError, UserId,
};
use tokio::time::Instant;

use ConnectionState::{
    Connected, Connecting, Disconnected, Disconnecting, NoCredential, Offline, Reconnecting,
    Unauthorized, VersionMismatch,
};

// ============================================================================
// Connect outcomes
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_reaches_connected_and_binds_once() {
    let h = Harness::new();

    h.manager.connect();
    h.wait_for(Connected).await;
    h.settle().await;

    assert_eq!(h.manager.session(), Some(compatible_descriptor()));
    assert_eq!(h.script.builds(), 1);
    assert_eq!(h.script.live(), 1);

    let handle = h.script.latest();
    assert_eq!(handle.token(), "token-1");
    for event in PushEvent::ALL {
        assert_eq!(handle.registrations(event), 1, "{event} bound once");
    }

    assert_eq!(h.sink.states(), vec![Connecting, Connected]);
    assert_eq!(h.sink.connects(), 1);
    assert!(h.manager.last_failure().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_missing_descriptor_ends_disconnected_without_retry() {
    let h = Harness::new();
    h.script.set_descriptor(None);

    h.manager.connect();
    h.wait_for(Disconnected).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(h.manager.state(), Disconnected);
    assert_eq!(h.script.builds(), 1);
    assert_eq!(h.script.starts(), 1);
    assert_eq!(h.script.live(), 0);
    assert!(h.manager.session().is_none());
    assert!(h.manager.last_failure().is_some());
    assert!(!h.sink.states().contains(&Connected));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_credential_ends_unauthorized() {
    let h = Harness::with_tokens(FakeTokens::failing(TokenError::Rejected(
        "secret expired".to_string(),
    )));

    h.manager.connect();
    h.wait_for(Unauthorized).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(h.manager.last_failure().as_deref(), Some("secret expired"));
    assert_eq!(h.tokens.get_calls(), 1);
    assert_eq!(h.script.builds(), 0);
    assert_eq!(h.sink.messages(Severity::Error), vec!["secret expired"]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_credential_ends_no_credential() {
    let h = Harness::with_tokens(FakeTokens::failing(TokenError::Missing));

    h.manager.connect();
    h.wait_for(NoCredential).await;

    assert_eq!(h.script.builds(), 0);
    assert_eq!(h.sink.messages(Severity::Warning).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_handshake_ends_unauthorized() {
    let h = Harness::new();
    h.script.fail_next_start(TransportError::Unauthorized);

    h.manager.connect();
    h.wait_for(Unauthorized).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(h.script.starts(), 1);
    assert!(h.manager.last_failure().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_paused_connect_makes_no_calls() {
    let h = Harness::new();
    h.manager.set_paused(true);
    let started = Instant::now();

    h.manager.connect();
    h.wait_for(Disconnected).await;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(h.tokens.get_calls(), 0);
    assert_eq!(h.script.builds(), 0);
    assert_eq!(h.sink.states(), vec![Disconnected]);

    h.manager.set_paused(false);
    h.manager.connect();
    h.wait_for(Connected).await;
}

#[tokio::test(start_paused = true)]
async fn test_outdated_client_stops_calling_the_hub() {
    let h = Harness::new();
    h.script.set_descriptor(Some(outdated_client_descriptor()));

    h.manager.connect();
    h.wait_for(VersionMismatch).await;
    tokio::time::sleep(Duration::from_secs(120)).await;

    let handle = h.script.latest();
    assert_eq!(handle.calls(), vec![methods::GET_SESSION_DESCRIPTOR]);
    assert!(handle.is_disposed());
    assert_eq!(h.script.builds(), 1);
    assert_eq!(h.script.total_calls(), 1);
    assert_eq!(h.tokens.refresh_calls(), 0);

    assert!(!h.sink.states().contains(&Connected));
    assert!(h.manager.session().is_none());
    assert_eq!(h.sink.messages(Severity::Error).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_newer_client_release_is_announced() {
    let h = Harness::new();
    let mut descriptor = compatible_descriptor();
    descriptor.target_client = ClientVersion::new(2, 0, 0);
    h.script.set_descriptor(Some(descriptor));

    h.manager.connect();
    h.wait_for(Connected).await;

    let info = h.sink.messages(Severity::Info);
    assert_eq!(info.len(), 1);
    assert!(info[0].contains("2.0.0"));
}

#[tokio::test(start_paused = true)]
async fn test_client_ahead_of_hub_connects_with_warning() {
    let h = Harness::new();
    let mut descriptor = compatible_descriptor();
    descriptor.server_protocol = ProtocolVersion::new(1);
    h.script.set_descriptor(Some(descriptor));

    h.manager.connect();
    h.wait_for(Connected).await;

    assert_eq!(h.sink.messages(Severity::Warning).len(), 1);
}

// ============================================================================
// Retry loop
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_retries_back_off_and_stop_on_disconnect() {
    let h = Harness::new();
    h.script.fail_every_start(true);

    h.manager.connect();
    for _ in 0..200 {
        if h.script.starts() >= 5 {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert!(h.script.starts() >= 5);
    assert_eq!(h.manager.state(), Reconnecting);

    for gap in h.script.start_times().windows(2).map(|w| w[1] - w[0]) {
        assert!(gap >= Duration::from_secs(5), "gap {gap:?} below minimum");
        // 1ms of timer granularity
        assert!(gap <= Duration::from_millis(20_000), "gap {gap:?} above maximum");
    }

    h.manager.disconnect_and_wait().await;
    let attempts = h.script.starts();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(h.script.starts(), attempts);
    assert_eq!(h.manager.state(), Disconnected);
    assert_eq!(h.script.live(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_recover() {
    let h = Harness::new();
    h.script.fail_next_start(TransportError::ConnectionLost);
    h.script.fail_next_start(TransportError::Connect("refused".to_string()));

    h.manager.connect();
    h.wait_for(Connected).await;

    assert_eq!(h.script.starts(), 3);
    assert_eq!(h.script.max_live(), 1);
    let states = h.sink.states();
    assert!(states.contains(&Reconnecting));
    assert_eq!(states.last(), Some(&Connected));
}

#[tokio::test(start_paused = true)]
async fn test_transient_token_error_is_retried() {
    let h = Harness::with_tokens(FakeTokens::failing(TokenError::Transient(
        "auth service busy".to_string(),
    )));

    h.manager.connect();
    h.wait_for(Reconnecting).await;
    h.tokens.rotate("token-1");
    h.wait_for(Connected).await;

    assert!(h.tokens.get_calls() >= 2);
    assert_eq!(h.script.builds(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waits_for_local_readiness() {
    let script = HubScript::new();
    let readiness = Readiness::new(false);
    let manager = ConnectionManager::builder(test_config(), FakeTokens::valid("token-1"))
        .connector(ScriptedConnector::new(&script))
        .readiness_probe(readiness.clone())
        .client_version(TEST_CLIENT_VERSION)
        .build();

    manager.connect();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(manager.state(), Connecting);
    assert_eq!(script.builds(), 0);
    assert!(readiness.polls() >= 10);

    readiness.set_ready(true);
    wait_for_state(manager.subscribe_state(), Connected, Duration::from_secs(5)).await;
}

// ============================================================================
// Disconnect
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_disconnect_when_idle_is_a_no_op() {
    let h = Harness::new();

    h.manager.disconnect_and_wait().await;
    assert_eq!(h.manager.state(), Offline);
    assert!(h.sink.all().is_empty());

    h.manager.connect();
    h.wait_for(Connected).await;
    h.manager.disconnect_and_wait().await;
    assert_eq!(h.manager.state(), Disconnected);

    h.sink.clear();
    h.manager.disconnect_and_wait().await;
    assert_eq!(h.manager.state(), Disconnected);
    assert!(h.sink.all().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_tears_down_every_loop() {
    let h = Harness::new();

    h.manager.connect();
    h.wait_for(Connected).await;
    h.settle().await;
    h.sink.clear();

    h.manager.disconnect_and_wait().await;

    assert_eq!(h.sink.states(), vec![Disconnecting, Disconnected]);
    assert_eq!(h.sink.disconnects(), 1);
    assert_eq!(h.script.live(), 0);
    assert!(h.manager.session().is_none());

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.tokens.refresh_calls(), 0);
    assert_eq!(h.script.builds(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_disconnect_storm_keeps_one_handle() {
    let h = Harness::new();
    h.script.set_start_delay(Duration::from_secs(1));

    for i in 0..12_u64 {
        h.manager.connect();
        tokio::time::sleep(Duration::from_millis(400 * (i % 4))).await;
        if i % 3 == 0 {
            h.manager.disconnect();
        }
        assert!(h.script.live() <= 1);
    }

    h.manager.connect();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.manager.state(), Connected);
    assert_eq!(h.script.live(), 1);
    assert_eq!(h.script.max_live(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_the_manager() {
    let h = Harness::new();

    h.manager.connect();
    h.wait_for(Connected).await;
    h.manager.shutdown().await;

    assert_eq!(h.manager.state(), Disconnected);
    assert_eq!(h.script.live(), 0);

    h.manager.connect();
    h.settle().await;
    assert_eq!(h.script.builds(), 1);
}

// ============================================================================
// Transport signals
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_transport_close_goes_offline_once() {
    let h = Harness::new();

    h.manager.connect();
    h.wait_for(Connected).await;
    h.settle().await;
    h.sink.clear();

    h.script.latest().close("socket reset");
    h.wait_for(Offline).await;
    h.settle().await;

    assert_eq!(h.sink.states(), vec![Offline]);
    assert_eq!(h.sink.disconnects(), 1);
    assert!(h.manager.session().is_none());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.script.builds(), 1);
    assert_eq!(h.sink.disconnects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_recovery_refreshes_session_on_same_handle() {
    let observer = CountingObserver::new(false);
    let script = HubScript::new();
    let sink = RecordingSink::new();
    let manager = ConnectionManager::builder(test_config(), FakeTokens::valid("token-1"))
        .connector(ScriptedConnector::new(&script))
        .notification_sink(sink.clone())
        .observer(observer.clone())
        .client_version(TEST_CLIENT_VERSION)
        .build();

    manager.connect();
    wait_for_state(manager.subscribe_state(), Connected, Duration::from_secs(5)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    sink.clear();

    let handle = script.latest();
    handle.signal(TransportSignal::Reconnecting {
        error: Some("connection reset".to_string()),
    });
    wait_for_state(manager.subscribe_state(), Reconnecting, Duration::from_secs(5)).await;

    handle.signal(TransportSignal::Reconnected);
    wait_for_state(manager.subscribe_state(), Connected, Duration::from_secs(5)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(sink.states(), vec![Reconnecting, Connected]);
    assert_eq!(sink.connects(), 1);
    assert_eq!(script.builds(), 1);
    assert_eq!(observer.loads(), 2);

    let fetches = handle
        .calls()
        .iter()
        .filter(|c| *c == methods::GET_SESSION_DESCRIPTOR)
        .count();
    assert_eq!(fetches, 2);
    for event in PushEvent::ALL {
        assert_eq!(handle.registrations(event), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_observer_does_not_block_session() {
    let observer = CountingObserver::new(true);
    let script = HubScript::new();
    let manager = ConnectionManager::builder(test_config(), FakeTokens::valid("token-1"))
        .connector(ScriptedConnector::new(&script))
        .observer(observer.clone())
        .client_version(TEST_CLIENT_VERSION)
        .build();

    manager.connect();
    wait_for_state(manager.subscribe_state(), Connected, Duration::from_secs(5)).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(manager.state(), Connected);
    assert_eq!(observer.loads(), 1);
    assert_eq!(script.builds(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_during_observer_load_refreshes_session() {
    let observer = SlowObserver::new(Duration::from_secs(5));
    let h = Harness::with_observer(observer.clone());

    h.manager.connect();
    h.wait_for(Connected).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(observer.loads(), 0);
    h.sink.clear();

    let handle = h.script.latest();
    handle.signal(TransportSignal::Reconnecting {
        error: Some("connection reset".to_string()),
    });
    h.wait_for(Reconnecting).await;

    let rotated = SessionDescriptor {
        user_id: UserId::new("user-2"),
        ..compatible_descriptor()
    };
    h.script.set_descriptor(Some(rotated.clone()));
    handle.signal(TransportSignal::Reconnected);
    h.wait_for(Connected).await;
    h.settle().await;

    assert_eq!(h.sink.states(), vec![Reconnecting, Connected]);
    assert_eq!(h.manager.session(), Some(rotated));
    assert_eq!(h.script.builds(), 1);
    let fetches = handle
        .calls()
        .iter()
        .filter(|c| *c == methods::GET_SESSION_DESCRIPTOR)
        .count();
    assert_eq!(fetches, 2);

    // The first load was cut short by the recovery
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(observer.started(), 2);
    assert_eq!(observer.loads(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_observer_does_not_hold_back_health_checks() {
    let observer = SlowObserver::stuck();
    let h = Harness::with_observer(observer.clone());

    h.manager.connect();
    h.wait_for(Connected).await;
    h.settle().await;

    h.tokens.rotate("token-2");
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(h.tokens.refresh_calls(), 1);
    assert_eq!(h.script.builds(), 2);
    assert_eq!(h.script.latest().token(), "token-2");
    assert_eq!(h.manager.state(), Connected);
    assert_eq!(observer.started(), 2);
    assert_eq!(observer.loads(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_signals_during_connect_attempt_are_replayed() {
    let h = Harness::new();
    h.script.set_start_delay(Duration::from_secs(1));

    h.manager.connect();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.manager.state(), Connecting);

    let handle = h.script.latest();
    handle.signal(TransportSignal::Reconnecting {
        error: Some("connection reset".to_string()),
    });
    handle.signal(TransportSignal::Reconnected);

    h.wait_for(Connected).await;
    h.settle().await;

    let fetches = handle
        .calls()
        .iter()
        .filter(|c| *c == methods::GET_SESSION_DESCRIPTOR)
        .count();
    assert_eq!(fetches, 2);
    assert_eq!(h.sink.states(), vec![Connecting, Connected]);
    assert_eq!(h.manager.state(), Connected);
    assert_eq!(h.script.builds(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_attempt_never_reports_connected() {
    let h = Harness::new();
    h.script.set_start_delay(Duration::from_secs(1));

    h.manager.connect();
    tokio::time::sleep(Duration::from_millis(500)).await;
    h.manager.disconnect_and_wait().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(h.sink.states(), vec![Connecting, Disconnecting, Disconnected]);
    assert!(h.manager.session().is_none());
    assert_eq!(h.script.live(), 0);
}

// ============================================================================
// Health loop
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_rotated_credential_restarts_the_cycle() {
    let h = Harness::new();

    h.manager.connect();
    h.wait_for(Connected).await;
    h.settle().await;
    h.sink.clear();

    h.tokens.rotate("token-2");
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(h.sink.states(), vec![Connecting, Connected]);
    assert_eq!(h.script.builds(), 2);
    assert!(h.script.handle(0).is_disposed());
    assert_eq!(h.script.latest().token(), "token-2");
    assert_eq!(h.script.live(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_handle_lost_without_signal_goes_offline() {
    let h = Harness::new();

    h.manager.connect();
    h.wait_for(Connected).await;
    h.settle().await;
    h.sink.clear();

    h.script.latest().vanish();
    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(h.manager.state(), Offline);
    assert_eq!(h.sink.states(), vec![Offline]);
    assert_eq!(h.sink.disconnects(), 1);
    assert!(h.manager.session().is_none());
    assert_eq!(h.tokens.refresh_calls(), 0);
    assert_eq!(h.script.builds(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_health_check_runs_while_connected() {
    let h = Harness::new();

    h.manager.connect();
    h.wait_for(Connected).await;
    tokio::time::sleep(Duration::from_secs(95)).await;

    let checks = h
        .script
        .latest()
        .calls()
        .iter()
        .filter(|c| *c == methods::CHECK_CLIENT_HEALTH)
        .count();
    assert_eq!(checks, 3);
    assert_eq!(h.tokens.refresh_calls(), 3);
    assert_eq!(h.script.builds(), 1);
    assert!(h.manager.check_health().await.unwrap());
}

// ============================================================================
// Push events
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_hard_reconnect_starts_a_new_cycle() {
    let h = Harness::new();

    h.manager.connect();
    h.wait_for(Connected).await;
    h.settle().await;

    let first = h.script.latest();
    first.push(PushEvent::HardReconnect, Vec::new());
    h.settle().await;

    assert!(first.is_disposed());
    assert_eq!(h.script.builds(), 2);
    assert_eq!(h.manager.state(), Connected);
    assert_eq!(h.script.live(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_push_events_update_session_and_notify() {
    let h = Harness::new();
    let mut events = h.manager.push_events();

    h.manager.connect();
    h.wait_for(Connected).await;

    let handle = h.script.latest();
    let codec = h.script.codec;

    let change = PermissionChange::Set {
        permission: Permission::Toybox,
        enabled: true,
    };
    handle.push(
        PushEvent::SelfPermissionsChanged,
        codec.encode_payload(&change).unwrap(),
    );
    let session = h.manager.session().unwrap();
    assert!(session.permissions.allows(Permission::Toybox));

    let message = ServerMessagePayload::new(MessageSeverity::Warning, "Maintenance at noon");
    handle.push(
        PushEvent::ServerMessage,
        codec.encode_payload(&message).unwrap(),
    );
    assert_eq!(
        h.sink.messages(Severity::Warning),
        vec!["Maintenance at noon"]
    );

    let first = events.recv().await.unwrap();
    assert_eq!(first.event, PushEvent::SelfPermissionsChanged);
    let second = events.recv().await.unwrap();
    assert_eq!(second.event, PushEvent::ServerMessage);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_session_descriptor_publishes_refresh() {
    let h = Harness::new();

    h.manager.connect();
    h.wait_for(Connected).await;
    h.settle().await;
    h.sink.clear();

    let descriptor = h.manager.fetch_session_descriptor(true).await.unwrap();
    assert_eq!(descriptor, Some(compatible_descriptor()));
    assert!(matches!(
        h.sink.all().as_slice(),
        [Notification::SessionRefreshed(_)]
    ));
}

#[tokio::test(start_paused = true)]
async fn test_api_without_transport_fails_fast() {
    let h = Harness::new();

    let err = h.manager.api().get_session_descriptor().await.unwrap_err();
    assert!(matches!(err, HubError::NotConnected));
}
