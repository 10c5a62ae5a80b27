//! Integration tests for the messaging facade against the stub responder.

mod support;

use cresco_core::{CrescoClient, CrescoClientBuilder, Messaging, Outcome, Payload};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use support::{Mode, StubServer};

fn connected_client(server: &StubServer, rpc_timeout: Duration) -> CrescoClient {
    let client = CrescoClientBuilder::from_config(server.config())
        .rpc_timeout(rpc_timeout)
        .build()
        .unwrap();
    client.connect().unwrap();
    client
}

fn echo(value: Value) -> Payload {
    Payload::for_action("echo").with("value", value)
}

#[test]
fn test_echo_round_trip_preserves_values() {
    let server = StubServer::start();
    let client = connected_client(&server, Duration::from_secs(5));

    let values = [
        json!("hello"),
        json!(42),
        json!(-7),
        json!({"nested": {"list": [1, 2, 3], "flag": true}, "name": "inner"}),
    ];

    for value in values {
        let reply = client
            .messaging()
            .to_controller(true, "EXEC", echo(value.clone()), None)
            .unwrap();
        assert_eq!(reply.outcome(), Outcome::Replied);
        assert_eq!(reply.get("value"), Some(&value));
    }
}

#[test]
fn test_wire_envelope_carries_destination_fields() {
    let server = StubServer::start();
    let client = connected_client(&server, Duration::from_secs(5));
    let messaging = client.messaging();

    messaging
        .to_controller(true, "EXEC", Payload::for_action("listregions"), None)
        .unwrap();
    messaging
        .to_agent(true, "EXEC", Payload::for_action("listplugins"), "lab", "agent-1", None)
        .unwrap();
    messaging
        .to_plugin_by_name(true, "CONFIG", Payload::for_action("status"), "plugin/2", None)
        .unwrap();
    messaging
        .to_plugin_at(true, "EXEC", Payload::for_action("status"), "lab", "agent-1", "plugin/2", None)
        .unwrap();

    let received = server.received();
    assert_eq!(received.len(), 4);

    assert_eq!(
        received[0]["message_info"],
        json!({"message_type": "global_controller_msgevent", "message_event_type": "EXEC", "is_rpc": true})
    );
    assert_eq!(
        received[1]["message_info"],
        json!({
            "message_type": "global_agent_msgevent",
            "message_event_type": "EXEC",
            "dst_region": "lab",
            "dst_agent": "agent-1",
            "is_rpc": true
        })
    );
    assert_eq!(
        received[2]["message_info"],
        json!({
            "message_type": "plugin_msgevent",
            "message_event_type": "CONFIG",
            "dst_plugin": "plugin/2",
            "is_rpc": true
        })
    );
    assert_eq!(
        received[3]["message_info"],
        json!({
            "message_type": "global_plugin_msgevent",
            "message_event_type": "EXEC",
            "dst_region": "lab",
            "dst_agent": "agent-1",
            "dst_plugin": "plugin/2",
            "is_rpc": true
        })
    );
    assert_eq!(received[3]["message_payload"], json!({"action": "status"}));
}

#[test]
fn test_invalid_destination_is_rejected_before_io() {
    let server = StubServer::start();
    let client = connected_client(&server, Duration::from_secs(5));

    let err = client
        .messaging()
        .to_agent(true, "EXEC", Payload::new(), "lab", "", None)
        .unwrap_err();

    assert!(err.is_caller_error());
    assert_eq!(client.transport().frames_sent(), 0);
    assert!(!client.messaging().is_failed());
}

#[test]
fn test_fire_and_forget_is_dispatched() {
    let server = StubServer::start();
    let client = connected_client(&server, Duration::from_secs(5));

    let reply = client
        .messaging()
        .to_agent(false, "CONFIG", Payload::for_action("setconfig"), "lab", "agent-1", None)
        .unwrap();

    assert_eq!(reply.outcome(), Outcome::Dispatched);
    assert!(support::wait_until(Duration::from_secs(2), || server.rpc_frames() == 1));
    assert_eq!(server.received()[0]["message_info"]["is_rpc"], json!(false));
}

#[test]
fn test_timeout_returns_sentinel_and_trips_latch() {
    let server = StubServer::start_with(Mode::Silent);
    let timeout = Duration::from_millis(300);
    let client = connected_client(&server, timeout);

    let started = Instant::now();
    let reply = client
        .messaging()
        .to_controller(true, "EXEC", echo(json!("lost")), None)
        .unwrap();

    assert!(started.elapsed() < timeout + Duration::from_secs(1));
    assert_eq!(reply.outcome(), Outcome::TimedOut);
    assert_eq!(reply.body(), &json!({}));
    assert!(client.messaging().is_failed());
}

#[test]
fn test_queued_call_after_timeout_is_suppressed() {
    let server = StubServer::start();
    let client = connected_client(&server, Duration::from_secs(3));
    let messaging = client.messaging();

    let (first, second) = std::thread::scope(|scope| {
        let first = scope.spawn(|| {
            messaging
                .to_controller(
                    true,
                    "EXEC",
                    echo(json!("A")).with("delay_ms", 1500),
                    Some(Duration::from_millis(500)),
                )
                .unwrap()
        });
        std::thread::sleep(Duration::from_millis(50));
        let second = scope.spawn(|| {
            messaging
                .to_controller(true, "EXEC", echo(json!("B")), Some(Duration::from_secs(3)))
                .unwrap()
        });
        (first.join().unwrap(), second.join().unwrap())
    });

    assert_eq!(first.outcome(), Outcome::TimedOut);
    assert_eq!(second.outcome(), Outcome::Suppressed);
    assert!(second.is_empty());
    assert!(messaging.is_failed());
    assert_eq!(client.transport().frames_sent(), 1);

    // Give the delayed reply time to arrive; nobody may consume it
    std::thread::sleep(Duration::from_millis(1200));
    assert_eq!(server.rpc_frames(), 1);
}

#[test]
fn test_timeout_closes_socket_for_shared_transport() {
    let server = StubServer::start();
    let client = connected_client(&server, Duration::from_secs(3));
    let other = Messaging::with_timeout(client.transport().clone(), Duration::from_secs(3));

    let reply = client
        .messaging()
        .to_controller(
            true,
            "EXEC",
            echo(json!("A")).with("delay_ms", 1000),
            Some(Duration::from_millis(300)),
        )
        .unwrap();
    assert_eq!(reply.outcome(), Outcome::TimedOut);

    let reply = other
        .to_controller(true, "EXEC", echo(json!("B")), None)
        .unwrap();
    assert_eq!(reply.outcome(), Outcome::ConnectionFailed);
    assert_ne!(reply.get_str("value"), Some("A"));
    assert!(support::wait_until(Duration::from_secs(3), || !client.connected()));
}

#[test]
fn test_dispatch_after_server_loss_trips_latch() {
    let mut server = StubServer::start();
    let client = connected_client(&server, Duration::from_secs(5));

    server.shutdown();
    assert!(support::wait_until(Duration::from_secs(3), || !client.connected()));

    let reply = client
        .messaging()
        .to_agent(false, "CONFIG", Payload::for_action("setconfig"), "lab", "agent-1", None)
        .unwrap();

    assert_eq!(reply.outcome(), Outcome::ConnectionFailed);
    assert!(reply.is_empty());
    assert!(client.messaging().is_failed());
}

#[test]
fn test_latched_calls_perform_no_io() {
    let server = StubServer::start_with(Mode::Silent);
    let client = connected_client(&server, Duration::from_millis(200));
    let messaging = client.messaging();

    messaging
        .to_controller(true, "EXEC", echo(json!(1)), None)
        .unwrap();
    assert!(messaging.is_failed());

    let frames_before = client.transport().frames_sent();
    assert_eq!(frames_before, 1);

    for _ in 0..5 {
        let started = Instant::now();
        let reply = messaging
            .to_plugin_by_name(true, "EXEC", echo(json!(2)), "plugin/1", None)
            .unwrap();
        assert_eq!(reply.outcome(), Outcome::Suppressed);
        assert!(reply.is_empty());
        assert!(started.elapsed() < Duration::from_millis(100));

        let reply = messaging
            .to_controller(false, "CONFIG", echo(json!(3)), None)
            .unwrap();
        assert_eq!(reply.outcome(), Outcome::Suppressed);
    }

    assert_eq!(client.transport().frames_sent(), frames_before);
    assert_eq!(server.rpc_frames(), 1);
}

#[test]
fn test_reset_and_reconnect_restores_calls() {
    let server = StubServer::start_with(Mode::Silent);
    let client = connected_client(&server, Duration::from_millis(200));

    client
        .messaging()
        .to_controller(true, "EXEC", echo(json!("first")), None)
        .unwrap();
    assert!(client.messaging().is_failed());

    server.set_mode(Mode::Echo);
    client.messaging().reset();
    client.connect().unwrap();
    assert!(!client.messaging().is_failed());

    let frames_before = client.transport().frames_sent();
    let reply = client
        .messaging()
        .to_controller(true, "EXEC", echo(json!("second")), Some(Duration::from_secs(5)))
        .unwrap();

    assert_eq!(reply.outcome(), Outcome::Replied);
    assert_eq!(reply.get_str("value"), Some("second"));
    assert_eq!(client.transport().frames_sent(), frames_before + 1);
}

#[test]
fn test_malformed_reply_is_tagged_but_not_latched() {
    let server = StubServer::start_with(Mode::Garbage);
    let client = connected_client(&server, Duration::from_secs(5));

    let reply = client
        .messaging()
        .to_controller(true, "EXEC", echo(json!("x")), None)
        .unwrap();

    assert_eq!(reply.outcome(), Outcome::Malformed);
    assert!(reply.is_empty());
    assert!(!client.messaging().is_failed());
}

#[test]
fn test_server_loss_fails_fast_and_latches() {
    let mut server = StubServer::start();
    let client = connected_client(&server, Duration::from_secs(5));

    server.shutdown();
    assert!(support::wait_until(Duration::from_secs(3), || !client.connected()));

    let started = Instant::now();
    let reply = client
        .messaging()
        .to_controller(true, "EXEC", echo(json!("gone")), None)
        .unwrap();

    assert_eq!(reply.outcome(), Outcome::ConnectionFailed);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(client.messaging().is_failed());
}

#[test]
fn test_concurrent_calls_get_their_own_replies() {
    let server = StubServer::start();
    let client = connected_client(&server, Duration::from_secs(5));
    let messaging = client.messaging();

    std::thread::scope(|scope| {
        for (plugin, delay) in [("plugin/1", 30u64), ("plugin/2", 5u64)] {
            scope.spawn(move || {
                for i in 0..10 {
                    let tag = format!("{}-{}", plugin, i);
                    let payload = echo(json!(tag.as_str())).with("delay_ms", delay);
                    let reply = messaging
                        .to_plugin_by_name(true, "EXEC", payload, plugin, None)
                        .unwrap();
                    assert_eq!(reply.outcome(), Outcome::Replied);
                    assert_eq!(reply.get_str("value"), Some(tag.as_str()));
                }
            });
        }
    });

    assert_eq!(server.rpc_frames(), 20);
    assert!(!messaging.is_failed());
}
