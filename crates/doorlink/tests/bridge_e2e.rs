// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end tests: a real bridge against a fake hub on localhost UDP.

use doorlink::protocol::decode_command;
use doorlink::{
    BridgeConfig, BridgeError, CommandCall, ErrorCode, HubBridge, OutboundCommand, Requester,
    ServerMessage, SessionId,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(3);
const QUIET: Duration = Duration::from_millis(200);

struct FakeHub {
    socket: UdpSocket,
}

impl FakeHub {
    async fn bind() -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    fn port(&self) -> u16 {
        self.socket.local_addr().unwrap().port()
    }

    /// Next datagram as text, with its sender.
    async fn recv_line(&self) -> (String, SocketAddr) {
        let mut buf = [0u8; 2048];
        let (len, from) = timeout(WAIT, self.socket.recv_from(&mut buf))
            .await
            .expect("hub received nothing")
            .unwrap();
        (String::from_utf8_lossy(&buf[..len]).into_owned(), from)
    }

    async fn recv_command(&self) -> (OutboundCommand, SocketAddr) {
        let (line, from) = self.recv_line().await;
        let cmd = decode_command(line.as_bytes()).expect("not a COMMAND line");
        (cmd, from)
    }

    async fn reply(&self, to: SocketAddr, line: &str) {
        self.socket.send_to(line.as_bytes(), to).await.unwrap();
    }
}

fn config_for(hub: &FakeHub) -> BridgeConfig {
    BridgeConfig {
        hub_host: "127.0.0.1".into(),
        hub_port: hub.port(),
        bind_address: "127.0.0.1".into(),
        ..BridgeConfig::default()
    }
}

async fn client(bridge: &HubBridge) -> (SessionId, mpsc::Receiver<ServerMessage>) {
    let (id, mut rx) = bridge.connect();
    assert!(matches!(next(&mut rx).await, ServerMessage::Welcome { .. }));
    (id, rx)
}

async fn next(rx: &mut mpsc::Receiver<ServerMessage>) -> ServerMessage {
    timeout(WAIT, rx.recv())
        .await
        .expect("client received nothing")
        .expect("client queue closed")
}

async fn assert_quiet(rx: &mut mpsc::Receiver<ServerMessage>) {
    if let Ok(Some(msg)) = timeout(QUIET, rx.recv()).await {
        panic!("unexpected {:?}", msg);
    }
}

async fn request(bridge: &HubBridge, session: SessionId, json: &str) {
    bridge
        .handle_request(session, serde_json::from_str(json).unwrap())
        .await;
}

/// Wait until the receive loop has dropped `n` FEEDBACK datagrams.
async fn wait_dropped(bridge: &HubBridge, n: u64) {
    timeout(WAIT, async {
        while bridge.stats().feedback_dropped < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("feedback was not dropped");
}

#[tokio::test]
async fn test_lock_door_round_trip() {
    let hub = FakeHub::bind().await;
    let bridge = HubBridge::new(config_for(&hub)).unwrap();
    let (id, mut rx) = client(&bridge).await;

    request(&bridge, id, r#"{"type": "lock-door", "moduleId": "D1", "requestId": 11}"#).await;

    let (line, from) = hub.recv_line().await;
    assert_eq!(line, "D1 COMMAND 1 D0 LOCK\n");
    hub.reply(from, "D1 FEEDBACK 1 D0 LOCKED\n").await;

    match next(&mut rx).await {
        ServerMessage::DoorAction {
            request_id,
            module_id,
            action,
            state,
            success,
        } => {
            assert_eq!(request_id, Some(11));
            assert_eq!(module_id, "D1");
            assert_eq!(action, "LOCK");
            assert!(success);
            assert!(!state.door_open);
            assert!(state.lock_locked);
        }
        other => panic!("Expected door-action, got {:?}", other),
    }
    assert!(bridge.table().is_empty());
    assert_eq!(bridge.stats().feedback_matched, 1);
}

#[tokio::test]
async fn test_get_door_info_times_out() {
    let hub = FakeHub::bind().await;
    let bridge = HubBridge::new(BridgeConfig {
        request_timeout_ms: 100,
        ..config_for(&hub)
    })
    .unwrap();
    let (id, mut rx) = client(&bridge).await;

    request(&bridge, id, r#"{"type": "get-door-info", "moduleId": "2"}"#).await;

    let (cmd, from) = hub.recv_command().await;
    assert_eq!(cmd.module_id, "D2");
    assert_eq!(cmd.target, "D0");
    assert_eq!(cmd.action, "STATUS");

    match next(&mut rx).await {
        ServerMessage::CommandError {
            code,
            error,
            command_id,
            ..
        } => {
            assert_eq!(code, ErrorCode::Timeout);
            assert!(error.contains("No response from hub"));
            assert_eq!(command_id, Some(cmd.command_id));
        }
        other => panic!("Expected command-error, got {:?}", other),
    }

    // Late FEEDBACK is dropped without a second delivery.
    hub.reply(
        from,
        &format!("D2 FEEDBACK {} D0 CLOSED,LOCKED\n", cmd.command_id),
    )
    .await;
    wait_dropped(&bridge, 1).await;
    assert_quiet(&mut rx).await;
    assert_eq!(bridge.stats().timeouts, 1);
}

#[tokio::test]
async fn test_door_info_reports_state() {
    let hub = FakeHub::bind().await;
    let bridge = HubBridge::new(config_for(&hub)).unwrap();
    let (id, mut rx) = client(&bridge).await;

    request(&bridge, id, r#"{"type": "get-door-info", "moduleId": 3}"#).await;
    let (cmd, from) = hub.recv_command().await;
    hub.reply(
        from,
        &format!("D3 FEEDBACK {} D0 OPEN, UNLOCKED\n", cmd.command_id),
    )
    .await;

    match next(&mut rx).await {
        ServerMessage::DoorInfo {
            module_id,
            status,
            state,
            ..
        } => {
            assert_eq!(module_id, "D3");
            assert_eq!(status, "OPEN, UNLOCKED");
            assert!(state.door_open);
            assert!(!state.lock_locked);
        }
        other => panic!("Expected door-info, got {:?}", other),
    }

    // A lock reply mentioning only the lock keeps the cached door state.
    request(&bridge, id, r#"{"type": "lock-door", "moduleId": 3}"#).await;
    let (cmd, from) = hub.recv_command().await;
    hub.reply(from, &format!("D3 FEEDBACK {} D0 LOCKED\n", cmd.command_id))
        .await;

    match next(&mut rx).await {
        ServerMessage::DoorAction { state, .. } => {
            assert!(state.door_open);
            assert!(state.lock_locked);
        }
        other => panic!("Expected door-action, got {:?}", other),
    }
}

#[tokio::test]
async fn test_event_reaches_every_client() {
    let hub = FakeHub::bind().await;
    let bridge = HubBridge::new(config_for(&hub)).unwrap();
    let local = bridge.start().await.unwrap();
    let (_a, mut rx_a) = client(&bridge).await;
    let (_b, mut rx_b) = client(&bridge).await;

    hub.reply(local, "D3 EVENT D0 DOOR OPEN\n").await;

    for rx in [&mut rx_a, &mut rx_b] {
        match next(rx).await {
            ServerMessage::HubEvent {
                module,
                target,
                event,
                raw,
            } => {
                assert_eq!(module, "D3");
                assert_eq!(target, "D0");
                assert_eq!(event, "DOOR OPEN");
                assert_eq!(raw, "D3 EVENT D0 DOOR OPEN");
            }
            other => panic!("Expected hub-event, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_heartbeat_and_unknown_lines_are_broadcast() {
    let hub = FakeHub::bind().await;
    let bridge = HubBridge::new(config_for(&hub)).unwrap();
    let local = bridge.start().await.unwrap();
    let (_a, mut rx) = client(&bridge).await;

    hub.reply(local, "D1 HEARTBEAT\n").await;
    hub.reply(local, "D2 HELLO\n").await;
    hub.reply(local, "D1 FEEDBACK abc D0 LOCKED\n").await;

    assert!(matches!(next(&mut rx).await, ServerMessage::HubHeartbeat { module, .. } if module == "D1"));
    assert!(matches!(next(&mut rx).await, ServerMessage::HubHello { module, .. } if module == "D2"));
    assert!(matches!(next(&mut rx).await, ServerMessage::HubRaw { .. }));
}

#[tokio::test]
async fn test_feedback_only_reaches_requester() {
    let hub = FakeHub::bind().await;
    let bridge = HubBridge::new(config_for(&hub)).unwrap();
    let (a, mut rx_a) = client(&bridge).await;
    let (_b, mut rx_b) = client(&bridge).await;

    request(
        &bridge,
        a,
        r#"{"type": "send-command", "module": "D4", "action": "SET LED ON", "requestId": 1}"#,
    )
    .await;
    let (cmd, from) = hub.recv_command().await;
    assert_eq!(cmd.action, "SET LED ON");
    hub.reply(from, &format!("D4 FEEDBACK {} D0 LED ON\n", cmd.command_id))
        .await;

    match next(&mut rx_a).await {
        ServerMessage::CommandFeedback {
            request_id,
            module,
            command_id,
            action,
            ..
        } => {
            assert_eq!(request_id, Some(1));
            assert_eq!(module, "D4");
            assert_eq!(command_id, cmd.command_id);
            assert_eq!(action, "LED ON");
        }
        other => panic!("Expected command-feedback, got {:?}", other),
    }
    assert_quiet(&mut rx_b).await;
}

#[tokio::test]
async fn test_disconnect_cancels_pending() {
    let hub = FakeHub::bind().await;
    let bridge = HubBridge::new(config_for(&hub)).unwrap();
    let (leaving, _rx_leaving) = client(&bridge).await;
    let (_staying, mut rx_staying) = client(&bridge).await;

    request(&bridge, leaving, r#"{"type": "lock-door", "moduleId": 1}"#).await;
    let (cmd, from) = hub.recv_command().await;

    assert_eq!(bridge.disconnect(leaving), 1);
    assert!(bridge.table().is_empty());

    hub.reply(from, &format!("D1 FEEDBACK {} D0 LOCKED\n", cmd.command_id))
        .await;
    wait_dropped(&bridge, 1).await;
    assert_quiet(&mut rx_staying).await;
}

#[tokio::test]
async fn test_unmatched_feedback_is_silent() {
    let hub = FakeHub::bind().await;
    let bridge = HubBridge::new(config_for(&hub)).unwrap();
    let local = bridge.start().await.unwrap();
    let (_id, mut rx) = client(&bridge).await;

    hub.reply(local, "D1 FEEDBACK 999 D0 LOCKED\n").await;
    wait_dropped(&bridge, 1).await;
    assert_quiet(&mut rx).await;
}

#[tokio::test]
async fn test_command_ids_are_unique_across_clients() {
    let hub = FakeHub::bind().await;
    let bridge = HubBridge::new(config_for(&hub)).unwrap();
    let (a, _rx_a) = client(&bridge).await;
    let (b, _rx_b) = client(&bridge).await;

    let mut sent = Vec::new();
    for (session, module) in [(a, "D1"), (b, "D2"), (a, "D3"), (b, "D4")] {
        let id = bridge
            .send_command(Requester::Session(session), CommandCall::status(module))
            .await
            .unwrap();
        sent.push(id.get());
    }
    assert_eq!(sent, [1, 2, 3, 4]);

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(hub.recv_command().await.0.command_id.get());
    }
    seen.sort_unstable();
    assert_eq!(seen, [1, 2, 3, 4]);
}

#[tokio::test]
async fn test_raw_send_passthrough() {
    let hub = FakeHub::bind().await;
    let bridge = HubBridge::new(config_for(&hub)).unwrap();
    let (id, mut rx) = client(&bridge).await;

    request(&bridge, id, r#"{"type": "raw-send", "text": "D1 RESET\n", "requestId": 5}"#).await;

    let (line, _) = hub.recv_line().await;
    assert_eq!(line, "D1 RESET\n");
    assert!(matches!(
        next(&mut rx).await,
        ServerMessage::RawSent { request_id: Some(5), .. }
    ));
}

#[tokio::test]
async fn test_poll_replies_are_broadcast() {
    let hub = FakeHub::bind().await;
    let bridge = HubBridge::new(BridgeConfig {
        poll_interval_ms: 50,
        poll_modules: vec!["D5".into()],
        ..config_for(&hub)
    })
    .unwrap();
    let (_a, mut rx_a) = client(&bridge).await;
    let (_b, mut rx_b) = client(&bridge).await;
    bridge.start().await.unwrap();

    let (cmd, from) = hub.recv_command().await;
    assert_eq!(cmd.module_id, "D5");
    assert_eq!(cmd.action, "STATUS");
    hub.reply(
        from,
        &format!("D5 FEEDBACK {} D0 CLOSED,LOCKED\n", cmd.command_id),
    )
    .await;

    for rx in [&mut rx_a, &mut rx_b] {
        loop {
            match next(rx).await {
                ServerMessage::CommandFeedback {
                    request_id,
                    command_id,
                    ..
                } if command_id == cmd.command_id => {
                    assert_eq!(request_id, None);
                    break;
                }
                // Later polls may time out while we wait.
                ServerMessage::CommandError { .. } | ServerMessage::CommandFeedback { .. } => {}
                other => panic!("Unexpected {:?}", other),
            }
        }
    }
    bridge.shutdown();
}

#[tokio::test]
async fn test_broadcast_timeout_reaches_every_client_once() {
    let hub = FakeHub::bind().await;
    let bridge = HubBridge::new(BridgeConfig {
        request_timeout_ms: 100,
        ..config_for(&hub)
    })
    .unwrap();
    let (_a, mut rx_a) = client(&bridge).await;
    let (_b, mut rx_b) = client(&bridge).await;

    let id = bridge
        .send_command(Requester::Broadcast, CommandCall::status("D9"))
        .await
        .unwrap();
    let (cmd, _) = hub.recv_command().await;
    assert_eq!(cmd.command_id, id);

    for rx in [&mut rx_a, &mut rx_b] {
        match next(rx).await {
            ServerMessage::CommandError {
                module,
                command_id,
                code,
                ..
            } => {
                assert_eq!(module.as_deref(), Some("D9"));
                assert_eq!(command_id, Some(id));
                assert_eq!(code, ErrorCode::Timeout);
            }
            other => panic!("Expected command-error, got {:?}", other),
        }
    }
    assert_quiet(&mut rx_a).await;
    assert_quiet(&mut rx_b).await;
    assert_eq!(bridge.stats().timeouts, 1);
    assert!(bridge.table().is_empty());
}

/// IPv4 endpoint addressing an IPv6 hub: every send fails.
fn unreachable_config(hub: &FakeHub) -> BridgeConfig {
    BridgeConfig {
        hub_host: "::1".into(),
        ..config_for(hub)
    }
}

#[tokio::test]
async fn test_send_failure_reaches_requester() {
    let hub = FakeHub::bind().await;
    let bridge = HubBridge::new(unreachable_config(&hub)).unwrap();
    let (id, mut rx) = client(&bridge).await;
    let (_other, mut rx_other) = client(&bridge).await;

    let err = bridge
        .send_command(Requester::Session(id), CommandCall::new("D1", "D0", "LOCK"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Transport(_)));

    assert!(matches!(
        next(&mut rx).await,
        ServerMessage::CommandError { code: ErrorCode::TransportFailed, .. }
    ));
    assert!(bridge.table().is_empty());
    assert_eq!(bridge.stats().send_errors, 1);
    assert_quiet(&mut rx).await;
    assert_quiet(&mut rx_other).await;
}

#[tokio::test]
async fn test_send_failure_without_requester_is_broadcast() {
    let hub = FakeHub::bind().await;
    let bridge = HubBridge::new(unreachable_config(&hub)).unwrap();
    let (_a, mut rx_a) = client(&bridge).await;
    let (_b, mut rx_b) = client(&bridge).await;

    let err = bridge
        .send_command(Requester::Broadcast, CommandCall::status("D2"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Transport(_)));

    for rx in [&mut rx_a, &mut rx_b] {
        assert!(matches!(
            next(rx).await,
            ServerMessage::CommandError { code: ErrorCode::TransportFailed, .. }
        ));
        assert_quiet(rx).await;
    }
    assert!(bridge.table().is_empty());
}

#[tokio::test]
async fn test_shutdown_cancels_and_rejects() {
    let hub = FakeHub::bind().await;
    let bridge: Arc<HubBridge> = HubBridge::new(config_for(&hub)).unwrap();
    let (id, mut rx) = client(&bridge).await;

    request(&bridge, id, r#"{"type": "unlock-door", "moduleId": 1}"#).await;
    let _ = hub.recv_command().await;
    assert_eq!(bridge.table().len(), 1);

    bridge.shutdown();
    assert!(bridge.table().is_empty());

    let err = bridge
        .send_command(Requester::Session(id), CommandCall::status("D1"))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Shutdown));
    assert!(matches!(
        next(&mut rx).await,
        ServerMessage::CommandError { code: ErrorCode::InternalError, .. }
    ));
}
