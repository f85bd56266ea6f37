//! Heartbeat and reconnect driven together the way the client loop does,
//! against a manual clock.

use std::time::Duration;

use nightwatch_protocol::{ClientRequest, MessageType, Payload, ServerMessage};
use nightwatch_session::{
    HeartbeatConfig, HeartbeatMonitor, ReconnectConfig, ReconnectCoordinator,
    ReconnectOutcome, ReconnectState,
};
use nightwatch_tick::{Clock, ManualClock};

fn roster_update() -> ServerMessage {
    ServerMessage::Passthrough {
        msg_type: MessageType::RoomStatusUpdate,
        payload: Payload::parse(br#"{"type":"player_joined"}"#),
    }
}

/// Runs one reconnect sequence where attempts `1..k` fail and attempt `k`
/// succeeds. Returns the delays observed before each attempt and how
/// many times "restored" was reported.
fn run_sequence(k: u32, cfg: ReconnectConfig) -> (Vec<(u32, f64)>, u32) {
    let clock = ManualClock::new(1_000.0);
    let mut rc = ReconnectCoordinator::new(cfg);
    rc.on_connection_lost();

    let mut delays = Vec::new();
    let mut restored = 0;
    let mut ticket = rc.begin_manual().unwrap();

    // Tick at 4 Hz until the sequence settles.
    for _ in 0..10_000 {
        if ticket.attempt == k {
            if rc.record_success(ticket) {
                restored += 1;
            }
            // Keep ticking: nothing more may fire.
            for _ in 0..200 {
                clock.advance(0.25);
                assert!(rc.poll_due(clock.now()).is_none());
            }
            break;
        }
        let failed_at = match rc.record_failure(ticket, clock.now()) {
            ReconnectOutcome::Retrying { .. } => clock.now(),
            other => panic!("unexpected {other:?}"),
        };
        loop {
            clock.advance(0.25);
            if let Some(next) = rc.poll_due(clock.now()) {
                delays.push((next.attempt, clock.now() - failed_at));
                ticket = next;
                break;
            }
        }
    }
    (delays, restored)
}

#[test]
fn test_backoff_delay_before_attempt_is_min_pow2_cap() {
    let cfg = ReconnectConfig {
        max_attempts: 7,
        cap: Duration::from_secs(30),
        ..Default::default()
    };
    let (delays, restored) = run_sequence(7, cfg.clone());

    assert_eq!(delays.len(), 6);
    for (attempt, delay) in delays {
        let expected = 2f64.powi(attempt as i32).min(30.0);
        assert!(
            (delay - expected).abs() < 1e-6,
            "attempt {attempt}: waited {delay}, expected {expected}"
        );
    }
    assert_eq!(restored, 1);
}

#[test]
fn test_first_attempt_success_restores_once() {
    let (delays, restored) = run_sequence(1, ReconnectConfig::default());
    assert!(delays.is_empty());
    assert_eq!(restored, 1);
}

#[test]
fn test_heartbeat_loss_feeds_reconnect_prompt_once() {
    let clock = ManualClock::new(0.0);
    let mut hb = HeartbeatMonitor::new(HeartbeatConfig {
        check_interval: Duration::from_secs(1),
        timeout: Duration::from_secs(30),
        probe_interval: None,
    });
    let mut rc = ReconnectCoordinator::default();
    hb.reset(clock.now());

    let mut prompts = 0;
    for step in 0..400 {
        clock.advance(0.25);
        // Traffic for the first 10 s, then silence.
        if step < 40 {
            hb.on_message(&roster_update(), clock.now());
        }
        if hb.check(clock.now()).is_some() && rc.on_connection_lost() {
            prompts += 1;
        }
    }
    assert_eq!(prompts, 1);
    assert_eq!(rc.state(), ReconnectState::AwaitingDecision);
}

#[test]
fn test_server_probe_is_answered_and_counts_as_activity() {
    let clock = ManualClock::new(0.0);
    let mut hb = HeartbeatMonitor::default();
    hb.reset(clock.now());

    clock.advance(170.0);
    assert_eq!(
        hb.on_message(&ServerMessage::Probe, clock.now()),
        Some(ClientRequest::ProbeReply)
    );
    clock.advance(170.0);
    assert!(hb.check(clock.now()).is_none());
}
