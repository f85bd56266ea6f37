//! Night flows driven by real decoded server frames and a manual clock.

use nightwatch_night::{NightController, NightEvent, NightState, Phase, RoleView};
use nightwatch_protocol::{
    ActionKind, Frame, JsonCodec, MessageType, Role, RoomId, ServerMessage,
};
use nightwatch_tick::{Clock, ManualClock};

// =========================================================================
// Helpers
// =========================================================================

fn msg(ty: MessageType, body: &str) -> ServerMessage {
    ServerMessage::from_frame(&Frame::new(ty, body.as_bytes().to_vec()), &JsonCodec)
}

/// Routes the night-owned messages the way the client dispatcher does.
fn feed(nc: &mut NightController, m: &ServerMessage, now: f64) -> Vec<NightEvent> {
    let result = match m {
        ServerMessage::RoleAssigned(a) => Ok(nc.on_role_assigned(a)),
        ServerMessage::NightBegin(b) => nc.on_night_begin(b, now),
        ServerMessage::GuardStart(t) => nc.on_guard_start(t, now),
        ServerMessage::WolfStart(t) => nc.on_wolf_start(t, now),
        ServerMessage::NightResolved(r) => nc.on_night_resolved(r),
        ServerMessage::RoomSnapshot(s) => nc.resume_from_snapshot(s),
        other => panic!("not a night message: {other:?}"),
    };
    match result {
        Ok(events) => events,
        Err(e) if e.is_benign() => Vec::new(),
        Err(e) => panic!("unexpected error {e}"),
    }
}

fn entries(events: &[NightEvent], phase: Phase) -> usize {
    events
        .iter()
        .filter(|e| {
            matches!(e, NightEvent::PhaseChanged { state: NightState::Night(p), .. } if *p == phase)
        })
        .count()
}

const NIGHT: &str = r#"{"duration":90,"seer_duration":30,"guard_duration":30,"wolf_duration":30,
    "roster":[{"username":"ann","is_alive":1},{"username":"bob","is_alive":1},
              {"username":"cat","is_alive":1},{"username":"dan","is_alive":1}]}"#;

fn player(name: &str, role: Role) -> NightController {
    let mut nc = NightController::default();
    nc.set_local_user(Some(name.to_string()));
    nc.enter_room(RoomId(12));
    let code = u8::from(role);
    feed(
        &mut nc,
        &msg(
            MessageType::GameStartAndRole,
            &format!(r#"{{"status":"success","role":{code},"werewolf_team":["dan"]}}"#),
        ),
        0.0,
    );
    nc
}

// =========================================================================
// End-to-end
// =========================================================================

#[test]
fn test_night_then_guard_signal_enters_guard_exactly_once_with_fresh_deadline() {
    let clock = ManualClock::new(10_000.0);
    let mut nc = player("bob", Role::Guard);

    feed(&mut nc, &msg(MessageType::PhaseNight, NIGHT), clock.now());
    assert_eq!(nc.state(), NightState::Night(Phase::SeerPhase));
    assert_eq!(nc.deadlines().unwrap().deadline(Phase::SeerPhase), Some(10_030.0));

    // The local seer countdown runs out before the server moves on.
    clock.advance(34.0);
    let _ = nc.tick(clock.now(), true);
    assert_eq!(nc.remaining(clock.now()), Some(0.0));
    assert_eq!(nc.state(), NightState::Night(Phase::SeerPhase));

    let guard = msg(MessageType::PhaseGuardStart, r#"{"guard_duration":30}"#);
    let events = feed(&mut nc, &guard, clock.now());
    assert_eq!(entries(&events, Phase::GuardPhase), 1);
    assert_eq!(nc.deadlines().unwrap().deadline(Phase::GuardPhase), Some(10_064.0));
    assert_eq!(nc.remaining(clock.now()), Some(30.0));
    assert!(matches!(
        nc.current_view(),
        RoleView::Action {
            kind: ActionKind::GuardProtect,
            submitted: false,
            ..
        }
    ));
}

#[test]
fn test_wolf_signal_twice_enters_wolf_once() {
    let mut nc = player("dan", Role::Werewolf);
    feed(&mut nc, &msg(MessageType::PhaseNight, NIGHT), 0.0);

    let wolf = msg(MessageType::PhaseWolfStart, r#"{"wolf_duration":30}"#);
    let mut events = feed(&mut nc, &wolf, 60.0);
    events.extend(feed(&mut nc, &wolf, 61.0));

    assert_eq!(entries(&events, Phase::WolfPhase), 1);
    assert_eq!(nc.deadlines().unwrap().deadline(Phase::WolfPhase), Some(90.0));
    // Guard was never announced: skipped, not started.
    assert!(nc.context().unwrap().was_skipped(Phase::GuardPhase));
}

#[test]
fn test_both_views_share_one_deadline() {
    let mut seer = player("ann", Role::Seer);
    let mut villager = player("cat", Role::Villager);
    for nc in [&mut seer, &mut villager] {
        feed(nc, &msg(MessageType::PhaseNight, NIGHT), 500.0);
    }
    assert!(seer.current_view().accepts_input());
    assert_eq!(
        villager.current_view(),
        RoleView::Waiting {
            active_role: Some(Role::Seer)
        }
    );
    assert_eq!(seer.remaining(512.0), villager.remaining(512.0));
}

#[test]
fn test_compact_resolution_marks_target_dead() {
    let mut nc = player("ann", Role::Seer);
    feed(&mut nc, &msg(MessageType::PhaseNight, NIGHT), 0.0);
    let events = feed(
        &mut nc,
        &msg(MessageType::PhaseDay, r#"{"result":"killed","targetId":"cat"}"#),
        95.0,
    );
    assert!(events.iter().any(|e| matches!(e, NightEvent::NightResolved { .. })));
    assert_eq!(nc.state(), NightState::Day);
    assert!(!nc.roster().iter().any(|p| p.username == "cat" && p.alive));
}

// =========================================================================
// Resume
// =========================================================================

#[test]
fn test_resume_mid_wolf_uses_server_deadline() {
    let clock = ManualClock::new(2_000.0);
    let mut nc = NightController::default();
    nc.set_local_user(Some("dan".into()));

    let snapshot = format!(
        r#"{{"status":"success","room_id":12,"phase":"wolf","role":1,
            "players":[{{"username":"ann","is_alive":1}},{{"username":"dan","is_alive":1}}],
            "werewolf_team":["dan"],
            "deadlines":{{"wolf":{}}}}}"#,
        clock.now() + 12.0
    );
    let events = feed(&mut nc, &msg(MessageType::RoomInfoRes, &snapshot), clock.now());

    assert_eq!(entries(&events, Phase::WolfPhase), 1);
    assert_eq!(entries(&events, Phase::SeerPhase), 0);
    assert_eq!(entries(&events, Phase::GuardPhase), 0);
    let remaining = nc.remaining(clock.now()).unwrap();
    assert!((remaining - 12.0).abs() < 1e-6, "remaining = {remaining}");
    assert!(nc.current_view().accepts_input());

    // Signals for phases before the snapshot are stale now.
    let late = feed(
        &mut nc,
        &msg(MessageType::PhaseGuardStart, r#"{"guard_duration":30}"#),
        clock.now(),
    );
    assert!(late.is_empty());
    let dup = feed(
        &mut nc,
        &msg(MessageType::PhaseWolfStart, r#"{"wolf_duration":30}"#),
        clock.now(),
    );
    assert!(dup.is_empty());
    assert!((nc.remaining(clock.now()).unwrap() - 12.0).abs() < 1e-6);
}

#[test]
fn test_resume_not_in_roster_is_observer() {
    let mut nc = NightController::default();
    nc.set_local_user(Some("zed".into()));
    let body = r#"{"status":"success","room_id":12,"phase":"seer","role":2,
        "players":[{"username":"ann","is_alive":1}],"deadlines":{"seer":100}}"#;
    feed(&mut nc, &msg(MessageType::RoomInfoRes, body), 90.0);

    assert!(nc.context().unwrap().observer);
    assert_eq!(
        nc.current_view(),
        RoleView::Waiting {
            active_role: Some(Role::Seer)
        }
    );
}

#[test]
fn test_resume_role_reveal_pending() {
    let mut nc = NightController::default();
    nc.set_local_user(Some("ann".into()));
    let body = r#"{"status":"success","room_id":3,"phase":"role_reveal","role":2}"#;
    let events = feed(&mut nc, &msg(MessageType::RoomInfoRes, body), 0.0);

    assert_eq!(nc.state(), NightState::RoleReveal);
    assert!(events.iter().any(|e| matches!(
        e,
        NightEvent::RoleRevealed {
            role: Some(Role::Seer),
            ..
        }
    )));
    assert!(nc.acknowledge_role_card().is_ok());
}

#[test]
fn test_resume_day_has_no_night_phase() {
    let mut nc = NightController::default();
    let body = r#"{"status":"success","room_id":3,"phase":"day","role":0}"#;
    feed(&mut nc, &msg(MessageType::RoomInfoRes, body), 0.0);
    assert_eq!(nc.state(), NightState::Day);
    assert!(nc.context().is_none());
    assert_eq!(nc.current_view(), RoleView::Inactive);
}

#[test]
fn test_resume_rejected_snapshot_is_an_error() {
    let mut nc = NightController::default();
    let m = msg(
        MessageType::RoomInfoRes,
        r#"{"status":"fail","message":"not in room"}"#,
    );
    let ServerMessage::RoomSnapshot(s) = m else {
        panic!("expected snapshot");
    };
    assert!(nc.resume_from_snapshot(&s).is_err());
    assert_eq!(nc.state(), NightState::Idle);
}
