use super::*;
use crate::frame::ErrorReport;
use crate::services::player::{self, PlayerMailbox, PlayerStatus};
use std::collections::HashMap;
use tokio::time::{Duration, timeout};

// =============================================================================
// HELPERS
// =============================================================================

fn test_hub() -> Hub {
    Hub::new(HubConfig::default())
}

fn add_player(hub: &mut Hub) -> (PlayerId, PlayerMailbox) {
    let id = PlayerId::new();
    let (link, mailbox) = player::channel(id, 16);
    hub.handle(Command::Register(link));
    (id, mailbox)
}

fn request_match(hub: &mut Hub, player: PlayerId, name: &str) {
    hub.handle(Command::RequestMatch { player, name: name.into() });
}

fn play(hub: &mut Hub, player: PlayerId, session: SessionId, mv: i64) {
    hub.handle(Command::PlayMove { player, session, mv: Move(mv) });
}

async fn recv(mailbox: &mut PlayerMailbox) -> Outbound {
    timeout(Duration::from_millis(200), mailbox.next())
        .await
        .expect("outbound receive timed out")
        .expect("mailbox closed unexpectedly")
}

async fn assert_quiet(mailbox: &mut PlayerMailbox) {
    assert!(
        timeout(Duration::from_millis(80), mailbox.next()).await.is_err(),
        "expected no outbound message"
    );
}

/// Collect everything currently buffered, stopping at the first quiet gap.
async fn drain(mailbox: &mut PlayerMailbox) -> Vec<Outbound> {
    let mut out = Vec::new();
    while let Ok(Some(msg)) = timeout(Duration::from_millis(80), mailbox.next()).await {
        out.push(msg);
    }
    out
}

fn expect_started(out: Outbound) -> Joined {
    match out {
        Outbound::Event(Event::Started(joined)) => joined,
        other => panic!("expected started, got {other:?}"),
    }
}

fn expect_played(out: Outbound) -> Played {
    match out {
        Outbound::Event(Event::Played(played)) => played,
        other => panic!("expected played, got {other:?}"),
    }
}

fn expect_ended(out: Outbound) -> Ended {
    match out {
        Outbound::Event(Event::Ended(ended)) => ended,
        other => panic!("expected ended, got {other:?}"),
    }
}

fn expect_error(out: Outbound) -> ErrorReport {
    match out {
        Outbound::Error(report) => report,
        other => panic!("expected error, got {other:?}"),
    }
}

fn endings(msgs: &[Outbound]) -> Vec<&Ended> {
    msgs.iter()
        .filter_map(|m| match m {
            Outbound::Event(Event::Ended(ended)) => Some(ended),
            _ => None,
        })
        .collect()
}

struct Matched {
    session: SessionId,
    x: PlayerId,
    x_mb: PlayerMailbox,
    o: PlayerId,
    o_mb: PlayerMailbox,
}

/// Alice queues first (O), Bob's request makes the match (X).
async fn matched_pair(hub: &mut Hub) -> Matched {
    let (alice, mut alice_mb) = add_player(hub);
    let (bob, mut bob_mb) = add_player(hub);
    request_match(hub, alice, "alice");
    request_match(hub, bob, "bob");

    let alice_joined = expect_started(recv(&mut alice_mb).await);
    let bob_joined = expect_started(recv(&mut bob_mb).await);
    assert_eq!(alice_joined.session_id, bob_joined.session_id);

    Matched { session: bob_joined.session_id, x: bob, x_mb: bob_mb, o: alice, o_mb: alice_mb }
}

// =============================================================================
// MATCHMAKING
// =============================================================================

#[tokio::test]
async fn lone_request_waits_in_queue() {
    let mut hub = test_hub();
    let (alice, mut alice_mb) = add_player(&mut hub);

    request_match(&mut hub, alice, "alice");

    assert_eq!(hub.stats(), HubStats { players: 1, sessions: 0, waiting: 1 });
    assert_quiet(&mut alice_mb).await;
}

#[tokio::test]
async fn two_requests_create_one_session_with_complementary_marks() {
    let mut hub = test_hub();
    let (alice, mut alice_mb) = add_player(&mut hub);
    let (bob, mut bob_mb) = add_player(&mut hub);

    request_match(&mut hub, alice, "alice");
    request_match(&mut hub, bob, "bob");

    let alice_joined = expect_started(recv(&mut alice_mb).await);
    let bob_joined = expect_started(recv(&mut bob_mb).await);

    assert_eq!(alice_joined.session_id, bob_joined.session_id);
    assert_eq!(alice_joined.tile, Mark::O);
    assert_eq!(bob_joined.tile, Mark::X);
    assert_eq!(alice_joined.opponent, "bob");
    assert_eq!(bob_joined.opponent, "alice");
    assert_eq!(hub.stats(), HubStats { players: 2, sessions: 1, waiting: 0 });

    let info = alice_mb.info().read().await;
    assert_eq!(info.status, PlayerStatus::Playing);
    assert_eq!(info.session, Some(alice_joined.session_id));
}

#[tokio::test]
async fn repeated_request_reports_already_queued() {
    let mut hub = test_hub();
    let (alice, mut alice_mb) = add_player(&mut hub);

    request_match(&mut hub, alice, "alice");
    request_match(&mut hub, alice, "alice");

    let report = expect_error(recv(&mut alice_mb).await);
    assert_eq!(report.code, "E_ALREADY_QUEUED");
    assert_eq!(hub.stats().waiting, 1);
}

#[tokio::test]
async fn rejected_request_keeps_display_name() {
    let mut hub = test_hub();
    let mut m = matched_pair(&mut hub).await;

    request_match(&mut hub, m.x, "mallory");
    let _ = recv(&mut m.x_mb).await;
    play(&mut hub, m.x, m.session, 4);

    assert_eq!(expect_played(recv(&mut m.o_mb).await).player, "bob");
}

#[tokio::test]
async fn exit_then_rematch_delivers_ended_before_started() {
    let mut hub = test_hub();
    let mut m = matched_pair(&mut hub).await;
    let (carol, mut carol_mb) = add_player(&mut hub);
    request_match(&mut hub, carol, "carol");

    hub.handle(Command::ExitSession { player: m.x, session: m.session });
    request_match(&mut hub, m.x, "bob");

    let events: Vec<&'static str> = drain(&mut m.x_mb)
        .await
        .iter()
        .filter_map(|msg| match msg {
            Outbound::Event(Event::Ended(_)) => Some("ended"),
            Outbound::Event(Event::Started(_)) => Some("started"),
            _ => None,
        })
        .collect();
    assert_eq!(events, ["ended", "started"]);

    let carol_joined = expect_started(recv(&mut carol_mb).await);
    let info = m.x_mb.info().read().await;
    assert_eq!(info.status, PlayerStatus::Playing);
    assert_eq!(info.session, Some(carol_joined.session_id));
}

#[tokio::test]
async fn request_while_in_session_is_rejected() {
    let mut hub = test_hub();
    let mut m = matched_pair(&mut hub).await;

    request_match(&mut hub, m.x, "bob");

    let report = expect_error(recv(&mut m.x_mb).await);
    assert_eq!(report.code, "E_ALREADY_PLAYING");
    assert_eq!(hub.stats(), HubStats { players: 2, sessions: 1, waiting: 0 });
}

#[tokio::test]
async fn leave_queue_removes_waiting_player() {
    let mut hub = test_hub();
    let (alice, mut alice_mb) = add_player(&mut hub);
    request_match(&mut hub, alice, "alice");

    hub.handle(Command::LeaveQueue(alice));

    assert_eq!(hub.stats().waiting, 0);
    assert_quiet(&mut alice_mb).await;
}

#[tokio::test]
async fn leave_queue_when_not_queued_reports_not_found() {
    let mut hub = test_hub();
    let (alice, mut alice_mb) = add_player(&mut hub);

    hub.handle(Command::LeaveQueue(alice));

    let report = expect_error(recv(&mut alice_mb).await);
    assert_eq!(report.code, "E_NOT_QUEUED");
}

// =============================================================================
// MOVES
// =============================================================================

#[tokio::test]
async fn valid_move_confirms_mover_and_notifies_opponent() {
    let mut hub = test_hub();
    let mut m = matched_pair(&mut hub).await;

    play(&mut hub, m.x, m.session, 4);

    match recv(&mut m.x_mb).await {
        Outbound::Notice { message } => assert_eq!(message, "you played 4"),
        other => panic!("expected notice, got {other:?}"),
    }
    let played = expect_played(recv(&mut m.o_mb).await);
    assert_eq!(played.player, "bob");
    assert_eq!(played.mv, Move(4));
}

#[tokio::test]
async fn wrong_turn_is_reported_to_mover_only() {
    let mut hub = test_hub();
    let mut m = matched_pair(&mut hub).await;

    play(&mut hub, m.o, m.session, 0);

    let report = expect_error(recv(&mut m.o_mb).await);
    assert_eq!(report.code, "E_WRONG_TURN");
    assert_quiet(&mut m.x_mb).await;
}

#[tokio::test]
async fn out_of_range_move_is_reported() {
    let mut hub = test_hub();
    let mut m = matched_pair(&mut hub).await;

    play(&mut hub, m.x, m.session, 9);

    let report = expect_error(recv(&mut m.x_mb).await);
    assert_eq!(report.code, "E_INVALID_MOVE");
    assert_quiet(&mut m.o_mb).await;
}

#[tokio::test]
async fn move_in_unknown_session_is_reported() {
    let mut hub = test_hub();
    let (alice, mut alice_mb) = add_player(&mut hub);

    play(&mut hub, alice, SessionId::new(), 0);

    let report = expect_error(recv(&mut alice_mb).await);
    assert_eq!(report.code, "E_SESSION_NOT_FOUND");
    assert_eq!(report.error, "game not found");
}

#[tokio::test]
async fn winning_move_broadcasts_and_removes_session() {
    let mut hub = test_hub();
    let mut m = matched_pair(&mut hub).await;

    for (player, mv) in [(m.x, 0), (m.o, 3), (m.x, 1), (m.o, 4), (m.x, 2)] {
        play(&mut hub, player, m.session, mv);
    }

    let x_msgs = drain(&mut m.x_mb).await;
    let o_msgs = drain(&mut m.o_mb).await;

    for msgs in [&x_msgs, &o_msgs] {
        let ended = endings(msgs);
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].reason, EndReason::Won);
        assert_eq!(ended[0].winner, Some(Mark::X));
        assert_eq!(ended[0].score, HubConfig::default().reward_score);
    }
    // The deciding move is answered with `ended` alone.
    assert!(matches!(o_msgs.last(), Some(Outbound::Event(Event::Ended(_)))));
    assert!(!o_msgs.iter().any(|m| matches!(m, Outbound::Event(Event::Played(p)) if p.mv == Move(2))));
    assert!(!x_msgs.contains(&Outbound::notice("you played 2")));

    assert_eq!(hub.stats().sessions, 0);
    assert_eq!(m.x_mb.info().read().await.status, PlayerStatus::Connected);
    assert_eq!(m.o_mb.info().read().await.status, PlayerStatus::Connected);

    play(&mut hub, m.o, m.session, 5);
    assert_eq!(expect_error(recv(&mut m.o_mb).await).code, "E_SESSION_NOT_FOUND");
}

#[tokio::test]
async fn full_board_ends_in_draw() {
    let mut hub = test_hub();
    let mut m = matched_pair(&mut hub).await;

    let moves = [(m.x, 0), (m.o, 1), (m.x, 2), (m.o, 4), (m.x, 3), (m.o, 5), (m.x, 7), (m.o, 6), (m.x, 8)];
    for (player, mv) in moves {
        play(&mut hub, player, m.session, mv);
    }

    let o_msgs = drain(&mut m.o_mb).await;
    let ended = endings(&o_msgs);
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].reason, EndReason::Draw);
    assert_eq!(ended[0].winner, None);
    assert_eq!(hub.stats().sessions, 0);
}

// =============================================================================
// EXIT / UNREGISTER
// =============================================================================

#[tokio::test]
async fn exit_session_awards_opponent() {
    let mut hub = test_hub();
    let mut m = matched_pair(&mut hub).await;

    hub.handle(Command::ExitSession { player: m.o, session: m.session });

    for mb in [&mut m.x_mb, &mut m.o_mb] {
        let ended = expect_ended(recv(mb).await);
        assert_eq!(ended.reason, EndReason::Abandoned);
        assert_eq!(ended.winner, Some(Mark::X));
        assert_eq!(ended.session_id, m.session);
    }
    assert_eq!(hub.stats().sessions, 0);
}

#[tokio::test]
async fn exit_unknown_session_is_silent() {
    let mut hub = test_hub();
    let (alice, mut alice_mb) = add_player(&mut hub);

    hub.handle(Command::ExitSession { player: alice, session: SessionId::new() });

    assert_quiet(&mut alice_mb).await;
}

#[tokio::test]
async fn unregister_mid_session_awards_remaining_player() {
    let mut hub = test_hub();
    let mut m = matched_pair(&mut hub).await;

    hub.handle(Command::Unregister(m.x));

    let ended = expect_ended(recv(&mut m.o_mb).await);
    assert_eq!(ended.reason, EndReason::Abandoned);
    assert_eq!(ended.winner, Some(Mark::O));
    assert_eq!(hub.stats(), HubStats { players: 1, sessions: 0, waiting: 0 });

    // The departed player's channels are closed after any buffered messages.
    drain(&mut m.x_mb).await;
    let closed = timeout(Duration::from_millis(200), m.x_mb.next()).await;
    assert!(matches!(closed, Ok(None)), "departed player's mailbox should be closed");
}

#[tokio::test]
async fn unregister_twice_cleans_up_once() {
    let mut hub = test_hub();
    let mut m = matched_pair(&mut hub).await;

    hub.handle(Command::Unregister(m.x));
    hub.handle(Command::Unregister(m.x));

    let msgs = drain(&mut m.o_mb).await;
    assert_eq!(endings(&msgs).len(), 1);
    assert_eq!(hub.stats(), HubStats { players: 1, sessions: 0, waiting: 0 });
}

#[tokio::test]
async fn unregister_waiting_player_leaves_queue() {
    let mut hub = test_hub();
    let (alice, _alice_mb) = add_player(&mut hub);
    request_match(&mut hub, alice, "alice");

    hub.handle(Command::Unregister(alice));

    assert_eq!(hub.stats(), HubStats::default());

    // A newcomer is queued rather than matched with the departed player.
    let (bob, mut bob_mb) = add_player(&mut hub);
    request_match(&mut hub, bob, "bob");
    assert_eq!(hub.stats().waiting, 1);
    assert_quiet(&mut bob_mb).await;
}

#[tokio::test]
async fn full_outbound_buffer_drops_instead_of_blocking() {
    let mut hub = test_hub();
    let id = PlayerId::new();
    let (link, mut mailbox) = player::channel(id, 1);
    hub.handle(Command::Register(link));

    for _ in 0..5 {
        hub.handle(Command::LeaveQueue(id));
    }

    let msgs = drain(&mut mailbox).await;
    assert_eq!(msgs.len(), 1);
    assert_eq!(expect_error(msgs[0].clone()).code, "E_NOT_QUEUED");
}

// =============================================================================
// HUB TASK
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_pair_everyone_at_most_once() {
    const N: usize = 9;
    let (hub, _task) = spawn_hub(HubConfig::default());

    let mut players = Vec::with_capacity(N);
    for _ in 0..N {
        let id = PlayerId::new();
        let (link, mailbox) = player::channel(id, 16);
        hub.register(link).await.expect("hub should accept registration");
        players.push((id, mailbox));
    }

    let tasks: Vec<_> = players
        .iter()
        .map(|(id, _)| {
            let hub = hub.clone();
            let id = *id;
            tokio::spawn(async move { hub.request_match(id, format!("p-{id}")).await })
        })
        .collect();
    for task in tasks {
        task.await.expect("task panicked").expect("hub should accept request");
    }

    let stats = hub.stats().await.expect("hub should answer stats");
    assert_eq!(stats.sessions, N / 2);
    assert_eq!(stats.waiting, N % 2);

    let mut per_session: HashMap<SessionId, usize> = HashMap::new();
    let mut unmatched = 0;
    for (_, mailbox) in &mut players {
        let starts: Vec<Joined> = drain(mailbox)
            .await
            .into_iter()
            .filter_map(|m| match m {
                Outbound::Event(Event::Started(j)) => Some(j),
                _ => None,
            })
            .collect();
        assert!(starts.len() <= 1, "player joined more than one session");
        match starts.first() {
            Some(j) => *per_session.entry(j.session_id).or_default() += 1,
            None => unmatched += 1,
        }
    }
    assert_eq!(per_session.len(), N / 2);
    assert!(per_session.values().all(|&n| n == 2));
    assert_eq!(unmatched, N % 2);
}

#[tokio::test]
async fn handle_reports_unavailable_after_hub_stops() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let hub = HubHandle::new(tx);

    assert_eq!(hub.unregister(PlayerId::new()).await, Err(HubUnavailable));
    assert_eq!(hub.stats().await, Err(HubUnavailable));
}
