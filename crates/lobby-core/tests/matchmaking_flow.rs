// End-to-end matchmaking flows through a running controller loop.
//
// Each test drives the controller the way the app does: commands through a
// `SessionHandle`, raw frames through `NotificationChannel::dispatch`, and
// observations on the UI and navigation receivers. Time is paused, so the
// countdown runs instantly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lobby_core::avatar::{AvatarError, AvatarResolver, DEFAULT_PLACEHOLDER_AVATAR};
use lobby_core::channel::NotificationChannel;
use lobby_core::controller::{
    ControllerConfig, LocalPlayer, SessionController, SessionHandle, SessionOutputs, UiUpdate,
};
use lobby_core::handoff::Navigation;
use lobby_core::session::{GameMode, Phase};
use lobby_core::view::LobbyView;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Resolver that answers `/avatars/<name>.png` after `delay`, and fails for
/// usernames starting with `ghost`.
struct SlowResolver {
    delay: Duration,
}

#[async_trait]
impl AvatarResolver for SlowResolver {
    async fn resolve(&self, username: &str) -> Result<String, AvatarError> {
        tokio::time::sleep(self.delay).await;
        if username.starts_with("ghost") {
            return Err(AvatarError::NotFound {
                username: username.to_string(),
            });
        }
        Ok(format!("/avatars/{username}.png"))
    }
}

struct Running {
    handle: SessionHandle,
    channel: NotificationChannel,
    outbound: mpsc::UnboundedReceiver<String>,
    outputs: SessionOutputs,
    task: JoinHandle<()>,
}

fn spawn_controller(username: &str, avatar_delay: Duration) -> Running {
    spawn_with_config(username, avatar_delay, ControllerConfig::default())
}

fn spawn_with_config(username: &str, avatar_delay: Duration, config: ControllerConfig) -> Running {
    let (channel, outbound) = NotificationChannel::new();
    let (controller, handle, outputs) = SessionController::new(
        LocalPlayer {
            username: username.to_string(),
            avatar_url: format!("/avatars/{username}.png"),
        },
        channel.clone(),
        Arc::new(SlowResolver {
            delay: avatar_delay,
        }),
        config,
    );
    let task = tokio::spawn(controller.run());
    Running {
        handle,
        channel,
        outbound,
        outputs,
        task,
    }
}

impl Running {
    /// Start a session and wait until its join request is on the wire.
    async fn join(&mut self, mode: GameMode) -> serde_json::Value {
        self.handle.start(mode).unwrap();
        let frame = self.outbound.recv().await.expect("join frame");
        serde_json::from_str(&frame).unwrap()
    }

    /// Wait for the first view in `phase`, failing on timeout.
    async fn wait_for_phase(&mut self, phase: Phase) -> LobbyView {
        let wait = async {
            loop {
                match self.outputs.ui_rx.recv().await {
                    Some(UiUpdate::View(view)) if view.phase == phase => return view,
                    Some(_) => continue,
                    None => panic!("controller stopped before reaching {phase}"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(30), wait)
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {phase}"))
    }

    async fn next_navigation(&mut self) -> Option<Navigation> {
        tokio::time::timeout(Duration::from_secs(30), self.outputs.nav_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Drain every update already queued.
    fn drain_updates(&mut self) -> Vec<UiUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = self.outputs.ui_rx.try_recv() {
            updates.push(update);
        }
        updates
    }
}

fn names(view: &LobbyView) -> Vec<&str> {
    view.players.iter().map(|c| c.username.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Random match
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn random_match_hands_off_once_and_returns_to_idle() {
    let mut run = spawn_controller("bob", Duration::ZERO);

    let join = run.join(GameMode::Random).await;
    assert_eq!(join["type"], "random_match");
    assert_eq!(join["data"]["gameMode"], "random");
    assert_eq!(join["data"]["username"], "bob");

    run.channel.dispatch(
        r#"{"type":"random_match_player_joined","current_players":[{"username":"amy","avatar":"/a.png"},{"username":"bob","avatar":null}]}"#,
    );
    let lobby = run.wait_for_phase(Phase::Waiting).await;
    let lobby = if lobby.players.is_empty() {
        run.wait_for_phase(Phase::Waiting).await
    } else {
        lobby
    };
    assert_eq!(names(&lobby), vec!["amy", "bob"]);
    assert_eq!(lobby.players[1].avatar_url, DEFAULT_PLACEHOLDER_AVATAR);

    run.channel
        .dispatch(r#"{"type":"random_match_ready","roomId":"r123"}"#);

    let nav = run.next_navigation().await.expect("navigation");
    assert_eq!(nav.to_url(), "/pong?room=r123&mode=random");

    let idle = run.wait_for_phase(Phase::Idle).await;
    assert!(idle.players.is_empty());

    // Exactly one navigation.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(run.outputs.nav_rx.try_recv().is_err());

    run.handle.clone().dispose().unwrap();
    run.task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn countdown_ticks_three_to_zero() {
    let mut run = spawn_controller("bob", Duration::ZERO);
    run.join(GameMode::Random).await;
    run.channel
        .dispatch(r#"{"type":"random_match_ready","roomId":"r9"}"#);

    run.next_navigation().await.expect("navigation");
    let ticks: Vec<u8> = run
        .drain_updates()
        .into_iter()
        .filter_map(|u| match u {
            UiUpdate::CountdownTick(n) => Some(n),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![3, 2, 1, 0]);
}

// ---------------------------------------------------------------------------
// Tournament
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn tournament_pairs_local_player_and_navigates() {
    let mut run = spawn_controller("bob", Duration::from_millis(200));

    let join = run.join(GameMode::Tournament).await;
    assert_eq!(join["type"], "tournament_join");
    assert_eq!(join["title"], "Tournament Entry");

    run.channel.dispatch(
        r#"{"type":"tournament_player_joined","current_players":[{"username":"alice"},{"username":"bob"},{"username":"carol"},{"username":"dan"}]}"#,
    );
    let full = run.wait_for_phase(Phase::Pairing).await;
    assert_eq!(full.players.len(), 4);
    assert_eq!(full.footer.as_deref(), Some("All players joined."));

    run.channel.dispatch(
        r#"{"type":"tournament_ready","pairings":[["alice","bob"],["carol","dan"]]}"#,
    );
    let countdown = run.wait_for_phase(Phase::Countdown).await;
    assert_eq!(names(&countdown), vec!["alice", "bob"]);

    let nav = run.next_navigation().await.expect("navigation");
    assert_eq!(nav.room, "tournament_alice_bob");
    assert_eq!(nav.to_url(), "/pong?room=tournament_alice_bob&mode=tournament");

    // Avatar lookups landed before the countdown finished.
    let resolved = run
        .drain_updates()
        .into_iter()
        .filter_map(|u| match u {
            UiUpdate::View(v) if v.phase == Phase::Countdown => Some(v),
            _ => None,
        })
        .any(|v| {
            v.players
                .iter()
                .any(|c| c.username == "alice" && c.avatar_url == "/avatars/alice.png")
        });
    assert!(resolved);
}

#[tokio::test(start_paused = true)]
async fn unresolved_pairing_errors_without_countdown() {
    let mut run = spawn_controller("bob", Duration::ZERO);
    run.join(GameMode::Tournament).await;

    run.channel.dispatch(
        r#"{"type":"tournament_ready","pairings":[["alice","carol"],["dan","erin"]]}"#,
    );

    let errored = run.wait_for_phase(Phase::Errored).await;
    assert!(errored.footer.unwrap().contains("bob"));
    let idle = run.wait_for_phase(Phase::Idle).await;
    assert!(idle.footer.is_some());

    tokio::time::sleep(Duration::from_secs(10)).await;
    let updates = run.drain_updates();
    assert!(!updates.iter().any(|u| matches!(u, UiUpdate::CountdownTick(_))));
    assert!(run.outputs.nav_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn broken_foreign_pair_still_pairs_local_player() {
    let mut run = spawn_controller("bob", Duration::ZERO);
    run.join(GameMode::Tournament).await;

    run.channel.dispatch(
        r#"{"type":"tournament_ready","pairings":[["carol","carol"],["","dan"],["alice","bob"]]}"#,
    );

    let nav = run.next_navigation().await.expect("navigation");
    assert_eq!(nav.to_url(), "/pong?room=tournament_alice_bob&mode=tournament");
}

#[tokio::test(start_paused = true)]
async fn self_pairing_of_local_player_errors_without_countdown() {
    let mut run = spawn_controller("bob", Duration::ZERO);
    run.join(GameMode::Tournament).await;

    run.channel
        .dispatch(r#"{"type":"tournament_ready","pairings":[["bob","bob"]]}"#);

    let errored = run.wait_for_phase(Phase::Errored).await;
    assert_eq!(errored.footer.as_deref(), Some("server paired `bob` with `bob`"));
    run.wait_for_phase(Phase::Idle).await;
    assert!(run.next_navigation().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn zero_tick_interval_still_navigates() {
    let config = ControllerConfig {
        tick_interval: Duration::ZERO,
        ..ControllerConfig::default()
    };
    let mut run = spawn_with_config("bob", Duration::ZERO, config);
    run.join(GameMode::Random).await;

    run.channel
        .dispatch(r#"{"type":"random_match_ready","roomId":"r1"}"#);

    let nav = run.next_navigation().await.expect("navigation");
    assert_eq!(nav.to_url(), "/pong?room=r1&mode=random");
    run.wait_for_phase(Phase::Idle).await;
}

#[tokio::test(start_paused = true)]
async fn failed_avatar_lookup_uses_placeholder() {
    let mut run = spawn_controller("bob", Duration::from_millis(100));
    run.join(GameMode::Tournament).await;

    run.channel
        .dispatch(r#"{"type":"tournament_ready","pairings":[["ghost1","bob"]]}"#);
    run.next_navigation().await.expect("navigation");

    let ghost_avatars: Vec<String> = run
        .drain_updates()
        .into_iter()
        .filter_map(|u| match u {
            UiUpdate::View(v) if v.phase == Phase::Countdown => Some(v),
            _ => None,
        })
        .flat_map(|v| v.players)
        .filter(|c| c.username == "ghost1")
        .map(|c| c.avatar_url)
        .collect();
    assert!(!ghost_avatars.is_empty());
    assert!(ghost_avatars.iter().all(|url| url == DEFAULT_PLACEHOLDER_AVATAR));
}

// ---------------------------------------------------------------------------
// Cancellation and robustness
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn cancel_mid_countdown_never_navigates() {
    let mut run = spawn_controller("bob", Duration::from_secs(5));
    run.join(GameMode::Tournament).await;

    run.channel
        .dispatch(r#"{"type":"tournament_ready","pairings":[["alice","bob"]]}"#);
    run.wait_for_phase(Phase::Countdown).await;

    run.handle.cancel().unwrap();
    let idle = run.wait_for_phase(Phase::Idle).await;
    assert!(idle.players.is_empty());
    assert_eq!(run.channel.listener_count(), 0);

    // Well past both the countdown and the slow avatar lookups.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(run.outputs.nav_rx.try_recv().is_err());
    assert!(run.drain_updates().is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancel_then_restart_is_not_disturbed_by_old_session() {
    let mut run = spawn_controller("bob", Duration::ZERO);
    run.join(GameMode::Random).await;
    run.channel
        .dispatch(r#"{"type":"random_match_ready","roomId":"old"}"#);
    run.wait_for_phase(Phase::Countdown).await;

    run.handle.cancel().unwrap();
    run.wait_for_phase(Phase::Idle).await;

    run.join(GameMode::Random).await;
    run.channel
        .dispatch(r#"{"type":"random_match_ready","roomId":"new"}"#);

    let nav = run.next_navigation().await.expect("navigation");
    assert_eq!(nav.room, "new");
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(run.outputs.nav_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn malformed_and_foreign_frames_are_ignored() {
    let mut run = spawn_controller("bob", Duration::ZERO);
    run.join(GameMode::Tournament).await;

    run.channel.dispatch(
        r#"{"type":"tournament_player_joined","current_players":[{"username":"amy"},{"username":"bob"}]}"#,
    );
    let before = run.wait_for_phase(Phase::Waiting).await;
    let before = if before.players.is_empty() {
        run.wait_for_phase(Phase::Waiting).await
    } else {
        before
    };

    for frame in [
        "{not json",
        r#"{"error":"Invalid JSON"}"#,
        r#"{"type":"mystery"}"#,
        r#"{"type":"tournament_ready","pairings":"soon"}"#,
        r#"{"type":"notification","message":"hi"}"#,
        r#"{"type":"tournament_player_joined","current_players":[{"username":"amy"},{"username":"amy"}]}"#,
    ] {
        run.channel.dispatch(frame);
    }
    // A valid frame afterwards proves the loop is still healthy.
    run.channel.dispatch(
        r#"{"type":"tournament_player_joined","current_players":[{"username":"amy"},{"username":"bob"},{"username":"cy"}]}"#,
    );

    let after = run.wait_for_phase(Phase::Waiting).await;
    assert_eq!(names(&before), vec!["amy", "bob"]);
    assert_eq!(names(&after), vec!["amy", "bob", "cy"]);
}

#[tokio::test(start_paused = true)]
async fn other_listeners_survive_the_session() {
    let mut run = spawn_controller("bob", Duration::ZERO);
    let mut presence = run.channel.add_listener();

    run.join(GameMode::Random).await;
    assert_eq!(run.channel.listener_count(), 2);

    run.channel
        .dispatch(r#"{"type":"random_match_ready","roomId":"r1"}"#);
    run.next_navigation().await.expect("navigation");
    run.wait_for_phase(Phase::Idle).await;

    assert_eq!(run.channel.listener_count(), 1);
    run.channel.dispatch("still listening");
    let mut last = None;
    while let Some(event) = presence.try_recv() {
        last = Some(event);
    }
    assert_eq!(
        last,
        Some(lobby_core::channel::ChannelEvent::Message(
            "still listening".into()
        ))
    );
}

#[tokio::test(start_paused = true)]
async fn channel_close_resets_active_session() {
    let mut run = spawn_controller("bob", Duration::ZERO);
    run.join(GameMode::Random).await;
    run.channel
        .dispatch(r#"{"type":"random_match_ready","roomId":"r1"}"#);
    run.wait_for_phase(Phase::Countdown).await;

    run.channel.close();
    run.wait_for_phase(Phase::Idle).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(run.outputs.nav_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn dispose_stops_loop_and_releases_listener() {
    let mut run = spawn_controller("bob", Duration::ZERO);
    run.join(GameMode::Tournament).await;
    assert_eq!(run.channel.listener_count(), 1);

    run.handle.clone().dispose().unwrap();
    run.task.await.unwrap();

    assert_eq!(run.channel.listener_count(), 0);
    assert!(run.handle.start(GameMode::Random).is_err());
}
