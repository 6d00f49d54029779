// Matchmaking session controller.
//
// Drives one local matchmaking session: sends the join request, consumes push
// events from the shared notification channel, tracks the lobby roster and
// pairing, runs the pre-game countdown, and emits exactly one navigation on
// completion. All state is owned by the controller and mutated only from its
// event loop, one input at a time.
//
// Asynchronous work (countdown ticks, avatar lookups) reports back through an
// internal channel. Every such report carries the session generation it was
// started under; the generation is bumped on every reset, so completions from
// a torn-down session are discarded instead of mutating the next one.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::avatar::{AvatarError, AvatarResolver, DEFAULT_PLACEHOLDER_AVATAR};
use crate::channel::{ChannelError, ChannelEvent, Listener, NotificationChannel};
use crate::countdown::{CountdownSlot, COUNTDOWN_START, DEFAULT_TICK_INTERVAL};
use crate::handoff::{self, Navigation};
use crate::protocol::{self, InboundEvent, MalformedEvent, OutboundMessage};
use crate::roster::{Player, TOURNAMENT_CAPACITY};
use crate::session::{GameMode, Pairing, Phase, Session};
use crate::view::{self, LobbyView};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a {mode} session is already in progress ({phase})")]
    AlreadyActive { mode: String, phase: Phase },

    #[error("no matchmaking session is in progress")]
    NotActive,

    #[error("`{username}` is not part of any tournament pairing")]
    UnresolvedPairing { username: String },

    #[error("server paired `{first}` with `{second}`")]
    InvalidPairing { first: String, second: String },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("session controller has stopped")]
    ControllerStopped,
}

/// The local user, as announced in join requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPlayer {
    pub username: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Time between countdown ticks.
    pub tick_interval: Duration,
    /// Avatar used for players without one and for failed lookups.
    pub placeholder_avatar: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            tick_interval: DEFAULT_TICK_INTERVAL,
            placeholder_avatar: DEFAULT_PLACEHOLDER_AVATAR.to_string(),
        }
    }
}

/// User actions accepted by the controller loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Start(GameMode),
    Cancel,
    /// Cancel any session, remove the channel listener, and stop the loop.
    Dispose,
}

/// Updates pushed to the render layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiUpdate {
    View(LobbyView),
    /// One countdown value, delivered once per tick.
    CountdownTick(u8),
    /// A session-fatal error to surface to the user.
    Error(String),
}

/// Receivers for everything the controller emits.
pub struct SessionOutputs {
    pub ui_rx: mpsc::UnboundedReceiver<UiUpdate>,
    /// Navigation requests for the external router.
    pub nav_rx: mpsc::UnboundedReceiver<Navigation>,
}

/// Command sender and disposer for a running controller.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<UserCommand>,
}

impl SessionHandle {
    pub fn start(&self, mode: GameMode) -> Result<(), SessionError> {
        self.send(UserCommand::Start(mode))
    }

    pub fn cancel(&self) -> Result<(), SessionError> {
        self.send(UserCommand::Cancel)
    }

    /// Tear down: cancel the session, remove the listener, stop the loop.
    pub fn dispose(self) -> Result<(), SessionError> {
        self.send(UserCommand::Dispose)
    }

    pub fn send(&self, cmd: UserCommand) -> Result<(), SessionError> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| SessionError::ControllerStopped)
    }
}

// ---------------------------------------------------------------------------
// Internal completions
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Internal {
    Tick {
        generation: u64,
        value: u8,
    },
    CountdownComplete {
        generation: u64,
    },
    AvatarResolved {
        generation: u64,
        username: String,
        result: Result<String, AvatarError>,
    },
}

impl Internal {
    fn generation(&self) -> u64 {
        match self {
            Internal::Tick { generation, .. }
            | Internal::CountdownComplete { generation }
            | Internal::AvatarResolved { generation, .. } => *generation,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionController
// ---------------------------------------------------------------------------

pub struct SessionController {
    local: LocalPlayer,
    config: ControllerConfig,
    channel: NotificationChannel,
    resolver: Arc<dyn AvatarResolver>,
    session: Session,
    /// Present only while a session is active.
    listener: Option<Listener>,
    countdown: CountdownSlot,
    avatar_tasks: Vec<JoinHandle<()>>,
    /// Bumped on every reset; stale completions are discarded.
    generation: u64,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: mpsc::UnboundedReceiver<Internal>,
    cmd_rx: mpsc::UnboundedReceiver<UserCommand>,
    ui_tx: mpsc::UnboundedSender<UiUpdate>,
    nav_tx: mpsc::UnboundedSender<Navigation>,
}

impl SessionController {
    /// Build a controller. Nothing is registered on the channel until a
    /// session starts.
    pub fn new(
        local: LocalPlayer,
        channel: NotificationChannel,
        resolver: Arc<dyn AvatarResolver>,
        config: ControllerConfig,
    ) -> (Self, SessionHandle, SessionOutputs) {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let (nav_tx, nav_rx) = mpsc::unbounded_channel();

        let controller = SessionController {
            local,
            config,
            channel,
            resolver,
            session: Session::default(),
            listener: None,
            countdown: CountdownSlot::new(),
            avatar_tasks: Vec::new(),
            generation: 0,
            internal_tx,
            internal_rx,
            cmd_rx,
            ui_tx,
            nav_tx,
        };
        (
            controller,
            SessionHandle { cmd_tx },
            SessionOutputs { ui_rx, nav_rx },
        )
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn countdown_active(&self) -> bool {
        self.countdown.is_active()
    }

    // -- user actions ------------------------------------------------------

    /// Join the lobby for `mode`. Requires an idle controller.
    pub fn start(&mut self, mode: GameMode) -> Result<(), SessionError> {
        if !self.session.is_idle() {
            return Err(SessionError::AlreadyActive {
                mode: self
                    .session
                    .mode
                    .map(|m| m.to_string())
                    .unwrap_or_default(),
                phase: self.session.phase,
            });
        }

        self.session = Session::begin(mode);
        // Listen before sending so no reply can slip past.
        if self.listener.is_none() {
            self.listener = Some(self.channel.add_listener());
        }

        let request = OutboundMessage::join(mode, &self.local.username, &self.local.avatar_url);
        if let Err(e) = self.channel.send(&request) {
            warn!("Failed to send {} join request: {}", mode, e);
            self.reset();
            self.publish_view();
            return Err(e.into());
        }

        self.session.phase = Phase::Waiting;
        info!("Joined {} lobby as {}", mode, self.local.username);
        self.publish_view();
        Ok(())
    }

    /// Abandon the session. No navigation happens.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        if self.session.is_idle() {
            return Err(SessionError::NotActive);
        }
        info!(
            "Cancelling {} session in phase {}",
            view::title(self.session.mode),
            self.session.phase
        );
        self.reset();
        self.publish_view();
        Ok(())
    }

    /// Cancel any session and drop the channel listener.
    pub fn dispose(&mut self) {
        if !self.session.is_idle() {
            self.reset();
            self.publish_view();
        }
        self.release_listener();
        self.cmd_rx.close();
        debug!("Session controller disposed");
    }

    // -- channel input -----------------------------------------------------

    /// Handle one event from the controller's channel listener.
    pub fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(text) => match protocol::decode(&text) {
                Ok(Some(event)) => self.on_event(event),
                Ok(None) => debug!("Ignoring non-matchmaking message"),
                Err(e) => warn!("Ignoring malformed channel message: {}", e),
            },
            ChannelEvent::Closed => self.handle_channel_closed(),
        }
    }

    /// Apply one decoded push event.
    pub fn on_event(&mut self, event: InboundEvent) {
        if self.session.is_idle() {
            debug!("No active session, dropping {}", event.kind());
            return;
        }

        match event {
            InboundEvent::TournamentPlayerJoined { players, joined } => {
                if let Some(p) = &joined {
                    debug!("{} joined the tournament lobby", p.username);
                }
                self.apply_snapshot(GameMode::Tournament, players);
            }
            InboundEvent::RandomMatchPlayerJoined { players, joined } => {
                if let Some(p) = &joined {
                    debug!("{} joined the random-match lobby", p.username);
                }
                self.apply_snapshot(GameMode::Random, players);
            }
            InboundEvent::TournamentReady { pairings } => self.handle_tournament_ready(pairings),
            InboundEvent::RandomMatchReady { room_id } => self.handle_random_ready(room_id),
        }
    }

    fn accepts(&self, mode: GameMode, kind: &str) -> bool {
        if self.session.mode != Some(mode) {
            debug!("Ignoring {} during a {} session", kind, view::title(self.session.mode));
            return false;
        }
        if !self.session.phase.is_lobby() {
            debug!("Ignoring {} in phase {}", kind, self.session.phase);
            return false;
        }
        true
    }

    fn apply_snapshot(&mut self, mode: GameMode, players: Vec<Player>) {
        let kind = match mode {
            GameMode::Tournament => "tournament_player_joined",
            GameMode::Random => "random_match_player_joined",
        };
        if !self.accepts(mode, kind) {
            return;
        }

        let players = players
            .into_iter()
            .map(|p| self.with_placeholder(p))
            .collect();

        match self.session.roster.replace(players, mode.roster_capacity()) {
            Ok(true) => {}
            Ok(false) => {
                debug!("Duplicate {} snapshot, roster unchanged", kind);
                return;
            }
            Err(source) => {
                let rejected = MalformedEvent::Roster {
                    kind: kind.to_string(),
                    source,
                };
                warn!("Ignoring malformed channel message: {}", rejected);
                return;
            }
        }

        self.session.phase =
            if mode == GameMode::Tournament && self.session.roster.len() == TOURNAMENT_CAPACITY {
                Phase::Pairing
            } else {
                Phase::Waiting
            };
        debug!(
            "Lobby roster now has {} players ({})",
            self.session.roster.len(),
            self.session.phase
        );
        self.publish_view();
    }

    fn handle_tournament_ready(&mut self, pairings: Vec<Pairing>) {
        if !self.accepts(GameMode::Tournament, "tournament_ready") {
            return;
        }

        let username = self.local.username.clone();
        let Some(pairing) = pairings.into_iter().find(|p| p.contains(&username)) else {
            self.fail(SessionError::UnresolvedPairing { username });
            return;
        };
        if !pairing.is_valid() {
            self.fail(SessionError::InvalidPairing {
                first: pairing.first,
                second: pairing.second,
            });
            return;
        }

        // Show just the two paired players; known avatars are kept until the
        // fresh lookups land.
        let display: Vec<Player> = pairing
            .usernames()
            .iter()
            .map(|name| {
                let known = self
                    .session
                    .roster
                    .get(name)
                    .map(|p| p.avatar_url.clone())
                    .unwrap_or_default();
                self.with_placeholder(Player::new(*name, known))
            })
            .collect();
        if let Err(e) = self.session.roster.replace(display, None) {
            warn!("Ignoring tournament_ready with unusable pairing: {}", e);
            return;
        }

        let room_id = handoff::tournament_room_id(&pairing);
        info!(
            "Paired {} vs {} in room {}",
            pairing.first, pairing.second, room_id
        );
        self.spawn_avatar_lookups(&pairing);
        self.session.pairing = Some(pairing);
        self.session.room_id = Some(room_id);
        self.enter_countdown();
    }

    fn handle_random_ready(&mut self, room_id: String) {
        if !self.accepts(GameMode::Random, "random_match_ready") {
            return;
        }
        info!("Random match ready in room {}", room_id);
        self.session.room_id = Some(room_id);
        self.enter_countdown();
    }

    fn handle_channel_closed(&mut self) {
        // The hub keeps closed listeners registered; release ours.
        self.release_listener();
        if self.session.is_idle() {
            return;
        }
        warn!(
            "Notification channel closed during {} phase, resetting session",
            self.session.phase
        );
        self.reset();
        self.publish_view();
    }

    // -- countdown and handoff ---------------------------------------------

    fn enter_countdown(&mut self) {
        self.session.phase = Phase::Countdown;
        self.session.countdown_value = None;

        let generation = self.generation;
        let tick_tx = self.internal_tx.clone();
        let done_tx = self.internal_tx.clone();
        let replaced = self.countdown.start(
            COUNTDOWN_START,
            self.config.tick_interval,
            move |value| {
                let _ = tick_tx.send(Internal::Tick { generation, value });
            },
            move || {
                let _ = done_tx.send(Internal::CountdownComplete { generation });
            },
        );
        if replaced {
            warn!("Replaced a live countdown");
        }
        self.publish_view();
    }

    fn complete_handoff(&mut self) {
        if self.session.phase != Phase::Countdown {
            debug!("Countdown completed outside countdown phase, ignoring");
            return;
        }

        self.countdown.cancel();
        self.session.phase = Phase::Handoff;
        self.session.countdown_value = None;
        self.publish_view();

        match handoff::resolve(&self.session) {
            Ok(nav) => {
                info!("Handing off to {}", nav);
                if self.nav_tx.send(nav).is_err() {
                    warn!("Router is gone, navigation dropped");
                }
            }
            Err(e) => warn!("Handoff aborted: {}", e),
        }

        self.reset();
        self.publish_view();
    }

    // -- avatars -----------------------------------------------------------

    fn spawn_avatar_lookups(&mut self, pairing: &Pairing) {
        for name in pairing.usernames() {
            let resolver = Arc::clone(&self.resolver);
            let tx = self.internal_tx.clone();
            let generation = self.generation;
            let username = name.to_string();
            self.avatar_tasks.push(tokio::spawn(async move {
                let result = resolver.resolve(&username).await;
                let _ = tx.send(Internal::AvatarResolved {
                    generation,
                    username,
                    result,
                });
            }));
        }
    }

    fn apply_avatar(&mut self, username: String, result: Result<String, AvatarError>) {
        let url = match result {
            Ok(url) if !url.is_empty() => url,
            Ok(_) => self.config.placeholder_avatar.clone(),
            Err(e) => {
                warn!("Using placeholder avatar: {}", e);
                self.config.placeholder_avatar.clone()
            }
        };
        if self.session.roster.set_avatar(&username, &url) {
            self.publish_view();
        }
    }

    // -- internal completions ----------------------------------------------

    fn handle_internal(&mut self, event: Internal) {
        if event.generation() != self.generation {
            debug!(
                "Discarding stale completion (gen {}, current {})",
                event.generation(),
                self.generation
            );
            return;
        }

        match event {
            Internal::Tick { value, .. } => {
                if self.session.phase != Phase::Countdown {
                    return;
                }
                self.session.countdown_value = Some(value);
                let _ = self.ui_tx.send(UiUpdate::CountdownTick(value));
                self.publish_view();
            }
            Internal::CountdownComplete { .. } => self.complete_handoff(),
            Internal::AvatarResolved {
                username, result, ..
            } => self.apply_avatar(username, result),
        }
    }

    // -- lifecycle helpers -------------------------------------------------

    /// Surface a session-fatal error, then return to idle.
    fn fail(&mut self, error: SessionError) {
        let message = error.to_string();
        warn!("Matchmaking session failed: {}", message);

        self.countdown.cancel();
        self.abort_avatar_lookups();
        self.session.phase = Phase::Errored;
        self.session.last_error = Some(message.clone());
        self.publish_view();
        let _ = self.ui_tx.send(UiUpdate::Error(message.clone()));

        self.reset();
        self.session.last_error = Some(message);
        self.publish_view();
    }

    /// Tear the session down to idle: stop the countdown, discard avatar
    /// lookups, remove the listener, and invalidate outstanding completions.
    fn reset(&mut self) {
        self.countdown.cancel();
        self.abort_avatar_lookups();
        self.release_listener();
        self.generation += 1;
        self.session = Session::default();
    }

    fn abort_avatar_lookups(&mut self) {
        for task in self.avatar_tasks.drain(..) {
            task.abort();
        }
    }

    fn release_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.channel.remove_listener(listener.id());
        }
    }

    fn with_placeholder(&self, mut player: Player) -> Player {
        if player.avatar_url.is_empty() {
            player.avatar_url = self.config.placeholder_avatar.clone();
        }
        player
    }

    fn publish_view(&self) {
        let _ = self.ui_tx.send(UiUpdate::View(view::project(&self.session)));
    }

    // -- event loop --------------------------------------------------------

    /// Run the controller until disposed or every handle is dropped.
    ///
    /// Listens on three inputs with `tokio::select!`:
    /// 1. User commands from [`SessionHandle`]s
    /// 2. The controller's own channel listener (only while a session is active)
    /// 3. Internal completions (countdown ticks, avatar lookups)
    pub async fn run(mut self) {
        info!("Session controller started for {}", self.local.username);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(UserCommand::Start(mode)) => {
                            if let Err(e) = self.start(mode) {
                                warn!("Cannot start {} session: {}", mode, e);
                            }
                        }
                        Some(UserCommand::Cancel) => {
                            if let Err(e) = self.cancel() {
                                debug!("Cancel ignored: {}", e);
                            }
                        }
                        Some(UserCommand::Dispose) | None => {
                            self.dispose();
                            break;
                        }
                    }
                }

                event = next_channel_event(&mut self.listener) => {
                    self.handle_channel_event(event);
                }

                Some(internal) = self.internal_rx.recv() => {
                    self.handle_internal(internal);
                }
            }
        }

        info!("Session controller stopped");
    }
}

/// Next event from the listener, pending forever while none is registered.
async fn next_channel_event(listener: &mut Option<Listener>) -> ChannelEvent {
    match listener {
        Some(listener) => listener.recv().await.unwrap_or(ChannelEvent::Closed),
        None => std::future::pending().await,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
