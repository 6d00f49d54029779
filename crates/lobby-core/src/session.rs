// Session data model: game mode, lifecycle phase, pairing, and the session
// record the controller mutates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::roster::{Roster, TOURNAMENT_CAPACITY};

/// Matchmaking mode selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Tournament,
    Random,
}

impl GameMode {
    /// Wire and route spelling of the mode.
    pub fn as_str(self) -> &'static str {
        match self {
            GameMode::Tournament => "tournament",
            GameMode::Random => "random",
        }
    }

    /// Roster size limit for lobbies of this mode (`None` = unbounded).
    pub fn roster_capacity(self) -> Option<usize> {
        match self {
            GameMode::Tournament => Some(TOURNAMENT_CAPACITY),
            GameMode::Random => None,
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase of a matchmaking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Phase {
    #[default]
    Idle,
    /// Join request is being queued on the channel.
    Joining,
    /// Joined; waiting for the lobby to fill.
    Waiting,
    /// Tournament lobby is full; waiting for the server's pairings.
    Pairing,
    Countdown,
    Handoff,
    Errored,
}

impl Phase {
    /// Phases in which lobby snapshots and ready events are accepted.
    pub fn is_lobby(self) -> bool {
        matches!(self, Phase::Joining | Phase::Waiting | Phase::Pairing)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Joining => "joining",
            Phase::Waiting => "waiting",
            Phase::Pairing => "pairing",
            Phase::Countdown => "countdown",
            Phase::Handoff => "handoff",
            Phase::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Two usernames grouped by the server, kept in delivered order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub first: String,
    pub second: String,
}

impl Pairing {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Pairing {
            first: first.into(),
            second: second.into(),
        }
    }

    pub fn contains(&self, username: &str) -> bool {
        self.first == username || self.second == username
    }

    /// Two distinct, non-empty usernames.
    pub fn is_valid(&self) -> bool {
        !self.first.is_empty() && !self.second.is_empty() && self.first != self.second
    }

    /// Both usernames, in delivered order.
    pub fn usernames(&self) -> [&str; 2] {
        [&self.first, &self.second]
    }
}

/// The state of one matchmaking attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    /// `None` while idle; set when the user picks a mode.
    pub mode: Option<GameMode>,
    pub phase: Phase,
    pub roster: Roster,
    pub pairing: Option<Pairing>,
    pub room_id: Option<String>,
    /// Last delivered countdown value; only set during `Countdown`.
    pub countdown_value: Option<u8>,
    /// Message of the most recent `Errored` transition, kept after the reset
    /// to `Idle` until the next session starts.
    pub last_error: Option<String>,
}

impl Session {
    /// A fresh session for `mode`, about to send its join request.
    pub fn begin(mode: GameMode) -> Self {
        Session {
            mode: Some(mode),
            phase: Phase::Joining,
            ..Session::default()
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }
}
