// Pure projection of a session onto the lobby view model. Renderers paint
// `LobbyView` values; they never look at `Session` directly.

use crate::roster::TOURNAMENT_CAPACITY;
use crate::session::{GameMode, Phase, Session};

/// One player card in the lobby modal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCard {
    pub username: String,
    pub avatar_url: String,
}

/// Immutable snapshot of what the lobby UI should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbyView {
    pub phase: Phase,
    pub title: String,
    pub players: Vec<PlayerCard>,
    pub footer: Option<String>,
    pub countdown: Option<u8>,
}

pub fn title(mode: Option<GameMode>) -> &'static str {
    match mode {
        Some(GameMode::Tournament) => "Tournament Mode",
        Some(GameMode::Random) => "Random Match",
        None => "",
    }
}

/// Map a session to its view. Player order is roster order.
pub fn project(session: &Session) -> LobbyView {
    let players = session
        .roster
        .players()
        .iter()
        .map(|p| PlayerCard {
            username: p.username.clone(),
            avatar_url: p.avatar_url.clone(),
        })
        .collect();

    LobbyView {
        phase: session.phase,
        title: title(session.mode).to_string(),
        players,
        footer: footer(session),
        countdown: session.countdown_value,
    }
}

fn footer(session: &Session) -> Option<String> {
    match session.phase {
        Phase::Idle => session.last_error.clone(),
        Phase::Joining => Some("Joining lobby...".to_string()),
        Phase::Waiting | Phase::Pairing => match session.mode {
            Some(GameMode::Tournament) => {
                let missing = TOURNAMENT_CAPACITY.saturating_sub(session.roster.len());
                Some(match missing {
                    0 => "All players joined.".to_string(),
                    1 => "Waiting for 1 more player.".to_string(),
                    n => format!("Waiting for {n} more players."),
                })
            }
            _ => Some("Looking for an opponent...".to_string()),
        },
        Phase::Countdown => Some(match session.countdown_value {
            Some(n) => format!("Game starts in {n} seconds"),
            None => "Match found!".to_string(),
        }),
        Phase::Handoff => Some("Starting game...".to_string()),
        Phase::Errored => session.last_error.clone(),
    }
}
