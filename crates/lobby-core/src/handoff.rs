// Navigation handoff: the route the router receives once a countdown ends.

use std::fmt;

use thiserror::Error;
use url::form_urlencoded;

use crate::session::{GameMode, Pairing, Session};

/// Route of the game page.
pub const GAME_ROUTE: &str = "/pong";

/// A navigation request for the external router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub route: &'static str,
    pub room: String,
    pub mode: GameMode,
}

impl Navigation {
    /// Render as `/pong?room=<room>&mode=<mode>`, form-encoding the values.
    pub fn to_url(&self) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("room", &self.room)
            .append_pair("mode", self.mode.as_str())
            .finish();
        format!("{}?{}", self.route, query)
    }
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffError {
    #[error("session has no room id")]
    MissingRoom,

    #[error("session has no game mode")]
    MissingMode,
}

/// Build the navigation for a session whose countdown has completed.
pub fn resolve(session: &Session) -> Result<Navigation, HandoffError> {
    let room = session.room_id.clone().ok_or(HandoffError::MissingRoom)?;
    let mode = session.mode.ok_or(HandoffError::MissingMode)?;
    Ok(Navigation {
        route: GAME_ROUTE,
        room,
        mode,
    })
}

/// Room id for a tournament pairing, using the pair exactly as delivered.
pub fn tournament_room_id(pairing: &Pairing) -> String {
    format!("tournament_{}_{}", pairing.first, pairing.second)
}
