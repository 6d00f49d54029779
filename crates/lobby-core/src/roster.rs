// Lobby roster: the ordered set of players in the latest membership snapshot.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of players in a tournament lobby.
pub const TOURNAMENT_CAPACITY: usize = 4;

/// A lobby participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Unique key within a roster.
    pub username: String,
    /// Avatar image URL. Empty when the server had none for this player.
    pub avatar_url: String,
}

impl Player {
    pub fn new(username: impl Into<String>, avatar_url: impl Into<String>) -> Self {
        Player {
            username: username.into(),
            avatar_url: avatar_url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("duplicate username `{username}` in snapshot")]
    DuplicateUsername { username: String },

    #[error("snapshot has {len} players, capacity is {capacity}")]
    OverCapacity { len: usize, capacity: usize },
}

/// Ordered collection of lobby players, replaced wholesale per snapshot.
///
/// Order is exactly the snapshot order; the roster never re-sorts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    pub fn new() -> Self {
        Roster::default()
    }

    /// Replace the roster with `snapshot`.
    ///
    /// The snapshot is validated first; on error the roster is left
    /// untouched. Returns `Ok(false)` when the snapshot is identical to the
    /// current contents (nothing to re-render).
    pub fn replace(
        &mut self,
        snapshot: Vec<Player>,
        capacity: Option<usize>,
    ) -> Result<bool, RosterError> {
        if let Some(capacity) = capacity {
            if snapshot.len() > capacity {
                return Err(RosterError::OverCapacity {
                    len: snapshot.len(),
                    capacity,
                });
            }
        }

        for (idx, player) in snapshot.iter().enumerate() {
            if snapshot[..idx].iter().any(|p| p.username == player.username) {
                return Err(RosterError::DuplicateUsername {
                    username: player.username.clone(),
                });
            }
        }

        if self.players == snapshot {
            return Ok(false);
        }
        self.players = snapshot;
        Ok(true)
    }

    /// Update one player's avatar, keyed by username.
    ///
    /// Returns `true` if the player is present and the URL changed.
    pub fn set_avatar(&mut self, username: &str, avatar_url: &str) -> bool {
        match self.players.iter_mut().find(|p| p.username == username) {
            Some(player) if player.avatar_url != avatar_url => {
                player.avatar_url = avatar_url.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, username: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.username == username)
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
