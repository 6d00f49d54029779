// Avatar lookup seam. The controller resolves avatars for paired players
// through this trait; implementations may fail per player.

use async_trait::async_trait;
use thiserror::Error;

/// Avatar shown when a player has none or the lookup fails.
pub const DEFAULT_PLACEHOLDER_AVATAR: &str = "/static/assets/default-avatar.png";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AvatarError {
    #[error("user `{username}` not found")]
    NotFound { username: String },

    #[error("user `{username}` has no avatar")]
    Missing { username: String },

    #[error("avatar lookup for `{username}` failed: {message}")]
    Lookup { username: String, message: String },
}

/// Asynchronous `username -> avatar URL` lookup.
#[async_trait]
pub trait AvatarResolver: Send + Sync {
    async fn resolve(&self, username: &str) -> Result<String, AvatarError>;
}

/// Resolver that always answers with the same URL. Used when no user-info
/// service is configured.
#[derive(Debug, Clone)]
pub struct FixedAvatarResolver {
    url: String,
}

impl FixedAvatarResolver {
    pub fn new(url: impl Into<String>) -> Self {
        FixedAvatarResolver { url: url.into() }
    }
}

#[async_trait]
impl AvatarResolver for FixedAvatarResolver {
    async fn resolve(&self, _username: &str) -> Result<String, AvatarError> {
        Ok(self.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_resolver_answers_everyone() {
        let resolver = FixedAvatarResolver::new(DEFAULT_PLACEHOLDER_AVATAR);
        assert_eq!(
            resolver.resolve("anyone").await.unwrap(),
            DEFAULT_PLACEHOLDER_AVATAR
        );
    }

    #[test]
    fn error_messages_name_the_player() {
        let err = AvatarError::Lookup {
            username: "bob".into(),
            message: "timeout".into(),
        };
        assert_eq!(err.to_string(), "avatar lookup for `bob` failed: timeout");
    }
}
