// Avatar lookup against the user-info HTTP endpoint.

use async_trait::async_trait;
use lobby_core::avatar::{AvatarError, AvatarResolver};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// `{username}` as it appears in a parsed URL path.
const PLACEHOLDER_SEGMENT: &str = "%7Busername%7D";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("invalid URL: {0}")]
    Parse(#[from] url::ParseError),

    #[error("the last path segment must be `{{username}}`")]
    MissingPlaceholder,
}

/// A user-info URL template such as `http://host/api/users/{username}/`.
///
/// The placeholder must be the last path segment (a trailing slash is kept).
/// Usernames are pushed as a single path segment, so reserved characters
/// including `/` are percent-encoded.
#[derive(Debug, Clone)]
pub struct UserInfoUrl {
    base: Url,
    trailing_slash: bool,
}

impl UserInfoUrl {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut base = Url::parse(template)?;

        let (trailing_slash, ends_with_placeholder) = {
            let mut segments: Vec<&str> = base
                .path_segments()
                .ok_or(TemplateError::MissingPlaceholder)?
                .collect();
            let trailing_slash = segments.last() == Some(&"");
            if trailing_slash {
                segments.pop();
            }
            (trailing_slash, segments.last() == Some(&PLACEHOLDER_SEGMENT))
        };
        if !ends_with_placeholder {
            return Err(TemplateError::MissingPlaceholder);
        }

        base.path_segments_mut()
            .map_err(|()| TemplateError::MissingPlaceholder)?
            .pop_if_empty()
            .pop();
        Ok(UserInfoUrl {
            base,
            trailing_slash,
        })
    }

    pub fn for_user(&self, username: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(username);
            if self.trailing_slash {
                segments.push("");
            }
        }
        url
    }
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    avatar_url: Option<String>,
}

/// Resolves avatars with `GET <template>` and reads `avatar_url` from the
/// JSON body.
pub struct HttpAvatarResolver {
    http: reqwest::Client,
    url: UserInfoUrl,
}

impl HttpAvatarResolver {
    pub fn new(url_template: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            http: reqwest::Client::new(),
            url: UserInfoUrl::parse(url_template)?,
        })
    }

    pub fn url_for(&self, username: &str) -> Url {
        self.url.for_user(username)
    }
}

/// A null, empty or absent `avatar_url` counts as missing.
fn avatar_from(username: &str, info: UserInfo) -> Result<String, AvatarError> {
    info.avatar_url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| AvatarError::Missing {
            username: username.to_string(),
        })
}

#[async_trait]
impl AvatarResolver for HttpAvatarResolver {
    async fn resolve(&self, username: &str) -> Result<String, AvatarError> {
        let url = self.url_for(username);
        debug!("Resolving avatar for {username} via {url}");

        let lookup_error = |message: String| AvatarError::Lookup {
            username: username.to_string(),
            message,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| lookup_error(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AvatarError::NotFound {
                username: username.to_string(),
            });
        }
        if !status.is_success() {
            return Err(lookup_error(format!("HTTP {status}")));
        }

        let info = response
            .json::<UserInfo>()
            .await
            .map_err(|e| lookup_error(format!("invalid user-info body: {e}")))?;
        avatar_from(username, info)
    }
}
