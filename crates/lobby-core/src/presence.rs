// Online-user presence tracker.
//
// Shares the notification channel with the matchmaking controller through its
// own listener, tracking the server's `user_status_update` broadcasts.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::channel::{ChannelError, ChannelEvent, Listener, NotificationChannel};
use crate::protocol::OutboundMessage;

#[derive(Debug, Deserialize)]
struct StatusUpdate {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    online_users: Vec<String>,
}

/// Extract the online-user list from a raw frame, if it is a status update.
pub fn decode_status_update(text: &str) -> Option<Vec<String>> {
    let update: StatusUpdate = serde_json::from_str(text).ok()?;
    (update.kind == "user_status_update").then_some(update.online_users)
}

pub struct PresenceTracker {
    channel: NotificationChannel,
    listener: Option<Listener>,
    online: Vec<String>,
    updated_at: Option<DateTime<Utc>>,
}

impl PresenceTracker {
    /// Register a listener on `channel` and start tracking.
    pub fn attach(channel: NotificationChannel) -> Self {
        let listener = channel.add_listener();
        PresenceTracker {
            channel,
            listener: Some(listener),
            online: Vec::new(),
            updated_at: None,
        }
    }

    /// Ask the server for the current online-user list.
    pub fn request_update(&self) -> Result<(), ChannelError> {
        self.channel.send(&OutboundMessage::GetOnlineUsers)
    }

    /// Apply a raw frame. Returns `true` if it was a status update.
    pub fn apply(&mut self, text: &str) -> bool {
        match decode_status_update(text) {
            Some(mut users) => {
                users.sort();
                users.dedup();
                debug!(count = users.len(), "Online users updated");
                self.online = users;
                self.updated_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Wait for the next status update. Returns `None` once the channel
    /// closes or the tracker was detached.
    pub async fn next_update(&mut self) -> Option<&[String]> {
        loop {
            let event = self.listener.as_mut()?.recv().await;
            match event {
                Some(ChannelEvent::Message(text)) => {
                    if self.apply(&text) {
                        return Some(&self.online);
                    }
                }
                Some(ChannelEvent::Closed) | None => {
                    self.detach();
                    return None;
                }
            }
        }
    }

    /// Remove this tracker's listener from the channel.
    pub fn detach(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.channel.remove_listener(listener.id());
        }
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.online.iter().any(|u| u == username)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_only_status_updates() {
        assert_eq!(
            decode_status_update(r#"{"type":"user_status_update","online_users":["b","a"]}"#),
            Some(vec!["b".to_string(), "a".to_string()])
        );
        assert_eq!(
            decode_status_update(r#"{"type":"random_match_ready","roomId":"r"}"#),
            None
        );
        assert_eq!(decode_status_update("nope"), None);
    }

    #[tokio::test]
    async fn tracks_updates_and_ignores_other_traffic() {
        let (channel, _out) = NotificationChannel::new();
        let mut tracker = PresenceTracker::attach(channel.clone());

        channel.dispatch(r#"{"type":"random_match_ready","roomId":"r"}"#);
        channel.dispatch(r#"{"type":"user_status_update","online_users":["zed","amy","zed"]}"#);

        let users = tracker.next_update().await.unwrap().to_vec();
        assert_eq!(users, vec!["amy", "zed"]);
        assert!(tracker.is_online("amy"));
        assert!(tracker.updated_at().is_some());
    }

    #[tokio::test]
    async fn request_update_sends_query() {
        let (channel, mut out) = NotificationChannel::new();
        let tracker = PresenceTracker::attach(channel);
        tracker.request_update().unwrap();
        assert_eq!(out.recv().await.unwrap(), r#"{"type":"get_online_users"}"#);
    }

    #[tokio::test]
    async fn close_ends_tracking_and_detaches() {
        let (channel, _out) = NotificationChannel::new();
        let mut tracker = PresenceTracker::attach(channel.clone());
        assert_eq!(channel.listener_count(), 1);

        channel.close();
        assert!(tracker.next_update().await.is_none());
        assert_eq!(channel.listener_count(), 0);
    }

    #[tokio::test]
    async fn drop_detaches() {
        let (channel, _out) = NotificationChannel::new();
        drop(PresenceTracker::attach(channel.clone()));
        assert_eq!(channel.listener_count(), 0);
    }
}
