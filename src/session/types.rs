use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a user in the `/estimate` conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No active flow. Initial state of every session.
    #[default]
    Idle,
    /// The bot prompted for a food image and is waiting for one.
    AwaitingImage,
    /// An image was received and is being estimated.
    Processing,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingImage => "awaiting_image",
            SessionState::Processing => "processing",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to a message the bot sent.
///
/// Carries the chat it lives in so the transport can delete it later
/// without any other context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i32,
}

impl MessageRef {
    pub fn new(chat_id: i64, message_id: i32) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

/// Per-user conversation record.
///
/// Values handed out by the store are snapshots: mutating one has no effect
/// until it is written back through the session manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: i64,
    pub state: SessionState,
    pub last_activity: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_message_ref: Option<MessageRef>,
}

impl Session {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            state: SessionState::Idle,
            last_activity: Utc::now(),
            pending_message_ref: None,
        }
    }

    /// Moves `last_activity` forward to `now`, never backwards.
    ///
    /// Wall-clock adjustments can make `now` earlier than the stored value;
    /// the timestamp is kept non-decreasing in that case.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity {
            self.last_activity = now;
        }
    }
}
