use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::session::MessageRef;

pub mod mock;
pub mod telegram;

pub use mock::{RecordingSender, SentMessage};
pub use telegram::{TelegramChannel, TelegramError, TelegramSender};

/// Callback data carried by the "Re-estimate" button
pub const CALLBACK_RE_ESTIMATE: &str = "re_estimate";
/// Callback data carried by the "Cancel" button
pub const CALLBACK_CANCEL: &str = "cancel";

/// Errors reported by a [`Sender`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SenderError {
    #[error("Failed to send message to chat {chat_id}: {message}")]
    Send { chat_id: i64, message: String },

    #[error("Failed to delete message {message_id} in chat {chat_id}: {message}")]
    Delete {
        chat_id: i64,
        message_id: i32,
        message: String,
    },

    #[error("Failed to answer callback query: {0}")]
    Callback(String),

    #[error("Failed to download file {file_id}: {message}")]
    Download { file_id: String, message: String },
}

/// An inline keyboard button that reports `data` back as a callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackButton {
    pub text: String,
    pub data: String,
}

impl CallbackButton {
    pub fn new(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: data.into(),
        }
    }

    pub fn cancel() -> Self {
        Self::new("Cancel", CALLBACK_CANCEL)
    }

    pub fn re_estimate() -> Self {
        Self::new("Re-estimate", CALLBACK_RE_ESTIMATE)
    }
}

/// Per-message delivery options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Buttons rendered on a single row under the message
    pub buttons: Vec<CallbackButton>,
}

impl SendOptions {
    pub fn with_buttons(buttons: Vec<CallbackButton>) -> Self {
        Self { buttons }
    }
}

/// Outbound side of a chat platform.
///
/// The conversation handler talks to users only through this trait, so the
/// Telegram adapter and the in-memory recorder are interchangeable.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Sends `content` to `chat_id` and returns a reference to the new message.
    async fn send(
        &self,
        chat_id: i64,
        content: &str,
        options: SendOptions,
    ) -> Result<MessageRef, SenderError>;

    /// Deletes a previously sent message.
    async fn delete(&self, message: MessageRef) -> Result<(), SenderError>;

    /// Acknowledges a button press with a short notification text.
    async fn respond_to_callback(&self, callback_id: &str, text: &str) -> Result<(), SenderError>;

    /// Downloads an uploaded file by its platform file id.
    async fn fetch_file(&self, file_id: &str) -> Result<Bytes, SenderError>;
}

/// Something a user did in the chat, already stripped of platform types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// `/start`
    Start { user_id: i64, chat_id: i64 },
    /// `/estimate`
    Estimate { user_id: i64, chat_id: i64 },
    /// A compressed photo; `file_id` refers to the largest available size
    Photo {
        user_id: i64,
        chat_id: i64,
        file_id: String,
    },
    /// A file sent as a document; the MIME type is whatever the client declared
    Document {
        user_id: i64,
        chat_id: i64,
        file_id: String,
        mime_type: Option<String>,
    },
    /// An inline keyboard button press
    Callback {
        user_id: i64,
        chat_id: i64,
        callback_id: String,
        data: String,
    },
}

impl InboundEvent {
    pub fn user_id(&self) -> i64 {
        match self {
            InboundEvent::Start { user_id, .. }
            | InboundEvent::Estimate { user_id, .. }
            | InboundEvent::Photo { user_id, .. }
            | InboundEvent::Document { user_id, .. }
            | InboundEvent::Callback { user_id, .. } => *user_id,
        }
    }

    pub fn chat_id(&self) -> i64 {
        match self {
            InboundEvent::Start { chat_id, .. }
            | InboundEvent::Estimate { chat_id, .. }
            | InboundEvent::Photo { chat_id, .. }
            | InboundEvent::Document { chat_id, .. }
            | InboundEvent::Callback { chat_id, .. } => *chat_id,
        }
    }

    /// Event name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Start { .. } => "start",
            InboundEvent::Estimate { .. } => "estimate",
            InboundEvent::Photo { .. } => "photo",
            InboundEvent::Document { .. } => "document",
            InboundEvent::Callback { .. } => "callback",
        }
    }
}

/// Consumer of inbound events.
///
/// A channel calls `handle` once per update; different users may be handled
/// concurrently.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn handle(&self, event: InboundEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let event = InboundEvent::Callback {
            user_id: 7,
            chat_id: 70,
            callback_id: "cb".to_string(),
            data: CALLBACK_CANCEL.to_string(),
        };
        assert_eq!(event.user_id(), 7);
        assert_eq!(event.chat_id(), 70);
        assert_eq!(event.kind(), "callback");

        let event = InboundEvent::Photo {
            user_id: 1,
            chat_id: 2,
            file_id: "f".to_string(),
        };
        assert_eq!(event.kind(), "photo");
    }

    #[test]
    fn test_standard_buttons() {
        assert_eq!(CallbackButton::cancel(), CallbackButton::new("Cancel", "cancel"));
        assert_eq!(CallbackButton::re_estimate().data, "re_estimate");
        assert!(SendOptions::default().buttons.is_empty());
    }

    #[test]
    fn test_sender_error_display() {
        let err = SenderError::Download {
            file_id: "abc".to_string(),
            message: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to download file abc: timeout");

        let err = SenderError::Send {
            chat_id: 5,
            message: "blocked".to_string(),
        };
        assert!(err.to_string().contains("chat 5"));
    }
}
