//! In-memory [`Sender`] that records everything it is asked to do

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;

use crate::channels::{CallbackButton, SendOptions, Sender, SenderError};
use crate::session::MessageRef;

/// A message captured by [`RecordingSender`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message_ref: MessageRef,
    pub content: String,
    pub buttons: Vec<CallbackButton>,
}

#[derive(Debug, Default)]
struct Recorded {
    next_message_id: i32,
    messages: Vec<SentMessage>,
    deleted: Vec<MessageRef>,
    callback_answers: Vec<(String, String)>,
    fetched: Vec<String>,
    file: Option<Bytes>,
    fail_fetch: bool,
    fail_send: bool,
    fail_send_at: Option<usize>,
    send_attempts: usize,
    fail_delete: bool,
    fail_callback: bool,
}

/// Sender double for tests and dry runs.
///
/// Message ids start at 1 and increase per send. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSender {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bytes returned by `fetch_file` (defaults to a small placeholder)
    pub fn set_file(&self, bytes: Bytes) {
        self.recorded().file = Some(bytes);
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.recorded().fail_fetch = fail;
    }

    pub fn fail_send(&self, fail: bool) {
        self.recorded().fail_send = fail;
    }

    /// Fails only the `attempt`-th send (1-based, counting every call)
    pub fn fail_send_at(&self, attempt: usize) {
        self.recorded().fail_send_at = Some(attempt);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.recorded().fail_delete = fail;
    }

    pub fn fail_callback(&self, fail: bool) {
        self.recorded().fail_callback = fail;
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.recorded().messages.clone()
    }

    pub fn last_message(&self) -> Option<SentMessage> {
        self.recorded().messages.last().cloned()
    }

    /// Contents of every message sent so far, in order
    pub fn texts(&self) -> Vec<String> {
        self.recorded()
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.recorded().deleted.clone()
    }

    /// `(callback_id, text)` pairs in answer order
    pub fn callback_answers(&self) -> Vec<(String, String)> {
        self.recorded().callback_answers.clone()
    }

    pub fn fetched_files(&self) -> Vec<String> {
        self.recorded().fetched.clone()
    }
}

#[async_trait]
impl Sender for RecordingSender {
    async fn send(
        &self,
        chat_id: i64,
        content: &str,
        options: SendOptions,
    ) -> Result<MessageRef, SenderError> {
        let mut recorded = self.recorded();
        recorded.send_attempts += 1;
        if recorded.fail_send || recorded.fail_send_at == Some(recorded.send_attempts) {
            return Err(SenderError::Send {
                chat_id,
                message: "send disabled".to_string(),
            });
        }

        recorded.next_message_id += 1;
        let message_ref = MessageRef::new(chat_id, recorded.next_message_id);
        recorded.messages.push(SentMessage {
            message_ref,
            content: content.to_string(),
            buttons: options.buttons,
        });
        Ok(message_ref)
    }

    async fn delete(&self, message: MessageRef) -> Result<(), SenderError> {
        let mut recorded = self.recorded();
        if recorded.fail_delete {
            return Err(SenderError::Delete {
                chat_id: message.chat_id,
                message_id: message.message_id,
                message: "delete disabled".to_string(),
            });
        }
        recorded.deleted.push(message);
        Ok(())
    }

    async fn respond_to_callback(&self, callback_id: &str, text: &str) -> Result<(), SenderError> {
        let mut recorded = self.recorded();
        if recorded.fail_callback {
            return Err(SenderError::Callback("callback answers disabled".to_string()));
        }
        recorded
            .callback_answers
            .push((callback_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn fetch_file(&self, file_id: &str) -> Result<Bytes, SenderError> {
        let mut recorded = self.recorded();
        recorded.fetched.push(file_id.to_string());
        if recorded.fail_fetch {
            return Err(SenderError::Download {
                file_id: file_id.to_string(),
                message: "download disabled".to_string(),
            });
        }
        Ok(recorded
            .file
            .clone()
            .unwrap_or_else(|| Bytes::from_static(b"\xff\xd8\xff\xe0fake-jpeg")))
    }
}
