//! The `/estimate` conversation
//!
//! [`EstimateHandler`] reacts to inbound chat events, moves the user's session
//! through its states and talks to the sender, the estimator and (optionally)
//! the log store:
//!
//! ```text
//! Idle --/estimate--> AwaitingImage --image--> Processing --ok--> AwaitingImage
//!                                                         \-err-> Idle
//! any --cancel--> (session deleted)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::channels::{
    CALLBACK_CANCEL, CALLBACK_RE_ESTIMATE, CallbackButton, InboundEvent, InboundHandler,
    SendOptions, Sender, SenderError,
};
use crate::estimator::{Estimator, is_supported_image_type};
use crate::logs::{LogStore, NewLog};
use crate::session::{MessageRef, SessionManager, SessionState};

pub mod messages;

/// MIME type of Telegram photos, which are always re-encoded as JPEG
pub const PHOTO_MIME_TYPE: &str = "image/jpeg";

/// Drives the estimate conversation for every user
pub struct EstimateHandler {
    sessions: SessionManager,
    sender: Arc<dyn Sender>,
    estimator: Arc<dyn Estimator>,
    log_store: Option<Arc<dyn LogStore>>,
}

impl EstimateHandler {
    pub fn new(
        sessions: SessionManager,
        sender: Arc<dyn Sender>,
        estimator: Arc<dyn Estimator>,
    ) -> Self {
        Self {
            sessions,
            sender,
            estimator,
            log_store: None,
        }
    }

    /// Records every successful estimate in `store`
    pub fn with_log_store(mut self, store: Arc<dyn LogStore>) -> Self {
        self.log_store = Some(store);
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Dispatches one event. Errors are failures to deliver a primary reply.
    pub async fn handle_event(&self, event: InboundEvent) -> Result<(), SenderError> {
        match event {
            InboundEvent::Start { user_id, chat_id } => self.handle_start(user_id, chat_id).await,
            InboundEvent::Estimate { user_id, chat_id } => {
                self.handle_estimate(user_id, chat_id).await
            }
            InboundEvent::Photo {
                user_id,
                chat_id,
                file_id,
            } => self.handle_photo(user_id, chat_id, &file_id).await,
            InboundEvent::Document {
                user_id,
                chat_id,
                file_id,
                mime_type,
            } => {
                self.handle_document(user_id, chat_id, &file_id, mime_type.as_deref())
                    .await
            }
            InboundEvent::Callback {
                user_id,
                chat_id,
                callback_id,
                data,
            } => {
                self.handle_callback(user_id, chat_id, &callback_id, &data)
                    .await
            }
        }
    }

    pub async fn handle_start(&self, user_id: i64, chat_id: i64) -> Result<(), SenderError> {
        self.sender
            .send(chat_id, messages::WELCOME, SendOptions::default())
            .await?;
        debug!(user_id = %user_id, "Sent welcome message");
        Ok(())
    }

    /// Prompts for an image and waits for it.
    pub async fn handle_estimate(&self, user_id: i64, chat_id: i64) -> Result<(), SenderError> {
        self.sessions
            .transition(user_id, SessionState::AwaitingImage);
        self.prompt_for_image(user_id, chat_id, messages::PROMPT_IMAGE)
            .await
    }

    pub async fn handle_photo(
        &self,
        user_id: i64,
        chat_id: i64,
        file_id: &str,
    ) -> Result<(), SenderError> {
        if !self.is_awaiting_image(user_id) {
            return Ok(());
        }
        self.process_image(user_id, chat_id, file_id, PHOTO_MIME_TYPE)
            .await
    }

    /// Documents carry the original file, so PNG and WebP survive uncompressed.
    pub async fn handle_document(
        &self,
        user_id: i64,
        chat_id: i64,
        file_id: &str,
        mime_type: Option<&str>,
    ) -> Result<(), SenderError> {
        if !self.is_awaiting_image(user_id) {
            return Ok(());
        }

        let mime_type = match mime_type {
            Some(m) if is_supported_image_type(m) => m,
            other => {
                info!(user_id = %user_id, mime_type = ?other, "Rejected unsupported document");
                self.sender
                    .send(chat_id, messages::UNSUPPORTED_FORMAT, SendOptions::default())
                    .await?;
                return Ok(());
            }
        };

        self.process_image(user_id, chat_id, file_id, mime_type)
            .await
    }

    pub async fn handle_callback(
        &self,
        user_id: i64,
        chat_id: i64,
        callback_id: &str,
        data: &str,
    ) -> Result<(), SenderError> {
        match data {
            CALLBACK_RE_ESTIMATE => self.handle_re_estimate(user_id, chat_id, callback_id).await,
            CALLBACK_CANCEL => self.handle_cancel(user_id, chat_id, callback_id).await,
            _ => {
                warn!(user_id = %user_id, data = %data, "Unknown callback data");
                self.answer_callback(user_id, callback_id, messages::ANSWER_UNKNOWN)
                    .await;
                Ok(())
            }
        }
    }

    /// Keeps the previous result visible and asks for a new image.
    pub async fn handle_re_estimate(
        &self,
        user_id: i64,
        chat_id: i64,
        callback_id: &str,
    ) -> Result<(), SenderError> {
        self.answer_callback(user_id, callback_id, messages::ANSWER_RE_ESTIMATE)
            .await;
        self.sessions
            .transition(user_id, SessionState::AwaitingImage);
        self.prompt_for_image(user_id, chat_id, messages::PROMPT_ANOTHER_IMAGE)
            .await
    }

    pub async fn handle_cancel(
        &self,
        user_id: i64,
        chat_id: i64,
        callback_id: &str,
    ) -> Result<(), SenderError> {
        self.answer_callback(user_id, callback_id, messages::ANSWER_CANCEL)
            .await;
        self.sessions.cancel(user_id);
        self.sender
            .send(chat_id, messages::CANCELED, SendOptions::default())
            .await?;
        info!(user_id = %user_id, "Estimation canceled");
        Ok(())
    }

    fn is_awaiting_image(&self, user_id: i64) -> bool {
        let state = self.sessions.get_or_create_session(user_id).state;
        if state != SessionState::AwaitingImage {
            debug!(user_id = %user_id, state = %state, "Ignoring image outside of estimate flow");
            return false;
        }
        true
    }

    async fn prompt_for_image(
        &self,
        user_id: i64,
        chat_id: i64,
        text: &str,
    ) -> Result<(), SenderError> {
        let sent = self
            .sender
            .send(
                chat_id,
                text,
                SendOptions::with_buttons(vec![CallbackButton::cancel()]),
            )
            .await?;
        self.sessions.attach_message_ref(user_id, sent);
        Ok(())
    }

    async fn process_image(
        &self,
        user_id: i64,
        chat_id: i64,
        file_id: &str,
        mime_type: &str,
    ) -> Result<(), SenderError> {
        self.sessions.transition(user_id, SessionState::Processing);
        info!(user_id = %user_id, mime_type = %mime_type, "Processing food image");

        let processing = match self
            .sender
            .send(chat_id, messages::ANALYZING, SendOptions::default())
            .await
        {
            Ok(message_ref) => Some(message_ref),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to send processing message");
                None
            }
        };

        let image = match self.sender.fetch_file(file_id).await {
            Ok(image) => image,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to download image");
                self.sessions.transition(user_id, SessionState::Idle);
                return self.send_plain(chat_id, messages::DOWNLOAD_FAILED).await;
            }
        };

        let result = match self.estimator.estimate(image, mime_type).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    user_id = %user_id,
                    estimator = self.estimator.name(),
                    transient = e.is_transient(),
                    error = %e,
                    "Calorie estimation failed"
                );
                self.sessions.transition(user_id, SessionState::Idle);
                self.delete_quietly(processing).await;
                return self.send_plain(chat_id, messages::ESTIMATE_FAILED).await;
            }
        };

        if !result.has_food() {
            info!(user_id = %user_id, "No food detected in image");
            self.sessions.transition(user_id, SessionState::Idle);
            self.delete_quietly(processing).await;
            return self.send_plain(chat_id, messages::NO_FOOD).await;
        }

        self.delete_quietly(processing).await;

        let sent = self
            .sender
            .send(
                chat_id,
                &result.format(),
                SendOptions::with_buttons(vec![
                    CallbackButton::re_estimate(),
                    CallbackButton::cancel(),
                ]),
            )
            .await;

        if let Some(store) = &self.log_store {
            match store.create_log(user_id, NewLog::from(&result)).await {
                Ok(entry) => info!(
                    user_id = %user_id,
                    log_id = %entry.id,
                    calories = entry.calories,
                    items = entry.food_items.len(),
                    "Log entry saved"
                ),
                Err(e) => error!(user_id = %user_id, error = %e, "Failed to save log entry"),
            }
        }

        self.sessions
            .transition(user_id, SessionState::AwaitingImage);
        sent.map(|_| ())
    }

    async fn send_plain(&self, chat_id: i64, text: &str) -> Result<(), SenderError> {
        self.sender
            .send(chat_id, text, SendOptions::default())
            .await
            .map(|_| ())
    }

    async fn delete_quietly(&self, message: Option<MessageRef>) {
        let Some(message) = message else {
            return;
        };
        if let Err(e) = self.sender.delete(message).await {
            warn!(error = %e, "Failed to delete processing message");
        }
    }

    async fn answer_callback(&self, user_id: i64, callback_id: &str, text: &str) {
        if let Err(e) = self.sender.respond_to_callback(callback_id, text).await {
            warn!(user_id = %user_id, error = %e, "Failed to answer callback query");
        }
    }
}

#[async_trait]
impl InboundHandler for EstimateHandler {
    async fn handle(&self, event: InboundEvent) {
        let user_id = event.user_id();
        let kind = event.kind();
        if let Err(e) = self.handle_event(event).await {
            error!(user_id = %user_id, event = kind, error = %e, "Failed to handle event");
        }
    }
}
