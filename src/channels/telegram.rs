use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId, Update,
};
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};

use crate::channels::{InboundEvent, InboundHandler, SendOptions, Sender, SenderError};
use crate::session::MessageRef;

const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Invalid token format: {0}. Check @BotFather (https://t.me/BotFather) for a valid token.")]
    InvalidTokenFormat(String),

    #[error("Telegram API error: {0}")]
    ApiError(String),
}

fn validated_bot(token: &str) -> Result<Bot, TelegramError> {
    if !is_valid_token_format(token) {
        return Err(TelegramError::InvalidTokenFormat(
            "Token must be in format: digits:alphanumeric (e.g., 123456789:ABC...)".to_string(),
        ));
    }
    Ok(Bot::new(token))
}

/// [`Sender`] backed by the Telegram Bot API
#[derive(Clone)]
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(token: &str) -> Result<Self, TelegramError> {
        Ok(Self {
            bot: validated_bot(token)?,
        })
    }

    pub fn from_bot(bot: Bot) -> Self {
        Self { bot }
    }

    fn keyboard(options: &SendOptions) -> Option<InlineKeyboardMarkup> {
        if options.buttons.is_empty() {
            return None;
        }
        let row = options
            .buttons
            .iter()
            .map(|b| InlineKeyboardButton::callback(b.text.clone(), b.data.clone()))
            .collect::<Vec<_>>();
        Some(InlineKeyboardMarkup::new(vec![row]))
    }
}

#[async_trait]
impl Sender for TelegramSender {
    async fn send(
        &self,
        chat_id: i64,
        content: &str,
        options: SendOptions,
    ) -> Result<MessageRef, SenderError> {
        let content = if content.chars().count() > TELEGRAM_MAX_MESSAGE_LENGTH {
            tracing::warn!(
                chat_id = %chat_id,
                original_length = content.len(),
                "Outbound message too long, truncating to {} characters",
                TELEGRAM_MAX_MESSAGE_LENGTH
            );
            content.chars().take(TELEGRAM_MAX_MESSAGE_LENGTH).collect::<String>()
        } else {
            content.to_string()
        };

        let mut request = self.bot.send_message(ChatId(chat_id), content);
        if let Some(markup) = Self::keyboard(&options) {
            request = request.reply_markup(markup);
        }

        match request.await {
            Ok(sent) => {
                tracing::debug!(chat_id = %chat_id, message_id = sent.id.0, "Sent message to Telegram");
                Ok(MessageRef::new(sent.chat.id.0, sent.id.0))
            }
            Err(e) => {
                tracing::error!(chat_id = %chat_id, error = %e, "Failed to send Telegram message");
                Err(SenderError::Send {
                    chat_id,
                    message: e.to_string(),
                })
            }
        }
    }

    async fn delete(&self, message: MessageRef) -> Result<(), SenderError> {
        self.bot
            .delete_message(ChatId(message.chat_id), MessageId(message.message_id))
            .await
            .map(|_| ())
            .map_err(|e| SenderError::Delete {
                chat_id: message.chat_id,
                message_id: message.message_id,
                message: e.to_string(),
            })
    }

    async fn respond_to_callback(&self, callback_id: &str, text: &str) -> Result<(), SenderError> {
        self.bot
            .answer_callback_query(callback_id.to_string())
            .text(text)
            .await
            .map(|_| ())
            .map_err(|e| SenderError::Callback(e.to_string()))
    }

    async fn fetch_file(&self, file_id: &str) -> Result<Bytes, SenderError> {
        let download_error = |message: String| SenderError::Download {
            file_id: file_id.to_string(),
            message,
        };

        let file = self
            .bot
            .get_file(file_id.to_string())
            .await
            .map_err(|e| download_error(e.to_string()))?;

        let mut buf: Vec<u8> = Vec::with_capacity(file.size as usize);
        self.bot
            .download_file(&file.path, &mut buf)
            .await
            .map_err(|e| download_error(e.to_string()))?;

        tracing::debug!(file_id = %file_id, bytes = buf.len(), "Downloaded Telegram file");
        Ok(Bytes::from(buf))
    }
}

/// Parses the command name out of a message text: "/estimate@my_bot now"
/// yields "estimate".
fn command_name(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let command = first.strip_prefix('/')?;
    let command = command.split('@').next().unwrap_or(command);
    if command.is_empty() {
        None
    } else {
        Some(command)
    }
}

/// Converts a Telegram message into an [`InboundEvent`].
///
/// Returns `None` for messages the bot does not react to (plain text, stickers,
/// unknown commands, messages without a sender).
pub fn event_from_message(msg: &Message) -> Option<InboundEvent> {
    let user_id = msg.from.as_ref()?.id.0 as i64;
    let chat_id = msg.chat.id.0;

    if let Some(photos) = msg.photo() {
        // Sizes are ordered smallest first
        let largest = photos.last()?;
        return Some(InboundEvent::Photo {
            user_id,
            chat_id,
            file_id: largest.file.id.to_string(),
        });
    }

    if let Some(document) = msg.document() {
        return Some(InboundEvent::Document {
            user_id,
            chat_id,
            file_id: document.file.id.to_string(),
            mime_type: document.mime_type.as_ref().map(|m| m.essence_str().to_string()),
        });
    }

    match msg.text().and_then(command_name)? {
        "start" => Some(InboundEvent::Start { user_id, chat_id }),
        "estimate" => Some(InboundEvent::Estimate { user_id, chat_id }),
        _ => None,
    }
}

/// Converts a button press into an [`InboundEvent`].
pub fn event_from_callback(query: &CallbackQuery) -> Option<InboundEvent> {
    let chat_id = query.message.as_ref()?.chat().id.0;
    Some(InboundEvent::Callback {
        user_id: query.from.id.0 as i64,
        chat_id,
        callback_id: query.id.to_string(),
        data: query.data.clone().unwrap_or_default(),
    })
}

/// Long-polling Telegram adapter.
///
/// Turns message and callback updates into [`InboundEvent`]s and hands them
/// to an [`InboundHandler`]. Teloxide runs updates of different chats
/// concurrently and updates of one chat in order.
pub struct TelegramChannel {
    bot: Bot,
    shutdown_tx: Arc<RwLock<Option<mpsc::Sender<()>>>>,
}

impl TelegramChannel {
    /// Create a new TelegramChannel with the given bot token.
    ///
    /// Validates token format before creating the bot instance.
    /// Token format should be: "123456789:ABCdefGHIjklMNOpqrsTUVwxyz"
    pub fn new(token: &str) -> Result<Self> {
        Ok(Self {
            bot: validated_bot(token)?,
            shutdown_tx: Arc::new(RwLock::new(None)),
        })
    }

    /// A sender sharing this channel's bot client
    pub fn sender(&self) -> TelegramSender {
        TelegramSender::from_bot(self.bot.clone())
    }

    /// Checks the token against the Bot API and returns the bot's username.
    pub async fn verify(&self) -> Result<String, TelegramError> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| TelegramError::ApiError(e.to_string()))?;
        Ok(me.username().to_string())
    }

    /// Starts polling in a background task and returns immediately.
    pub async fn start(&self, handler: Arc<dyn InboundHandler>) -> Result<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        {
            let mut tx = self.shutdown_tx.write().await;
            *tx = Some(shutdown_tx);
        }

        let bot = self.bot.clone();
        let message_handler = handler.clone();
        let callback_handler = handler;

        tokio::spawn(async move {
            let tree = dptree::entry()
                .branch(Update::filter_message().endpoint(move |msg: Message| {
                    let handler = message_handler.clone();
                    async move {
                        match event_from_message(&msg) {
                            Some(event) => {
                                tracing::info!(
                                    user_id = event.user_id(),
                                    event = event.kind(),
                                    "Received Telegram message"
                                );
                                handler.handle(event).await;
                            }
                            None => {
                                tracing::debug!(chat_id = %msg.chat.id.0, "Ignoring unsupported message");
                            }
                        }
                        Ok::<(), TelegramError>(())
                    }
                }))
                .branch(Update::filter_callback_query().endpoint(move |query: CallbackQuery| {
                    let handler = callback_handler.clone();
                    async move {
                        match event_from_callback(&query) {
                            Some(event) => {
                                tracing::info!(
                                    user_id = event.user_id(),
                                    event = event.kind(),
                                    "Received Telegram callback"
                                );
                                handler.handle(event).await;
                            }
                            None => {
                                tracing::debug!("Ignoring callback without message");
                            }
                        }
                        Ok::<(), TelegramError>(())
                    }
                }));

            let mut dispatcher = Dispatcher::builder(bot, tree)
                .default_handler(|_upd| async move {
                    tracing::debug!("Ignoring unsupported update");
                })
                .build();

            tokio::select! {
                _ = dispatcher.dispatch() => {
                    tracing::info!("Telegram dispatcher stopped");
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Telegram dispatcher received shutdown signal");
                }
            }
        });

        tracing::info!("Telegram channel connected and listening for messages");
        Ok(())
    }

    /// Stops polling. Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(()).await;
            tracing::info!("Telegram channel shutdown signal sent");
        }
    }
}

/// Validates Telegram bot token format.
///
/// Expected format: "123456789:ABCdefGHIjklMNOpqrsTUVwxyz"
/// - Bot ID must be all digits
/// - Must contain exactly one colon separator
/// - Secret part must be non-empty
pub fn is_valid_token_format(token: &str) -> bool {
    let Some((bot_id, secret)) = token.split_once(':') else {
        return false;
    };

    if bot_id.is_empty() || !bot_id.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    !secret.is_empty() && !secret.contains(':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::CallbackButton;

    const TOKEN: &str = "123456789:ABCdefGHIjklMNOpqrsTUVwxyz";

    #[test]
    fn test_valid_token_format() {
        assert!(is_valid_token_format(TOKEN));
        assert!(is_valid_token_format("987654321:xyz123"));
        assert!(is_valid_token_format("1:a"));
    }

    #[test]
    fn test_invalid_token_format() {
        assert!(!is_valid_token_format(""));
        assert!(!is_valid_token_format("invalid"));
        assert!(!is_valid_token_format("abc:def"));
        assert!(!is_valid_token_format("123:"));
        assert!(!is_valid_token_format("123:abc:def"));
        assert!(!is_valid_token_format(":secret"));
        assert!(!is_valid_token_format("123 456:secret"));
    }

    #[test]
    fn test_channel_creation() {
        assert!(TelegramChannel::new(TOKEN).is_ok());
        assert!(TelegramChannel::new("invalid-token").is_err());
        assert!(TelegramSender::new("123:").is_err());
    }

    #[test]
    fn test_command_name() {
        assert_eq!(command_name("/start"), Some("start"));
        assert_eq!(command_name("/estimate@calorie_bot"), Some("estimate"));
        assert_eq!(command_name("  /estimate now"), Some("estimate"));
        assert_eq!(command_name("estimate"), None);
        assert_eq!(command_name("/"), None);
        assert_eq!(command_name(""), None);
    }

    #[test]
    fn test_keyboard() {
        assert!(TelegramSender::keyboard(&SendOptions::default()).is_none());

        let options = SendOptions::with_buttons(vec![
            CallbackButton::re_estimate(),
            CallbackButton::cancel(),
        ]);
        let markup = TelegramSender::keyboard(&options).unwrap();
        assert_eq!(markup.inline_keyboard.len(), 1);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[0][1].text, "Cancel");
    }

    #[test]
    fn test_telegram_error_display() {
        let err = TelegramError::InvalidTokenFormat("test".to_string());
        assert!(err.to_string().contains("Invalid token format"));

        let err = TelegramError::ApiError("API failed".to_string());
        assert!(err.to_string().contains("API error"));
    }
}
