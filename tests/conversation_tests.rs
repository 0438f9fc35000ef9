use std::sync::Arc;
use std::time::Duration;

use calorie_bot::channels::{
    CALLBACK_CANCEL, CALLBACK_RE_ESTIMATE, InboundEvent, InboundHandler, RecordingSender,
};
use calorie_bot::conversation::{EstimateHandler, messages};
use calorie_bot::estimator::{Confidence, EstimateError, EstimateResult, MockEstimator};
use calorie_bot::logs::{LogStore, MemoryLogStore};
use calorie_bot::session::{SessionManager, SessionState};

const USER: i64 = 123_456;
const CHAT: i64 = 123_456;

struct Bot {
    handler: Arc<EstimateHandler>,
    sender: RecordingSender,
    estimator: MockEstimator,
    logs: MemoryLogStore,
}

impl Bot {
    fn new() -> Self {
        let sender = RecordingSender::new();
        let estimator = MockEstimator::new();
        let logs = MemoryLogStore::new();
        let handler = EstimateHandler::new(
            SessionManager::new(),
            Arc::new(sender.clone()),
            Arc::new(estimator.clone()),
        )
        .with_log_store(Arc::new(logs.clone()));

        Self {
            handler: Arc::new(handler),
            sender,
            estimator,
            logs,
        }
    }

    async fn estimate_command(&self) {
        self.handler
            .handle(InboundEvent::Estimate {
                user_id: USER,
                chat_id: CHAT,
            })
            .await;
    }

    async fn photo(&self) {
        self.handler
            .handle(InboundEvent::Photo {
                user_id: USER,
                chat_id: CHAT,
                file_id: "photo-file".to_string(),
            })
            .await;
    }

    async fn press(&self, data: &str) {
        self.handler
            .handle(InboundEvent::Callback {
                user_id: USER,
                chat_id: CHAT,
                callback_id: format!("cb-{}", data),
                data: data.to_string(),
            })
            .await;
    }

    fn state(&self) -> SessionState {
        self.handler.sessions().get_or_create_session(USER).state
    }
}

#[tokio::test]
async fn test_full_estimate_flow_records_log() {
    let bot = Bot::new();
    bot.estimator.set_result(EstimateResult::new(
        450,
        Confidence::High,
        vec!["Chicken".to_string(), "Rice".to_string()],
    ));

    bot.estimate_command().await;
    assert_eq!(bot.state(), SessionState::AwaitingImage);

    bot.photo().await;
    assert_eq!(bot.state(), SessionState::AwaitingImage);

    let result = bot.sender.last_message().unwrap();
    assert!(result.content.contains("450 kcal"));
    assert!(result.content.contains("Confidence: High"));
    assert!(result.content.contains("Chicken, Rice"));

    let logs = bot.logs.list_logs(USER).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].user_id, USER);
    assert_eq!(logs[0].calories, 450);
    assert_eq!(logs[0].confidence, Confidence::High);
    assert_eq!(logs[0].food_items, vec!["Chicken", "Rice"]);
}

#[tokio::test]
async fn test_cancel_while_awaiting_image() {
    let bot = Bot::new();
    bot.estimate_command().await;
    bot.press(CALLBACK_CANCEL).await;

    assert_eq!(bot.handler.sessions().session_count(), 0);
    let session = bot.handler.sessions().get_or_create_session(USER);
    assert_eq!(session.state, SessionState::Idle);
    assert!(session.pending_message_ref.is_none());

    assert_eq!(bot.sender.last_message().unwrap().content, messages::CANCELED);
    assert!(bot.logs.list_logs(USER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_estimator_failure_reports_fixed_message() {
    let bot = Bot::new();
    bot.estimator
        .set_error(EstimateError::network("connection reset"));

    bot.estimate_command().await;
    bot.photo().await;

    assert_eq!(bot.state(), SessionState::Idle);
    assert_eq!(
        bot.sender.last_message().unwrap().content,
        messages::ESTIMATE_FAILED
    );
    assert!(bot.logs.list_logs(USER).await.unwrap().is_empty());

    // A later photo is ignored until /estimate is sent again
    bot.photo().await;
    assert_eq!(bot.estimator.call_count(), 1);
}

#[tokio::test]
async fn test_re_estimate_records_second_log() {
    let bot = Bot::new();
    bot.estimate_command().await;
    bot.photo().await;

    bot.press(CALLBACK_RE_ESTIMATE).await;
    assert_eq!(
        bot.sender.last_message().unwrap().content,
        messages::PROMPT_ANOTHER_IMAGE
    );

    bot.estimator.set_result(EstimateResult::new(
        300,
        Confidence::Medium,
        vec!["Salad".to_string()],
    ));
    bot.photo().await;

    let logs = bot.logs.list_logs(USER).await.unwrap();
    assert_eq!(logs.len(), 2);
    let mut calories: Vec<i64> = logs.iter().map(|l| l.calories).collect();
    calories.sort();
    assert_eq!(calories, vec![300, 500]);
}

#[tokio::test]
async fn test_image_ignored_while_processing() {
    let bot = Bot::new();
    bot.estimator.set_delay(Duration::from_millis(200));
    bot.estimate_command().await;

    let first = {
        let handler = Arc::clone(&bot.handler);
        tokio::spawn(async move {
            handler
                .handle(InboundEvent::Photo {
                    user_id: USER,
                    chat_id: CHAT,
                    file_id: "first".to_string(),
                })
                .await;
        })
    };

    // Wait until the first image moved the session to Processing
    while bot.state() != SessionState::Processing {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    bot.photo().await;

    first.await.unwrap();
    assert_eq!(bot.estimator.call_count(), 1);
    assert_eq!(bot.sender.fetched_files(), vec!["first"]);
    assert_eq!(bot.state(), SessionState::AwaitingImage);
}

#[tokio::test]
async fn test_users_are_independent() {
    let bot = Bot::new();
    bot.estimate_command().await;

    bot.handler
        .handle(InboundEvent::Photo {
            user_id: 999,
            chat_id: 999,
            file_id: "other".to_string(),
        })
        .await;

    assert_eq!(bot.estimator.call_count(), 0);
    assert_eq!(bot.state(), SessionState::AwaitingImage);
    assert_eq!(
        bot.handler.sessions().get_or_create_session(999).state,
        SessionState::Idle
    );
}

#[tokio::test]
async fn test_unsupported_document_keeps_waiting() {
    let bot = Bot::new();
    bot.estimate_command().await;

    bot.handler
        .handle(InboundEvent::Document {
            user_id: USER,
            chat_id: CHAT,
            file_id: "doc".to_string(),
            mime_type: Some("application/pdf".to_string()),
        })
        .await;

    assert_eq!(
        bot.sender.last_message().unwrap().content,
        messages::UNSUPPORTED_FORMAT
    );
    assert_eq!(bot.state(), SessionState::AwaitingImage);

    bot.photo().await;
    assert_eq!(bot.logs.list_logs(USER).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_delete_does_not_stop_flow() {
    let bot = Bot::new();
    bot.sender.fail_delete(true);

    bot.estimate_command().await;
    bot.photo().await;

    assert_eq!(bot.state(), SessionState::AwaitingImage);
    assert!(bot.sender.deleted().is_empty());
    assert!(bot.sender.last_message().unwrap().content.contains("500 kcal"));
    assert_eq!(bot.logs.list_logs(USER).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_callback_answer_does_not_stop_flow() {
    let bot = Bot::new();
    bot.sender.fail_callback(true);

    bot.estimate_command().await;
    bot.photo().await;

    bot.press(CALLBACK_RE_ESTIMATE).await;
    assert_eq!(bot.state(), SessionState::AwaitingImage);
    assert_eq!(
        bot.sender.last_message().unwrap().content,
        messages::PROMPT_ANOTHER_IMAGE
    );

    bot.press(CALLBACK_CANCEL).await;
    assert_eq!(bot.handler.sessions().session_count(), 0);
    assert_eq!(bot.sender.last_message().unwrap().content, messages::CANCELED);
    assert!(bot.sender.callback_answers().is_empty());
}

#[tokio::test]
async fn test_failed_result_send_still_records_log() {
    let bot = Bot::new();
    // Sends: the image prompt, the analyzing notice, then the result
    bot.sender.fail_send_at(3);

    bot.estimate_command().await;
    bot.photo().await;

    assert_eq!(bot.state(), SessionState::AwaitingImage);
    assert_eq!(
        bot.sender.texts(),
        vec![messages::PROMPT_IMAGE, messages::ANALYZING]
    );
    let analyzing = bot.sender.messages()[1].message_ref;
    assert_eq!(bot.sender.deleted(), vec![analyzing]);

    let logs = bot.logs.list_logs(USER).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].calories, 500);
}
