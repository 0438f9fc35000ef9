//! Canned estimator for tests and offline runs
//!
//! Returns a configurable result or error without touching the network and
//! records what it was asked.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::estimator::{Confidence, EstimateError, EstimateResult, Estimator};

/// Mock estimator
///
/// Clones share state, so a test can keep one handle while the conversation
/// handler owns another.
///
/// # Example
///
/// ```rust
/// use bytes::Bytes;
/// use calorie_bot::estimator::{Estimator, MockEstimator};
///
/// async fn example() {
///     let mock = MockEstimator::new();
///     let result = mock.estimate(Bytes::from_static(b"img"), "image/jpeg").await.unwrap();
///     assert_eq!(result.calories, 500);
///     assert_eq!(mock.call_count(), 1);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockEstimator {
    result: Arc<Mutex<EstimateResult>>,
    error: Arc<Mutex<Option<EstimateError>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    call_count: Arc<Mutex<usize>>,
    last_mime_type: Arc<Mutex<Option<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockEstimator {
    /// Creates a mock that answers 500 kcal, high confidence, rice and chicken
    pub fn new() -> Self {
        Self {
            result: Arc::new(Mutex::new(Self::default_result())),
            error: Arc::new(Mutex::new(None)),
            delay: Arc::new(Mutex::new(None)),
            call_count: Arc::new(Mutex::new(0)),
            last_mime_type: Arc::new(Mutex::new(None)),
        }
    }

    fn default_result() -> EstimateResult {
        EstimateResult::new(
            500,
            Confidence::High,
            vec!["Rice".to_string(), "Chicken".to_string()],
        )
        .with_reasoning("Standard portions")
    }

    pub fn set_result(&self, result: EstimateResult) {
        *lock(&self.result) = result;
    }

    /// Makes every following call fail with `error`
    pub fn set_error(&self, error: EstimateError) {
        *lock(&self.error) = Some(error);
    }

    pub fn clear_error(&self) {
        *lock(&self.error) = None;
    }

    /// Holds each call for `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn call_count(&self) -> usize {
        *lock(&self.call_count)
    }

    pub fn last_mime_type(&self) -> Option<String> {
        lock(&self.last_mime_type).clone()
    }

}

impl Default for MockEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Estimator for MockEstimator {
    async fn estimate(&self, _image: Bytes, mime_type: &str) -> Result<EstimateResult, EstimateError> {
        *lock(&self.call_count) += 1;
        *lock(&self.last_mime_type) = Some(mime_type.to_string());

        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = lock(&self.error).clone() {
            return Err(error);
        }
        Ok(lock(&self.result).clone())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
