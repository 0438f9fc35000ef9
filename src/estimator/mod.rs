//! Calorie estimation from food images
//!
//! The conversation handler only sees the [`Estimator`] trait:
//! - [`GeminiEstimator`] calls the hosted Gemini vision model
//! - [`MockEstimator`] returns canned answers for tests and local runs

use async_trait::async_trait;
use bytes::Bytes;

pub mod error;
pub mod gemini;
pub mod mock;
pub mod types;

pub use error::EstimateError;
pub use gemini::{GeminiConfig, GeminiEstimator};
pub use mock::MockEstimator;
pub use types::{Confidence, EstimateResult, parse_model_output};

/// Image MIME types the estimator accepts
pub const SUPPORTED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Returns true when `mime_type` is one of [`SUPPORTED_IMAGE_TYPES`].
pub fn is_supported_image_type(mime_type: &str) -> bool {
    SUPPORTED_IMAGE_TYPES.contains(&mime_type)
}

/// Estimates calories for a single food image.
#[async_trait]
pub trait Estimator: Send + Sync {
    /// Analyzes `image` (encoded as `mime_type`) and returns a validated
    /// estimate. "No food" is a successful result with no items and zero
    /// calories, not an error.
    async fn estimate(&self, image: Bytes, mime_type: &str) -> Result<EstimateResult, EstimateError>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}
