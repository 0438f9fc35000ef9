use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::estimator::{Confidence, EstimateResult};
use crate::logs::error::LogStoreError;

/// Maximum number of food items in one entry
pub const MAX_FOOD_ITEMS: usize = 10;
/// Maximum combined UTF-8 byte length of all (trimmed) food item names
pub const MAX_FOOD_ITEMS_TEXT_LEN: usize = 1000;

/// One recorded meal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: Uuid,
    pub user_id: i64,
    pub food_items: Vec<String>,
    pub calories: i64,
    pub confidence: Confidence,
    /// When the meal was eaten
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn validate(&self) -> Result<(), LogStoreError> {
        validate_fields(&self.food_items, self.calories)
    }

    /// Applies every field present in `update` and bumps `updated_at`.
    pub fn apply(&mut self, update: LogUpdate, now: DateTime<Utc>) {
        if let Some(food_items) = update.food_items {
            self.food_items = food_items;
        }
        if let Some(calories) = update.calories {
            self.calories = calories;
        }
        if let Some(confidence) = update.confidence {
            self.confidence = confidence;
        }
        if let Some(timestamp) = update.timestamp {
            self.timestamp = timestamp;
        }
        self.updated_at = now;
    }
}

/// Fields supplied by the caller when creating an entry.
///
/// `timestamp` defaults to the creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLog {
    pub food_items: Vec<String>,
    pub calories: i64,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewLog {
    pub fn validate(&self) -> Result<(), LogStoreError> {
        validate_fields(&self.food_items, self.calories)
    }
}

impl From<&EstimateResult> for NewLog {
    fn from(result: &EstimateResult) -> Self {
        Self {
            food_items: result.items.clone(),
            calories: result.calories,
            confidence: result.confidence,
            timestamp: Some(Utc::now()),
        }
    }
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

// Confidence is checked by its type when deserialized
fn validate_fields(food_items: &[String], calories: i64) -> Result<(), LogStoreError> {
    if calories < 0 {
        return Err(LogStoreError::validation("calories must be non-negative"));
    }

    if food_items.is_empty() {
        return Err(LogStoreError::validation("food items cannot be empty"));
    }
    if food_items.len() > MAX_FOOD_ITEMS {
        return Err(LogStoreError::validation(format!(
            "food items cannot exceed {} items",
            MAX_FOOD_ITEMS
        )));
    }

    let mut total = 0;
    for item in food_items {
        let item = item.trim();
        if item.is_empty() {
            return Err(LogStoreError::validation(
                "food items cannot contain empty strings",
            ));
        }
        total += item.len();
    }
    if total > MAX_FOOD_ITEMS_TEXT_LEN {
        return Err(LogStoreError::validation(format!(
            "total food items text cannot exceed {} characters",
            MAX_FOOD_ITEMS_TEXT_LEN
        )));
    }

    Ok(())
}
