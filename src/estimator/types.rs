use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::estimator::error::EstimateError;

/// How sure the model is about an estimate.
///
/// Parsing is case-insensitive; serialization is always lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }

    /// Display form used in chat replies ("High", "Medium", "Low")
    pub fn capitalized(&self) -> &'static str {
        match self {
            Confidence::Low => "Low",
            Confidence::Medium => "Medium",
            Confidence::High => "High",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            _ => Err(format!("confidence must be low/medium/high, got {}", s)),
        }
    }
}

impl TryFrom<String> for Confidence {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Calorie estimate for a single image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateResult {
    /// Total estimated energy in kcal
    pub calories: i64,
    pub confidence: Confidence,
    /// Detected food items, empty when no food was recognised
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl EstimateResult {
    pub fn new(calories: i64, confidence: Confidence, items: Vec<String>) -> Self {
        Self {
            calories,
            confidence,
            items,
            reasoning: String::new(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// True when the estimate actually describes food.
    ///
    /// The model signals "no food" with an empty item list and zero calories;
    /// either one on its own is treated the same way.
    pub fn has_food(&self) -> bool {
        !self.items.is_empty() && self.calories > 0
    }

    pub fn validate(&self) -> Result<(), EstimateError> {
        if self.calories < 0 {
            return Err(EstimateError::validation(format!(
                "calories must be non-negative, got {}",
                self.calories
            )));
        }
        Ok(())
    }

    /// Renders the fixed-format chat reply for this estimate.
    pub fn format(&self) -> String {
        let items = if self.items.is_empty() {
            "None detected".to_string()
        } else {
            self.items.join(", ")
        };

        format!(
            "🍽️ Calorie Estimate\n\nEstimated Calories: {} kcal\nConfidence: {}\n\nDetected Items: {}",
            self.calories,
            self.confidence.capitalized(),
            items
        )
    }
}

/// Parses raw model text into a validated [`EstimateResult`].
///
/// Models often wrap JSON in a markdown code fence; a leading "```json" or
/// "```" and a trailing "```" are stripped before parsing.
pub fn parse_model_output(text: &str) -> Result<EstimateResult, EstimateError> {
    let mut json = text.trim();
    json = json.strip_prefix("```json").unwrap_or(json);
    json = json.strip_prefix("```").unwrap_or(json);
    json = json.strip_suffix("```").unwrap_or(json);
    let json = json.trim();

    let result: EstimateResult = serde_json::from_str(json).map_err(|e| {
        EstimateError::serialization(format!(
            "Failed to parse model JSON response: {} (response: {})",
            e, json
        ))
    })?;

    result.validate()?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let text = r#"{"calories": 450, "confidence": "high", "items": ["Chicken", "Rice"], "reasoning": "Standard plate"}"#;
        let result = parse_model_output(text).unwrap();
        assert_eq!(result.calories, 450);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.items, vec!["Chicken", "Rice"]);
        assert_eq!(result.reasoning, "Standard plate");
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"calories\": 300, \"confidence\": \"Medium\", \"items\": [\"Salad\"]}\n```";
        let result = parse_model_output(text).unwrap();
        assert_eq!(result.calories, 300);
        assert_eq!(result.confidence, Confidence::Medium);
        assert!(result.reasoning.is_empty());
    }

    #[test]
    fn test_parse_bare_fence() {
        let text = "```\n{\"calories\": 0, \"confidence\": \"low\", \"items\": [], \"reasoning\": \"No food detected\"}\n```";
        let result = parse_model_output(text).unwrap();
        assert!(!result.has_food());
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = parse_model_output("I think this is a burger").unwrap_err();
        assert!(matches!(err, EstimateError::Serialization { .. }));
    }

    #[test]
    fn test_parse_rejects_negative_calories() {
        let err = parse_model_output(r#"{"calories": -5, "confidence": "low", "items": []}"#)
            .unwrap_err();
        assert!(matches!(err, EstimateError::Validation { .. }));
    }

    #[test]
    fn test_parse_rejects_unknown_confidence() {
        let err = parse_model_output(r#"{"calories": 5, "confidence": "certain", "items": ["x"]}"#)
            .unwrap_err();
        assert!(matches!(err, EstimateError::Serialization { .. }));
    }

    #[test]
    fn test_has_food() {
        let chicken = || vec!["Chicken".to_string()];
        assert!(EstimateResult::new(450, Confidence::High, chicken()).has_food());
        assert!(!EstimateResult::new(0, Confidence::Low, vec![]).has_food());
        assert!(!EstimateResult::new(0, Confidence::Low, chicken()).has_food());
        assert!(!EstimateResult::new(100, Confidence::Low, vec![]).has_food());
    }

    #[test]
    fn test_format() {
        let result = EstimateResult::new(
            450,
            Confidence::High,
            vec!["Chicken".to_string(), "Rice".to_string()],
        );
        let text = result.format();
        assert!(text.starts_with("🍽️ Calorie Estimate"));
        assert!(text.contains("Estimated Calories: 450 kcal"));
        assert!(text.contains("Confidence: High"));
        assert!(text.contains("Detected Items: Chicken, Rice"));
    }

    #[test]
    fn test_format_without_items() {
        let text = EstimateResult::new(0, Confidence::Low, vec![]).format();
        assert!(text.contains("Detected Items: None detected"));
        assert!(text.contains("Confidence: Low"));
    }

    #[test]
    fn test_confidence_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Confidence::Medium).unwrap(), "\"medium\"");
        let parsed: Confidence = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(parsed, Confidence::High);
    }
}
