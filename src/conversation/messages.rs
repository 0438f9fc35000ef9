//! User-facing texts of the estimate conversation

pub const WELCOME: &str = "👋 Welcome to the Calorie Estimator bot!\n\n\
I can estimate the calories in your meals from a single picture.\n\n\
How to use:\n\
1. Send /estimate\n\
2. Upload a photo of your food (JPEG, PNG or WebP)\n\
3. Get an estimate with the detected items and a confidence level\n\n\
After a result you can re-estimate with another image or cancel at any time.";

pub const PROMPT_IMAGE: &str = "📸 Please send a food image for calorie estimation";
pub const PROMPT_ANOTHER_IMAGE: &str = "📸 Please send another food image";
pub const ANALYZING: &str = "⏳ Analyzing your image...";
pub const CANCELED: &str = "Estimation canceled. Use /estimate to start again.";

pub const UNSUPPORTED_FORMAT: &str =
    "❌ Unsupported format. Please send JPEG, PNG, or WebP images only.";
pub const DOWNLOAD_FAILED: &str = "❌ Failed to download image. Please try again.";
pub const ESTIMATE_FAILED: &str = "❌ API error. Please try again later.";
pub const NO_FOOD: &str = "❌ No food detected in image. Please send an image containing food.";

// Callback query answers
pub const ANSWER_RE_ESTIMATE: &str = "Send another image";
pub const ANSWER_CANCEL: &str = "Estimation canceled";
pub const ANSWER_UNKNOWN: &str = "Unknown action";
