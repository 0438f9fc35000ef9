pub mod loader;
pub mod schema;

pub use loader::{ConfigError, get_config_path, load_config, save_config};
pub use schema::{Config, ConfigSummary, DEFAULT_ALLOWED_ORIGINS, DEFAULT_PORT};
