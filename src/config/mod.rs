pub mod loader;
pub mod schema;

pub use loader::{apply_env, apply_env_with, load_from_path, load_from_str, ConfigError, ENV_APPS_DIR, ENV_WORKSPACE};
pub use schema::{EngineConfig, ValidationError, ValidationIssue, DEFAULT_PARSE_TIMEOUT_MS};
