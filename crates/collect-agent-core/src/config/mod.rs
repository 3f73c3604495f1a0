mod paths;
mod settings;
mod validation;

pub use paths::{AGENT_NAME_FILES, DEFAULT_SETTINGS_FILE, DEFAULT_STORAGE_DIR, UNKNOWN_AGENT_NAME};
pub use settings::{AgentConfig, RstatsConfig};
pub use validation::warn_unknown_fields;
