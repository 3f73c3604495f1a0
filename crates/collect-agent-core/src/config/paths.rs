/// Base directory for files stored through [`crate::FileStore`]
pub const DEFAULT_STORAGE_DIR: &str = "/opt/openbach/agent/collect_agent";

/// Candidate files holding the agent name, tried in order
pub const AGENT_NAME_FILES: [&str; 3] = [
    "/opt/openbach/agent/agent_name",
    "/etc/hostname",
    "C:\\openbach\\agent_name",
];

/// Agent name used when none of [`AGENT_NAME_FILES`] can be opened
pub const UNKNOWN_AGENT_NAME: &str = "agent_name_not_found";

/// Agent settings file read by the command line tool
pub const DEFAULT_SETTINGS_FILE: &str = "/etc/openbach/collect-agent.json";
