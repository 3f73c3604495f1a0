use crate::{Error, Result};
use collect_agent_rpc::{
    DEFAULT_RECEIVE_BUFFER, DEFAULT_RECEIVE_TIMEOUT, DEFAULT_SEND_TIMEOUT, RSTATS_PORT,
    RstatsClient,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::{AGENT_NAME_FILES, DEFAULT_STORAGE_DIR};

/// Agent configuration.
///
/// Every field has a default matching a standard agent installation, so an
/// empty or missing configuration file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    pub rstats: RstatsConfig,

    /// Base directory for stored files
    pub storage_dir: PathBuf,

    /// Files holding the agent name, tried in order
    pub agent_name_files: Vec<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            rstats: RstatsConfig::default(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            agent_name_files: AGENT_NAME_FILES.iter().map(PathBuf::from).collect(),
        }
    }
}

impl AgentConfig {
    /// Load config from file, falling back to defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// describes an unusable rstats endpoint.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        super::validation::warn_unknown_fields(&content, &path.display().to_string());
        let config: Self = serde_json::from_str(&content)?;
        config.rstats.validate()?;
        Ok(config)
    }

    /// Save config to file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build the rstats client described by this configuration.
    #[must_use]
    pub fn client(&self) -> RstatsClient {
        self.rstats.client()
    }
}

/// Where and how to reach rstats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RstatsConfig {
    pub host: IpAddr,
    pub port: u16,
    pub send_timeout_ms: u64,
    pub receive_timeout_ms: u64,
    pub receive_buffer: usize,
}

// Timeout defaults are whole seconds, far below u64::MAX milliseconds
#[allow(clippy::cast_possible_truncation)]
impl Default for RstatsConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: RSTATS_PORT,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT.as_millis() as u64,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT.as_millis() as u64,
            receive_buffer: DEFAULT_RECEIVE_BUFFER,
        }
    }
}

impl RstatsConfig {
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero port, timeout or receive buffer.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("rstats.port must not be 0".to_string()));
        }
        if self.send_timeout_ms == 0 || self.receive_timeout_ms == 0 {
            return Err(Error::Config("rstats timeouts must be positive".to_string()));
        }
        if self.receive_buffer == 0 {
            return Err(Error::Config("rstats.receiveBuffer must be positive".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    #[must_use]
    pub fn client(&self) -> RstatsClient {
        RstatsClient::new(self.endpoint())
            .with_timeouts(
                Duration::from_millis(self.send_timeout_ms),
                Duration::from_millis(self.receive_timeout_ms),
            )
            .with_receive_buffer(self.receive_buffer)
    }
}
