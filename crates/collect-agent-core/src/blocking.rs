//! Blocking wrapper for callers without an async runtime.
//!
//! [`BlockingAgent`] owns a current-thread runtime and drives every
//! [`CollectAgent`] operation to completion on the calling thread.

use std::fmt::Display;
use std::path::PathBuf;

use collect_agent_types::Statistics;
use tokio::runtime::{Builder, Runtime};

use crate::agent::CollectAgent;
use crate::config::AgentConfig;
use crate::logging::{Facility, LogOptions, Priority};
use crate::session::Session;
use crate::Result;

pub struct BlockingAgent {
    runtime: Runtime,
    agent: CollectAgent,
}

impl BlockingAgent {
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be created.
    pub fn new(agent: CollectAgent) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { runtime, agent })
    }

    /// # Errors
    ///
    /// Returns an error if the runtime cannot be created.
    pub fn from_config(config: AgentConfig) -> Result<Self> {
        Self::new(CollectAgent::new(config))
    }

    #[must_use]
    pub fn agent(&self) -> &CollectAgent {
        &self.agent
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        self.agent.session()
    }

    #[must_use]
    pub fn into_inner(self) -> CollectAgent {
        self.agent
    }

    pub fn register(
        &mut self,
        config_file: &str,
        options: LogOptions,
        facility: Facility,
        overwrite: bool,
    ) -> bool {
        self.runtime
            .block_on(self.agent.register(config_file, options, facility, overwrite))
    }

    /// Open the job log without contacting rstats, see [`CollectAgent::open_session`].
    pub fn open_session(&mut self, options: LogOptions, facility: Facility) -> &Session {
        self.agent.open_session(options, facility)
    }

    /// Register with the default log options, terminating the process on failure.
    pub fn connect(&mut self, config_file: &str) {
        self.runtime.block_on(self.agent.connect(config_file));
    }

    /// Run `job` inside a registration, removing it afterwards.
    ///
    /// # Errors
    ///
    /// Returns the job's own error, after logging it at CRIT priority.
    pub fn run_job<F, T, E>(&mut self, config_file: &str, job: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&BlockingAgent) -> std::result::Result<T, E>,
        E: Display,
    {
        self.runtime.block_on(self.agent.register_or_exit(config_file));
        self.agent.log_job_start();

        let outcome = job(&*self);
        if let Err(e) = &outcome {
            self.send_log(Priority::Critical, &e.to_string());
        }

        self.remove_stat();
        outcome
    }

    pub fn send_log(&self, priority: Priority, message: &str) {
        self.agent.send_log(priority, message);
    }

    pub fn send_stat(
        &self,
        timestamp: i64,
        statistics: &Statistics,
        suffix: &str,
        stored: bool,
    ) -> String {
        self.runtime
            .block_on(self.agent.send_stat(timestamp, statistics, suffix, stored))
    }

    pub fn send_prepared_stat(&self, timestamp: i64, suffix: &str, statistics: &str) -> String {
        self.runtime
            .block_on(self.agent.send_prepared_stat(timestamp, suffix, statistics))
    }

    /// # Errors
    ///
    /// See [`crate::FileStore::store_file`].
    pub fn store_file(&self, timestamp: i64, source: &str) -> Result<PathBuf> {
        self.agent.store_file(timestamp, source)
    }

    /// # Errors
    ///
    /// See [`crate::FileStore::store_file`].
    pub fn store_files<I, K, V>(
        &self,
        timestamp: i64,
        suffix: &str,
        files: I,
        copy: bool,
    ) -> Result<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        self.runtime
            .block_on(self.agent.store_files(timestamp, suffix, files, copy))
    }

    pub fn reload_stat(&self) -> String {
        self.runtime.block_on(self.agent.reload_stat())
    }

    pub fn remove_stat(&self) -> String {
        self.runtime.block_on(self.agent.remove_stat())
    }

    pub fn reload_all_stats(&self) -> String {
        self.runtime.block_on(self.agent.reload_all_stats())
    }

    pub fn change_config(&self, storage: bool, broadcast: bool) -> String {
        self.runtime
            .block_on(self.agent.change_config(storage, broadcast))
    }

    pub fn restart_rstats(&self) -> String {
        self.runtime.block_on(self.agent.restart_rstats())
    }
}
