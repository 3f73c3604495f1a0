use std::fmt::Display;
use std::path::PathBuf;

use collect_agent_rpc::{ClientError, Command, RstatsClient};
use collect_agent_types::Statistics;
use tracing::debug;

use crate::config::AgentConfig;
use crate::environment::JobEnvironment;
use crate::identity::resolve_agent_name;
use crate::logging::{Facility, LogOptions, Priority};
use crate::session::{Identity, Session, change_config_command};
use crate::store::FileStore;
use crate::{Error, Result};

/// Reporting client used by a job to talk to rstats.
///
/// Holds the [`Session`] established by registration and threads it through
/// every command. Reporting commands never fail: transport problems come back
/// as `KO <reason>` text, the same shape rstats itself uses for refusals.
#[derive(Debug, Clone)]
pub struct CollectAgent {
    config: AgentConfig,
    client: RstatsClient,
    store: FileStore,
    session: Session,
    environment: Option<JobEnvironment>,
}

impl Default for CollectAgent {
    fn default() -> Self {
        Self::new(AgentConfig::default())
    }
}

impl CollectAgent {
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self {
            client: config.client(),
            store: FileStore::new(&config.storage_dir),
            session: Session::default(),
            environment: None,
            config,
        }
    }

    /// Use a fixed job identity instead of reading the process environment.
    #[must_use]
    pub fn with_environment(mut self, environment: JobEnvironment) -> Self {
        self.environment = Some(environment);
        self
    }

    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn store(&self) -> &FileStore {
        &self.store
    }

    fn environment(&self) -> JobEnvironment {
        self.environment
            .clone()
            .unwrap_or_else(JobEnvironment::from_env)
    }

    /// Open the job log for the current job without contacting rstats.
    ///
    /// The agent is left unregistered, with connection id 0.
    pub fn open_session(&mut self, options: LogOptions, facility: Facility) -> &Session {
        let environment = self.environment();
        let agent_name = resolve_agent_name(&self.config.agent_name_files);
        self.session = Session::open(Identity::new(environment, agent_name), options, facility);
        &self.session
    }

    /// Register the job with rstats and return the connection id it handed out.
    ///
    /// The session is replaced before anything is sent, so a failed
    /// registration always leaves connection id 0 behind.
    ///
    /// # Errors
    ///
    /// `Error::Transport` if rstats could not be reached, `Error::Protocol`
    /// if it refused the registration or answered something unreadable.
    /// Transport failures are also written to the job log.
    pub async fn try_register(
        &mut self,
        config_file: &str,
        options: LogOptions,
        facility: Facility,
        overwrite: bool,
    ) -> Result<u32> {
        self.open_session(options, facility);

        let command = self.session.register_command(config_file, overwrite);
        let reply = match self.client.exchange(&command).await {
            Ok(reply) => reply,
            Err(e) => {
                self.log_transport_failure(&e);
                self.send_log(
                    Priority::Error,
                    &format!("Failed to register to rstats service: {e}"),
                );
                return Err(e.into());
            }
        };

        if self.session.accept_register_reply(&reply) {
            Ok(self.session.connection_id())
        } else {
            Err(Error::Protocol(format!(
                "registration refused: {}",
                reply.trim()
            )))
        }
    }

    /// Register the job with rstats; returns whether rstats accepted it.
    pub async fn register(
        &mut self,
        config_file: &str,
        options: LogOptions,
        facility: Facility,
        overwrite: bool,
    ) -> bool {
        match self
            .try_register(config_file, options, facility, overwrite)
            .await
        {
            Ok(connection_id) => {
                debug!(connection_id, "Registered to rstats");
                true
            }
            Err(e) => {
                debug!("Registration failed: {e}");
                false
            }
        }
    }

    /// Register with the default log options, terminating the process on failure.
    pub async fn connect(&mut self, config_file: &str) {
        self.register_or_exit(config_file).await;
        self.send_log(Priority::Debug, "Starting job");
    }

    pub(crate) async fn register_or_exit(&mut self, config_file: &str) {
        let registered = self
            .register(config_file, LogOptions::default(), Facility::default(), false)
            .await;
        if !registered {
            let message = "ERROR connecting to collect-agent";
            self.send_log(Priority::Error, message);
            eprintln!("{message}");
            std::process::exit(1);
        }
    }

    /// Run `job` inside a registration.
    ///
    /// Registers first (terminating the process if that fails). A failing job
    /// is logged at CRIT priority. The registration is removed afterwards
    /// whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns the job's own error.
    pub async fn run_job<F, T, E>(&mut self, config_file: &str, job: F) -> std::result::Result<T, E>
    where
        F: AsyncFnOnce(&CollectAgent) -> std::result::Result<T, E>,
        E: Display,
    {
        self.register_or_exit(config_file).await;
        self.log_job_start();

        let outcome = job(&*self).await;
        if let Err(e) = &outcome {
            self.send_log(Priority::Critical, &e.to_string());
        }

        let reply = self.remove_stat().await;
        debug!(%reply, "Removed registration after job");
        outcome
    }

    pub(crate) fn log_job_start(&self) {
        self.send_log(
            Priority::Debug,
            &format!("Starting job {}", self.session.identity().job_name),
        );
    }

    /// Write a record to the job log.
    pub fn send_log(&self, priority: Priority, message: &str) {
        self.session.log(priority, message);
    }

    /// Report one set of statistics taken at `timestamp` (milliseconds).
    pub async fn send_stat(
        &self,
        timestamp: i64,
        statistics: &Statistics,
        suffix: &str,
        stored: bool,
    ) -> String {
        let command =
            self.session
                .send_stat_command(timestamp, statistics.clone(), suffix, Some(stored));
        self.report(&command, "KO Failed to send statistic to rstats")
            .await
    }

    /// Report statistics that are already serialized as a JSON object.
    pub async fn send_prepared_stat(&self, timestamp: i64, suffix: &str, statistics: &str) -> String {
        let failure = "KO Failed to send statistic to rstats";
        let statistics = match Statistics::from_json_str(statistics) {
            Ok(statistics) => statistics,
            Err(e) => return self.failed(failure, &Error::from(e)),
        };
        let command = self
            .session
            .send_stat_command(timestamp, statistics, suffix, None);
        self.report(&command, failure).await
    }

    /// Copy `source` into the storage directory of the current job instance.
    ///
    /// # Errors
    ///
    /// See [`FileStore::store_file`].
    pub fn store_file(&self, timestamp: i64, source: &str) -> Result<PathBuf> {
        self.store
            .store_file(self.session.identity(), timestamp, source)
            .inspect_err(|e| self.send_log(Priority::Error, &format!("KO {e}")))
    }

    /// Store a set of named files and report their paths as one statistic.
    ///
    /// With `copy` unset the source paths are reported as they are.
    ///
    /// # Errors
    ///
    /// Storage failures are returned before anything is sent; see
    /// [`FileStore::store_file`].
    pub async fn store_files<I, K, V>(
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
        let statistics = self
            .store
            .collect_files(self.session.identity(), timestamp, files, copy)
            .inspect_err(|e| self.send_log(Priority::Error, &format!("KO {e}")))?;
        Ok(self.send_stat(timestamp, &statistics, suffix, true).await)
    }

    /// Ask rstats to reload the configuration of this registration.
    pub async fn reload_stat(&self) -> String {
        self.report(&self.session.reload_command(), "KO Failed to reload statistic")
            .await
    }

    pub async fn remove_stat(&self) -> String {
        self.report(&self.session.remove_command(), "KO Failed to remove statistic")
            .await
    }

    pub async fn reload_all_stats(&self) -> String {
        self.report(&Command::ReloadAll, "KO Failed to reload statistics")
            .await
    }

    /// Change storage and broadcast settings of the current job instance.
    ///
    /// The instance ids are read from the environment at call time, not
    /// from the session.
    pub async fn change_config(&self, storage: bool, broadcast: bool) -> String {
        let command = change_config_command(&self.environment(), storage, broadcast);
        self.report(&command, "KO Failed to fetch configurations")
            .await
    }

    pub async fn restart_rstats(&self) -> String {
        self.report(&Command::RestartRstats, "KO Failed to reset rstats")
            .await
    }

    async fn report(&self, command: &Command, failure: &str) -> String {
        match self.client.exchange(command).await {
            Ok(reply) => {
                debug!(command = command.name(), %reply, "rstats answered");
                reply
            }
            Err(e) => {
                self.log_transport_failure(&e);
                self.failed(failure, &Error::from(e))
            }
        }
    }

    /// Log a failed command and build the `KO` text returned in its place.
    fn failed(&self, failure: &str, error: &Error) -> String {
        let message = format!("{failure}: {error}");
        self.send_log(Priority::Error, &message);
        message
    }

    fn log_transport_failure(&self, error: &ClientError) {
        let message = match error {
            ClientError::Send(_) => {
                "Error: Connexion to rstats refused, maybe rstats service isn't started"
            }
            ClientError::Receive(_) => {
                "Error: Connexion to rstats was closed, could not get an answer"
            }
            ClientError::Bind(_) | ClientError::Codec(_) => return,
        };
        self.send_log(Priority::Error, message);
    }
}
