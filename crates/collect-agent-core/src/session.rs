//! Registration state threaded through every command.

use collect_agent_rpc::{
    ChangeConfigParams, Command, ConnectionParams, RegisterParams, RegisterReply, SendStatParams,
};
use collect_agent_types::Statistics;

use crate::environment::JobEnvironment;
use crate::logging::{Facility, LogOptions, LogSink, Priority};

/// Who is reporting: the agent and the job instance running on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub agent_name: String,
    pub job_name: String,
    pub job_instance_id: u32,
    pub scenario_instance_id: u32,
    pub owner_scenario_instance_id: u32,
}

impl Default for Identity {
    fn default() -> Self {
        Self::new(JobEnvironment::default(), String::new())
    }
}

impl Identity {
    #[must_use]
    pub fn new(environment: JobEnvironment, agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            job_name: environment.job_name,
            job_instance_id: environment.job_instance_id,
            scenario_instance_id: environment.scenario_instance_id,
            owner_scenario_instance_id: environment.owner_scenario_instance_id,
        }
    }

    /// Prefix prepended to every job log record.
    #[must_use]
    pub fn log_prefix(&self) -> String {
        format!(
            "OWNER_SCENARIO_INSTANCE_ID {}, SCENARIO_INSTANCE_ID {}, JOB_INSTANCE_ID {}, AGENT_NAME {}, ",
            self.owner_scenario_instance_id,
            self.scenario_instance_id,
            self.job_instance_id,
            self.agent_name,
        )
    }
}

/// Identity plus the connection id handed out by rstats.
///
/// A connection id of 0 means the job is not registered. Commands are still
/// built and sent in that state; rstats decides what to do with them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    identity: Identity,
    connection_id: u32,
    log_sink: LogSink,
}

impl Session {
    /// Start an unregistered session, opening the job log for `identity`.
    #[must_use]
    pub fn open(identity: Identity, options: LogOptions, facility: Facility) -> Self {
        let log_sink = LogSink::open(identity.job_name.clone(), options, facility);
        Self {
            identity,
            connection_id: 0,
            log_sink,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.connection_id != 0
    }

    /// Write `message` to the job log, prefixed with the job identity.
    pub fn log(&self, priority: Priority, message: &str) {
        let record = format!("{}{message}", self.identity.log_prefix());
        self.log_sink.emit(priority, &record);
    }

    /// Record the outcome of a registration from the daemon's reply text.
    ///
    /// Returns whether rstats accepted the registration.
    pub fn accept_register_reply(&mut self, reply: &str) -> bool {
        let decoded = RegisterReply::parse(reply);
        self.connection_id = decoded.connection_id();

        match decoded {
            RegisterReply::Accepted { connection_id: 0 } => {
                self.log(Priority::Error, "ERROR: Return message isn't well formed");
                self.log(Priority::Error, reply);
            }
            RegisterReply::Accepted { connection_id } => {
                self.log(Priority::Notice, &format!("NOTICE: Connexion ID is {connection_id}"));
            }
            RegisterReply::Rejected => {
                self.log(Priority::Error, "ERROR: Something went wrong");
                self.log(Priority::Error, reply);
            }
            RegisterReply::Malformed => {
                self.log(Priority::Error, "ERROR: Return message isn't well formed");
                self.log(Priority::Error, reply);
            }
        }

        decoded.is_accepted()
    }

    #[must_use]
    pub fn register_command(&self, confpath: &str, overwrite: bool) -> Command {
        Command::Register(RegisterParams {
            confpath: confpath.to_string(),
            job_name: self.identity.job_name.clone(),
            agent_name: self.identity.agent_name.clone(),
            job_instance_id: self.identity.job_instance_id,
            scenario_instance_id: self.identity.scenario_instance_id,
            owner_scenario_instance_id: self.identity.owner_scenario_instance_id,
            overwrite,
        })
    }

    /// Statistics report. `stored_files` is `None` for prepared statistics.
    #[must_use]
    pub fn send_stat_command(
        &self,
        timestamp: i64,
        statistics: Statistics,
        suffix: &str,
        stored_files: Option<bool>,
    ) -> Command {
        Command::SendStat(SendStatParams {
            connection_id: self.connection_id,
            timestamp,
            statistics,
            stored_files,
            suffix: suffix.to_string(),
        })
    }

    #[must_use]
    pub fn reload_command(&self) -> Command {
        Command::Reload(ConnectionParams {
            connection_id: self.connection_id,
        })
    }

    #[must_use]
    pub fn remove_command(&self) -> Command {
        Command::Remove(ConnectionParams {
            connection_id: self.connection_id,
        })
    }
}

/// Configuration change for the job instance described by `environment`.
#[must_use]
pub fn change_config_command(environment: &JobEnvironment, storage: bool, broadcast: bool) -> Command {
    Command::ChangeConfig(ChangeConfigParams {
        job_instance_id: environment.job_instance_id,
        scenario_instance_id: environment.scenario_instance_id,
        enable_storage: storage,
        enable_broadcast: broadcast,
    })
}
