//! Job identity provided by the agent through environment variables.

use tracing::warn;

pub const JOB_NAME: &str = "JOB_NAME";
pub const JOB_INSTANCE_ID: &str = "JOB_INSTANCE_ID";
pub const SCENARIO_INSTANCE_ID: &str = "SCENARIO_INSTANCE_ID";
pub const OWNER_SCENARIO_INSTANCE_ID: &str = "OWNER_SCENARIO_INSTANCE_ID";

/// Job name used when `JOB_NAME` is unset or empty
pub const DEFAULT_JOB_NAME: &str = "job_debug";

/// Identity of the running job instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEnvironment {
    pub job_name: String,
    pub job_instance_id: u32,
    pub scenario_instance_id: u32,
    pub owner_scenario_instance_id: u32,
}

impl Default for JobEnvironment {
    fn default() -> Self {
        Self {
            job_name: DEFAULT_JOB_NAME.to_string(),
            job_instance_id: 0,
            scenario_instance_id: 0,
            owner_scenario_instance_id: 0,
        }
    }
}

impl JobEnvironment {
    /// Read the job identity from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the job identity through `lookup`, which maps a variable name to its value.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let job_name = lookup(JOB_NAME)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_JOB_NAME.to_string());

        Self {
            job_name,
            job_instance_id: parse_id(&lookup, JOB_INSTANCE_ID),
            scenario_instance_id: parse_id(&lookup, SCENARIO_INSTANCE_ID),
            owner_scenario_instance_id: parse_id(&lookup, OWNER_SCENARIO_INSTANCE_ID),
        }
    }
}

fn parse_id<F>(lookup: &F, name: &str) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name).filter(|v| !v.is_empty()) else {
        return 0;
    };

    value.trim().parse().unwrap_or_else(|_| {
        warn!("Ignoring invalid {name}={value:?}, using 0");
        0
    })
}
