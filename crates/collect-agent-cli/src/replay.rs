//! Re-sending statistics saved on disk.
//!
//! Statistics files hold one JSON object per line, each carrying a
//! `_metadata` object (`time`, optional `suffix`, and the job identity). The
//! first line of a file decides the identity used to register, under a
//! `send_stats-` job name so rstats does not store the statistics again.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use collect_agent_core::config::AgentConfig;
use collect_agent_core::{CollectAgent, Facility, JobEnvironment, LogOptions, Priority, Statistics};
use serde_json::{Map, Value};
use tracing::{debug, info};

pub const DEFAULT_STATS_DIR: &str = "/var/openbach_stats/";

/// Job configuration used when registering replayed statistics
pub const REPLAY_CONF_FILE: &str = "/opt/openbach/agent/jobs/send_stats/send_stats_rstats_filter.conf";

pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const METADATA_KEY: &str = "_metadata";
const JOB_NAME_PREFIX: &str = "send_stats-";

/// Parse a local date such as `2024-03-01 12:00:00.000`.
pub fn parse_since(date: &str) -> Result<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(date, DATE_FORMAT).with_context(|| {
        format!("Date and time {date:?} are not in the expected ({DATE_FORMAT}) format")
    })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("{date:?} does not exist in the local time zone"))
}

/// One saved line: statistics plus when and under which suffix they were taken
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub timestamp: i64,
    pub suffix: String,
    pub statistics: Statistics,
    metadata: Map<String, Value>,
}

impl Record {
    pub fn parse(line: &str) -> Result<Self> {
        let mut object: Map<String, Value> =
            serde_json::from_str(line).context("Statistics line is not a JSON object")?;

        let Some(Value::Object(metadata)) = object.remove(METADATA_KEY) else {
            bail!("Statistics line has no {METADATA_KEY} object");
        };
        let timestamp = metadata
            .get("time")
            .and_then(Value::as_i64)
            .with_context(|| format!("{METADATA_KEY} has no integer time"))?;
        let suffix = metadata
            .get("suffix")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let statistics = Statistics::try_from(Value::Object(object))?;

        Ok(Self {
            timestamp,
            suffix,
            statistics,
            metadata,
        })
    }

    /// Job identity to register replayed statistics under.
    pub fn environment(&self) -> JobEnvironment {
        JobEnvironment::from_lookup(|name| {
            let value = self.metadata.get(&name.to_lowercase())?;
            let text = match value {
                Value::String(text) => text.clone(),
                Value::Null => return None,
                other => other.to_string(),
            };
            if name == "JOB_NAME" {
                Some(format!("{JOB_NAME_PREFIX}{text}"))
            } else {
                Some(text)
            }
        })
    }
}

/// Statistics files modified at or after `since`, job by job.
///
/// With a non-empty `jobs`, only those job directories are considered.
pub fn files_to_replay(
    stats_dir: &Path,
    jobs: &[String],
    since: DateTime<Local>,
) -> Result<Vec<PathBuf>> {
    let mut job_dirs = sorted_entries(stats_dir)?;
    job_dirs.retain(|dir| {
        let selected = jobs.is_empty()
            || dir
                .file_name()
                .is_some_and(|name| jobs.iter().any(|job| name == job.as_str()));
        selected && dir.is_dir()
    });

    let mut files = Vec::new();
    for job_dir in job_dirs {
        for path in sorted_entries(&job_dir)? {
            let Ok(modified) = fs::metadata(&path).and_then(|m| m.modified()) else {
                continue;
            };
            if DateTime::<Local>::from(modified) >= since {
                files.push(path);
            }
        }
    }
    Ok(files)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect::<Vec<_>>();
    entries.sort();
    Ok(entries)
}

/// Register under the identity of the file's first line and send every line.
///
/// Returns the number of statistics sent; an empty file sends nothing.
pub async fn replay_file(config: &AgentConfig, conf_file: &str, path: &Path) -> Result<usize> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());

    let Some(first) = lines.next() else {
        return Ok(0);
    };
    let first = Record::parse(first).with_context(|| format!("In {}", path.display()))?;

    let mut agent = CollectAgent::new(config.clone()).with_environment(first.environment());
    if let Err(e) = agent
        .try_register(conf_file, LogOptions::default(), Facility::default(), true)
        .await
    {
        let message = "Cannot communicate with rstats";
        agent.send_log(Priority::Error, message);
        return Err(e).context(message);
    }

    let mut sent = 0;
    for record in std::iter::once(Ok(first)).chain(lines.map(Record::parse)) {
        let record = record.with_context(|| format!("In {}", path.display()))?;
        let reply = agent
            .send_stat(record.timestamp, &record.statistics, &record.suffix, false)
            .await;
        debug!(timestamp = record.timestamp, %reply, "Replayed statistics");
        sent += 1;
    }

    info!("Replayed {sent} statistics from {}", path.display());
    Ok(sent)
}
