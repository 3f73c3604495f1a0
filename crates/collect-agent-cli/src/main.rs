//! collect-agent command line
//!
//! Lets shell jobs report to the local rstats daemon the way library users
//! do: register, log, send statistics, store files. Also re-sends statistics
//! saved on disk while rstats was unreachable.

mod replay;
mod stats;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use collect_agent_core::config::{AgentConfig, DEFAULT_SETTINGS_FILE};
use collect_agent_core::logging::{self, LogDestination};
use collect_agent_core::{CollectAgent, Facility, LogOptions, Priority, now};

use crate::replay::{DEFAULT_STATS_DIR, REPLAY_CONF_FILE};

/// Report job statistics and logs to rstats
#[derive(Parser)]
#[command(name = "collect-agent")]
#[command(about = "Report job statistics and logs to the local rstats daemon")]
#[command(version)]
#[command(after_help = "\
Job identity is read from JOB_NAME, JOB_INSTANCE_ID, SCENARIO_INSTANCE_ID
and OWNER_SCENARIO_INSTANCE_ID.

Examples:
  collect-agent --config /opt/ping.conf register
  collect-agent --config /opt/ping.conf stat rtt=12.5 host=10.0.0.1
  collect-agent --config /opt/ping.conf stat --json '{\"rtt\": 12.5}'
  collect-agent --config /opt/ping.conf store capture=/tmp/ping.pcap
  collect-agent --config /opt/ping.conf log --priority 3 \"probe failed\"
  collect-agent change-config --no-broadcast
  collect-agent replay 2024-03-01 12:00:00.000 --job ping
")]
struct Cli {
    /// Job configuration file handed to rstats on registration
    #[arg(long, global = true, default_value = "")]
    config: String,

    /// Agent settings (rstats endpoint, timeouts, storage directory)
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the job and print its connection id
    Register {
        /// Replace an existing registration of this job
        #[arg(long)]
        overwrite: bool,

        /// Syslog option flags for the job log
        #[arg(long, default_value_t = LogOptions::PID.0)]
        log_option: i32,

        /// Syslog facility for the job log
        #[arg(long, default_value_t = Facility::USER.0)]
        log_facility: i32,
    },

    /// Write a record to the job log
    Log {
        /// Syslog priority, 0 (emergency) to 7 (debug)
        #[arg(short, long, default_value_t = 6)]
        priority: i32,

        message: String,
    },

    /// Send statistics given as NAME=VALUE pairs or a JSON object
    Stat {
        /// Timestamp in milliseconds, defaults to now
        #[arg(short, long)]
        timestamp: Option<i64>,

        #[arg(short, long, default_value = "")]
        suffix: String,

        /// Statistics as an already serialized JSON object
        #[arg(long, conflicts_with = "values", required_unless_present = "values")]
        json: Option<String>,

        /// NAME=VALUE pairs; values that parse as JSON keep their type
        values: Vec<String>,
    },

    /// Store files and report where they were stored
    Store {
        /// Timestamp in milliseconds, defaults to now
        #[arg(short, long)]
        timestamp: Option<i64>,

        #[arg(short, long, default_value = "")]
        suffix: String,

        /// Report the given paths without copying the files
        #[arg(long)]
        no_copy: bool,

        /// NAME=PATH pairs
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Ask rstats to reload the configuration of this job
    Reload,

    /// Remove the registration of this job
    Remove,

    /// Ask rstats to reload every registration
    #[command(name = "reload-all")]
    ReloadAll,

    /// Change storage and broadcast of statistics for this job instance
    #[command(name = "change-config")]
    ChangeConfig {
        /// Stop storing statistics locally
        #[arg(long)]
        no_storage: bool,

        /// Stop broadcasting statistics to the collector
        #[arg(long)]
        no_broadcast: bool,
    },

    /// Restart rstats
    #[command(name = "restart-rstats")]
    RestartRstats,

    /// Re-send statistics files saved since a date
    Replay {
        /// Date and time, e.g. "2024-03-01 12:00:00.000"
        #[arg(required = true, num_args = 2, value_names = ["DATE", "TIME"])]
        since: Vec<String>,

        /// Only replay statistics of this job (repeatable)
        #[arg(short, long = "job")]
        jobs: Vec<String>,

        #[arg(long, default_value = DEFAULT_STATS_DIR)]
        stats_dir: PathBuf,

        /// Job configuration used to register replayed statistics
        #[arg(long, default_value = REPLAY_CONF_FILE)]
        replay_config: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let destination = cli
        .log_file
        .clone()
        .map_or(LogDestination::Stderr, LogDestination::File);
    let _guard = logging::init(&destination);

    let settings = AgentConfig::load(&cli.settings)
        .with_context(|| format!("Failed to load settings from {}", cli.settings.display()))?;
    let mut agent = CollectAgent::new(settings);

    match cli.command {
        Commands::Register {
            overwrite,
            log_option,
            log_facility,
        } => {
            let connection_id = agent
                .try_register(
                    &cli.config,
                    LogOptions(log_option),
                    Facility(log_facility),
                    overwrite,
                )
                .await
                .context("Failed to register to rstats")?;
            println!("{connection_id}");
            Ok(())
        }
        Commands::Log { priority, message } => {
            agent.open_session(LogOptions::default(), Facility::default());
            agent.send_log(Priority::from_level(priority), &message);
            Ok(())
        }
        Commands::Stat {
            timestamp,
            suffix,
            json,
            values,
        } => {
            let statistics = match json {
                Some(_) => None,
                None => Some(stats::parse_statistics(&values)?),
            };
            register(&mut agent, &cli.config).await?;
            let timestamp = timestamp.unwrap_or_else(now);
            let reply = match (statistics, json) {
                (Some(statistics), _) => {
                    agent.send_stat(timestamp, &statistics, &suffix, false).await
                }
                (None, json) => {
                    let json = json.unwrap_or_default();
                    agent.send_prepared_stat(timestamp, &suffix, &json).await
                }
            };
            print_reply(&reply)
        }
        Commands::Store {
            timestamp,
            suffix,
            no_copy,
            files,
        } => {
            let files = stats::parse_files(&files)?;
            register(&mut agent, &cli.config).await?;
            let timestamp = timestamp.unwrap_or_else(now);
            let reply = agent
                .store_files(timestamp, &suffix, files, !no_copy)
                .await
                .context("Failed to store files")?;
            print_reply(&reply)
        }
        Commands::Reload => {
            register(&mut agent, &cli.config).await?;
            print_reply(&agent.reload_stat().await)
        }
        Commands::Remove => {
            register(&mut agent, &cli.config).await?;
            print_reply(&agent.remove_stat().await)
        }
        Commands::ReloadAll => print_reply(&agent.reload_all_stats().await),
        Commands::ChangeConfig {
            no_storage,
            no_broadcast,
        } => print_reply(&agent.change_config(!no_storage, !no_broadcast).await),
        Commands::RestartRstats => print_reply(&agent.restart_rstats().await),
        Commands::Replay {
            since,
            jobs,
            stats_dir,
            replay_config,
        } => run_replay(agent.config(), &since.join(" "), &jobs, &stats_dir, &replay_config).await,
    }
}

/// Register with default log options before a command addressing this job.
async fn register(agent: &mut CollectAgent, config: &str) -> Result<()> {
    agent
        .try_register(config, LogOptions::default(), Facility::default(), false)
        .await
        .context("Failed to register to rstats")?;
    Ok(())
}

fn print_reply(reply: &str) -> Result<()> {
    if reply.starts_with("KO") {
        bail!("{reply}");
    }
    println!("{reply}");
    Ok(())
}

async fn run_replay(
    settings: &AgentConfig,
    since: &str,
    jobs: &[String],
    stats_dir: &std::path::Path,
    replay_config: &str,
) -> Result<()> {
    let since = replay::parse_since(since)?;
    let files = replay::files_to_replay(stats_dir, jobs, since)?;
    if files.is_empty() {
        eprintln!("No statistics to replay in {}", stats_dir.display());
        return Ok(());
    }

    let mut total = 0;
    for path in &files {
        println!("{}", path.display());
        total += replay::replay_file(settings, replay_config, path).await?;
    }
    println!("Replayed {total} statistics from {} files", files.len());
    Ok(())
}
