//! Job-side reporting client for the rstats collection daemon.
//!
//! A job registers once with [`CollectAgent::register`], then reports
//! statistics, log records and stored files through the same agent. The
//! agent keeps the [`Session`] handed out by rstats and threads it through
//! every command.
//!
//! Async callers use [`CollectAgent`] directly; everything else goes through
//! [`blocking::BlockingAgent`].

pub mod blocking;
pub mod config;
pub mod logging;
pub mod store;

pub(crate) mod identity;
pub(crate) mod utils;

mod agent;
mod environment;
mod error;
mod session;

#[cfg(test)]
mod tests;

pub use agent::CollectAgent;
pub use blocking::BlockingAgent;
pub use environment::JobEnvironment;
pub use error::{Error, Result};
pub use logging::{Facility, LogDestination, LogOptions, Priority};
pub use session::{Identity, Session};
pub use store::FileStore;
pub use utils::now_millis as now;

pub use collect_agent_rpc::{Command, RstatsClient};
pub use collect_agent_types::*;
