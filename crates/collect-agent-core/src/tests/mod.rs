//! Test module for collect-agent-core
//!
//! These tests run the agent against a fake rstats daemon on a loopback port:
//! - Registration and the reply grammar
//! - Reporting commands, their `KO` fallbacks and timeout bounds
//! - File storage and stored-file statistics

mod register_tests;
