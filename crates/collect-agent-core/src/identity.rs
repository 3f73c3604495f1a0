//! Agent name resolution.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::config::UNKNOWN_AGENT_NAME;

/// Read the agent name from the first candidate file that can be opened.
///
/// Only the first line is used. A candidate that opens but cannot be read
/// still wins and yields an empty name; if no candidate opens at all the
/// name is [`UNKNOWN_AGENT_NAME`].
pub(crate) fn resolve_agent_name(candidates: &[PathBuf]) -> String {
    candidates
        .iter()
        .find_map(|path| File::open(path).ok().map(|file| (path, file)))
        .map_or_else(
            || UNKNOWN_AGENT_NAME.to_string(),
            |(path, file)| first_line(path, file),
        )
}

fn first_line(path: &Path, file: File) -> String {
    let mut line = String::new();
    if let Err(e) = BufReader::new(file).read_line(&mut line) {
        tracing::warn!("Failed reading agent name from {}: {e}", path.display());
        return String::new();
    }
    line.trim_end_matches(['\r', '\n']).to_string()
}
