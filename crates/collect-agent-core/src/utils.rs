use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current timestamp in milliseconds, the unit statistics are reported in.
// i64 millis cover dates until year 292278994
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Last component of `path`, split on either `/` or `\`.
///
/// Returns `None` when the path holds no separator at all or ends with one.
pub(crate) fn file_name_of(path: &str) -> Option<&str> {
    let index = path.rfind(['/', '\\'])?;
    let name = &path[index + 1..];
    (!name.is_empty()).then_some(name)
}

pub(crate) fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
