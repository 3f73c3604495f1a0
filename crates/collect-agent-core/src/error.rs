use std::path::PathBuf;

use collect_agent_rpc::{ClientError, CodecError};
use collect_agent_types::ValueError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(ClientError),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Encoding error: {0}")]
    Encoding(#[from] ValueError),

    #[error("Failed making destination directory {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed extracting filename from: {0}")]
    Filename(String),

    #[error("Failed copying {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<ClientError> for Error {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Codec(CodecError::Value(value)) => Error::Encoding(value),
            other => Error::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display_filename() {
        let err = Error::Filename("nameonly".to_string());
        assert_eq!(err.to_string(), "Failed extracting filename from: nameonly");
    }

    #[test]
    fn test_error_display_filesystem() {
        let err = Error::Filesystem {
            path: PathBuf::from("/opt/openbach/agent/collect_agent/ping/3/1000"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("ping/3/1000"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_error_display_copy() {
        let err = Error::Copy {
            from: PathBuf::from("/a/b/c.csv"),
            to: PathBuf::from("/dest/c.csv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert_eq!(
            err.to_string(),
            "Failed copying /a/b/c.csv to /dest/c.csv: missing"
        );
    }

    #[test]
    fn test_from_client_error() {
        let err: Error = ClientError::Receive(collect_agent_rpc::ChannelError::Timeout {
            operation: "receive",
            timeout: Duration::from_secs(30),
        })
        .into();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.to_string().contains("receive timed out"));
    }

    #[test]
    fn test_from_codec_value_error_is_encoding() {
        let err: Error =
            ClientError::Codec(CodecError::Value(ValueError::NonFiniteFloat(f64::NAN))).into();
        assert!(matches!(err, Error::Encoding(ValueError::NonFiniteFloat(_))));

        let err: Error = ClientError::Codec(CodecError::MessageTooLarge(70_000)).into();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_from_value_error() {
        let err: Error = ValueError::NonFiniteFloat(f64::NAN).into();
        assert!(matches!(err, Error::Encoding(_)));
        assert!(err.to_string().starts_with("Encoding error"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_error_debug_format() {
        let err = Error::Protocol("bad reply".to_string());
        let debug_str = format!("{err:?}");
        assert!(debug_str.contains("Protocol"));
        assert!(debug_str.contains("bad reply"));
    }
}
