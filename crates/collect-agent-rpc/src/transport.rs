//! Datagram codec for rstats commands.
//!
//! One datagram carries exactly one message, so there is no length prefix:
//! the encoder writes a single JSON document and the decoder consumes the
//! whole buffer as reply text.
//!
//! ```text
//! request:  {"command_id": N, "command_parameters": {...}}
//! response: OK 42 | KO <reason> | <opaque text>
//! ```

use bytes::{BufMut, BytesMut};
use collect_agent_types::ValueError;
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::protocol::Command;

/// Largest payload a single IPv4 UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Codec for rstats command datagrams
#[derive(Debug, Default)]
pub struct CommandCodec;

impl CommandCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Encoder<&Command> for CommandCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // serde_json writes NaN and infinities as null
        if let Command::SendStat(params) = item {
            params.statistics.validate()?;
        }

        let json = serde_json::to_vec(item)?;

        if json.len() > MAX_DATAGRAM_SIZE {
            return Err(CodecError::MessageTooLarge(json.len()));
        }

        dst.reserve(json.len());
        dst.put_slice(&json);

        Ok(())
    }
}

impl Decoder for CommandCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let datagram = src.split_to(src.len());
        Ok(Some(String::from_utf8_lossy(&datagram).into_owned()))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(Some(String::new()));
        }
        self.decode(src)
    }
}

/// Errors that can occur during codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message too large: {0} bytes (max: {MAX_DATAGRAM_SIZE})")]
    MessageTooLarge(usize),

    #[error("Invalid statistic: {0}")]
    Value(#[from] ValueError),
}
