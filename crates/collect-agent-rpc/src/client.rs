//! Request/response exchange with the rstats daemon.
//!
//! A fresh socket is opened for every exchange, so independent callers never
//! share socket state. There is no correlation token in the protocol: callers
//! that depend on the outcome of a previous exchange must wait for it.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::channel::{ChannelError, TimedChannel};
use crate::protocol::Command;
use crate::transport::{CodecError, CommandCodec};

/// UDP port rstats listens on
pub const RSTATS_PORT: u16 = 1111;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Replies longer than this are truncated
pub const DEFAULT_RECEIVE_BUFFER: usize = 2048;

/// Loopback endpoint of the local rstats daemon.
#[must_use]
pub fn default_endpoint() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, RSTATS_PORT))
}

/// Errors that can occur during an exchange with rstats
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Failed to open socket: {0}")]
    Bind(#[source] ChannelError),

    #[error("Failed to send command: {0}")]
    Send(#[source] ChannelError),

    #[error("Failed to receive response: {0}")]
    Receive(#[source] ChannelError),
}

impl ClientError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            ClientError::Send(e) | ClientError::Receive(e) | ClientError::Bind(e) => {
                e.is_timeout()
            }
            ClientError::Codec(_) => false,
        }
    }
}

/// Client for the local rstats daemon
#[derive(Debug, Clone)]
pub struct RstatsClient {
    endpoint: SocketAddr,
    send_timeout: Duration,
    receive_timeout: Duration,
    receive_buffer: usize,
}

impl Default for RstatsClient {
    fn default() -> Self {
        Self::new(default_endpoint())
    }
}

impl RstatsClient {
    #[must_use]
    pub fn new(endpoint: SocketAddr) -> Self {
        Self {
            endpoint,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            receive_buffer: DEFAULT_RECEIVE_BUFFER,
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, send: Duration, receive: Duration) -> Self {
        self.send_timeout = send;
        self.receive_timeout = receive;
        self
    }

    #[must_use]
    pub fn with_receive_buffer(mut self, size: usize) -> Self {
        self.receive_buffer = size;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    #[must_use]
    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    /// Send `command` and wait for the daemon's reply text.
    ///
    /// The command is encoded before any socket is opened, so encoding
    /// failures never reach the network.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Codec` if the command cannot be encoded,
    /// `ClientError::Send` or `ClientError::Receive` if the exchange failed
    /// or timed out.
    pub async fn exchange(&self, command: &Command) -> Result<String, ClientError> {
        let mut codec = CommandCodec::new();
        let mut payload = BytesMut::new();
        codec.encode(command, &mut payload)?;

        let channel = TimedChannel::bind().await.map_err(ClientError::Bind)?;

        tracing::debug!(
            command = command.name(),
            endpoint = %self.endpoint,
            bytes = payload.len(),
            "Sending command to rstats"
        );

        if let Err(e) = channel
            .send_to(payload, self.endpoint, self.send_timeout)
            .await
        {
            tracing::debug!(command = command.name(), "Send to rstats failed: {e}");
            return Err(ClientError::Send(e));
        }

        let mut datagram = match channel
            .receive(self.receive_buffer, self.receive_timeout)
            .await
        {
            Ok(datagram) => datagram,
            Err(e) => {
                tracing::debug!(command = command.name(), "No answer from rstats: {e}");
                return Err(ClientError::Receive(e));
            }
        };

        let reply = codec.decode_eof(&mut datagram)?.unwrap_or_default();
        tracing::debug!(command = command.name(), %reply, "rstats replied");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ConnectionParams;
    use collect_agent_types::Statistics;
    use tokio::net::UdpSocket;

    #[test]
    fn test_default_endpoint() {
        let endpoint = default_endpoint();
        assert!(endpoint.ip().is_loopback());
        assert_eq!(endpoint.port(), 1111);
    }

    #[test]
    fn test_default_timeouts() {
        let client = RstatsClient::default();
        assert_eq!(client.send_timeout(), Duration::from_secs(10));
        assert_eq!(client.receive_timeout(), Duration::from_secs(30));
        assert_eq!(client.endpoint(), default_endpoint());
    }

    #[tokio::test]
    async fn test_exchange_returns_reply_text() {
        let daemon = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let client = RstatsClient::new(daemon.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            let (len, from) = daemon.recv_from(&mut buf).await.unwrap();
            let command = Command::parse(std::str::from_utf8(&buf[..len]).unwrap()).unwrap();
            daemon.send_to(b"OK reloaded", from).await.unwrap();
            command
        });

        let command = Command::Reload(ConnectionParams { connection_id: 5 });
        let reply = client.exchange(&command).await.unwrap();
        assert_eq!(reply, "OK reloaded");
        assert_eq!(server.await.unwrap(), command);
    }

    #[tokio::test]
    async fn test_exchange_times_out_without_reply() {
        let silent = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let client = RstatsClient::new(silent.local_addr().unwrap())
            .with_timeouts(Duration::from_millis(100), Duration::from_millis(100));

        let err = client.exchange(&Command::ReloadAll).await.unwrap_err();
        assert!(matches!(err, ClientError::Receive(_)));
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_encoding_failure_happens_before_io() {
        let silent = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let client = RstatsClient::new(silent.local_addr().unwrap());

        let command = Command::SendStat(crate::protocol::SendStatParams {
            connection_id: 1,
            timestamp: 0,
            statistics: Statistics::new().with("blob", "x".repeat(70_000)),
            stored_files: Some(false),
            suffix: String::new(),
        });
        let err = client.exchange(&command).await.unwrap_err();
        assert!(matches!(err, ClientError::Codec(CodecError::MessageTooLarge(_))));

        let mut buf = [0u8; 16];
        let nothing = tokio::time::timeout(Duration::from_millis(50), silent.recv_from(&mut buf)).await;
        assert!(nothing.is_err(), "No datagram should have been sent");
    }

    #[test]
    fn test_client_error_display() {
        let err = ClientError::Send(ChannelError::Timeout {
            operation: "send",
            timeout: Duration::from_secs(10),
        });
        assert!(err.to_string().starts_with("Failed to send command"));
        assert!(err.is_timeout());

        let err = ClientError::Codec(CodecError::MessageTooLarge(1));
        assert!(!err.is_timeout());
    }
}
