//! Time-bounded datagram operations.
//!
//! Each send or receive runs as its own task. If the deadline passes first,
//! the task is aborted and then awaited until the abort itself has completed,
//! so no operation is ever left pending on the socket when a call returns.

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::net::UdpSocket;

/// Errors from a single channel operation
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Socket task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ChannelError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChannelError::Timeout { .. })
    }
}

/// A UDP socket whose operations are individually bounded in time
#[derive(Debug, Clone)]
pub struct TimedChannel {
    socket: Arc<UdpSocket>,
}

impl TimedChannel {
    /// Open an IPv4 socket on an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Io` if the socket cannot be bound.
    pub async fn bind() -> Result<Self, ChannelError> {
        Self::bind_to(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await
    }

    /// Open a socket bound to `addr`.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Io` if the socket cannot be bound.
    pub async fn bind_to(addr: SocketAddr) -> Result<Self, ChannelError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Send one datagram to `endpoint`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Timeout` if the send did not complete in time,
    /// or `ChannelError::Io` if the socket reported a failure.
    pub async fn send_to(
        &self,
        payload: BytesMut,
        endpoint: SocketAddr,
        timeout: Duration,
    ) -> Result<usize, ChannelError> {
        let socket = Arc::clone(&self.socket);
        run_bounded("send", timeout, async move {
            socket.send_to(&payload, endpoint).await
        })
        .await
    }

    /// Receive one datagram of at most `capacity` bytes, giving up after `timeout`.
    ///
    /// Datagrams longer than `capacity` are truncated, not reported as errors.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Timeout` if nothing arrived in time, or
    /// `ChannelError::Io` if the socket reported a failure.
    pub async fn receive(
        &self,
        capacity: usize,
        timeout: Duration,
    ) -> Result<BytesMut, ChannelError> {
        let socket = Arc::clone(&self.socket);
        run_bounded("receive", timeout, async move {
            let mut buf = vec![0u8; capacity];
            let len = match socket.recv_from(&mut buf).await {
                Ok((len, _peer)) => len,
                Err(e) if is_message_too_large(&e) => capacity,
                Err(e) => return Err(e),
            };
            Ok(BytesMut::from(&buf[..len]))
        })
        .await
    }
}

async fn run_bounded<T, F>(
    operation: &'static str,
    timeout: Duration,
    future: F,
) -> Result<T, ChannelError>
where
    F: Future<Output = io::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut pending = tokio::spawn(future);

    if let Ok(joined) = tokio::time::timeout(timeout, &mut pending).await {
        return Ok(joined??);
    }

    pending.abort();
    match pending.await {
        Err(e) if e.is_cancelled() => {
            tracing::debug!(operation, ?timeout, "Pending socket operation cancelled");
        }
        Err(e) => return Err(e.into()),
        Ok(_) => {
            tracing::debug!(operation, "Socket operation finished while being cancelled");
        }
    }

    Err(ChannelError::Timeout { operation, timeout })
}

// Linux truncates oversized datagrams silently; Windows reports WSAEMSGSIZE.
#[cfg(windows)]
fn is_message_too_large(err: &io::Error) -> bool {
    const WSAEMSGSIZE: i32 = 10040;
    err.raw_os_error() == Some(WSAEMSGSIZE)
}

#[cfg(not(windows))]
fn is_message_too_large(_err: &io::Error) -> bool {
    false
}
