//! Command protocol and transport for talking to the local rstats daemon.
//!
//! Jobs report statistics by sending one JSON command per UDP datagram to
//! rstats and reading back one datagram of text.
//!
//! # Architecture
//!
//! - [`protocol`]: the seven commands and the registration reply grammar
//! - [`transport`]: datagram codec turning commands into bytes and replies into text
//! - [`channel`]: send/receive operations bounded by a timeout, cancelled on expiry
//! - [`client`]: one full request/response exchange with the daemon
//!
//! # Example
//!
//! ```no_run
//! use collect_agent_rpc::{Command, RstatsClient};
//!
//! # async fn example() -> Result<(), collect_agent_rpc::ClientError> {
//! let client = RstatsClient::default();
//! let reply = client.exchange(&Command::ReloadAll).await?;
//! println!("rstats answered: {reply}");
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod protocol;
pub mod transport;

pub use channel::{ChannelError, TimedChannel};
pub use client::{
    ClientError, DEFAULT_RECEIVE_BUFFER, DEFAULT_RECEIVE_TIMEOUT, DEFAULT_SEND_TIMEOUT,
    RSTATS_PORT, RstatsClient, default_endpoint,
};
pub use protocol::{
    CHANGE_CONFIG, ChangeConfigParams, Command, ConnectionParams, EmptyParams, REGISTER,
    RELOAD, RELOAD_ALL, REMOVE, RESTART_RSTATS, RegisterParams, RegisterReply,
    SEND_STAT, SendStatParams,
};
pub use transport::{CodecError, CommandCodec, MAX_DATAGRAM_SIZE};

pub use collect_agent_types::{StatValue, Statistics, ValueError};
