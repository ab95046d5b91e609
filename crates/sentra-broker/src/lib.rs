//! Sentra Broker - privileged execution over a local IPC channel.
//!
//! A privileged broker process executes actions on behalf of an
//! unprivileged client. Every message is a length-prefixed JSON envelope
//! carrying a unique request id; the connection is useless until a
//! token handshake succeeds, and the broker re-runs policy classification
//! on every request rather than trusting anything the client computed.
//!
//! Requests may be pipelined. State-mutating actions are serialized by
//! the broker; auto-approved reads run concurrently.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod framing;
pub mod protocol;

#[cfg(unix)]
pub mod client;
#[cfg(unix)]
pub mod server;

#[cfg(unix)]
pub use client::{BrokerClient, ClientError};
pub use framing::{read_frame, write_frame, FrameError, MAX_FRAME_BYTES};
pub use protocol::{
    generate_token, BrokerErrorCode, BrokerRequest, BrokerResponse, CancelRequest, ExecuteRequest,
    ExecuteResult, HelloRequest, ListDirRequest, PingRequest, ReadFileRequest, WriteFileRequest,
    MIN_TOKEN_LEN,
};
#[cfg(unix)]
pub use server::{BrokerConfig, BrokerServer};
