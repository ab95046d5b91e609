//! Sentra Core - shared types for the action-governance pipeline.
//!
//! This crate holds the identifiers, timestamps and classification scales
//! that every other sentra crate builds on. It deliberately has no logic of
//! its own: risk scoring lives in `sentra-risk`, policy in `sentra-policy`,
//! and the broker protocol in `sentra-broker`.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;
pub mod types;

pub use types::{Environment, RequestId, SessionId, Severity, Timestamp};
