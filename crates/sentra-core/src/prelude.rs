//! Convenience re-exports for downstream crates.

pub use crate::types::{Environment, RequestId, SessionId, Severity, Timestamp};
