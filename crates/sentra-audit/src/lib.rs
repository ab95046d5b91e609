//! Sentra Audit - one-way audit trail for governance decisions.
//!
//! Every [`ActionClassification`](sentra_policy::ActionClassification) and
//! PAC outcome becomes an [`AuditEntry`] and is written to an
//! [`AuditSink`]. Entries pass through the [`Redactor`] on the way out, so
//! secret-like values never reach disk. The trail is consumed for review
//! only; nothing in the governance path reads it back.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod entry;
pub mod error;
pub mod redact;
pub mod sink;

pub use entry::{AuditAction, AuditEntry, AuditEntryId};
pub use error::{AuditError, AuditResult};
pub use redact::Redactor;
pub use sink::{AuditSink, JsonlSink, MemorySink};
