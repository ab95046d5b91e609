//! Sentra Events - session-scoped governance notifications.
//!
//! Each governance session owns one [`SessionBus`]. Components publish
//! notifications (classification emitted, PAC outcome, step-back triggered)
//! and interested consumers subscribe for the lifetime of the task. Dropping
//! the bus tears the channel down with the session: there is no process-wide
//! emitter and no state shared across sessions.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bus;
pub mod event;

pub use bus::{EventReceiver, SessionBus, DEFAULT_CHANNEL_CAPACITY};
pub use event::SessionEvent;
