//! Sentra Policy - trust zones, action classification and approval.
//!
//! [`ZoneRoots::classify`] maps a canonical filesystem path to exactly one
//! [`Zone`]. The [`PolicyEngine`] combines zone, execution mode and a
//! hard-stop command list into an [`ActionClassification`] whose
//! [`ApprovalLevel`] is the most restrictive of all triggered rules.
//! [`ApprovalService`] then turns that level into an approve/refuse
//! decision, prompting the user where the level demands it.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod approval;
pub mod engine;
pub mod zone;

pub use approval::{ApprovalDecision, ApprovalMode, ApprovalPrompt, ApprovalService};
pub use engine::{
    ActionClassification, ActionContext, ActionMode, ApprovalLevel, HardStopConfig, PolicyEngine,
    RiskFactor,
};
pub use zone::{canonicalize_path, Zone, ZoneRoots};
