//! Shared types for the studio check-in stack
//!
//! Domain models and wire types used by the check-in server and by kiosk
//! clients talking to it over HTTP.

pub mod checkin;
pub mod models;
pub mod util;

// Re-exports
pub use checkin::{CheckInOutcome, CheckInRequest, CheckInStatus, DenialReason, ResolveReason, ResolvedClass, SyncMode, SyncReport};
pub use serde::{Deserialize, Serialize};
