//! Data models
//!
//! Shared between studio-server and kiosk clients (via API).
//! Documents are stored as JSON; all IDs are strings.

pub mod attendance;
pub mod member;
pub mod pending;
pub mod schedule;
pub mod serde_helpers;

// Re-exports
pub use attendance::*;
pub use member::*;
pub use pending::*;
pub use schedule::*;
