//! Attendance Check-In Engine
//!
//! ```text
//! kiosk ──► CheckInService ──► resolver (class) ──► CheckInEngine (redb txn)
//!                 │                                       │ broadcast
//!                 │ timeout / unreachable                 ▼
//!                 └──► OfflineQueue ──► Reconciler ──► CheckInEngine
//! ```
//!
//! - [`storage`] - redb tables and the version-conditional commit
//! - [`resolver`] - schedule time-window rules (pure)
//! - [`membership`] - validity, activation, ledger update (pure)
//! - [`engine`] - the transaction and the event channel
//! - [`cache`] / [`offline`] / [`reconciler`] - offline-first path
//! - [`correction`] - retroactive schedule correction

pub mod cache;
pub mod correction;
pub mod engine;
pub mod error;
pub mod events;
pub mod membership;
pub mod notify;
pub mod offline;
pub mod reconciler;
pub mod resolver;
pub mod service;
pub mod storage;

pub use cache::MemberCache;
pub use engine::{CheckInCommand, CheckInEngine, CheckInGateway};
pub use error::{CheckInError, CheckInResult, QueueError};
pub use events::AttendanceEvent;
pub use offline::{LocalQueue, OfflineQueue, PendingStore};
pub use reconciler::{ReconcileWorker, Reconciler};
pub use service::{CheckInService, LivePolicy};
pub use storage::{AttendanceStorage, StorageError};
