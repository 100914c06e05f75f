//! # Realm Core
//!
//! Shared building blocks for the in-memory game-world services.
//!
//! Every service follows the same control flow:
//!
//! ```text
//!   bus command / HTTP read
//!          │
//!          ▼
//!   tenant established ──► registry lookup (lazy init when cold)
//!                                 │
//!                                 ▼
//!                        transition computed under the
//!                        tenant write lock, indices rebuilt
//!                                 │
//!                                 ▼
//!                        events buffered, flushed on success
//! ```
//!
//! ## Modules
//!
//! - [`tenant`]: partition identity carried by every operation
//! - [`registry`]: tenant-partitioned store with participant, container and
//!   spatial indices
//! - [`contribution`]: labelled contributions folded into computed values
//! - [`state_machine`]: guarded transition tables
//! - [`init_tracker`]: lazy-initialization flags
//! - [`event`], [`event_bus`], [`emitter`]: outbound messages and delivery
//! - [`peer`]: capabilities of peer services
//! - [`status`]: status events published by peer services
//! - [`catalog`]: durable definition storage
//! - [`environment`]: injected clock
//! - [`topic`]: environment-driven topic names and knobs

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod contribution;
pub mod emitter;
pub mod environment;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod init_tracker;
pub mod peer;
pub mod registry;
pub mod state_machine;
pub mod status;
pub mod tenant;
pub mod topic;

pub use error::{RealmError, RealmResult};
pub use tenant::Tenant;
