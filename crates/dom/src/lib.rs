//! DOM tree library for the ad sweeper
//!
//! Arena-backed document tree with a mutation journal.
//!
//! ## Philosophy
//!
//! - **Good taste**: Data structures first, algorithms follow naturally
//! - **No special cases**: removal is detaching; detached subtrees are
//!   reclaimed between steps, never mid-step
//! - **Cache friendly**: Arena allocation, sequential access patterns
//!
//! ## Core Design
//!
//! ```text
//! CDP JSON ─┐
//!           ├→ DomArena (owned) → query_all / remove → MutationRecord journal
//! local  ───┘        ↓
//!               NodeId (u32)
//! ```

pub mod arena;
pub mod error;
pub mod mutation;
pub mod serializer;
pub mod service;
pub mod types;
pub mod utils;

pub use arena::{DomArena, RECLAIM_THRESHOLD};
pub use error::{DomError, Result};
pub use mutation::{MutationBatch, MutationRecord};
pub use serializer::DomSerializer;
pub use service::{DomService, DomServiceConfig};
pub use types::*;
