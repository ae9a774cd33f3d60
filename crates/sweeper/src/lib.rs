//! AdSweeper - remove ad elements from a live document
//!
//! A fixed rule set ([`AdSelector`]) is swept over a [`LivePage`] three ways:
//! - [`AdSweeper::sweep`]: one pass, now
//! - [`AdSweeper::schedule_initial`]: next frame, then fixed follow-ups
//! - [`AdSweeper::watch`]: re-sweep whenever a mutation batch adds an ad
//!
//! The page can be a local arena (tests, embedding) or a mirror of a real
//! browser tab driven over CDP ([`cdp::CdpBinding`]).
//!
//! # Architecture Philosophy
//!
//! 1. **Data structures first**: the document is an arena; rules are data
//! 2. **No special cases**: every category goes through the same sweep loop
//! 3. **Deletion only**: nothing is created, moved or rewritten
//! 4. **Practical**: a missed ad is not an error, it just stays on the page

pub mod activation;
pub mod cdp;
pub mod config;
pub mod error;
pub mod events;
pub mod page;
pub mod schedule;
pub mod selector;
pub mod sweep;
pub mod sweeper;
pub mod watch;

pub use activation::{ActivationPatterns, MatchPattern};
pub use cdp::{CdpBinding, CdpClient};
pub use config::SweeperConfig;
pub use error::{Result, SweeperError};
pub use events::{EventBus, SweepEvent, SweepTrigger};
pub use page::{LivePage, MutationSubscription};
pub use schedule::{FrameClock, IntervalFrameClock, SweepCoalescer, WatchState};
pub use selector::{AdCategory, AdRule, AdSelector, ElementPredicate, PlaceholderPolicy};
pub use sweep::{sweep_document, RemovedElement, SweepResult};
pub use sweeper::AdSweeper;
pub use watch::{is_ad_bearing, WatchHandle};
