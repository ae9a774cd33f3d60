//! Chrome DevTools Protocol host
//!
//! One WebSocket per browser, one flattened session per page, one
//! [`CdpBinding`] per page the sweeper runs on.

pub mod binding;
pub mod client;
pub mod protocol;
pub mod session;

pub use binding::{apply_event, CdpBinding, MirrorUpdate};
pub use client::{CdpClient, CdpError};
pub use protocol::{CdpEvent, TargetInfo};
pub use session::CdpSession;
