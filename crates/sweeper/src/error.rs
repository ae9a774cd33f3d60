//! Error types for the sweeper plumbing
//!
//! The sweep itself never fails; these cover configuration and the host
//! binding.

use thiserror::Error;

use crate::cdp::CdpError;

pub type Result<T> = std::result::Result<T, SweeperError>;

#[derive(Debug, Error)]
pub enum SweeperError {
    #[error("DOM error: {0}")]
    Dom(#[from] dom::DomError),

    #[error("CDP error: {0}")]
    Cdp(#[from] CdpError),

    #[error("Invalid match pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
