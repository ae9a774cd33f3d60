//! Sweeper configuration
//!
//! Plain serde struct; every field has a default so a config file only needs
//! the keys it changes.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::activation::ActivationPatterns;
use crate::error::Result;
use crate::selector::{AdRule, AdSelector, PlaceholderPolicy};

/// Pages the sweeper activates on (userscript `@match` style)
pub const DEFAULT_MATCH_PATTERNS: &[&str] = &[
    "https://www.reddit.com/r/*/comments/*",
    "https://www.reddit.com/",
    "https://www.reddit.com/*",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub placeholder_policy: PlaceholderPolicy,

    /// Replace the built-in rule set entirely
    pub rules: Option<Vec<AdRule>>,

    /// Length of one rendering frame
    pub frame_interval_ms: u64,

    /// Follow-up sweeps after the first one, measured from the first sweep
    pub initial_delays_ms: Vec<u64>,

    pub match_patterns: Vec<String>,

    pub cdp_url: String,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            placeholder_policy: PlaceholderPolicy::default(),
            rules: None,
            frame_interval_ms: 16,
            initial_delays_ms: vec![500, 1500],
            match_patterns: DEFAULT_MATCH_PATTERNS.iter().map(|s| s.to_string()).collect(),
            cdp_url: "ws://localhost:9222".to_string(),
        }
    }
}

impl SweeperConfig {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn initial_delays(&self) -> Vec<Duration> {
        self.initial_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    /// Build the rule set this config describes
    pub fn selector(&self) -> AdSelector {
        match &self.rules {
            Some(rules) => AdSelector::new(rules.clone()),
            None => AdSelector::reddit(self.placeholder_policy),
        }
    }

    pub fn activation_patterns(&self) -> Result<ActivationPatterns> {
        ActivationPatterns::parse(&self.match_patterns)
    }
}
