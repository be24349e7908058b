//! Runtime configuration for an [`EventJournal`](crate::EventJournal).
//!
//! Capacity is a const generic on the journal itself; everything that can
//! change without reallocating the slot arrays lives here.

use std::env;
use std::str::FromStr;
use tracing::warn;

/// Environment variable read by [`JournalConfig::from_env`].
pub const OVERFLOW_ENV: &str = "CYCLE_JOURNAL_OVERFLOW";

/// What happens once every slot has been claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Keep recording and overwrite the oldest entries.
    #[default]
    Wrap,
    /// Stop recording and count every rejected event.
    Drop,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wrap" | "ring" => Ok(OverflowPolicy::Wrap),
            "drop" => Ok(OverflowPolicy::Drop),
            other => Err(format!("unknown overflow policy {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JournalConfig {
    pub overflow: OverflowPolicy,
}

impl JournalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    /// Builds a config from `CYCLE_JOURNAL_OVERFLOW`, falling back to the
    /// defaults when the variable is unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = env::var(OVERFLOW_ENV) {
            match value.parse() {
                Ok(policy) => config.overflow = policy,
                Err(err) => warn!(%err, "ignoring {}", OVERFLOW_ENV),
            }
        }
        config
    }
}
