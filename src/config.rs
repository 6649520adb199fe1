use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::holder::assembler::SelectionPreference;

/// Holder-side matching configuration.
///
/// Every setting has a default, so an empty JSON object is a valid
/// configuration.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Bound on each schema resolution call, in seconds.
    pub schema_resolution_timeout: Timeout,
    pub selection_preference: SelectionPreference,
    /// Identifier of the holder, written into assembled presentations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
}

impl Config {
    pub fn from_json(bytes: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(bytes).context("invalid configuration")
    }
}

/// A non-zero timeout, expressed in seconds once serialized.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Hash, PartialEq, Eq)]
#[serde(try_from = "u64", into = "u64")]
pub struct Timeout(Duration);

impl Timeout {
    pub const DEFAULT_SECONDS: u64 = 5;
}

impl Default for Timeout {
    fn default() -> Self {
        Self(Duration::from_secs(Self::DEFAULT_SECONDS))
    }
}

impl std::ops::Deref for Timeout {
    type Target = Duration;

    fn deref(&self) -> &Duration {
        &self.0
    }
}

impl TryFrom<u64> for Timeout {
    type Error = anyhow::Error;

    fn try_from(seconds: u64) -> Result<Self, Self::Error> {
        if seconds == 0 {
            anyhow::bail!("timeout must be at least one second")
        }
        Ok(Self(Duration::from_secs(seconds)))
    }
}

impl From<Timeout> for u64 {
    fn from(timeout: Timeout) -> Self {
        timeout.0.as_secs()
    }
}
