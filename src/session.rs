//! Per-process session identity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque tag distinguishing one run's logs from another's.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new session id from the current time
    pub fn generate() -> Self {
        Self::from_start(Utc::now())
    }

    /// Start seconds followed by a random 16-bit suffix, e.g. `1760611200-3fa9`
    pub fn from_start(started_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{}-{:04x}",
            started_at.timestamp(),
            rand::random::<u16>()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
