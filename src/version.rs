//! Build metadata served on `/version`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Commit checksum and commit time of the running build.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Version {
    pub checksum: String,
    #[serde(rename = "dateTime")]
    pub date_time: DateTime<Utc>,
}

impl Version {
    pub fn new(checksum: impl Into<String>, date_time: DateTime<Utc>) -> Self {
        Self { checksum: checksum.into(), date_time }
    }

    /// Reads `KVGATE_GIT_SHA` and `KVGATE_BUILD_TIME` (RFC 3339) as set at
    /// compile time. Missing values fall back to the crate version and the
    /// Unix epoch.
    pub fn from_build_env() -> Self {
        let checksum = option_env!("KVGATE_GIT_SHA").unwrap_or(env!("CARGO_PKG_VERSION"));
        let date_time = option_env!("KVGATE_BUILD_TIME")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self::new(checksum, date_time)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.checksum, self.date_time.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_date_time_key() {
        let v = Version::new("abc123", DateTime::<Utc>::UNIX_EPOCH);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["checksum"], "abc123");
        assert_eq!(json["dateTime"], "1970-01-01T00:00:00Z");
    }
}
