//! Configuration helpers shared by the Keel crates.

use std::str::FromStr;
use std::time::Duration;

/// Read and parse an environment variable, ignoring unset or malformed values.
pub fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Read a millisecond duration from an environment variable.
pub fn env_duration_ms(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_millis)
}

/// Serialize a `Duration` as whole milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
