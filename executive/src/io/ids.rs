//! Identifiers and timestamps for runs and sandbox environments.

use chrono::{SecondsFormat, Utc};
use rand::{Rng, distributions::Alphanumeric};

/// Random lowercase alphanumeric suffix.
pub fn short_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase()
}

/// Run identifier: UTC timestamp plus a random suffix, e.g. `20260101T120000Z-ab12cd`.
pub fn run_id() -> String {
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%SZ"), short_id())
}

/// Current UTC time as RFC 3339.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
