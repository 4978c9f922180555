pub mod artifact;
pub mod document;
pub mod entity;
pub mod extraction;
pub mod lease;
pub mod run;

use chrono::Utc;

/// Canonical UTC timestamp string used across all tables.
/// Fixed-width ISO-8601, so lexicographic order equals chronological order.
pub fn now_utc() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// A UTC timestamp `secs` seconds in the future (lease expiries).
pub fn utc_after_secs(secs: i64) -> String {
    (Utc::now() + chrono::Duration::seconds(secs))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_fixed_width_utc() {
        let now = now_utc();
        assert_eq!(now.len(), 20);
        assert!(now.ends_with('Z'));
    }

    #[test]
    fn future_timestamp_sorts_after_now() {
        let now = now_utc();
        let later = utc_after_secs(120);
        assert!(later > now, "{later} should sort after {now}");
    }
}
