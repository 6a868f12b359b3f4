//! Replay Time
//!
//! Quote and trade timestamps are opaque monotonic integers. The recorded
//! datasets use nanoseconds since the Unix epoch, which is what the defaults
//! below assume; nothing in the engine reads wall-clock time.

/// Timestamp in the source's clock units (nanoseconds for recorded data).
pub type Nanos = i64;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Default snapshot cadence: one minute.
pub const DEFAULT_SAMPLE_INTERVAL_NS: Nanos = 60 * NANOS_PER_SEC;

/// Convert Nanos to a chrono DateTime for display.
///
/// Returns `None` for values chrono cannot represent.
#[inline]
pub fn nanos_to_datetime(nanos: Nanos) -> Option<chrono::DateTime<chrono::Utc>> {
    use chrono::TimeZone;
    let secs = nanos.div_euclid(NANOS_PER_SEC);
    let nsecs = nanos.rem_euclid(NANOS_PER_SEC) as u32;
    chrono::Utc.timestamp_opt(secs, nsecs).single()
}

/// Render a timestamp as RFC3339 when it looks like epoch nanos, raw otherwise.
pub fn display_nanos(nanos: Nanos) -> String {
    match nanos_to_datetime(nanos) {
        Some(dt) if nanos >= NANOS_PER_SEC => dt.to_rfc3339(),
        _ => nanos.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_interval_is_one_minute() {
        assert_eq!(DEFAULT_SAMPLE_INTERVAL_NS, 60_000_000_000);
    }

    #[test]
    fn test_nanos_to_datetime() {
        // 2018-12-07T07:00:06.144506979Z, first row of the recorded FutureA file
        let dt = nanos_to_datetime(1_544_166_006_144_506_979).unwrap();
        assert_eq!(dt.timestamp(), 1_544_166_006);
        assert_eq!(dt.timestamp_subsec_nanos(), 144_506_979);
    }

    #[test]
    fn test_display_small_values_raw() {
        assert_eq!(display_nanos(70), "70");
        assert!(display_nanos(1_544_166_006_000_000_000).starts_with("2018-12-07T"));
    }
}
