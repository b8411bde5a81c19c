//! Duration rendering for the `startup_time` response field
//!
//! Durations are written the way Go's `time.Duration` prints them
//! (`80ms`, `1.5s`, `2m3.25s`) so existing benchmark scripts keep parsing
//! the endpoint's output.

use std::time::Duration;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Format a duration in Go duration notation
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();

    if nanos == 0 {
        return "0s".to_string();
    }

    if nanos < NANOS_PER_MICRO {
        return format!("{}ns", nanos);
    }
    if nanos < NANOS_PER_MILLI {
        let (whole, frac) = split_frac(nanos, 3);
        return format!("{}{}µs", whole, frac);
    }
    if nanos < NANOS_PER_SEC {
        let (whole, frac) = split_frac(nanos, 6);
        return format!("{}{}ms", whole, frac);
    }

    let (total_secs, frac) = split_frac(nanos, 9);
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = total_secs / 3600;

    if hours > 0 {
        format!("{}h{}m{}{}s", hours, mins, secs, frac)
    } else if mins > 0 {
        format!("{}m{}{}s", mins, secs, frac)
    } else {
        format!("{}{}s", secs, frac)
    }
}

/// Split `value` at `digits` decimal places, trimming trailing zeros
fn split_frac(value: u128, digits: u32) -> (u128, String) {
    let scale = 10u128.pow(digits);
    let whole = value / scale;
    let rem = value % scale;

    if rem == 0 {
        return (whole, String::new());
    }

    let padded = format!("{:0width$}", rem, width = digits as usize);
    (whole, format!(".{}", padded.trim_end_matches('0')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_sub_second_units() {
        assert_eq!(format_duration(Duration::from_nanos(999)), "999ns");
        assert_eq!(format_duration(Duration::from_nanos(1_500)), "1.5µs");
        assert_eq!(format_duration(Duration::from_millis(80)), "80ms");
        assert_eq!(format_duration(Duration::from_micros(80_250)), "80.25ms");
    }

    #[test]
    fn test_seconds_minutes_hours() {
        assert_eq!(format_duration(Duration::from_millis(1_500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(2)), "2s");
        assert_eq!(format_duration(Duration::from_millis(62_250)), "1m2.25s");
        assert_eq!(format_duration(Duration::from_secs(3_600)), "1h0m0s");
        assert_eq!(
            format_duration(Duration::from_nanos(1_234_567_891)),
            "1.234567891s"
        );
    }
}
