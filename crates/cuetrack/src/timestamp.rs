// Cue timestamps: `H:MM:SS.mmm`, with `,` accepted as the decimal separator.

use std::sync::LazyLock;

use regex::Regex;

static TIMESTAMP_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+):(\d{2}):(\d{2})[.,](\d{3})$").unwrap());

/// Parse a single timestamp into seconds.
///
/// Minutes and seconds must be below 60. Returns `None` for anything else.
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let caps = TIMESTAMP_REGEX.captures(s.trim())?;
    let hours: u64 = caps[1].parse().ok()?;
    let minutes: u64 = caps[2].parse().ok()?;
    let seconds: u64 = caps[3].parse().ok()?;
    let millis: u64 = caps[4].parse().ok()?;

    if minutes >= 60 || seconds >= 60 {
        return None;
    }

    let total_ms = hours
        .checked_mul(3_600_000)?
        .checked_add(minutes * 60_000 + seconds * 1_000 + millis)?;
    Some(total_ms as f64 / 1000.0)
}

/// Format seconds as `HH:MM:SS.mmm`, rounding to the nearest millisecond.
///
/// Negative and non-finite inputs render as zero.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    let s = total_secs % 60;
    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_separators() {
        assert_eq!(parse_timestamp("00:00:01.500"), Some(1.5));
        assert_eq!(parse_timestamp("00:00:01,500"), Some(1.5));
        assert_eq!(parse_timestamp("01:02:03.004"), Some(3723.004));
    }

    #[test]
    fn accepts_single_digit_and_long_hours() {
        assert_eq!(parse_timestamp("1:00:00.000"), Some(3600.0));
        assert_eq!(parse_timestamp("100:00:00.000"), Some(360_000.0));
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!(parse_timestamp("00:00:01"), None);
        assert_eq!(parse_timestamp("00:0:01.000"), None);
        assert_eq!(parse_timestamp("00:00:01.5"), None);
        assert_eq!(parse_timestamp("00:61:00.000"), None);
        assert_eq!(parse_timestamp("00:00:60.000"), None);
        assert_eq!(parse_timestamp("aa:bb:cc.ddd"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn formats_with_rounding() {
        assert_eq!(format_timestamp(0.0), "00:00:00.000");
        assert_eq!(format_timestamp(1.5), "00:00:01.500");
        assert_eq!(format_timestamp(3723.004), "01:02:03.004");
        assert_eq!(format_timestamp(0.9996), "00:00:01.000");
        assert_eq!(format_timestamp(-3.0), "00:00:00.000");
        assert_eq!(format_timestamp(f64::NAN), "00:00:00.000");
    }

    #[test]
    fn format_then_parse_is_stable() {
        for secs in [0.0, 0.001, 59.999, 60.0, 3599.5, 86_400.25] {
            let text = format_timestamp(secs);
            let back = parse_timestamp(&text).unwrap();
            assert!((back - secs).abs() < 0.0005, "{secs} -> {text} -> {back}");
        }
    }
}
