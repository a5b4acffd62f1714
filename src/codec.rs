//! Field codecs for the GC2 text protocol.
//!
//! Every non-header line is `KEY=VALUE` with optional ASCII whitespace
//! around either side. Metric values are decimal floats; identifiers and
//! counters are decimal integers. A value that fails to parse drops that
//! one field, never the whole frame, so all readers return `Option`.

// ---------------------------------------------------------------------------
// Line splitting
// ---------------------------------------------------------------------------

/// Split a line into `(KEY, VALUE)` at the first `=`, trimming ASCII
/// whitespace from both parts. Lines without `=` yield `None` and are
/// ignored by the caller.
pub fn split_kv(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    Some((key.trim_ascii(), value.trim_ascii()))
}

/// First whitespace-delimited token of a line (the message tag on header
/// lines), trimmed of ASCII whitespace.
pub fn first_token(line: &str) -> &str {
    line.trim_ascii().split_ascii_whitespace().next().unwrap_or("")
}

// ---------------------------------------------------------------------------
// Value readers
// ---------------------------------------------------------------------------

/// Parse a decimal float value. `None` on anything `f64::from_str` rejects
/// plus non-finite results (the device never legitimately sends inf/NaN).
pub fn read_f64(value: &str) -> Option<f64> {
    let v: f64 = value.parse().ok()?;
    v.is_finite().then_some(v)
}

/// Parse a decimal integer value. Tolerates a trailing fraction
/// (`"2686.0"`) since some firmware revisions emit integers float-formatted.
pub fn read_i64(value: &str) -> Option<i64> {
    if let Ok(v) = value.parse::<i64>() {
        return Some(v);
    }
    let v = read_f64(value)?;
    (v.fract() == 0.0 && v.abs() <= i64::MAX as f64).then_some(v as i64)
}

/// Parse a boolean flag field (`0`/`1`).
pub fn read_flag(value: &str) -> Option<bool> {
    match read_i64(value)? {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_basic() {
        assert_eq!(split_kv("SPEED_MPH=167.0"), Some(("SPEED_MPH", "167.0")));
    }

    #[test]
    fn split_trims_whitespace() {
        assert_eq!(split_kv("  SHOT_ID = 12 \r"), Some(("SHOT_ID", "12")));
        assert_eq!(split_kv("\tBALLS=1"), Some(("BALLS", "1")));
    }

    #[test]
    fn split_no_equals() {
        assert_eq!(split_kv("0H"), None);
        assert_eq!(split_kv(""), None);
    }

    #[test]
    fn split_value_containing_equals() {
        // Only the first `=` delimits.
        assert_eq!(split_kv("NOTE=a=b"), Some(("NOTE", "a=b")));
    }

    #[test]
    fn first_token_variants() {
        assert_eq!(first_token("0H"), "0H");
        assert_eq!(first_token("  0M extra"), "0M");
        assert_eq!(first_token(""), "");
    }

    #[test]
    fn f64_basic() {
        assert_eq!(read_f64("167.0"), Some(167.0));
        assert_eq!(read_f64("-400"), Some(-400.0));
        assert_eq!(read_f64("bogus"), None);
        assert_eq!(read_f64("inf"), None);
        assert_eq!(read_f64("NaN"), None);
    }

    #[test]
    fn i64_basic() {
        assert_eq!(read_i64("2686"), Some(2686));
        assert_eq!(read_i64("-400"), Some(-400));
        assert_eq!(read_i64("bogus"), None);
    }

    #[test]
    fn i64_float_formatted() {
        assert_eq!(read_i64("2686.0"), Some(2686));
        assert_eq!(read_i64("2686.5"), None);
    }

    #[test]
    fn flag_values() {
        assert_eq!(read_flag("0"), Some(false));
        assert_eq!(read_flag("1"), Some(true));
        assert_eq!(read_flag("2"), None);
        assert_eq!(read_flag("x"), None);
    }
}
