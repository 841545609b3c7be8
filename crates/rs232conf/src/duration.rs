//! Human-readable durations for config files and flags.
//!
//! Accepted forms: `250ms`, `5s`, `2m`, `1h`. A bare number is seconds.

use std::time::Duration;

/// Parse a duration string such as `5s` or `500ms`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // "ms" has to be checked before "s" and "m"
    if let Some(n) = s.strip_suffix("ms") {
        let val: u64 = n
            .trim()
            .parse()
            .map_err(|_| format!("invalid milliseconds: {n}"))?;
        return Ok(Duration::from_millis(val));
    }
    if let Some(n) = s.strip_suffix('s') {
        let val: u64 = n.trim().parse().map_err(|_| format!("invalid seconds: {n}"))?;
        return Ok(Duration::from_secs(val));
    }
    if let Some(n) = s.strip_suffix('m') {
        let val: u64 = n.trim().parse().map_err(|_| format!("invalid minutes: {n}"))?;
        let secs = val
            .checked_mul(60)
            .ok_or_else(|| format!("duration too large: {s}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(n) = s.strip_suffix('h') {
        let val: u64 = n.trim().parse().map_err(|_| format!("invalid hours: {n}"))?;
        let secs = val
            .checked_mul(3600)
            .ok_or_else(|| format!("duration too large: {s}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Ok(val) = s.parse::<u64>() {
        return Ok(Duration::from_secs(val));
    }

    Err(format!(
        "unrecognized duration format: '{s}'. Expected NNms, NNs, NNm, or NNh."
    ))
}

/// Format a duration in the largest unit that represents it exactly.
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }
    let secs = d.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// `serialize_with` helper so durations render as `"5s"` in TOML output.
pub(crate) fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format_duration(*d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_valid() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 10s ").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("1.5s").is_err());
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert!(parse_duration("307445734561825861m").is_err());
        assert!(parse_duration("5124095576030432h").is_err());
        assert_eq!(
            parse_duration("307445734561825860m").unwrap(),
            Duration::from_secs(307445734561825860 * 60)
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_millis(100)), "100ms");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn test_format_then_parse_is_stable() {
        for d in [
            Duration::from_millis(1500),
            Duration::from_secs(90),
            Duration::from_secs(7200),
        ] {
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
    }
}
