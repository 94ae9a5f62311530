//! Lap time text parsing

/// Parse a formatted lap time into seconds
///
/// Accepts timedelta text (`0 days 00:01:24.500000`), clock notation
/// (`00:01:24.5`, `1:24.5`) and bare seconds (`84.5`). Returns `None` for
/// anything unparseable or non-positive.
pub fn parse_pace(raw: &str) -> Option<f64> {
    let text = raw.trim();
    if text.is_empty() || text.eq_ignore_ascii_case("nat") || text.eq_ignore_ascii_case("nan") {
        return None;
    }

    let (days, clock) = split_days(text)?;

    let parts: Vec<&str> = clock.split(':').collect();
    let seconds = match parts.as_slice() {
        [s] => parse_component(s)?,
        [m, s] => {
            let minutes = parse_whole(m)?;
            let secs = parse_component(s)?;
            if secs >= 60.0 {
                return None;
            }
            minutes * 60.0 + secs
        }
        [h, m, s] => {
            let hours = parse_whole(h)?;
            let minutes = parse_whole(m)?;
            let secs = parse_component(s)?;
            if minutes >= 60.0 || secs >= 60.0 {
                return None;
            }
            hours * 3600.0 + minutes * 60.0 + secs
        }
        _ => return None,
    };

    let total = days * 86_400.0 + seconds;
    if total.is_finite() && total > 0.0 {
        Some(total)
    } else {
        None
    }
}

/// Split an optional `N days ` prefix from the clock part
fn split_days(text: &str) -> Option<(f64, &str)> {
    let Some(idx) = text.find("day") else {
        return Some((0.0, text));
    };

    let days = parse_whole(text[..idx].trim())?;
    let rest = text[idx..]
        .trim_start_matches("days")
        .trim_start_matches("day")
        .trim();
    Some((days, rest))
}

fn parse_whole(s: &str) -> Option<f64> {
    let value: u64 = s.trim().parse().ok()?;
    Some(value as f64)
}

fn parse_component(s: &str) -> Option<f64> {
    let value: f64 = s.trim().parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timedelta_text() {
        let secs = parse_pace("0 days 00:01:24.500000").unwrap();
        assert!((secs - 84.5).abs() < 1e-9);
    }

    #[test]
    fn test_clock_notation() {
        assert!((parse_pace("00:01:24.5").unwrap() - 84.5).abs() < 1e-9);
        assert!((parse_pace("1:24.512").unwrap() - 84.512).abs() < 1e-9);
    }

    #[test]
    fn test_bare_seconds() {
        assert!((parse_pace("84.5").unwrap() - 84.5).abs() < 1e-9);
        assert!((parse_pace(" 91 ").unwrap() - 91.0).abs() < 1e-9);
    }

    #[test]
    fn test_nonzero_days_prefix() {
        let secs = parse_pace("1 days 00:00:01").unwrap();
        assert!((secs - 86_401.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(parse_pace(""), None);
        assert_eq!(parse_pace("NaT"), None);
        assert_eq!(parse_pace("abc"), None);
        assert_eq!(parse_pace("1:75.0"), None);
        assert_eq!(parse_pace("-3.0"), None);
        assert_eq!(parse_pace("0"), None);
        assert_eq!(parse_pace("1:2:3:4"), None);
    }
}
