use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

/// Parse a currency string into integer minor units (cents).
///
/// Accepts thousands separators, a leading `$`, surrounding quotes,
/// parenthesized negatives and a leading or trailing minus sign. More than
/// two fractional digits is rejected rather than rounded.
pub fn parse_minor_units(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | '"' | '$') && !c.is_whitespace())
        .collect();
    let mut s = cleaned.as_str();
    let mut negative = false;

    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        negative = true;
        s = inner;
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    } else if let Some(rest) = s.strip_suffix('-') {
        negative = !negative;
        s = rest;
    }

    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > 2
        || !whole.chars().all(|c| c.is_ascii_digit())
        || !frac.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let cents: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    let value = whole.checked_mul(100)?.checked_add(cents)?;
    Some(if negative { -value } else { value })
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// 01/15/2024
    Mdy,
    /// 01/15/24
    MdyShort,
    /// 15/01/2024
    Dmy,
    /// 2024-01-15
    Iso,
    /// Jan 15, 2024
    MonthName,
}

impl DateFormat {
    fn pattern(&self) -> &'static str {
        match self {
            Self::Mdy => "%m/%d/%Y",
            Self::MdyShort => "%m/%d/%y",
            Self::Dmy => "%d/%m/%Y",
            Self::Iso => "%Y-%m-%d",
            Self::MonthName => "%b %d, %Y",
        }
    }
}

/// Parse a date in the given institution format and return it as ISO8601.
pub fn parse_date(raw: &str, format: DateFormat) -> Option<String> {
    let raw = raw.trim().trim_matches('"').trim();
    NaiveDate::parse_from_str(raw, format.pattern())
        .ok()
        .map(to_iso)
}

pub fn parse_iso(iso: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(iso.trim(), "%Y-%m-%d").ok()
}

pub fn to_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minor_units() {
        assert_eq!(parse_minor_units("1,234.56"), Some(123456));
        assert_eq!(parse_minor_units("\"500.00\""), Some(50000));
        assert_eq!(parse_minor_units("  -42.50  "), Some(-4250));
        assert_eq!(parse_minor_units("0"), Some(0));
        assert_eq!(parse_minor_units("-12.34"), Some(-1234));
        assert_eq!(parse_minor_units("7.5"), Some(750));
        assert_eq!(parse_minor_units(".99"), Some(99));
    }

    #[test]
    fn test_parse_minor_units_negative_forms() {
        assert_eq!(parse_minor_units("(500.00)"), Some(-50000));
        assert_eq!(parse_minor_units("(1,234.56)"), Some(-123456));
        assert_eq!(parse_minor_units("-$50.00"), Some(-5000));
        assert_eq!(parse_minor_units("50.00-"), Some(-5000));
        assert_eq!(parse_minor_units("+$3.10"), Some(310));
    }

    #[test]
    fn test_parse_minor_units_rejects_garbage() {
        assert_eq!(parse_minor_units(""), None);
        assert_eq!(parse_minor_units("-"), None);
        assert_eq!(parse_minor_units("not_a_number"), None);
        assert_eq!(parse_minor_units("1.234"), None);
        assert_eq!(parse_minor_units("12.3.4"), None);
    }

    #[test]
    fn test_parse_minor_units_never_uses_floats() {
        // 0.29 * 100 is 28.999999999999996 in binary floating point
        assert_eq!(parse_minor_units("0.29"), Some(29));
        assert_eq!(parse_minor_units("1,000,000.07"), Some(100_000_007));
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("01/15/2024", DateFormat::Mdy), Some("2024-01-15".to_string()));
        assert_eq!(parse_date("1/5/2024", DateFormat::Mdy), Some("2024-01-05".to_string()));
        assert_eq!(parse_date("01/15/24", DateFormat::MdyShort), Some("2024-01-15".to_string()));
        assert_eq!(parse_date("15/01/2024", DateFormat::Dmy), Some("2024-01-15".to_string()));
        assert_eq!(parse_date("2024-01-15", DateFormat::Iso), Some("2024-01-15".to_string()));
        assert_eq!(parse_date("Jan 15, 2024", DateFormat::MonthName), Some("2024-01-15".to_string()));
        assert_eq!(parse_date("\"01/15/2024\"", DateFormat::Mdy), Some("2024-01-15".to_string()));
    }

    #[test]
    fn test_parse_date_rejects_invalid_dates() {
        assert_eq!(parse_date("13/01/2025", DateFormat::Mdy), None);
        assert_eq!(parse_date("02/30/2025", DateFormat::Mdy), None);
        assert_eq!(parse_date("2025-01-15", DateFormat::Mdy), None);
        assert_eq!(parse_date("", DateFormat::Iso), None);
    }
}
