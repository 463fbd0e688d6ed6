//! Formatting and parsing of human-readable transaction numbers.
//!
//! Numbers look like `INV-20260827-0001`: prefix, day, then a four-digit
//! counter that resets daily per prefix+scope. The allocator in the backend
//! serializes concurrent generation; this module only knows the format.

use chrono::NaiveDate;

/// Minimum width of the daily counter suffix; counters past 9999 widen it
pub const SEQUENCE_WIDTH: usize = 4;

/// Format a full sequence number for a day
pub fn format_sequence(prefix: &str, date: NaiveDate, sequence: u32) -> String {
    format!(
        "{}-{}-{:0width$}",
        prefix,
        date.format("%Y%m%d"),
        sequence,
        width = SEQUENCE_WIDTH
    )
}

/// SQL LIKE pattern matching every number issued for `prefix` on `date`
pub fn day_pattern(prefix: &str, date: NaiveDate) -> String {
    format!("{}-{}-%", prefix, date.format("%Y%m%d"))
}

/// Extract the counter from a number issued for `prefix` on `date`.
/// Returns `None` for codes from other days, other prefixes, or with
/// malformed suffixes.
pub fn parse_sequence(prefix: &str, date: NaiveDate, code: &str) -> Option<u32> {
    let expected = format!("{}-{}-", prefix, date.format("%Y%m%d"));
    let suffix = code.strip_prefix(&expected)?;
    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Advisory-lock key for one prefix+scope+day. Scope discriminates beyond the
/// prefix (e.g. product+branch+batch type for instance codes); document
/// numbers use an empty scope.
pub fn lock_key(prefix: &str, scope: &str, date: NaiveDate) -> String {
    format!("seq:{}:{}:{}", prefix, scope, date.format("%Y%m%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 27).unwrap()
    }

    #[test]
    fn formats_with_zero_padding() {
        assert_eq!(format_sequence("INV", day(), 1), "INV-20260827-0001");
        assert_eq!(format_sequence("PRET", day(), 9999), "PRET-20260827-9999");
    }

    #[test]
    fn parse_rejects_other_days_and_prefixes() {
        assert_eq!(parse_sequence("INV", day(), "INV-20260827-0042"), Some(42));
        assert_eq!(parse_sequence("INV", day(), "INV-20260826-0042"), None);
        assert_eq!(parse_sequence("PO", day(), "INV-20260827-0042"), None);
        assert_eq!(parse_sequence("INV", day(), "INV-20260827-00x2"), None);
    }
}
