//! Invoice numbering: `{PREFIX}-{YYYY}-{NNNN}`, sequential per prefix and year.

use crate::error::ValidationError;

/// Formats an invoice number. The sequence is zero-padded to four digits and
/// simply grows wider past 9999.
pub fn format_invoice_number(prefix: &str, year: i32, sequence: u32) -> String {
    format!("{}-{}-{:04}", prefix, year, sequence)
}

/// Extracts the sequence from a number produced by [`format_invoice_number`]
/// for the same prefix and year.
pub fn parse_sequence(prefix: &str, year: i32, number: &str) -> Option<u32> {
    let head = format!("{}-{}-", prefix, year);
    let tail = number.strip_prefix(&head)?;

    if tail.is_empty() || !tail.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    tail.parse().ok()
}

/// The number following `last`, or the first of the year when there is none.
///
/// `last` is the highest existing number for this prefix and year; a value
/// that does not parse counts as absent.
pub fn next_invoice_number(prefix: &str, year: i32, last: Option<&str>) -> String {
    let next = last
        .and_then(|number| parse_sequence(prefix, year, number))
        .map_or(1, |sequence| sequence.saturating_add(1));

    format_invoice_number(prefix, year, next)
}

/// Prefix rules: 1 to 10 uppercase letters or digits.
pub fn validate_prefix(prefix: &str) -> Result<(), ValidationError> {
    if prefix.is_empty() {
        return Err(ValidationError::Required {
            field: "invoice prefix".to_string(),
        });
    }

    if prefix.len() > 10
        || !prefix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(ValidationError::InvalidFormat {
            field: "invoice prefix".to_string(),
            reason: "must be 1-10 uppercase letters or digits".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert_eq!(format_invoice_number("ORD", 2026, 1), "ORD-2026-0001");
        assert_eq!(format_invoice_number("ORD", 2026, 12345), "ORD-2026-12345");
    }

    #[test]
    fn test_next_number() {
        assert_eq!(next_invoice_number("ORD", 2026, None), "ORD-2026-0001");
        assert_eq!(
            next_invoice_number("ORD", 2026, Some("ORD-2026-0041")),
            "ORD-2026-0042"
        );
        // Last year's numbering does not carry over.
        assert_eq!(
            next_invoice_number("ORD", 2026, Some("ORD-2025-0041")),
            "ORD-2026-0001"
        );
    }

    #[test]
    fn test_parse_sequence() {
        assert_eq!(parse_sequence("PUR", 2026, "PUR-2026-0007"), Some(7));
        assert_eq!(parse_sequence("PUR", 2026, "ORD-2026-0007"), None);
        assert_eq!(parse_sequence("PUR", 2026, "PUR-2026-"), None);
        assert_eq!(parse_sequence("PUR", 2026, "PUR-2026-00a7"), None);
    }

    #[test]
    fn test_validate_prefix() {
        assert!(validate_prefix("ORD").is_ok());
        assert!(validate_prefix("PO2").is_ok());
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("ord").is_err());
        assert!(validate_prefix("TOO-LONG-PREFIX").is_err());
    }
}
