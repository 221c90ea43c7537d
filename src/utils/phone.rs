/// Canonicalises a Tanzanian mobile number to `255XXXXXXXXX`.
///
/// Input that does not look like a mobile number is returned trimmed but
/// otherwise unchanged.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let compact: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    let digits = compact.strip_prefix('+').unwrap_or(&compact);
    let digits = digits.strip_prefix("00").unwrap_or(digits);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return trimmed.to_string();
    }

    match digits.len() {
        12 if digits.starts_with("255") => digits.to_string(),
        10 if digits.starts_with('0') => format!("255{}", &digits[1..]),
        9 if digits.starts_with('6') || digits.starts_with('7') => format!("255{}", digits),
        _ => trimmed.to_string(),
    }
}

/// Returns true for a normalised Tanzanian mobile number.
pub fn is_valid_phone(normalized: &str) -> bool {
    normalized.len() == 12
        && normalized.starts_with("255")
        && matches!(normalized.as_bytes()[3], b'6' | b'7')
        && normalized.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_format() {
        assert_eq!(normalize_phone("0712345678"), "255712345678");
        assert_eq!(normalize_phone(" 0712 345 678 "), "255712345678");
        assert_eq!(normalize_phone("0654-321-987"), "255654321987");
    }

    #[test]
    fn test_international_format() {
        assert_eq!(normalize_phone("255712345678"), "255712345678");
        assert_eq!(normalize_phone("+255 712 345 678"), "255712345678");
        assert_eq!(normalize_phone("00255712345678"), "255712345678");
    }

    #[test]
    fn test_bare_subscriber_number() {
        assert_eq!(normalize_phone("712345678"), "255712345678");
    }

    #[test]
    fn test_malformed_input_unchanged() {
        assert_eq!(normalize_phone("12345"), "12345");
        assert_eq!(normalize_phone("not a phone"), "not a phone");
        assert_eq!(normalize_phone(""), "");
    }

    #[test]
    fn test_is_valid_phone() {
        assert!(is_valid_phone("255712345678"));
        assert!(is_valid_phone("255654321987"));
        assert!(!is_valid_phone("255512345678"));
        assert!(!is_valid_phone("12345"));
        assert!(!is_valid_phone("0712345678"));
    }
}
