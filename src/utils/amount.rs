use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

const CURRENCY_MARKERS: [&str; 5] = ["tzs", "tshs", "tsh", "shs", "sh"];

/// Parses a loosely formatted currency string such as `"TZS 10,000.00"`,
/// `"10000/="` or `"1.5k"`.
///
/// Returns `None` for blank, negative, non-numeric or out-of-range input.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let mut cleaned = raw.trim().to_lowercase().replace(',', "").replace("/=", "");
    for marker in CURRENCY_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }
    let cleaned = cleaned.replace(' ', "");
    if cleaned.is_empty() {
        return None;
    }

    let (number, multiplier) = match cleaned.strip_suffix('k') {
        Some(number) => (number, Decimal::from(1000)),
        None => (cleaned.as_str(), Decimal::ONE),
    };

    let value = Decimal::from_str(number).ok()?;
    if value.is_sign_negative() {
        return None;
    }

    value.checked_mul(multiplier).map(|v| v.round_dp(2))
}

/// Formats an amount with thousands separators, e.g. `10,000` or `2,500.50`.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let whole = rounded.trunc();
    let fraction = rounded - whole;

    let digits = whole.abs().normalize().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if rounded.is_sign_negative() && !rounded.is_zero() {
        grouped.insert(0, '-');
    }

    if fraction.is_zero() {
        grouped
    } else {
        let cents = (fraction.abs() * Decimal::from(100)).trunc().to_u32().unwrap_or(0);
        format!("{}.{:02}", grouped, cents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_plain_and_grouped() {
        assert_eq!(parse_amount("10000"), Some(dec!(10000)));
        assert_eq!(parse_amount("10,000"), Some(dec!(10000)));
        assert_eq!(parse_amount("TZS 10,000.00"), Some(dec!(10000)));
        assert_eq!(parse_amount("Tsh 5000"), Some(dec!(5000)));
        assert_eq!(parse_amount("15000/="), Some(dec!(15000)));
    }

    #[test]
    fn test_parse_thousands_suffix() {
        assert_eq!(parse_amount("1.5k"), Some(dec!(1500)));
        assert_eq!(parse_amount("20K"), Some(dec!(20000)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("   "), None);
        assert_eq!(parse_amount("free"), None);
        assert_eq!(parse_amount("-500"), None);
    }

    #[test]
    fn test_parse_out_of_range_is_none() {
        assert_eq!(parse_amount("79228162514264337593543950335k"), None);
        assert_eq!(parse_amount("79228162514264337593543950335"), Some(Decimal::MAX));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec!(10000)), "10,000");
        assert_eq!(format_amount(dec!(999)), "999");
        assert_eq!(format_amount(dec!(1234567.5)), "1,234,567.50");
        assert_eq!(format_amount(dec!(0)), "0");
    }
}
