//! Conversions between human decimal amounts and integer base units.

use crate::error::{ChainError, Result};

/// Parses a decimal amount such as `"1.5"` into base units with `decimals`
/// fractional digits.
pub fn parse_units(text: &str, decimals: u8) -> Result<u128> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ChainError::invalid("amount is empty"));
    }
    if text.starts_with('-') {
        return Err(ChainError::invalid(format!("amount must be positive, got {text}")));
    }
    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(ChainError::invalid(format!("\"{text}\" is not a number")));
    }
    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) {
        return Err(ChainError::invalid(format!("\"{text}\" is not a number")));
    }
    if frac.len() > decimals as usize {
        return Err(ChainError::invalid(format!(
            "\"{text}\" has more than {decimals} decimal places"
        )));
    }

    let overflow = || ChainError::invalid(format!("\"{text}\" is too large"));
    let scale = 10u128.checked_pow(decimals as u32).ok_or_else(overflow)?;
    let whole_units = if whole.is_empty() {
        0
    } else {
        whole.parse::<u128>().map_err(|_| overflow())?
    };
    let mut frac_padded = frac.to_string();
    while frac_padded.len() < decimals as usize {
        frac_padded.push('0');
    }
    let frac_units = if frac_padded.is_empty() {
        0
    } else {
        frac_padded.parse::<u128>().map_err(|_| overflow())?
    };

    whole_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or_else(overflow)
}

/// Like [`parse_units`] but rejects zero.
pub fn parse_positive_units(text: &str, decimals: u8) -> Result<u128> {
    let value = parse_units(text, decimals)?;
    if value == 0 {
        return Err(ChainError::invalid(format!("amount must be positive, got {text}")));
    }
    Ok(value)
}

/// Formats base units as a decimal string without trailing zeros.
pub fn format_units(value: u128, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let digits = format!("{value:0>width$}", width = decimals as usize + 1);
    let (whole, frac) = digits.split_at(digits.len() - decimals as usize);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_amounts() {
        assert_eq!(parse_units("1", 18).unwrap(), 1_000_000_000_000_000_000);
        assert_eq!(parse_units("1.5", 18).unwrap(), 1_500_000_000_000_000_000);
        assert_eq!(parse_units(".25", 2).unwrap(), 25);
        assert_eq!(parse_units("100", 0).unwrap(), 100);
    }

    #[test]
    fn rejects_malformed_amounts() {
        assert!(parse_units("", 18).is_err());
        assert!(parse_units("-1", 18).is_err());
        assert!(parse_units("1e18", 18).is_err());
        assert!(parse_units("1.2.3", 18).is_err());
        assert!(parse_units(".", 18).is_err());
        assert!(parse_units("0.001", 2).is_err());
    }

    #[test]
    fn rejects_overflow() {
        assert!(parse_units("340282366920938463463374607431768211456", 0).is_err());
        assert!(parse_units("1000000000000000000", 18).is_ok());
        assert!(parse_units("1000000000000000000000000", 18).is_err());
    }

    #[test]
    fn positive_rejects_zero() {
        assert!(matches!(
            parse_positive_units("0.0", 18),
            Err(ChainError::InvalidInput(_))
        ));
        assert_eq!(parse_positive_units("0.1", 1).unwrap(), 1);
    }

    #[test]
    fn formats_without_trailing_zeros() {
        assert_eq!(format_units(0, 18), "0");
        assert_eq!(format_units(1_500_000_000_000_000_000, 18), "1.5");
        assert_eq!(format_units(10_000_000_000_000_000_000_000, 18), "10000");
        assert_eq!(format_units(1, 18), "0.000000000000000001");
        assert_eq!(format_units(42, 0), "42");
    }
}
