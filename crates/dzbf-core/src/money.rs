//! DZD amount helpers.

use rust_decimal::{Decimal, RoundingStrategy};

/// Round an amount to centimes (2 dp), half away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Render an amount the way the storefront displays prices, e.g.
/// `12 500,00 DA`.
#[must_use]
pub fn format_dzd(amount: Decimal) -> String {
    let rounded = round_money(amount);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();

    let mut abs = rounded.abs();
    abs.rescale(2);
    let text = abs.to_string();
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(*c);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}{grouped},{frac_part} DA")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_money(Decimal::new(12_345, 3)), Decimal::new(1235, 2));
        assert_eq!(round_money(Decimal::new(-12_345, 3)), Decimal::new(-1235, 2));
    }

    #[test]
    fn formats_with_thousands_separator() {
        assert_eq!(format_dzd(Decimal::new(12_500, 0)), "12 500,00 DA");
        assert_eq!(format_dzd(Decimal::new(1_234_567_89, 2)), "1 234 567,89 DA");
    }

    #[test]
    fn formats_small_and_zero_amounts() {
        assert_eq!(format_dzd(Decimal::ZERO), "0,00 DA");
        assert_eq!(format_dzd(Decimal::new(600, 0)), "600,00 DA");
        assert_eq!(format_dzd(Decimal::new(5, 1)), "0,50 DA");
    }

    #[test]
    fn formats_negative_amounts() {
        assert_eq!(format_dzd(Decimal::new(-1500, 0)), "-1 500,00 DA");
    }
}
