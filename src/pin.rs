//! Canonicalization of user-entered PIN strings.
//!
//! Pure and total: the same logical PIN, however the user or their input
//! method shaped it, must normalize identically so key derivation is
//! reproducible across devices and keyboards.

use unicode_normalization::UnicodeNormalization;

/// Normalize a PIN for key derivation and verification.
///
/// Steps, in order:
/// 1. Trim leading/trailing whitespace.
/// 2. If the trimmed PIN is entirely Unicode decimal digits, map each to
///    its ASCII digit equivalent (so e.g. Arabic-Indic digits and ASCII
///    digits collapse to the same string).
/// 3. Apply Unicode NFKD normalization.
///
/// Only leading/trailing whitespace is trimmed; interior whitespace is
/// preserved (so `"1 2 3 4"` is not all-digits and normalizes to itself,
/// not `"1234"`) — see the Open Question resolution in DESIGN.md.
pub fn normalize(pin: &str) -> String {
    let trimmed = pin.trim();

    let digit_mapped: String = if is_all_digits(trimmed) {
        trimmed
            .chars()
            .map(|c| c.to_digit(10).map(|d| std::char::from_digit(d, 10).unwrap()).unwrap_or(c))
            .collect()
    } else {
        trimmed.to_string()
    };

    digit_mapped.nfkd().collect()
}

fn is_all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.to_digit(10).is_some())
}

/// Whether a normalized PIN is purely digits ([`crate::keys::PinType::Numeric`])
/// or contains other characters ([`crate::keys::PinType::Alphanumeric`]).
pub fn is_numeric(normalized_pin: &str) -> bool {
    is_all_digits(normalized_pin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_whitespace() {
        assert_eq!(normalize("  1 2 3 4  "), "1 2 3 4");
    }

    #[test]
    fn maps_arabic_indic_digits_to_ascii() {
        assert_eq!(normalize("\u{0661}\u{0662}\u{0663}\u{0664}"), "1234");
    }

    #[test]
    fn leaves_alphanumeric_untouched_besides_trim() {
        assert_eq!(normalize("  abCD12  "), "abCD12");
    }

    #[test]
    fn numeric_detection() {
        assert!(is_numeric(&normalize("1234")));
        assert!(!is_numeric(&normalize("12a4")));
    }

    #[test]
    fn idempotent_under_repeated_normalization() {
        let once = normalize("  \u{0661}\u{0662}\u{0663}\u{0664}  ");
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    // Invariant 1 (spec.md §8): padding a PIN with ASCII whitespace, or
    // reshaping all-digit PINs into another digit script, never changes
    // what it normalizes to.
    proptest::proptest! {
        #[test]
        fn padding_with_ascii_whitespace_does_not_change_normalization(
            pin in "[0-9a-zA-Z]{1,12}",
            leading in " {0,4}",
            trailing in " {0,4}",
        ) {
            let padded = format!("{leading}{pin}{trailing}");
            proptest::prop_assert_eq!(normalize(&padded), normalize(&pin));
        }

        #[test]
        fn arabic_indic_digit_pins_normalize_identically_to_ascii(digits in proptest::collection::vec(0u8..=9, 1..8)) {
            let ascii: String = digits.iter().map(|d| std::char::from_digit(*d as u32, 10).unwrap()).collect();
            let arabic_indic: String = digits
                .iter()
                .map(|d| std::char::from_u32(0x0660 + *d as u32).unwrap())
                .collect();
            proptest::prop_assert_eq!(normalize(&arabic_indic), normalize(&ascii));
        }
    }
}
