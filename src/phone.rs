//! Phone number canonicalization.
//!
//! All functions are total: malformed input degrades to an empty string or
//! is returned unchanged, never an error.

/// Country calling code prepended to bare national numbers.
pub const COUNTRY_CODE: &str = "998";

/// Length of a national number without the country code.
const NATIONAL_LEN: usize = 9;

/// Numbers with this many digits or fewer are internal extensions.
pub const MAX_INTERNAL_LEN: usize = 5;

/// Strip every character that is not an ASCII digit.
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Prefix the country code onto a 9-digit national number.
///
/// Any other length is returned unchanged (after digit stripping). No
/// dialing-plan validation is attempted.
pub fn to_country_form(s: &str) -> String {
    let digits = digits_only(s);
    if digits.len() == NATIONAL_LEN {
        format!("{COUNTRY_CODE}{digits}")
    } else {
        digits
    }
}

/// Canonical `+<digits>` form used for exact contact matching.
pub fn compact_form(s: &str) -> String {
    let digits = digits_only(s);
    if digits.is_empty() {
        String::new()
    } else {
        format!("+{digits}")
    }
}

/// Human-readable form: `+998 XX XXX XX XX` for full local numbers,
/// otherwise the compact form.
pub fn pretty_format(s: &str) -> String {
    let digits = digits_only(s);
    if digits.len() == COUNTRY_CODE.len() + NATIONAL_LEN && digits.starts_with(COUNTRY_CODE) {
        let n = &digits[COUNTRY_CODE.len()..];
        return format!(
            "+{} {} {} {} {}",
            COUNTRY_CODE,
            &n[0..2],
            &n[2..5],
            &n[5..7],
            &n[7..9]
        );
    }
    compact_form(&digits)
}

/// Last seven digits, used to narrow substring searches.
pub fn tail(digits: &str) -> &str {
    let start = digits.len().saturating_sub(7);
    &digits[start..]
}
