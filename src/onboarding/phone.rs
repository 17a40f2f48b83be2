//! Phone number input mask and validation.

use std::sync::LazyLock;

use regex::Regex;

/// Significant digits accepted; anything past this is dropped.
pub const MAX_PHONE_DIGITS: usize = 10;

static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{3}-[0-9]{3}-[0-9]{4}$").expect("phone pattern is a valid regex")
});

/// Progressive `DDD-DDD-DDDD` mask over whatever digits `raw` contains.
///
/// Non-digits are stripped and digits past the tenth are dropped, so partial
/// input stays a prefix of the final form: `"1234567"` becomes `"123-456-7"`.
pub fn format_phone(raw: &str) -> String {
    let mut formatted = String::with_capacity(MAX_PHONE_DIGITS + 2);
    for (i, digit) in raw
        .chars()
        .filter(char::is_ascii_digit)
        .take(MAX_PHONE_DIGITS)
        .enumerate()
    {
        if i == 3 || i == 6 {
            formatted.push('-');
        }
        formatted.push(digit);
    }
    formatted
}

/// Exactly `DDD-DDD-DDDD`.
pub fn is_valid_phone(formatted: &str) -> bool {
    PHONE_PATTERN.is_match(formatted)
}
