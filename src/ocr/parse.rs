//! Parsing numbers out of recognized text.
//!
//! Every parser returns `None` for text it cannot make sense of. That is the
//! soft-failure signal the polling code retries on.

use regex::Regex;
use std::sync::OnceLock;

/// Digits with optional thousands separators, optional decimals,
/// optional exponent (`1.5E+10`) and optional magnitude suffix (`K/M/B/T`).
const NUMBER_PATTERN: &str =
    r"(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d+))?(?:\s*[eE]\s*\+?\s*(\d{1,3}))?(?:\s*([KMBTkmbt])\b)?";

/// "12 / 40" style progress counters.
const PROGRESS_PATTERN: &str = r"(\d[\d,]*)\s*/\s*(\d[\d,]*)";

fn number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NUMBER_PATTERN).expect("number pattern is valid"))
}

fn progress_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PROGRESS_PATTERN).expect("progress pattern is valid"))
}

/// Fixes common letter-for-digit misreads, only inside tokens that already contain a digit.
///
/// "B0ss" stays a word; "5O" becomes "50".
pub fn fix_digit_misreads(text: &str) -> String {
    text.split(' ')
        .map(|token| {
            if token.chars().any(|c| c.is_ascii_digit()) {
                token
                    .chars()
                    .map(|c| match c {
                        'O' | 'o' => '0',
                        'l' | 'I' | '|' => '1',
                        'S' => '5',
                        other => other,
                    })
                    .collect()
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// First whole number in the text, ignoring thousands separators.
pub fn parse_integer(text: &str) -> Option<u64> {
    let fixed = fix_digit_misreads(text);
    let caps = number_regex().captures(&fixed)?;
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

/// First number in the text, honouring decimals, exponents and K/M/B/T suffixes.
pub fn parse_number(text: &str) -> Option<f64> {
    let fixed = fix_digit_misreads(text);
    let caps = number_regex().captures(&fixed)?;

    let whole = caps.get(1)?.as_str().replace(',', "");
    let mut literal = whole;
    if let Some(frac) = caps.get(2) {
        literal.push('.');
        literal.push_str(frac.as_str());
    }
    let mut value: f64 = literal.parse().ok()?;

    if let Some(exp) = caps.get(3) {
        let exp: i32 = exp.as_str().parse().ok()?;
        value *= 10f64.powi(exp);
    }

    if let Some(suffix) = caps.get(4) {
        value *= match suffix.as_str().to_ascii_uppercase().as_str() {
            "K" => 1e3,
            "M" => 1e6,
            "B" => 1e9,
            "T" => 1e12,
            _ => 1.0,
        };
    }

    Some(value)
}

/// `(done, total)` from a "done / total" counter.
pub fn parse_progress(text: &str) -> Option<(u32, u32)> {
    let fixed = fix_digit_misreads(text);
    let caps = progress_regex().captures(&fixed)?;
    let done = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    let total = caps.get(2)?.as_str().replace(',', "").parse().ok()?;
    Some((done, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("57"), Some(57));
        assert_eq!(parse_integer("Boss 116"), Some(116));
        assert_eq!(parse_integer("1,234,567"), Some(1234567));
        assert_eq!(parse_integer(""), None);
        assert_eq!(parse_integer("~~~"), None);
    }

    #[test]
    fn test_parse_integer_fixes_misreads() {
        assert_eq!(parse_integer("5O"), Some(50));
        assert_eq!(parse_integer("1l6"), Some(116));
        // Words without digits are left alone
        assert_eq!(parse_integer("Boss 1O"), Some(10));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("12,345"), Some(12345.0));
        assert_eq!(parse_number("EXP: 1.5E+10"), Some(1.5e10));
        assert_eq!(parse_number("3.2M"), Some(3.2e6));
        assert_eq!(parse_number("999"), Some(999.0));
        assert_eq!(parse_number("none"), None);
    }

    #[test]
    fn test_parse_number_exponent_with_spaces() {
        let v = parse_number("2.75 E +12").unwrap();
        assert!((v - 2.75e12).abs() < 1.0);
    }

    #[test]
    fn test_parse_progress() {
        assert_eq!(parse_progress("12 / 40"), Some((12, 40)));
        assert_eq!(parse_progress("Progress: 1,000/2,500"), Some((1000, 2500)));
        assert_eq!(parse_progress("12 of 40"), None);
    }
}
