//! Best-effort extraction of a money amount from keyed digits or transcribed speech.
//!
//! Two paths are tried in order: a plain digit string (DTMF, or speech that the
//! recognizer already rendered as a number), then a small word lexicon. Anything
//! phrased outside the lexicon is rejected so that the caller gets re-prompted
//! rather than recorded with a wrong figure.
//!
//! Amounts are bounded by `Decimal::MAX` (29 digits). Every digit string of up
//! to 28 digits is accepted as-is; larger values past that bound are rejected.

use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("amount not parseable")]
pub struct NotParseable;

const DIGIT_WORDS: &[(&str, u32)] = &[
    ("zero", 0),
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
];

/// Numerals we recognize but deliberately do not compose.
const UNSUPPORTED_NUMERALS: &[&str] = &[
    "ten", "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen",
    "eighteen", "nineteen", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty",
    "ninety", "point",
];

pub fn normalize(raw: &str) -> Result<Decimal, NotParseable> {
    if let Some(amount) = plain_amount(raw) {
        return Ok(amount);
    }
    spoken_amount(raw)
}

/// `350000`, `350 000`, `$350,000` and `350000.00` all land here.
fn plain_amount(raw: &str) -> Option<Decimal> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '$' | ','))
        .collect();
    let whole = match compact.split_once('.') {
        Some((whole, cents)) if cents.bytes().all(|b| b.is_ascii_digit()) => whole,
        Some(_) => return None,
        None => compact.as_str(),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Decimal::from_str(whole).ok()
}

fn spoken_amount(raw: &str) -> Result<Decimal, NotParseable> {
    let mut total = Decimal::ZERO;
    let mut pending = Decimal::ZERO;
    let mut seen_digit = false;

    for token in raw.split(|c: char| c.is_whitespace() || c == '-') {
        let word = token
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if word.is_empty() {
            continue;
        }

        if word.bytes().any(|b| b.is_ascii_digit()) {
            // "1.5 million" would otherwise read as one million
            if word.contains('.') {
                return Err(NotParseable);
            }
            for digit in word.chars().filter_map(|c| c.to_digit(10)) {
                pending = push_digit(pending, digit)?;
                seen_digit = true;
            }
            continue;
        }

        if let Some(&(_, digit)) = DIGIT_WORDS.iter().find(|(w, _)| *w == word) {
            pending = push_digit(pending, digit)?;
            seen_digit = true;
            continue;
        }

        match word.as_str() {
            "hundred" => pending = scale(pending, 100)?,
            "thousand" => {
                total = total
                    .checked_add(scale(pending, 1_000)?)
                    .ok_or(NotParseable)?;
                pending = Decimal::ZERO;
            }
            "million" => {
                total = total
                    .checked_add(scale(pending, 1_000_000)?)
                    .ok_or(NotParseable)?;
                pending = Decimal::ZERO;
            }
            w if UNSUPPORTED_NUMERALS.contains(&w) => return Err(NotParseable),
            // filler such as "about", "dollars", "my", "budget", "is"
            _ => {}
        }
    }

    if !seen_digit {
        return Err(NotParseable);
    }
    total.checked_add(pending).ok_or(NotParseable)
}

fn push_digit(acc: Decimal, digit: u32) -> Result<Decimal, NotParseable> {
    acc.checked_mul(Decimal::TEN)
        .and_then(|v| v.checked_add(Decimal::from(digit)))
        .ok_or(NotParseable)
}

fn scale(acc: Decimal, factor: u64) -> Result<Decimal, NotParseable> {
    acc.checked_mul(Decimal::from(factor)).ok_or(NotParseable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(v: u64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn digits_parse_directly() {
        assert_eq!(normalize("350000"), Ok(dec(350_000)));
        assert_eq!(normalize(" 007 "), Ok(dec(7)));
        assert_eq!(normalize("0"), Ok(dec(0)));
    }

    #[test]
    fn punctuation_and_cents_are_stripped() {
        assert_eq!(normalize("$350,000"), Ok(dec(350_000)));
        assert_eq!(normalize("350,000.00"), Ok(dec(350_000)));
        assert_eq!(normalize("3 5 0 0 0 0"), Ok(dec(350_000)));
    }

    #[test]
    fn magnitude_words() {
        assert_eq!(normalize("one thousand"), Ok(dec(1_000)));
        assert_eq!(normalize("two million"), Ok(dec(2_000_000)));
        assert_eq!(normalize("three five zero thousand"), Ok(dec(350_000)));
        assert_eq!(normalize("five hundred thousand"), Ok(dec(500_000)));
        assert_eq!(
            normalize("One million, two hundred thousand dollars."),
            Ok(dec(1_200_000))
        );
    }

    #[test]
    fn digits_mixed_with_words() {
        assert_eq!(normalize("about 350 thousand"), Ok(dec(350_000)));
        assert_eq!(normalize("my budget is $400,000"), Ok(dec(400_000)));
    }

    #[test]
    fn fractions_next_to_words_are_rejected() {
        assert_eq!(normalize("1.5 million"), Err(NotParseable));
    }

    #[test]
    fn nothing_recoverable() {
        assert_eq!(normalize(""), Err(NotParseable));
        assert_eq!(normalize("   "), Err(NotParseable));
        assert_eq!(normalize("banana"), Err(NotParseable));
        assert_eq!(normalize("a million"), Err(NotParseable));
    }

    #[test]
    fn phrasing_outside_lexicon_is_rejected() {
        assert_eq!(normalize("two fifty k"), Err(NotParseable));
        assert_eq!(normalize("twenty-five thousand"), Err(NotParseable));
        assert_eq!(normalize("three point five million"), Err(NotParseable));
    }

    #[test]
    fn overflow_is_not_parseable() {
        let huge = "9".repeat(40);
        assert_eq!(normalize(&huge), Err(NotParseable));
        let spoken = format!("{} million", "nine ".repeat(30));
        assert_eq!(normalize(&spoken), Err(NotParseable));
    }

    #[test]
    fn digit_strings_stop_at_decimal_max() {
        assert_eq!(normalize("79228162514264337593543950335"), Ok(Decimal::MAX));
        assert_eq!(normalize("79228162514264337593543950336"), Err(NotParseable));
        assert_eq!(normalize(&"9".repeat(30)), Err(NotParseable));
    }

    proptest! {
        #[test]
        fn any_digit_string_is_its_own_value(d in "[0-9]{1,28}") {
            let expected = Decimal::from_i128_with_scale(d.parse::<i128>().unwrap(), 0);
            prop_assert_eq!(normalize(&d), Ok(expected));
        }
    }
}
