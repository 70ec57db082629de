//! SMS text preparation and segment counting.
//!
//! Messages that fit the GSM 03.38 alphabet are billed per 160 (single) or
//! 153 (concatenated) characters, with characters from the extension table
//! taking two slots. Anything else is sent as UTF-16 at 70 / 67 characters
//! per segment.

use lazy_static::lazy_static;
use regex::Regex;

const GSM_7BIT_LEN: usize = 160;
const GSM_7BIT_LEN_MULTIPART: usize = 153;
const UTF16_LEN: usize = 70;
const UTF16_LEN_MULTIPART: usize = 67;

const GSM_7BIT_BASIC: &[u32] = &[
    10, 12, 13, 92, 95, 161, 163, 164, 165, 191, 196, 197, 198, 199, 201, 209, 214, 216, 220,
    223, 224, 228, 229, 230, 232, 233, 236, 241, 242, 246, 248, 249, 252, 915, 916, 920, 923,
    926, 928, 931, 934, 936, 937,
];

const GSM_7BIT_EXTENDED: &[u32] = &[12, 91, 92, 93, 94, 123, 124, 125, 126, 8364];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsEncoding {
    Gsm7Bit,
    Gsm7BitExtended,
    Utf16,
}

impl SmsEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmsEncoding::Gsm7Bit => "GSM_7BIT",
            SmsEncoding::Gsm7BitExtended => "GSM_7BIT_EX",
            SmsEncoding::Utf16 => "UTF16",
        }
    }
}

/// Segment count of one SMS text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmsCount {
    pub encoding: SmsEncoding,
    /// Length in encoding slots (extension characters count twice)
    pub length: usize,
    pub per_message: usize,
    pub messages: usize,
    pub remaining: usize,
}

fn is_basic(code: u32) -> bool {
    (32..=90).contains(&code) || (97..=122).contains(&code) || GSM_7BIT_BASIC.contains(&code)
}

fn is_extended(code: u32) -> bool {
    GSM_7BIT_EXTENDED.contains(&code)
}

pub fn detect_encoding(text: &str) -> SmsEncoding {
    let codes: Vec<u32> = text.chars().map(u32::from).collect();

    if codes.iter().all(|&c| is_basic(c)) {
        return SmsEncoding::Gsm7Bit;
    }
    if codes.iter().filter(|&&c| !is_basic(c)).all(|&c| is_extended(c)) {
        return SmsEncoding::Gsm7BitExtended;
    }
    SmsEncoding::Utf16
}

/// Count the segments `text` is split into.
pub fn count(text: &str) -> SmsCount {
    let encoding = detect_encoding(text);
    let mut length = text.chars().count();

    if encoding == SmsEncoding::Gsm7BitExtended {
        length += text.chars().filter(|&c| is_extended(u32::from(c))).count();
    }

    let (single, multipart) = match encoding {
        SmsEncoding::Utf16 => (UTF16_LEN, UTF16_LEN_MULTIPART),
        _ => (GSM_7BIT_LEN, GSM_7BIT_LEN_MULTIPART),
    };
    let per_message = if length > single { multipart } else { single };

    let messages = length.div_ceil(per_message);
    let remaining = per_message * messages - length;

    SmsCount {
        encoding,
        length,
        per_message,
        messages,
        remaining,
    }
}

lazy_static! {
    static ref TAGS: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Plain single-spaced text: markup removed, whitespace runs collapsed.
pub fn plain_text(text: &str) -> String {
    let stripped = TAGS.replace_all(text, " ");
    WHITESPACE
        .replace_all(&stripped, " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_gsm_message() {
        let result = count("Hello world");
        assert_eq!(result.encoding, SmsEncoding::Gsm7Bit);
        assert_eq!(result.length, 11);
        assert_eq!(result.messages, 1);
        assert_eq!(result.per_message, 160);
        assert_eq!(result.remaining, 149);
    }

    #[test]
    fn test_gsm_multipart_boundary() {
        assert_eq!(count(&"a".repeat(160)).messages, 1);

        let result = count(&"a".repeat(161));
        assert_eq!(result.per_message, 153);
        assert_eq!(result.messages, 2);
        assert_eq!(result.remaining, 306 - 161);
    }

    #[test]
    fn test_extended_characters_take_two_slots() {
        let result = count("price 5€ [x]");
        assert_eq!(result.encoding, SmsEncoding::Gsm7BitExtended);
        assert_eq!(result.length, 12 + 3);
    }

    #[test]
    fn test_unicode_message() {
        let result = count("Pozdrav, čas je že pretekel");
        assert_eq!(result.encoding, SmsEncoding::Utf16);
        assert_eq!(result.per_message, 70);
        assert_eq!(result.messages, 1);

        assert_eq!(count(&"č".repeat(71)).messages, 2);
        assert_eq!(count(&"č".repeat(71)).per_message, 67);
    }

    #[test]
    fn test_plain_text_strips_markup() {
        assert_eq!(
            plain_text("<p>Hello\n\n  <b>there</b></p>"),
            "Hello there"
        );
    }
}
