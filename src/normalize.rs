//! # Line Normalization
//!
//! Small, table-driven text normalization used before and during clause
//! splitting.
//!
//! - **Zenkaku digits**: fullwidth `０`..`９` mapped to ASCII for marker matching
//! - **Line preprocessing**: trailing CR/LF removal, control character
//!   removal, optional Unicode NFC and blank-line dropping

use crate::options::PreprocessOptions;
use std::borrow::Cow;
use unicode_normalization::UnicodeNormalization;

/// Fullwidth (zenkaku) digit to ASCII digit translation table.
const ZENKAKU_DIGITS: &[(char, char)] = &[
    ('０', '0'),
    ('１', '1'),
    ('２', '2'),
    ('３', '3'),
    ('４', '4'),
    ('５', '5'),
    ('６', '6'),
    ('７', '7'),
    ('８', '8'),
    ('９', '9'),
];

/// Get the ASCII replacement for a zenkaku digit, if any.
fn halfwidth_digit(c: char) -> Option<char> {
    ZENKAKU_DIGITS
        .iter()
        .find(|(zenkaku, _)| *zenkaku == c)
        .map(|(_, ascii)| *ascii)
}

/// Converts zenkaku digits to ASCII, leaving every other character intact.
///
/// Borrows the input when there is nothing to convert.
///
/// ```
/// use clausecut::normalize::to_halfwidth_digits;
///
/// assert_eq!(to_halfwidth_digits("第１２条"), "第12条");
/// ```
pub fn to_halfwidth_digits(input: &str) -> Cow<'_, str> {
    if !input.chars().any(|c| halfwidth_digit(c).is_some()) {
        return Cow::Borrowed(input);
    }
    Cow::Owned(
        input
            .chars()
            .map(|c| halfwidth_digit(c).unwrap_or(c))
            .collect(),
    )
}

/// Check if character is an invisible control character that should be removed
fn is_control_char(c: char) -> bool {
    matches!(
        c,
        '\0'        // Null
        | '\x0B'    // Vertical Tab
        | '\x0C'    // Form Feed
        | '\u{FEFF}' // BOM
        | '\u{00AD}' // Soft hyphen
    )
}

/// Normalizes a single extracted line.
pub fn normalize_line(line: &str, options: &PreprocessOptions) -> String {
    let line = line.trim_end_matches(['\n', '\r']);
    if options.normalize_unicode {
        line.nfc().filter(|c| !is_control_char(*c)).collect()
    } else {
        line.chars().filter(|c| !is_control_char(*c)).collect()
    }
}

/// Prepares raw extracted lines for splitting.
///
/// Every line is normalized with [`normalize_line`]; blank lines are kept
/// unless `preserve_empty_lines` is off, so line numbers stay aligned with
/// the source by default.
pub fn preprocess_lines<S: AsRef<str>>(lines: &[S], options: &PreprocessOptions) -> Vec<String> {
    lines
        .iter()
        .map(|line| normalize_line(line.as_ref(), options))
        .filter(|line| options.preserve_empty_lines || !line.trim().is_empty())
        .collect()
}

/// Splits a text blob into lines suitable for [`preprocess_lines`].
pub fn split_text(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halfwidth_digits() {
        assert_eq!(to_halfwidth_digits("第１０条"), "第10条");
        assert_eq!(to_halfwidth_digits("Ａrticle ３"), "Ａrticle 3");
    }

    #[test]
    fn test_halfwidth_digits_borrows_when_unchanged() {
        assert!(matches!(to_halfwidth_digits("第1条"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_control_char_removal() {
        let options = PreprocessOptions::default();
        assert_eq!(normalize_line("\u{FEFF}契約書\x0B\r\n", &options), "契約書");
    }

    #[test]
    fn test_nfc_normalization() {
        // "が" as か + combining dakuten
        let decomposed = "\u{304B}\u{3099}";
        let options = PreprocessOptions::default().with_unicode_normalization();
        assert_eq!(normalize_line(decomposed, &options), "\u{304C}");

        let raw = PreprocessOptions::default();
        assert_eq!(normalize_line(decomposed, &raw), decomposed);
    }

    #[test]
    fn test_compatibility_ideograph_kept_by_default() {
        let line = "第1条 \u{FA19}社の義務";
        assert_eq!(normalize_line(line, &PreprocessOptions::default()), line);
    }

    #[test]
    fn test_preprocess_preserves_blank_lines_by_default() {
        let lines = ["契約書", "", "第1条"];
        let result = preprocess_lines(&lines, &PreprocessOptions::default());
        assert_eq!(result, vec!["契約書", "", "第1条"]);
    }

    #[test]
    fn test_preprocess_drops_blank_lines() {
        let lines = ["契約書", "  ", "第1条"];
        let options = PreprocessOptions::default().drop_empty_lines();
        let result = preprocess_lines(&lines, &options);
        assert_eq!(result, vec!["契約書", "第1条"]);
    }
}
