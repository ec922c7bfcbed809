//! Cleanup of raw OCR lines before field extraction.

use std::borrow::Cow;

use super::patterns::{NOISE_CHARS, SEPARATOR_RUN};

/// Letters OCR engines commonly emit in place of digits.
fn digit_for(c: char) -> Option<char> {
    match c {
        'O' | 'o' => Some('0'),
        'l' | 'I' | '|' => Some('1'),
        'S' => Some('5'),
        'B' => Some('8'),
        _ => None,
    }
}

/// Replace look-alike letters in a token that is otherwise numeric.
///
/// A token qualifies only if it already holds a digit and consists solely of
/// digits, separators and look-alikes, so words are never touched.
fn fix_numeric_token(token: &str) -> Cow<'_, str> {
    let body = token.strip_prefix('$').unwrap_or(token);
    let has_digit = body.chars().any(|c| c.is_ascii_digit());
    let has_lookalike = body.chars().any(|c| digit_for(c).is_some());
    let numeric_shape = body
        .chars()
        .all(|c| c.is_ascii_digit() || c == '.' || c == ',' || digit_for(c).is_some());

    if !(has_digit && has_lookalike && numeric_shape) {
        return Cow::Borrowed(token);
    }

    let prefix = &token[..token.len() - body.len()];
    let fixed: String = body.chars().map(|c| digit_for(c).unwrap_or(c)).collect();
    Cow::Owned(format!("{}{}", prefix, fixed))
}

/// Normalize one recognized line.
pub fn normalize_line(line: &str) -> String {
    let line = SEPARATOR_RUN.replace_all(line, " ");
    let fixed = line
        .split_whitespace()
        .map(fix_numeric_token)
        .collect::<Vec<_>>()
        .join(" ");
    let stripped = NOISE_CHARS.replace_all(&fixed, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize page text into non-blank lines.
pub fn normalize_text(text: &str) -> Vec<String> {
    text.lines()
        .map(normalize_line)
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_collapses_whitespace_and_separators() {
        assert_eq!(normalize_line("  MILK    ----   4.50 "), "MILK 4.50");
        assert_eq!(normalize_line("========"), "");
    }

    #[test]
    fn test_fixes_digits_in_numbers_only() {
        assert_eq!(normalize_line("TOTAL $4O.5O"), "TOTAL $40.50");
        assert_eq!(normalize_line("SOUP l2.99"), "SOUP 12.99");
        // Words stay intact even though they contain look-alike letters.
        assert_eq!(normalize_line("BOSS SOLO"), "BOSS SOLO");
    }

    #[test]
    fn test_strips_noise_characters() {
        assert_eq!(normalize_line("~ACME* MART!"), "ACME MART");
        assert_eq!(normalize_line("2 @ 1.25 = 2.50"), "2 @ 1.25 = 2.50");
    }

    #[test]
    fn test_normalize_text_drops_blank_lines() {
        let lines = normalize_text("ACME\n\n   \n---\nTOTAL 1.00\n");
        assert_eq!(lines, vec!["ACME", "TOTAL 1.00"]);
    }
}
