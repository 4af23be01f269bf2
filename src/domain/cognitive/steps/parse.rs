//! Lenient readers for the loosely structured text models return.

/// Value after `label:` on the first line that starts with `label`
/// (ASCII case-insensitive), trimmed and unquoted.
pub(crate) fn labelled_value<'a>(raw: &'a str, label: &str) -> Option<&'a str> {
    raw.lines().find_map(|line| {
        let line = line.trim_start_matches(|c: char| matches!(c, '*' | '-' | '#') || c.is_whitespace());
        let head = line.get(..label.len())?;
        if !head.eq_ignore_ascii_case(label) {
            return None;
        }
        let rest = line[label.len()..].trim_start_matches('*').trim_start();
        let value = rest.strip_prefix(':').unwrap_or(rest);
        Some(unquote(value))
    })
}

/// Strips surrounding whitespace and matching quote characters.
pub(crate) fn unquote(text: &str) -> &str {
    text.trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”' | '*'))
        .trim()
}

/// First non-negative decimal number in `text`.
pub(crate) fn first_number(text: &str) -> Option<f32> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;
    let mut end = start;
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    text[start..end].parse().ok()
}

/// Byte offset of the first ASCII case-insensitive occurrence of `needle`.
pub(crate) fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .to_ascii_lowercase()
        .find(&needle.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labelled_value_is_case_insensitive_and_unquoted() {
        let raw = "Urgency: 0.8\nINTERJECTION: \"Hold on!\"";
        assert_eq!(labelled_value(raw, "interjection"), Some("Hold on!"));
        assert_eq!(labelled_value(raw, "urgency"), Some("0.8"));
        assert_eq!(labelled_value(raw, "approach"), None);
    }

    #[test]
    fn labelled_value_tolerates_markdown_bullets() {
        assert_eq!(labelled_value("- **first**: Tamar", "first"), Some("Tamar"));
        assert_eq!(labelled_value("  ## * Urgency: 0.9", "urgency"), Some("0.9"));
        assert_eq!(labelled_value("**interjection**: \"Wait!\"", "interjection"), Some("Wait!"));
    }

    #[test]
    fn first_number_reads_decimals() {
        assert_eq!(first_number("about 7.5 out of 10"), Some(7.5));
        assert_eq!(first_number("0.75"), Some(0.75));
        assert_eq!(first_number("ends with 3."), Some(3.0));
        assert_eq!(first_number("none here"), None);
    }

    #[test]
    fn find_ignore_case_returns_offset() {
        assert_eq!(find_ignore_case("I pick KOTHAR", "kothar"), Some(7));
        assert_eq!(find_ignore_case("nobody", ""), None);
    }
}
