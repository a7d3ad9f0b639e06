/// Utility functions for handling Telegram MarkdownV2 formatting
///
/// MarkdownV2 requires escaping of special characters to prevent formatting issues.
/// Escapes markdown special characters for MarkdownV2 parsing mode
///
/// Backslashes are escaped first so already-escaped input is not mangled
/// into a different literal.
///
/// # Example
/// ```
/// use productivity_bot::utils::markdown::escape_markdown;
///
/// let text = "Call mom (at 5pm)!";
/// let escaped = escape_markdown(text);
/// assert_eq!(escaped, "Call mom \\(at 5pm\\)\\!");
/// ```
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(
            ch,
            '\\' | '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '='
                | '|' | '{' | '}' | '.' | '!'
        ) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Escapes `text` and wraps it in MarkdownV2 bold markers.
pub fn bold(text: &str) -> String {
    format!("*{}*", escape_markdown(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_basic_markdown() {
        assert_eq!(escape_markdown("Hello *world*"), "Hello \\*world\\*");
        assert_eq!(escape_markdown("_italic_"), "\\_italic\\_");
        assert_eq!(escape_markdown("`code`"), "\\`code\\`");
    }

    #[test]
    fn test_escape_brackets_and_parentheses() {
        assert_eq!(escape_markdown("[link](url)"), "\\[link\\]\\(url\\)");
        assert_eq!(escape_markdown("{code}"), "\\{code\\}");
    }

    #[test]
    fn test_escape_dates_and_times() {
        assert_eq!(escape_markdown("27-06-2025 at 14:30"), "27\\-06\\-2025 at 14:30");
        assert_eq!(escape_markdown("50.0%"), "50\\.0%");
    }

    #[test]
    fn test_escape_backslash() {
        assert_eq!(escape_markdown("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_escape_empty_and_plain_text() {
        assert_eq!(escape_markdown(""), "");
        assert_eq!(escape_markdown("plain text"), "plain text");
    }

    #[test]
    fn test_bold_escapes_inner_text() {
        assert_eq!(bold("Read 10 pages."), "*Read 10 pages\\.*");
    }
}
