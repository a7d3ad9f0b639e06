//! Small text helpers shared by list views and notes.

/// Cuts `text` to at most `max_chars` characters, ending in `...` when cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut cut: String = text.chars().take(keep).collect();
    cut.push_str("...");
    cut
}

/// Splits a comma separated tag list, dropping blanks and leading `#`.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|tag| tag.trim().trim_start_matches('#').trim())
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Renders tags as `#a #b`.
pub fn format_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits `a | b | c` command arguments into trimmed parts.
pub fn split_fields(raw: &str) -> Vec<String> {
    raw.split('|').map(|part| part.trim().to_string()).collect()
}

/// Percentage of `part` in `whole`, zero when `whole` is zero.
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly ten", 11), "exactly ten");
        assert_eq!(truncate("a longer sentence", 10), "a longe...");
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn test_parse_and_format_tags() {
        let tags = parse_tags("work, #ideas, , later ");
        assert_eq!(tags, vec!["work", "ideas", "later"]);
        assert_eq!(format_tags(&tags), "#work #ideas #later");
        assert!(parse_tags("").is_empty());
        assert_eq!(format_tags(&[]), "");
    }

    #[test]
    fn test_split_fields() {
        assert_eq!(split_fields("in 2 hours | Call mom"), vec!["in 2 hours", "Call mom"]);
        assert_eq!(split_fields("single"), vec!["single"]);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(1, 4), 25.0);
        assert_eq!(percentage(3, 0), 0.0);
    }
}
