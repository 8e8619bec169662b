//! Shared utility functions used across the codebase.

/// Marker appended to observations cut by [`truncate_observation`].
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Parse a boolean setting.
///
/// Recognises `1`, `true`, `yes`, `y`, `on` (case-insensitive) as `true`;
/// any other value maps to `false`.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

/// Cut `text` to at most `max_len` bytes (on a char boundary) and append
/// [`TRUNCATION_MARKER`]. Text within the limit is returned unchanged.
pub fn truncate_observation(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &text[..end], TRUNCATION_MARKER)
}

/// Shorten `text` to `max_chars` characters for one-line previews.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    match flat.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &flat[..end]),
        None => flat,
    }
}

/// Turn a task description into a file-name fragment.
///
/// Keeps ASCII alphanumerics, collapses everything else into `_`, and limits
/// the result to 50 characters.
pub fn sanitize_file_name(text: &str) -> String {
    let mut cleaned = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            cleaned.push(c);
        } else if !cleaned.is_empty() && !cleaned.ends_with('_') {
            cleaned.push('_');
        }
    }
    let cleaned: String = cleaned.trim_end_matches('_').chars().take(50).collect();
    if cleaned.is_empty() {
        "task".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_values() {
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" on "));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("nope"));
    }

    #[test]
    fn truncate_observation_keeps_short_text() {
        assert_eq!(truncate_observation("short", 20), "short");
        assert_eq!(truncate_observation("exact", 5), "exact");
    }

    #[test]
    fn truncate_observation_appends_marker() {
        let text = "a".repeat(30);
        let out = truncate_observation(&text, 10);
        assert_eq!(out, format!("{}{}", "a".repeat(10), TRUNCATION_MARKER));
    }

    #[test]
    fn truncate_observation_respects_char_boundaries() {
        // 'é' is two bytes; a cut at byte 3 would split the second one
        let out = truncate_observation("éééé", 3);
        assert_eq!(out, format!("é{}", TRUNCATION_MARKER));
    }

    #[test]
    fn preview_flattens_and_shortens() {
        assert_eq!(preview("one\ntwo", 20), "one two");
        assert_eq!(preview("abcdef", 3), "abc...");
    }

    #[test]
    fn sanitize_file_name_collapses_symbols() {
        assert_eq!(
            sanitize_file_name("Find the price of: 'iPhone 15'!"),
            "Find_the_price_of_iPhone_15"
        );
        assert_eq!(sanitize_file_name("???"), "task");
        assert_eq!(sanitize_file_name(&"x".repeat(80)).len(), 50);
    }
}
