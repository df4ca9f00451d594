//! Small formatting helpers shared by handlers and reports.

/// Formats a byte size into a human-readable string
pub fn format_file_size(bytes: i64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

/// Safely truncates a string to a maximum number of characters (not bytes),
/// appending "..." when something was cut off.
pub fn truncate_string_safe(text: &str, max_len: usize) -> String {
    if text.is_empty() {
        return String::new();
    }

    let char_count = text.chars().count();
    if char_count <= max_len {
        return text.to_string();
    }

    let truncate_len = max_len.saturating_sub(3);
    let mut result = String::with_capacity(truncate_len + 3);
    for (idx, ch) in text.chars().enumerate() {
        if idx >= truncate_len {
            break;
        }
        result.push(ch);
    }
    result.push_str("...");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(2048), "2.0 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_truncate_string_safe() {
        assert_eq!(truncate_string_safe("", 10), "");
        assert_eq!(truncate_string_safe("short", 10), "short");
        assert_eq!(truncate_string_safe("a very long title indeed", 10), "a very ...");
        // Multibyte characters are counted as characters, not bytes
        assert_eq!(truncate_string_safe("Видео на русском языке", 10), "Видео н...");
    }
}
