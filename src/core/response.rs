//! Discord message chunking and line-compaction utilities

/// Discord message content limit
pub const MESSAGE_LIMIT: usize = 2000;

/// Chunk text into pieces that fit a size limit (UTF-8 safe, line-aware)
///
/// Splits at line boundaries when possible and falls back to
/// character-by-character splitting for single lines longer than the
/// limit. Never splits inside a UTF-8 character.
pub fn chunk_text(text: &str, max_size: usize) -> Vec<String> {
    if text.len() <= max_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let line_with_newline = format!("{line}\n");
        if current.len() + line_with_newline.len() > max_size {
            if !current.is_empty() {
                chunks.push(current.trim_end().to_string());
                current = String::new();
            }
            if line_with_newline.len() > max_size {
                chunks.extend(chunk_long_line(line, max_size));
            } else {
                current = line_with_newline;
            }
        } else {
            current.push_str(&line_with_newline);
        }
    }
    if !current.is_empty() {
        chunks.push(current.trim_end().to_string());
    }
    chunks
}

fn chunk_long_line(line: &str, max_size: usize) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();

    for ch in line.chars() {
        if current.len() + ch.len_utf8() > max_size && !current.is_empty() {
            result.push(current);
            current = String::new();
        }
        current.push(ch);
    }

    if !current.is_empty() {
        result.push(current);
    }

    result
}

/// Chunk text for plain message content (2000 character limit)
pub fn chunk_for_message(text: &str) -> Vec<String> {
    chunk_text(text, MESSAGE_LIMIT)
}

/// Collapse runs of whitespace into single spaces and truncate to a
/// character count, appending an ellipsis when anything was cut.
///
/// Used to squeeze background-channel chatter into single short lines
/// before token costing.
pub fn compact_inline(text: &str, limit: usize) -> String {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.chars().count() <= limit {
        return cleaned;
    }
    let kept: String = cleaned.chars().take(limit.saturating_sub(1)).collect();
    format!("{}…", kept.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_no_chunk() {
        let result = chunk_text("hello", 100);
        assert_eq!(result, vec!["hello"]);
    }

    #[test]
    fn test_chunk_respects_lines() {
        let text = "line1\nline2\nline3";
        let result = chunk_text(text, 12);
        assert!(result.len() >= 2);
        for chunk in &result {
            assert!(!chunk.ends_with('\n'));
        }
    }

    #[test]
    fn test_chunk_handles_long_lines() {
        let long_line = "a".repeat(100);
        let result = chunk_text(&long_line, 30);
        assert!(result.len() >= 3);
        for chunk in &result {
            assert!(chunk.len() <= 30);
        }
    }

    #[test]
    fn test_message_limit() {
        let result = chunk_for_message(&"a".repeat(3000));
        assert!(result.len() >= 2);
        assert!(result[0].len() <= MESSAGE_LIMIT);
    }

    #[test]
    fn test_utf8_safety() {
        let text = "Hello 世界! ".repeat(500);
        let chunks = chunk_for_message(&text);
        for chunk in chunks {
            assert!(chunk.len() <= MESSAGE_LIMIT);
            assert!(chunk.chars().count() > 0);
        }
    }

    #[test]
    fn test_compact_inline_collapses_whitespace() {
        assert_eq!(compact_inline("a   b\n\t c", 100), "a b c");
    }

    #[test]
    fn test_compact_inline_truncates_with_ellipsis() {
        let result = compact_inline(&"word ".repeat(100), 20);
        assert!(result.chars().count() <= 20);
        assert!(result.ends_with('…'));
    }

    #[test]
    fn test_compact_inline_exact_fit_untouched() {
        let text = "exactly twenty chars";
        assert_eq!(text.chars().count(), 20);
        assert_eq!(compact_inline(text, 20), text);
    }
}
