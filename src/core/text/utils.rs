//! Utility helpers.

use unicode_segmentation::UnicodeSegmentation;

use super::ansi::ansi_code_len;
use super::width::{grapheme_width, visible_width};

const ANSI_RESET: &str = "\x1b[0m";

pub fn grapheme_segments(text: &str) -> unicode_segmentation::Graphemes<'_> {
    UnicodeSegmentation::graphemes(text, true)
}

/// Right-pads `text` with spaces up to `width` visible columns.
pub fn pad_to_width(text: &str, width: usize) -> String {
    let padding = width.saturating_sub(visible_width(text));
    format!("{text}{}", " ".repeat(padding))
}

/// Cuts `text` to `max_width` columns, appending `ellipsis` when shortened.
///
/// Escape sequences are kept; a reset is emitted before the ellipsis so a
/// truncated style does not bleed into it.
pub fn truncate_to_width(text: &str, max_width: usize, ellipsis: &str, pad: bool) -> String {
    if max_width == 0 {
        return String::new();
    }

    let text_width = visible_width(text);
    if text_width <= max_width {
        if pad {
            return pad_to_width(text, max_width);
        }
        return text.to_string();
    }

    let target_width = max_width.saturating_sub(visible_width(ellipsis));
    if target_width == 0 {
        return ellipsis.chars().take(max_width).collect();
    }

    let mut truncated = String::new();
    let mut current_width = 0;
    let mut idx = 0;
    'outer: while idx < text.len() {
        if let Some(len) = ansi_code_len(text, idx) {
            truncated.push_str(&text[idx..idx + len]);
            idx += len;
            continue;
        }

        let end = next_ansi_or_end(text, idx);
        for grapheme in grapheme_segments(&text[idx..end]) {
            let width = grapheme_width(grapheme);
            if current_width + width > target_width {
                break 'outer;
            }
            truncated.push_str(grapheme);
            current_width += width;
        }
        idx = end;
    }

    let mut result = String::with_capacity(truncated.len() + ellipsis.len() + ANSI_RESET.len());
    result.push_str(&truncated);
    result.push_str(ANSI_RESET);
    result.push_str(ellipsis);

    if pad {
        return pad_to_width(&result, max_width);
    }
    result
}

fn next_ansi_or_end(input: &str, mut idx: usize) -> usize {
    while idx < input.len() {
        if ansi_code_len(input, idx).is_some() {
            break;
        }
        idx += input[idx..].chars().next().map(char::len_utf8).unwrap_or(1);
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::{grapheme_segments, pad_to_width, truncate_to_width};
    use crate::core::text::width::visible_width;

    #[test]
    fn truncate_returns_original_when_shorter() {
        assert_eq!(truncate_to_width("hello", 6, "...", false), "hello");
    }

    #[test]
    fn truncate_adds_ellipsis_and_reset() {
        let truncated = truncate_to_width("hello", 4, "...", false);
        assert_eq!(truncated, "h\x1b[0m...");
        assert_eq!(visible_width(&truncated), 4);
    }

    #[test]
    fn truncate_preserves_ansi_prefix() {
        let truncated = truncate_to_width("\x1b[31mhello", 4, "...", false);
        assert_eq!(truncated, "\x1b[31mh\x1b[0m...");
    }

    #[test]
    fn truncate_handles_small_max_width() {
        assert_eq!(truncate_to_width("hello", 2, "...", false), "..");
    }

    #[test]
    fn pad_counts_visible_columns_only() {
        assert_eq!(pad_to_width("\x1b[1mhi\x1b[22m", 4), "\x1b[1mhi\x1b[22m  ");
    }

    #[test]
    fn grapheme_segments_splits_clusters() {
        let clusters: Vec<&str> = grapheme_segments("a🇺🇸").collect();
        assert_eq!(clusters, vec!["a", "🇺🇸"]);
    }
}
