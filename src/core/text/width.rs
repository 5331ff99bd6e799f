//! Grapheme width and visible width helpers.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use super::ansi::strip_ansi;

const TAB_WIDTH: usize = 3;

pub fn grapheme_width(grapheme: &str) -> usize {
    if grapheme == "\t" {
        return TAB_WIDTH;
    }
    UnicodeWidthStr::width(grapheme)
}

/// Terminal column width of `input`, ignoring ANSI control sequences.
pub fn visible_width(input: &str) -> usize {
    if input.is_empty() {
        return 0;
    }

    strip_ansi(input).graphemes(true).map(grapheme_width).sum()
}

#[cfg(test)]
mod tests {
    use super::visible_width;

    #[test]
    fn ansi_ignored_in_width() {
        assert_eq!(visible_width("hi\x1b[31m!!\x1b[0m"), 4);
    }

    #[test]
    fn wide_and_combining_characters() {
        assert_eq!(visible_width("日本"), 4);
        assert_eq!(visible_width("e\u{301}"), 1);
        assert_eq!(visible_width("a\tb"), 5);
    }
}
