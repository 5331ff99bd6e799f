//! Determinate progress bar.

use crate::core::component::Component;
use crate::core::text::utils::truncate_to_width;

const FILLED: char = '█';
const EMPTY: char = '░';

/// Horizontal bar for a 0..=100 percentage, with an optional caption.
#[derive(Debug, Clone, Default)]
pub struct ProgressBar {
    percent: u8,
    caption: String,
}

impl ProgressBar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values past 100 are clamped.
    pub fn set_percent(&mut self, percent: u8) {
        self.percent = percent.min(100);
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn set_caption(&mut self, caption: impl Into<String>) {
        self.caption = caption.into();
    }

    pub fn reset(&mut self) {
        self.percent = 0;
        self.caption.clear();
    }
}

impl Component for ProgressBar {
    fn render(&mut self, width: usize) -> Vec<String> {
        let suffix = format!(" {:>3}%", self.percent);
        let bar_width = width.saturating_sub(suffix.len() + 2);
        let filled = bar_width * self.percent as usize / 100;

        let mut bar = String::with_capacity(width * 3);
        bar.push('[');
        bar.extend(std::iter::repeat(FILLED).take(filled));
        bar.extend(std::iter::repeat(EMPTY).take(bar_width - filled));
        bar.push(']');
        bar.push_str(&suffix);

        let mut lines = Vec::with_capacity(2);
        if !self.caption.is_empty() {
            lines.push(truncate_to_width(&self.caption, width, "…", false));
        }
        lines.push(truncate_to_width(&bar, width, "", false));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::ProgressBar;
    use crate::core::component::Component;

    #[test]
    fn bar_fills_proportionally() {
        let mut bar = ProgressBar::new();
        bar.set_percent(50);
        let lines = bar.render(17);
        assert_eq!(lines, vec!["[█████░░░░░]  50%".to_string()]);
    }

    #[test]
    fn percent_is_clamped_and_caption_shown_first() {
        let mut bar = ProgressBar::new();
        bar.set_percent(250);
        bar.set_caption("Updating movies");
        let lines = bar.render(20);
        assert_eq!(bar.percent(), 100);
        assert_eq!(lines[0], "Updating movies");
        assert!(lines[1].ends_with("100%"));
    }
}
