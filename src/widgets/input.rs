//! Input widget.

use zeroize::Zeroizing;

use crate::core::component::Component;
use crate::core::input_event::InputEvent;
use crate::core::text::utils::{grapheme_segments, pad_to_width};
use crate::core::text::width::{grapheme_width, visible_width};

const MASK: &str = "*";

/// Single-line labelled input field with horizontal scrolling.
///
/// The value lives in zeroized storage so password fields do not linger in
/// freed memory. Submit/cancel/focus keys are left to the owner.
pub struct Input {
    label: String,
    value: Zeroizing<String>,
    cursor: usize,
    masked: bool,
    read_only: bool,
    focused: bool,
}

impl Input {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: Zeroizing::new(String::with_capacity(64)),
            cursor: 0,
            masked: false,
            read_only: false,
            focused: false,
        }
    }

    /// Field whose characters render as `*`.
    pub fn masked(label: impl Into<String>) -> Self {
        Self {
            masked: true,
            ..Self::new(label)
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn set_value(&mut self, value: &str) {
        self.value.clear();
        self.value.push_str(value);
        self.cursor = self.value.len();
    }

    /// Empty the field, wiping the previous contents.
    pub fn clear(&mut self) {
        self.value = Zeroizing::new(String::with_capacity(64));
        self.cursor = 0;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_masked(&self) -> bool {
        self.masked
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    fn insert_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.value.insert_str(self.cursor, text);
        self.cursor += text.len();
    }

    fn previous_boundary(&self) -> Option<usize> {
        grapheme_segments(&self.value[..self.cursor])
            .next_back()
            .map(|grapheme| self.cursor - grapheme.len())
    }

    fn next_boundary(&self) -> Option<usize> {
        grapheme_segments(&self.value[self.cursor..])
            .next()
            .map(|grapheme| self.cursor + grapheme.len())
    }

    fn handle_key(&mut self, key_id: &str) {
        match key_id {
            "backspace" => {
                if let Some(start) = self.previous_boundary() {
                    self.value.replace_range(start..self.cursor, "");
                    self.cursor = start;
                }
            }
            "delete" => {
                if let Some(end) = self.next_boundary() {
                    self.value.replace_range(self.cursor..end, "");
                }
            }
            "left" => {
                if let Some(start) = self.previous_boundary() {
                    self.cursor = start;
                }
            }
            "right" => {
                if let Some(end) = self.next_boundary() {
                    self.cursor = end;
                }
            }
            "home" | "ctrl+a" => self.cursor = 0,
            "end" | "ctrl+e" => self.cursor = self.value.len(),
            "ctrl+u" => {
                self.value.replace_range(..self.cursor, "");
                self.cursor = 0;
            }
            "ctrl+k" => self.value.truncate(self.cursor),
            "space" => self.insert_text(" "),
            _ => {}
        }
    }

    fn display_graphemes(&self) -> (Vec<&str>, usize) {
        let mut cursor_index = 0;
        let mut offset = 0;
        let mut graphemes = Vec::new();
        for grapheme in grapheme_segments(&self.value) {
            if offset < self.cursor {
                cursor_index += 1;
            }
            offset += grapheme.len();
            graphemes.push(if self.masked { MASK } else { grapheme });
        }
        (graphemes, cursor_index)
    }
}

impl Component for Input {
    fn render(&mut self, width: usize) -> Vec<String> {
        let available = width.saturating_sub(visible_width(&self.label));
        if available == 0 {
            return vec![self.label.clone()];
        }

        let (graphemes, cursor_index) = self.display_graphemes();

        // Scroll so the cursor cell (one column past the text at the end) stays visible.
        let mut start = 0;
        let mut before_width: usize = graphemes[..cursor_index]
            .iter()
            .map(|g| grapheme_width(g))
            .sum();
        while start < cursor_index && before_width + 1 > available {
            before_width -= grapheme_width(graphemes[start]);
            start += 1;
        }

        let mut line = String::new();
        let mut used = 0;
        for (index, grapheme) in graphemes.iter().enumerate().skip(start) {
            let cell = grapheme_width(grapheme);
            if used + cell > available {
                break;
            }
            if self.focused && index == cursor_index {
                line.push_str(&format!("\x1b[7m{grapheme}\x1b[27m"));
            } else {
                line.push_str(grapheme);
            }
            used += cell;
        }
        if self.focused && cursor_index == graphemes.len() && used < available {
            line.push_str("\x1b[7m \x1b[27m");
        }

        vec![format!("{}{}", self.label, pad_to_width(&line, available))]
    }

    fn handle_event(&mut self, event: &InputEvent) {
        if self.read_only {
            return;
        }
        match event {
            InputEvent::Text { text, .. } => self.insert_text(text),
            InputEvent::Paste { text, .. } => {
                let cleaned: String = text.chars().filter(|ch| !ch.is_control()).collect();
                self.insert_text(&cleaned);
            }
            InputEvent::Key { key_id, .. } => self.handle_key(key_id),
            _ => {}
        }
    }
}
