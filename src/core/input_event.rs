//! Structured input events produced by the runtime.

use crate::core::input::{parse_key, parse_text, split_sequences};

/// Input event delivered to components.
///
/// Notes:
/// - `raw` is the exact sequence received from the terminal.
/// - `key_id` is a normalized identifier, see [`crate::core::input`].
/// - Text and paste events carry decoded text so widgets don't have to parse escape sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key { raw: String, key_id: String },
    Text { raw: String, text: String },
    Paste { raw: String, text: String },
    Resize { columns: u16, rows: u16 },
    UnknownRaw { raw: String },
}

impl InputEvent {
    /// Key id for key events, `None` otherwise.
    pub fn key_id(&self) -> Option<&str> {
        match self {
            Self::Key { key_id, .. } => Some(key_id),
            _ => None,
        }
    }
}

pub fn parse_input_events(data: &str) -> Vec<InputEvent> {
    if data.is_empty() {
        return Vec::new();
    }

    const PASTE_START: &str = "\x1b[200~";
    const PASTE_END: &str = "\x1b[201~";

    fn parse_non_paste(data: &str, events: &mut Vec<InputEvent>) {
        for sequence in split_sequences(data) {
            let event = if let Some(text) = parse_text(sequence) {
                InputEvent::Text {
                    raw: sequence.to_string(),
                    text,
                }
            } else if let Some(key_id) = parse_key(sequence) {
                InputEvent::Key {
                    raw: sequence.to_string(),
                    key_id,
                }
            } else {
                InputEvent::UnknownRaw {
                    raw: sequence.to_string(),
                }
            };
            events.push(event);
        }
    }

    let mut events = Vec::new();
    let mut remaining = data;
    loop {
        let Some(start) = remaining.find(PASTE_START) else {
            parse_non_paste(remaining, &mut events);
            break;
        };

        parse_non_paste(&remaining[..start], &mut events);

        let after_start = &remaining[start + PASTE_START.len()..];
        let Some(end_rel) = after_start.find(PASTE_END) else {
            events.push(InputEvent::UnknownRaw {
                raw: remaining[start..].to_string(),
            });
            break;
        };

        let raw_end = start + PASTE_START.len() + end_rel + PASTE_END.len();
        events.push(InputEvent::Paste {
            raw: remaining[start..raw_end].to_string(),
            text: after_start[..end_rel].to_string(),
        });

        remaining = &after_start[end_rel + PASTE_END.len()..];
        if remaining.is_empty() {
            break;
        }
    }

    events
}
