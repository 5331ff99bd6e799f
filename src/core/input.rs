//! Keyboard input parsing for legacy (VT/xterm) terminal sequences.
//!
//! Key ids are lowercase names joined with `+` for modifiers, e.g. `enter`,
//! `shift+tab`, `ctrl+c`. Printable characters map to themselves.

const ESC: char = '\x1b';

fn sequence_key_id(data: &str) -> Option<&'static str> {
    match data {
        "\x1b" => Some("escape"),
        "\t" => Some("tab"),
        "\x1b[Z" => Some("shift+tab"),
        "\r" | "\n" | "\x1bOM" => Some("enter"),
        "\x1b\r" => Some("alt+enter"),
        "\x7f" | "\x08" => Some("backspace"),
        "\x1b\x7f" | "\x1b\x08" => Some("alt+backspace"),
        "\x1b[3~" => Some("delete"),
        "\x1b[2~" => Some("insert"),
        "\x1b[A" | "\x1bOA" => Some("up"),
        "\x1b[B" | "\x1bOB" => Some("down"),
        "\x1b[C" | "\x1bOC" => Some("right"),
        "\x1b[D" | "\x1bOD" => Some("left"),
        "\x1b[H" | "\x1bOH" | "\x1b[1~" | "\x1b[7~" => Some("home"),
        "\x1b[F" | "\x1bOF" | "\x1b[4~" | "\x1b[8~" => Some("end"),
        "\x1b[5~" => Some("pageUp"),
        "\x1b[6~" => Some("pageDown"),
        "\x1b[1;5C" | "\x1bOc" => Some("ctrl+right"),
        "\x1b[1;5D" | "\x1bOd" => Some("ctrl+left"),
        "\x1bb" => Some("alt+left"),
        "\x1bf" => Some("alt+right"),
        "\x1bOP" | "\x1b[11~" => Some("f1"),
        "\x1bOQ" | "\x1b[12~" => Some("f2"),
        "\x1bOR" | "\x1b[13~" => Some("f3"),
        "\x1bOS" | "\x1b[14~" => Some("f4"),
        "\x1b[15~" => Some("f5"),
        "\x00" => Some("ctrl+space"),
        _ => None,
    }
}

/// Parses one key sequence into a key id.
///
/// `data` must be a single sequence as produced by [`split_sequences`].
pub fn parse_key(data: &str) -> Option<String> {
    if let Some(key_id) = sequence_key_id(data) {
        return Some(key_id.to_string());
    }

    if data == " " {
        return Some("space".to_string());
    }

    let bytes = data.as_bytes();
    if bytes.len() == 1 {
        let code = bytes[0];
        if (1..=26).contains(&code) {
            return Some(format!("ctrl+{}", (code + 96) as char));
        }
        if (33..=126).contains(&code) {
            return Some(data.to_string());
        }
    }

    if bytes.len() == 2 && bytes[0] == 0x1b {
        let code = bytes[1];
        if (97..=122).contains(&code) {
            return Some(format!("alt+{}", code as char));
        }
        if (1..=26).contains(&code) {
            return Some(format!("ctrl+alt+{}", (code + 96) as char));
        }
    }

    None
}

/// Returns the text carried by `data` when it is made of printable characters only.
pub fn parse_text(data: &str) -> Option<String> {
    if data.is_empty() || data.chars().any(char::is_control) {
        return None;
    }
    Some(data.to_string())
}

/// Returns whether `data` is the key identified by `key_id`.
pub fn matches_key(data: &str, key_id: &str) -> bool {
    parse_key(data).is_some_and(|parsed| parsed == key_id)
}

/// Splits a raw input chunk into individual key sequences and printable runs.
///
/// Escape sequences (CSI, SS3, and `ESC x` meta pairs) are kept whole, each
/// control byte becomes its own sequence, and consecutive printable characters
/// stay together so typed or pasted text arrives as one run.
pub fn split_sequences(data: &str) -> Vec<&str> {
    let mut sequences = Vec::new();
    let mut idx = 0;

    while idx < data.len() {
        let rest = &data[idx..];
        let Some(first) = rest.chars().next() else {
            break;
        };

        let len = if first == ESC {
            escape_sequence_len(rest)
        } else if first.is_control() {
            first.len_utf8()
        } else {
            rest.char_indices()
                .find(|(_, ch)| ch.is_control())
                .map(|(end, _)| end)
                .unwrap_or(rest.len())
        };

        sequences.push(&rest[..len]);
        idx += len;
    }

    sequences
}

fn escape_sequence_len(rest: &str) -> usize {
    let bytes = rest.as_bytes();
    match bytes.get(1) {
        None => 1,
        Some(b'[') => {
            // Legacy double-bracket function keys.
            let start = if bytes.get(2) == Some(&b'[') { 3 } else { 2 };
            let mut idx = start;
            while idx < bytes.len() {
                let byte = bytes[idx];
                if (0x40..=0x7e).contains(&byte) {
                    return idx + 1;
                }
                if byte == 0x1b {
                    return idx;
                }
                idx += 1;
            }
            bytes.len()
        }
        Some(b'O') if bytes.len() >= 3 => 3,
        Some(&next) if next == 0x1b => 1,
        Some(_) => {
            let next_len = rest[1..].chars().next().map(char::len_utf8).unwrap_or(0);
            1 + next_len
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_sequences_map_to_key_ids() {
        assert_eq!(parse_key("\r").as_deref(), Some("enter"));
        assert_eq!(parse_key("\t").as_deref(), Some("tab"));
        assert_eq!(parse_key("\x1b[Z").as_deref(), Some("shift+tab"));
        assert_eq!(parse_key("\x7f").as_deref(), Some("backspace"));
        assert_eq!(parse_key("\x03").as_deref(), Some("ctrl+c"));
        assert_eq!(parse_key("\x1b").as_deref(), Some("escape"));
        assert_eq!(parse_key("\x1bOA").as_deref(), Some("up"));
        assert_eq!(parse_key("q").as_deref(), Some("q"));
        assert_eq!(parse_key("\x1bx").as_deref(), Some("alt+x"));
    }

    #[test]
    fn text_rejects_control_characters() {
        assert_eq!(parse_text("żółw").as_deref(), Some("żółw"));
        assert_eq!(parse_text("a\rb"), None);
        assert_eq!(parse_text(""), None);
    }

    #[test]
    fn split_keeps_escape_sequences_whole() {
        assert_eq!(
            split_sequences("ab\x1b[A\r\x1b\x1b[1;5Cz"),
            vec!["ab", "\x1b[A", "\r", "\x1b", "\x1b[1;5C", "z"]
        );
    }

    #[test]
    fn split_handles_trailing_escape_and_ss3() {
        assert_eq!(split_sequences("\x1bOB\x1b"), vec!["\x1bOB", "\x1b"]);
        assert_eq!(split_sequences("\x1b[[A"), vec!["\x1b[[A"]);
    }

    #[test]
    fn matches_key_compares_parsed_ids() {
        assert!(matches_key("\x1b[B", "down"));
        assert!(!matches_key("\x1b[B", "up"));
    }
}
