//! ANSI escape recognition.

/// Returns the byte length of the escape sequence starting at `pos`, if any.
///
/// Recognizes CSI (`ESC [ ... final`) and OSC (`ESC ] ... BEL|ST`) sequences,
/// which is everything the widgets emit.
pub fn ansi_code_len(input: &str, pos: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    if bytes.get(pos) != Some(&0x1b) {
        return None;
    }

    match bytes.get(pos + 1)? {
        b'[' => {
            let mut idx = pos + 2;
            while idx < bytes.len() {
                if (0x40..=0x7e).contains(&bytes[idx]) {
                    return Some(idx + 1 - pos);
                }
                idx += 1;
            }
            None
        }
        b']' => {
            let mut idx = pos + 2;
            while idx < bytes.len() {
                if bytes[idx] == 0x07 {
                    return Some(idx + 1 - pos);
                }
                if bytes[idx] == 0x1b && bytes.get(idx + 1) == Some(&b'\\') {
                    return Some(idx + 2 - pos);
                }
                idx += 1;
            }
            None
        }
        _ => None,
    }
}

/// Removes recognized escape sequences.
pub fn strip_ansi(input: &str) -> String {
    let mut clean = String::with_capacity(input.len());
    let mut idx = 0;
    while idx < input.len() {
        if let Some(len) = ansi_code_len(input, idx) {
            idx += len;
            continue;
        }
        let Some(ch) = input[idx..].chars().next() else {
            break;
        };
        clean.push(ch);
        idx += ch.len_utf8();
    }
    clean
}
