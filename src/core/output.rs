//! Typed terminal output commands and a single output gate.
//!
//! Invariant: all terminal writes must flow through `OutputGate::flush(..)`.

use crate::core::terminal::Terminal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCmd {
    /// Raw bytes/control sequences (UTF-8 string) to be written to the terminal.
    Bytes(String),

    /// Cursor visibility.
    HideCursor,
    ShowCursor,

    /// Screen control.
    AltScreenEnter,
    AltScreenLeave,
    ClearScreen,

    /// Protocol toggles.
    BracketedPasteEnable,
    BracketedPasteDisable,
}

impl TerminalCmd {
    pub fn bytes(data: impl Into<String>) -> Self {
        Self::Bytes(data.into())
    }

    fn as_str(&self) -> &str {
        match self {
            Self::Bytes(data) => data,
            Self::HideCursor => "\x1b[?25l",
            Self::ShowCursor => "\x1b[?25h",
            Self::AltScreenEnter => "\x1b[?1049h",
            Self::AltScreenLeave => "\x1b[?1049l",
            Self::ClearScreen => "\x1b[H\x1b[2J",
            Self::BracketedPasteEnable => "\x1b[?2004h",
            Self::BracketedPasteDisable => "\x1b[?2004l",
        }
    }
}

#[derive(Debug, Default)]
pub struct OutputGate {
    cmds: Vec<TerminalCmd>,
}

impl OutputGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cmd: TerminalCmd) {
        self.cmds.push(cmd);
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    pub fn clear(&mut self) {
        self.cmds.clear();
    }

    /// Flush buffered commands to the terminal as one write.
    ///
    /// This is the single write gate: `Terminal::write(..)` must not be called
    /// from anywhere else.
    pub fn flush<T: Terminal>(&mut self, term: &mut T) {
        if self.cmds.is_empty() {
            return;
        }
        let mut out = String::new();
        for cmd in self.cmds.drain(..) {
            out.push_str(cmd.as_str());
        }
        term.write(&out);
    }
}
