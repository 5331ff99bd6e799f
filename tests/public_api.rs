#![allow(unused_imports)]

use fwl_tui::{
    install_panic_hook, matches_key, pad_to_width, parse_input_events, parse_key, strip_ansi,
    truncate_to_width, visible_width, Command, Component, ComponentId, CustomCommand,
    CustomCommandCtx, CustomCommandError, Input, InputEvent, ProcessTerminal, ProgressBar,
    RuntimeHandle, Terminal, TUI,
};

#[test]
fn public_api_exports_compile() {}
