//! Terminal trait.

/// Minimal terminal interface the runtime drives.
///
/// Implementations deliver raw input chunks and resize notifications through
/// the handlers passed to [`Terminal::start`]; both may be invoked from
/// background threads.
pub trait Terminal {
    /// Start the terminal with input and resize handlers.
    fn start(
        &mut self,
        on_input: Box<dyn FnMut(String) + Send>,
        on_resize: Box<dyn FnMut() + Send>,
    ) -> std::io::Result<()>;

    /// Stop the terminal and restore state.
    fn stop(&mut self) -> std::io::Result<()>;

    /// Drain stdin before exiting so buffered keys do not leak into the shell.
    fn drain_input(&mut self, max_ms: u64, idle_ms: u64);

    /// Write output to the terminal.
    fn write(&mut self, data: &str);

    /// Terminal dimensions.
    fn columns(&self) -> u16;
    fn rows(&self) -> u16;
}
