//! Higher-level widgets.

pub mod input;
pub mod progress_bar;

pub use input::Input;
pub use progress_bar::ProgressBar;
