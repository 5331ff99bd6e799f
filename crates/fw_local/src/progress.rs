//! Progress channel: `-1` hides the indicator, `0..=100` shows a percentage.

use std::fmt;
use std::sync::Arc;

use fwl_client::ProgressCallback;

pub const HIDDEN: i32 = -1;

/// Displayed progress state, owned by the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressIndicator {
    visible: bool,
    percent: u8,
}

impl ProgressIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Negative values hide and reset to 0; values above 100 show 100.
    pub fn set(&mut self, value: i32) {
        if value < 0 {
            self.visible = false;
            self.percent = 0;
        } else {
            self.visible = true;
            self.percent = value.min(100) as u8;
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }
}

/// Thread-safe publisher handed to the record store. Never blocks on the UI.
#[derive(Clone)]
pub struct ProgressSink {
    publish: ProgressCallback,
}

impl ProgressSink {
    pub fn new(publish: impl Fn(i32) + Send + Sync + 'static) -> Self {
        Self {
            publish: Arc::new(publish),
        }
    }

    /// Discards every value.
    pub fn detached() -> Self {
        Self::new(|_| {})
    }

    pub fn set(&self, value: i32) {
        (self.publish)(value);
    }

    pub fn hide(&self) {
        self.set(HIDDEN);
    }

    pub fn callback(&self) -> ProgressCallback {
        Arc::clone(&self.publish)
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressSink")
    }
}
