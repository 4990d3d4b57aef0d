//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one spinner line per ingesting stream.
//! Non-TTY mode: hidden bars, logs carry the progress.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Width of the stream label column
const LABEL_WIDTH: usize = 24;

/// Central progress context managing per-stream status lines.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty: std::io::stderr().is_terminal(),
        }
    }

    /// Status line for one stream.
    ///
    /// Update with `pb.set_message(...)`; call `finish_and_clear` when done.
    pub fn stream_line(&self, label: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {prefix:<24.cyan.bold} {wide_msg}")
                .expect("invalid template"),
        );
        pb.set_prefix(fit_label(label));
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// `MultiProgress` for the log bridge
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe wrapper for `ProgressContext`.
pub type SharedProgress = Arc<ProgressContext>;

/// Cut a label to the column width, counting characters rather than bytes
fn fit_label(label: &str) -> String {
    label.chars().take(LABEL_WIDTH).collect()
}

/// Format a count with thousands separators (1234567 → "1,234,567")
pub fn fmt_num(n: usize) -> String {
    let s = n.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
