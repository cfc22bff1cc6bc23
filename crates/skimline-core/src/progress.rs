//! Progress reporting for TTY and non-TTY environments.
//!
//! TTY mode: one indicatif bar per sample, counting read units.
//! Non-TTY mode: hidden bars, progress goes through the log instead.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Per-sample bar: green bar, units done / total
fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:<20.dim} {bar:30.green/dim} {pos:>5}/{len:5} units {eta:>4} {wide_msg:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("--")
}

/// Central progress context managing multi-progress bars.
pub struct ProgressContext {
    multi: MultiProgress,
    is_tty: bool,
}

impl ProgressContext {
    /// Create new context, detecting TTY automatically.
    pub fn new() -> Self {
        Self::with_tty(std::io::stderr().is_terminal())
    }

    /// Context that never draws, for tests and piped output.
    pub fn hidden() -> Self {
        Self::with_tty(false)
    }

    fn with_tty(is_tty: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            is_tty,
        }
    }

    /// Bar over the units of one sample; length is set once files are opened.
    ///
    /// TTY: visible bar. Non-TTY: hidden (no-op).
    pub fn sample_bar(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }

        let pb = self.multi.add(ProgressBar::new(0));
        pb.set_style(bar_style());
        // Truncate long names to keep bars aligned
        let display: String = name.chars().take(20).collect();
        pb.set_prefix(display);
        pb
    }

    /// Spinner line for a stage without a known length (pre-scan, split).
    pub fn stage_line(&self, name: &str) -> ProgressBar {
        if !self.is_tty {
            return ProgressBar::hidden();
        }
        let pb = self.multi.add(ProgressBar::new(0));
        if let Ok(style) =
            ProgressStyle::with_template("{spinner:.green} {prefix:<10.cyan.bold} {wide_msg}")
        {
            pb.set_style(style);
        }
        pb.set_prefix(name.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Print a line above managed progress bars (avoids interference).
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.is_tty {
            let _ = self.multi.println(msg);
        } else {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Whether running in TTY mode.
    pub fn is_tty(&self) -> bool {
        self.is_tty
    }

    /// Get reference to `MultiProgress` for log bridge.
    pub fn multi(&self) -> &MultiProgress {
        &self.multi
    }
}

impl Default for ProgressContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Format number with thousand separators.
pub fn fmt_num(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Weighted event count with three decimals and thousand separators.
pub fn fmt_weight(w: f64) -> String {
    let rounded = format!("{:.3}", w.abs());
    let (int, frac) = rounded.split_once('.').unwrap_or((rounded.as_str(), "000"));
    let int = int.parse::<usize>().map(fmt_num).unwrap_or_else(|_| int.to_string());
    let sign = if w < 0.0 { "-" } else { "" };
    format!("{sign}{int}.{frac}")
}
