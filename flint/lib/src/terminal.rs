//! Terminal size detection.

use terminal_size::{Height, Width, terminal_size};

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub columns: u16,
    pub rows: u16,
}

impl TerminalSize {
    /// Used when stdout is not a terminal.
    pub const FALLBACK: TerminalSize = TerminalSize {
        columns: 80,
        rows: 24,
    };

    pub fn new(columns: u16, rows: u16) -> Self {
        Self { columns, rows }
    }

    /// Queries the controlling terminal, falling back to 80x24.
    pub fn detect() -> Self {
        match terminal_size() {
            Some((Width(columns), Height(rows))) => {
                tracing::trace!(columns, rows, "Detected terminal size");
                Self { columns, rows }
            }
            None => {
                tracing::debug!("No terminal attached; using fallback size");
                Self::FALLBACK
            }
        }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::FALLBACK
    }
}
