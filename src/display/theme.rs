//! Styling for CLI status lines, paths and build errors.

use console::Style;
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use std::sync::LazyLock;

use crate::IndexError;

pub static THEME: LazyLock<Theme> = LazyLock::new(Theme::default);

/// Outcome a status line reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Done,
    Failed,
    Notice,
}

impl Status {
    fn icon(self) -> &'static str {
        match self {
            Self::Done => "✓",
            Self::Failed => "✗",
            Self::Notice => "⚠",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Theme {
    pub done: Style,
    pub failed: Style,
    pub notice: Style,
    /// Manifest summary line in `stats`
    pub header: Style,
    /// Recovery suggestions under a build error
    pub hint: Style,
    pub path: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            done: Style::new().green().bright(),
            failed: Style::new().red().bright(),
            notice: Style::new().yellow().bright(),
            header: Style::new().cyan().bold(),
            hint: Style::new().dim(),
            path: Style::new().magenta(),
        }
    }
}

impl Theme {
    /// `text` prefixed with the icon of `status`.
    pub fn status(&self, status: Status, text: &str) -> String {
        if Self::plain() {
            return format!("{} {text}", status.icon());
        }
        let icon = match status {
            Status::Done => status.icon().green().to_string(),
            Status::Failed => status.icon().red().to_string(),
            Status::Notice => status.icon().yellow().to_string(),
        };
        let style = match status {
            Status::Done => &self.done,
            Status::Failed => &self.failed,
            Status::Notice => &self.notice,
        };
        format!("{icon} {}", style.apply_to(text))
    }

    /// A failed build followed by its recovery suggestions, one per line.
    pub fn index_error(&self, error: &IndexError) -> String {
        let mut out = self.status(Status::Failed, &error.to_string());
        for suggestion in error.recovery_suggestions() {
            out.push_str("\n  ");
            out.push_str(&self.apply(&self.hint, format!("→ {suggestion}")));
        }
        out
    }

    /// No colors under `NO_COLOR` or when stdout is not a terminal.
    pub fn plain() -> bool {
        std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal()
    }

    pub fn apply<T: std::fmt::Display>(&self, style: &Style, text: T) -> String {
        if Self::plain() {
            text.to_string()
        } else {
            style.apply_to(text).to_string()
        }
    }
}
