//! Message styling and tables for CLI output.
//!
//! | Prefix | Meaning | Color |
//! |--------|---------|-------|
//! | `[ok]` | Success | Green |
//! | `[err]` | Error | Red |
//! | `[warn]` | Warning | Yellow |
//! | `[info]` | Information | Blue |

use std::io::IsTerminal;

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, Table};
use docrag_core::{ModelStatus, ScoredMatch};
use owo_colors::OwoColorize;

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    Always,
    Never,
    #[default]
    Auto,
}

impl ColorMode {
    /// Accepts `always`, `never`, `auto`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "always" => Some(Self::Always),
            "never" => Some(Self::Never),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    /// `NO_COLOR` or a non-TTY stdout disables colors in auto mode.
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ok,
    Err,
    Warn,
    Info,
}

impl MessageType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ok => "[ok]",
            Self::Err => "[err]",
            Self::Warn => "[warn]",
            Self::Info => "[info]",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Style {
    colors: bool,
}

impl Style {
    pub fn new(mode: ColorMode) -> Self {
        Self {
            colors: mode.is_enabled(),
        }
    }

    pub fn message(&self, kind: MessageType, text: &str) -> String {
        let prefix = kind.prefix();
        if !self.colors {
            return format!("{prefix} {text}");
        }
        let prefix = match kind {
            MessageType::Ok => prefix.green().to_string(),
            MessageType::Err => prefix.red().to_string(),
            MessageType::Warn => prefix.yellow().to_string(),
            MessageType::Info => prefix.blue().to_string(),
        };
        format!("{prefix} {text}")
    }

    /// Detail line under a message, indented five spaces.
    pub fn detail(&self, label: &str, value: &str) -> String {
        format!("     {label}: {value}")
    }

    /// Error with optional cause and hint lines.
    pub fn error_with_context(&self, msg: &str, cause: Option<&str>, hint: Option<&str>) -> String {
        let mut output = self.message(MessageType::Err, msg);
        if let Some(cause) = cause {
            output.push_str(&format!("\n      Cause: {cause}"));
        }
        if let Some(hint) = hint {
            output.push_str(&format!("\n      Hint: {hint}"));
        }
        output
    }
}

/// `TASK  MODEL  DEFAULT  INSTALLED` table.
pub fn render_models_table(models: &[ModelStatus]) -> String {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec!["TASK", "MODEL", "DEFAULT", "INSTALLED"]);
    for model in models {
        table.add_row(vec![
            Cell::new(model.task.to_string()),
            Cell::new(&model.model_id),
            Cell::new(if model.default { "yes" } else { "" }),
            Cell::new(if model.installed { "yes" } else { "no" }),
        ]);
    }
    table.to_string()
}

/// `#  SCORE  TEXT` table of search hits; `*` marks confident matches.
pub fn render_matches_table(matches: &[ScoredMatch], threshold_hits: &[i64]) -> String {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec!["", "#", "SCORE", "TEXT"]);
    for m in matches {
        let text = m.text.as_deref().unwrap_or_default().replace('\n', " ");
        let text: String = if text.chars().count() > 72 {
            format!("{}...", text.chars().take(69).collect::<String>())
        } else {
            text
        };
        table.add_row(vec![
            Cell::new(if threshold_hits.contains(&m.id) { "*" } else { "" }),
            Cell::new(m.number.map(|n| n.to_string()).unwrap_or_default()),
            Cell::new(format!("{:.3}", m.score)),
            Cell::new(text),
        ]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_message() {
        let style = Style::new(ColorMode::Never);
        assert_eq!(style.message(MessageType::Ok, "Done"), "[ok] Done");
        assert_eq!(style.detail("Title", "Report"), "     Title: Report");
    }

    #[test]
    fn test_error_context() {
        let style = Style::new(ColorMode::Never);
        let out = style.error_with_context("Failed", Some("io"), Some("retry"));
        assert!(out.contains("[err] Failed"));
        assert!(out.contains("Cause: io"));
        assert!(out.contains("Hint: retry"));
    }

    #[test]
    fn test_color_mode_parse() {
        assert_eq!(ColorMode::parse("NEVER"), Some(ColorMode::Never));
        assert_eq!(ColorMode::parse("sometimes"), None);
    }
}
