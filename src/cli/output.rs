use clap::ValueEnum;
use std::io::IsTerminal;
use tracing::warn;

use crate::core::config::Settings;

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub format: OutputFormat,
    pub pretty: bool,
    pub use_color: bool,
    pub verbose: bool,
}

impl OutputOptions {
    /// Resolve flags against the config file's defaults. Flags win.
    pub fn resolve(
        settings: &Settings,
        format: Option<OutputFormat>,
        json: bool,
        pretty: bool,
        no_color: bool,
        verbose: bool,
    ) -> Self {
        let format = if json {
            OutputFormat::Json
        } else {
            format.unwrap_or_else(|| config_format(&settings.default_format))
        };
        let use_color = match settings.color.as_str() {
            _ if no_color => false,
            "always" => true,
            "never" => false,
            _ => detect_color(),
        };
        Self {
            format,
            pretty,
            use_color,
            verbose,
        }
    }
}

/// Format named in the config file; unknown names fall back to text.
fn config_format(name: &str) -> OutputFormat {
    OutputFormat::from_str(name, true).unwrap_or_else(|_| {
        warn!("Unknown default_format '{}' in config, using text", name);
        OutputFormat::Text
    })
}

pub fn detect_color() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    std::io::stdout().is_terminal()
}

pub fn to_json<T: serde::Serialize>(value: &T, opts: &OutputOptions) -> serde_json::Result<String> {
    if opts.pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}
