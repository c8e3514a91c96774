//! Logger bootstrap for the `pdf-notes` binary.
//!
//! Library crates only emit through `log`; this is the one place a backend is
//! installed. Output goes to stderr so stdout stays machine-readable.

use anyhow::{Context, Result};
use flexi_logger::{Logger, LoggerHandle};
use log::info;

pub const LOG_ENV: &str = "PDF_NOTES_LOG";

/// Picks the log level: explicit flag, then [`LOG_ENV`], then settings.
pub fn resolve_level(flag: Option<&str>, env: Option<String>, settings: &str) -> String {
    flag.map(str::to_owned)
        .or_else(|| env.filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| settings.to_owned())
}

/// Starts stderr logging. Keep the handle alive for the life of the command.
pub fn init(level: &str) -> Result<LoggerHandle> {
    let handle = Logger::try_with_str(level)
        .with_context(|| format!("invalid log level `{level}`"))?
        .log_to_stderr()
        .format(flexi_logger::default_format)
        .start()
        .context("failed to start logger")?;

    info!(
        "event=cli_start module=cli status=ok level={} version={}",
        level,
        env!("CARGO_PKG_VERSION")
    );
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_env_and_settings() {
        assert_eq!(resolve_level(Some("debug"), Some("warn".to_owned()), "info"), "debug");
    }

    #[test]
    fn env_wins_over_settings() {
        assert_eq!(resolve_level(None, Some("warn".to_owned()), "info"), "warn");
    }

    #[test]
    fn blank_env_falls_back_to_settings() {
        assert_eq!(resolve_level(None, Some("  ".to_owned()), "error"), "error");
        assert_eq!(resolve_level(None, None, "error"), "error");
    }
}
