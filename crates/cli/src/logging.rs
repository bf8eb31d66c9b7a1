//! Stderr logging for the binary.
//!
//! Level precedence: `-v` flags, then `LEDGERMATCH_LOG`, then `warn`.
//! Stdout stays reserved for command output (reports, `--json`).

use flexi_logger::{Logger, LoggerHandle};

pub const LOG_ENV: &str = "LEDGERMATCH_LOG";

/// Level spec for a `-v` count: 0 = warn, 1 = info, 2+ = debug.
pub fn verbosity_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn level_spec(verbose: u8, env: Option<String>) -> String {
    if verbose > 0 {
        return verbosity_level(verbose).to_string();
    }
    env.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| verbosity_level(0).to_string())
}

/// Start the logger. The handle must live until the process exits.
/// Failure prints a warning and the run continues without logging.
pub fn init(verbose: u8) -> Option<LoggerHandle> {
    let spec = level_spec(verbose, std::env::var(LOG_ENV).ok());

    let started = Logger::try_with_str(&spec).and_then(|logger| {
        logger
            .log_to_stderr()
            .format(flexi_logger::default_format)
            .start()
    });

    match started {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("warning: logging disabled ({}: {})", spec, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_win_over_environment() {
        assert_eq!(level_spec(0, None), "warn");
        assert_eq!(level_spec(0, Some("ledgermatch_recon=debug".into())), "ledgermatch_recon=debug");
        assert_eq!(level_spec(0, Some("  ".into())), "warn");
        assert_eq!(level_spec(1, Some("error".into())), "info");
        assert_eq!(level_spec(3, None), "debug");
    }
}
