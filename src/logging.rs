//! logging
//!
//! Tracing subscriber setup from the resolved `log-level` option.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

/// Initialize the global tracing subscriber at the given level.
///
/// `level` accepts a plain level name (`debug`) or full `EnvFilter`
/// directive syntax (`info,commandant=debug`). Repeated initialization (a
/// second `run`, tests) is tolerated; the first subscriber wins.
///
/// # Errors
///
/// Returns [`Error::Configuration`] when the level text is neither a level
/// name nor a valid filter directive.
pub fn init(level: &str) -> Result<()> {
    // A bare token must be a real level name; EnvFilter alone would accept
    // any token as a target directive and the typo would filter everything.
    let filter = if level.contains('=') || level.contains(',') {
        EnvFilter::try_new(level)
            .map_err(|e| Error::Configuration(format!("invalid log-level '{}': {}", level, e)))?
    } else {
        let parsed = Level::from_str(level)
            .map_err(|_| Error::Configuration(format!("invalid log-level '{}'", level)))?;
        EnvFilter::new(parsed.to_string())
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_levels_initialize() {
        init("info").unwrap();
        // Second initialization is tolerated.
        init("debug").unwrap();
    }

    #[test]
    fn invalid_level_is_a_configuration_error() {
        let err = init("not a level !!").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn level_shaped_garbage_is_rejected_too() {
        // A lone unknown token must not slip through as a target directive.
        let err = init("garbage-level").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("garbage-level"));
    }

    #[test]
    fn directive_syntax_still_accepted() {
        init("info,commandant=debug").unwrap();
    }
}
