//! error
//!
//! Crate-wide error taxonomy.
//!
//! # Classes
//!
//! - [`Error::Configuration`]: bad or missing config/env file, undeclared
//!   option, unparsable default or value text
//! - [`Error::Dispatch`]: unknown subcommand name, no default registered
//! - [`Error::Argument`]: a declared positional argument was not supplied
//! - [`Error::Lifecycle`]: a failure from `init`, `start`, `on_exited`, or
//!   an orchestrator teardown hook
//! - [`Error::Persistence`]: cache not initialized, I/O failure on load/save
//! - [`Error::Shutdown`]: aggregate for the teardown path, preserving the
//!   baseline `start` error alongside every teardown failure
//!
//! Configuration, dispatch, and argument errors abort before any subcommand
//! code runs, so they are returned directly. Failures during teardown are
//! never allowed to mask one another; they accumulate into [`ShutdownError`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the commander and its components.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration resolution failed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Subcommand dispatch failed.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// A declared positional argument is missing.
    #[error("argument <{name}> not set (got {supplied} positional argument(s))")]
    Argument {
        /// Name of the missing argument, as declared in the descriptor.
        name: String,
        /// How many positional tokens were actually supplied.
        supplied: usize,
    },

    /// A lifecycle stage (init, start, on_exited, teardown hook) failed.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// A persistence cache operation failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The run failed during shutdown; every failure is preserved.
    #[error("{0}")]
    Shutdown(ShutdownError),
}

impl Error {
    /// Wrap a file-level I/O failure as a configuration error.
    pub(crate) fn config_io(path: &std::path::Path, source: std::io::Error) -> Self {
        Error::Configuration(format!("failed to read '{}': {}", path.display(), source))
    }
}

/// Aggregate error for the teardown path.
///
/// The orchestrator runs every teardown step even when earlier ones fail, so
/// a caller can observe each independent failure. `baseline` is the error
/// returned by `start` itself, if any; `failures` are the teardown errors in
/// the order the steps ran.
#[derive(Debug)]
pub struct ShutdownError {
    /// Error returned by the subcommand's `start`, if it failed.
    pub baseline: Option<Box<Error>>,
    /// Teardown failures, in step order.
    pub failures: Vec<Error>,
}

impl ShutdownError {
    /// True if neither the run nor any teardown step failed.
    pub fn is_empty(&self) -> bool {
        self.baseline.is_none() && self.failures.is_empty()
    }

    /// Fold into the final run outcome.
    ///
    /// A lone baseline error is returned as-is; anything else that failed
    /// produces the aggregate.
    pub(crate) fn into_result(self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        if self.failures.is_empty() {
            if let Some(baseline) = self.baseline {
                return Err(*baseline);
            }
        }
        Err(Error::Shutdown(self))
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.baseline {
            Some(baseline) => write!(f, "run failed: {}", baseline)?,
            None => write!(f, "run failed during shutdown")?,
        }
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for ShutdownError {}

/// Error and path pair for cache operations.
pub(crate) fn persistence_io(path: &PathBuf, op: &str, source: std::io::Error) -> Error {
    Error::Persistence(format!("{} '{}': {}", op, path.display(), source))
}
