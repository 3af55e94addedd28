//! context
//!
//! The run context shared between the orchestrator and the active
//! subcommand: resolved paths, bound positional arguments, and the
//! cooperative cancellation signal.
//!
//! Cancellation is a request, not a preemption. The orchestrator cancels the
//! context once, on the first interrupt; a well-behaved `start` observes
//! [`RunContext::cancelled`] (or polls [`RunContext::is_cancelled`]) and
//! winds down on its own.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio::sync::watch;

/// Context handed to `init`, `start`, and `on_exited`.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Active subcommand name (`"default"` when none was supplied).
    pub name: String,
    /// Resolved data directory (exists by the time subcommand code runs).
    pub data_dir: PathBuf,
    /// Config file the run loaded, if any.
    pub config_file: Option<PathBuf>,
    /// Resolved log level text.
    pub log_level: String,
    /// Positional argument bindings, keyed by declared argument name.
    pub args: BTreeMap<String, String>,
    cancel_rx: watch::Receiver<bool>,
}

impl RunContext {
    /// Create a context and the orchestrator-held cancel handle.
    pub(crate) fn new(
        name: String,
        data_dir: PathBuf,
        config_file: Option<PathBuf>,
        log_level: String,
        args: BTreeMap<String, String>,
    ) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                name,
                data_dir,
                config_file,
                log_level,
                args,
                cancel_rx: rx,
            },
            CancelHandle { tx },
        )
    }

    /// A bound positional argument, by declared name.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }

    /// True once the run has been asked to wind down.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Resolve when the run is asked to wind down.
    ///
    /// Resolves immediately if cancellation already happened, and also when
    /// the orchestrator side is gone (a vanished orchestrator means the run
    /// is over).
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

/// Orchestrator-held side of the cancellation signal.
#[derive(Debug)]
pub(crate) struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Request cancellation. Idempotent; the context observes it once.
    pub(crate) fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}
