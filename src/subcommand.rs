//! subcommand
//!
//! The subcommand contract.
//!
//! # Capabilities
//!
//! A subcommand participates in the lifecycle through five optional
//! capabilities plus the mandatory `start`:
//!
//! - **Configuration**: [`Subcommand::options`] declares typed options;
//!   [`Subcommand::configure`] receives the resolved configuration before
//!   any lifecycle method runs (most implementations extract a typed struct
//!   via [`ResolvedConfig::typed`]).
//! - **Persisted data**: [`Subcommand::snapshot`] produces the document to
//!   carry across restarts (`None` means the subcommand persists nothing);
//!   [`Subcommand::restore`] receives the prior document before `init`.
//! - **Lifecycle**: `init` runs synchronously before the run; `start` is
//!   spawned as an independent task and raced against interrupts;
//!   `on_exited` runs during teardown on every exit path.
//!
//! Methods take `&self`; implementations that mutate state across calls use
//! interior mutability, which is also what makes a restored snapshot visible
//! to `start`.
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use commandant::{OptionDescriptor, ResolvedConfig, RunContext, Subcommand};
//! use std::sync::Mutex;
//!
//! #[derive(Default)]
//! struct Greeter {
//!     greeting: Mutex<String>,
//! }
//!
//! #[async_trait]
//! impl Subcommand for Greeter {
//!     fn options(&self) -> Vec<OptionDescriptor> {
//!         vec![OptionDescriptor::string("greeting", "hello", "what to say")]
//!     }
//!
//!     fn configure(&self, config: &ResolvedConfig) -> anyhow::Result<()> {
//!         *self.greeting.lock().unwrap() = config.str("greeting")?.to_string();
//!         Ok(())
//!     }
//!
//!     async fn start(&self, ctx: RunContext) -> anyhow::Result<()> {
//!         println!("{} from {}", self.greeting.lock().unwrap(), ctx.name);
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::config::ResolvedConfig;
use crate::context::RunContext;
use crate::options::OptionDescriptor;

/// A named, independently configured unit of application behavior.
///
/// Errors cross this seam as `anyhow::Result`; the orchestrator classifies
/// them into the crate's error taxonomy.
#[async_trait]
pub trait Subcommand: Send + Sync {
    /// Options this subcommand contributes beyond the built-in set.
    fn options(&self) -> Vec<OptionDescriptor> {
        Vec::new()
    }

    /// Receive the effective configuration, before any lifecycle method.
    ///
    /// Errors abort the run as configuration errors.
    fn configure(&self, config: &ResolvedConfig) -> anyhow::Result<()> {
        let _ = config;
        Ok(())
    }

    /// The document to persist across restarts.
    ///
    /// Returning `None` declares that this subcommand persists nothing; the
    /// cache is then neither loaded into nor saved from this subcommand.
    fn snapshot(&self) -> Option<serde_json::Value> {
        None
    }

    /// Receive the prior run's document, before `init`.
    ///
    /// Only called when a document exists and `snapshot` declares one.
    fn restore(&self, doc: serde_json::Value) -> anyhow::Result<()> {
        let _ = doc;
        Ok(())
    }

    /// Synchronous setup; an error here prevents `start` from running.
    async fn init(&self, ctx: &RunContext) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// The subcommand's main work, spawned as an independent task.
    ///
    /// Implementations should observe `ctx.cancelled()` and wind down when
    /// the run is interrupted.
    async fn start(&self, ctx: RunContext) -> anyhow::Result<()>;

    /// Teardown hook; runs on every exit path, clean or forced.
    async fn on_exited(&self, ctx: &RunContext) -> anyhow::Result<()> {
        let _ = ctx;
        Ok(())
    }
}
