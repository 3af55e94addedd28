//! Commandant - a scaffold for single-binary CLI tools
//!
//! Commandant gives an application consistent option handling and clean
//! shutdown semantics: it registers named subcommands, resolves a layered
//! configuration (flags, environment, config file, env file, declared
//! defaults), runs the active subcommand under a cancellable context with
//! interrupt escalation, and persists a small JSON document per subcommand
//! across invocations.
//!
//! # Architecture
//!
//! - [`registry`] - Name-keyed subcommand descriptors and argv resolution
//! - [`config`] / [`options`] - Typed option declarations and the
//!   precedence resolver
//! - [`commander`] - The lifecycle orchestrator
//! - [`cache`] - The file-backed persistence cache
//! - [`context`] - The run context shared with the active subcommand
//!
//! # Lifecycle invariants
//!
//! 1. Configuration, dispatch, and argument errors abort before any
//!    subcommand code runs
//! 2. The run context is cancelled exactly once, on the first interrupt
//! 3. Three interrupts stop the wait for `start`; its result is discarded
//! 4. Teardown always runs, and its failures chain instead of masking
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use commandant::{Commander, RunContext, Subcommand, SubcommandInfo};
//! use std::sync::Arc;
//!
//! struct Serve;
//!
//! #[async_trait]
//! impl Subcommand for Serve {
//!     async fn start(&self, ctx: RunContext) -> anyhow::Result<()> {
//!         ctx.cancelled().await; // wind down on interrupt
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut commander = Commander::new("myapp", "v0.1.0", "does things");
//!     commander.register("serve", SubcommandInfo::new("run the server", &[], Arc::new(Serve)));
//!     commander.run().await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod commander;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod options;
pub mod registry;
pub mod subcommand;

pub use cache::Cache;
pub use commander::{Commander, DiagnosticsServer, TeardownHook};
pub use config::{ResolvedConfig, ResolvedOption};
pub use context::RunContext;
pub use error::{Error, Result, ShutdownError};
pub use options::{builtin_options, OptionDescriptor, OptionKind, OptionValue, Provenance};
pub use registry::{Registry, SubcommandInfo, DEFAULT_NAME};
pub use subcommand::Subcommand;
