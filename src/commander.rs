//! commander
//!
//! The lifecycle orchestrator.
//!
//! # Lifecycle
//!
//! Every run walks the same phases:
//!
//! ```text
//! Idle -> Resolving -> Configuring -> Preparing -> Running -> Draining -> Exited
//! ```
//!
//! - **Resolving**: the registry picks the active subcommand from argv.
//! - **Configuring**: the layered configuration is resolved and handed to
//!   the subcommand as a typed object.
//! - **Preparing**: positional arguments are bound, the data directory is
//!   created, `--version` short-circuits, the diagnostics endpoint starts,
//!   the run context is created, and prior persisted state is loaded.
//! - **Running**: `init` runs synchronously, then `start` is spawned and
//!   raced against interrupt signals.
//! - **Draining**: the first interrupt cancels the run context; each
//!   further interrupt decrements a budget of 3; at zero the orchestrator
//!   stops waiting and the in-flight `start` is left to the process
//!   lifetime, its result discarded.
//! - **Exited**: teardown always runs: pre-teardown hook, persisted-state
//!   save and cache close, `on_exited`, post-teardown hook. Every failure
//!   is chained into the returned error instead of masking the others.
//!
//! Resolution, configuration, and argument errors abort before any
//! subcommand code executes and are returned directly.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::cache::{cache_file_name, Cache};
use crate::config::{self, check_duplicates, parse_flags, FlagLayer, ResolvedConfig};
use crate::context::RunContext;
use crate::error::{Error, Result, ShutdownError};
use crate::logging;
use crate::options::{
    builtin_options, OptionDescriptor, OPT_CONFIG, OPT_DATA_DIR, OPT_ENABLE_PPROF, OPT_ENV_FILE,
    OPT_LOG_LEVEL, OPT_PPROF_ADDRESS, OPT_VERSION,
};
use crate::registry::{Registry, Resolution, SubcommandInfo};

/// Interrupts tolerated before the orchestrator stops waiting for `start`.
const INTERRUPT_BUDGET: u32 = 3;

/// Narrow seam for the optional diagnostics (pprof-style) endpoint.
///
/// The embedder supplies the listener; the orchestrator only starts it when
/// `enable-pprof` is set. The listener is never joined or stopped; its
/// lifetime is the process's.
pub trait DiagnosticsServer: Send + Sync {
    /// Start serving on `address` in the background and return immediately.
    fn spawn(&self, address: &str);
}

/// Orchestrator-level teardown hook.
pub type TeardownHook = Box<dyn Fn(&RunContext) -> anyhow::Result<()> + Send + Sync>;

/// Lifecycle phases, for logging and post-mortems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolving,
    Configuring,
    Preparing,
    Running,
    Draining,
    Exited,
}

/// The lifecycle orchestrator: registry, configuration resolver, and
/// persistence cache composed under one `run`.
pub struct Commander {
    app_name: String,
    version: String,
    description: String,
    registry: Registry,
    common_options: Vec<OptionDescriptor>,
    cache: Cache,
    diagnostics: Option<Box<dyn DiagnosticsServer>>,
    before_exit: Option<TeardownHook>,
    after_exit: Option<TeardownHook>,
}

impl Commander {
    /// Create an orchestrator for the named application.
    pub fn new(app_name: &str, version: &str, description: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            version: version.to_string(),
            description: description.to_string(),
            registry: Registry::new(),
            common_options: Vec::new(),
            cache: Cache::new(),
            diagnostics: None,
            before_exit: None,
            after_exit: None,
        }
    }

    /// Register a subcommand under `name`.
    pub fn register(&mut self, name: &str, info: SubcommandInfo) -> &mut Self {
        self.registry.register(name, info);
        self
    }

    /// Register the subcommand run when argv names none.
    pub fn register_default(&mut self, info: SubcommandInfo) -> &mut Self {
        self.registry.register_default(info);
        self
    }

    /// Disable subcommand dispatch for single-purpose tools: the first
    /// non-option token becomes the default subcommand's first positional.
    pub fn disable_dispatch(&mut self) -> &mut Self {
        self.registry.disable_dispatch();
        self
    }

    /// Declare options shared by every subcommand, resolved through the
    /// same precedence chain as the built-ins.
    pub fn add_common_options(&mut self, options: Vec<OptionDescriptor>) -> &mut Self {
        self.common_options.extend(options);
        self
    }

    /// Supply the diagnostics endpoint started when `enable-pprof` is set.
    pub fn with_diagnostics_server(&mut self, server: Box<dyn DiagnosticsServer>) -> &mut Self {
        self.diagnostics = Some(server);
        self
    }

    /// Hook run first in the teardown sequence.
    pub fn on_exited_before(&mut self, hook: TeardownHook) -> &mut Self {
        self.before_exit = Some(hook);
        self
    }

    /// Hook run last in the teardown sequence.
    pub fn on_exited_after(&mut self, hook: TeardownHook) -> &mut Self {
        self.after_exit = Some(hook);
        self
    }

    /// Run with the process argv and OS interrupt signals (SIGINT/SIGTERM).
    pub async fn run(&self) -> Result<()> {
        let argv: Vec<String> = std::env::args().skip(1).collect();
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_signal_forwarder(tx);
        self.run_from(argv, rx).await
    }

    /// Run with an explicit argv (without the program name) and interrupt
    /// source. This is the embedding- and test-friendly entry point.
    ///
    /// Each received `()` counts as one interrupt toward the escalation
    /// budget. After a forced exit the in-flight `start` task keeps running
    /// for the remaining process lifetime and its result is discarded; no
    /// durability of its side effects is guaranteed.
    pub async fn run_from(
        &self,
        argv: Vec<String>,
        mut interrupts: UnboundedReceiver<()>,
    ) -> Result<()> {
        // Resolving.
        tracing::debug!(phase = ?Phase::Resolving, "run starting");
        let resolution = self.registry.resolve(&argv)?;
        let sub = Arc::clone(&resolution.info.subcommand);

        // Configuring.
        tracing::debug!(phase = ?Phase::Configuring, subcommand = %resolution.name, "resolving configuration");
        let mut descriptors = builtin_options(&self.app_name);
        descriptors.extend(self.common_options.iter().cloned());
        descriptors.extend(sub.options());
        check_duplicates(&descriptors)?;

        let matches = match parse_flags(
            &self.app_name,
            &self.description,
            &descriptors,
            &resolution.flag_tokens,
        )? {
            FlagLayer::Parsed(m) => m,
            FlagLayer::HelpRequested => return Ok(()),
        };

        // The env-file and config paths are options themselves, so resolve
        // in passes: flags/env/defaults give the env-file path, the env-file
        // layer may then supply the config path, and only then can the full
        // four-layer document be built.
        let bootstrap = config::resolve(&descriptors, &matches, &BTreeMap::new(), &BTreeMap::new())?;
        let env_file = PathBuf::from(bootstrap.str(OPT_ENV_FILE)?);
        let env_doc = if !env_file.as_os_str().is_empty() && env_file.exists() {
            config::load_env_file(&env_file)?
        } else {
            BTreeMap::new()
        };

        let with_env = config::resolve(&descriptors, &matches, &BTreeMap::new(), &env_doc)?;
        let config_path = with_env.str(OPT_CONFIG)?.to_string();
        let (config_doc, config_file) = if config_path.is_empty() {
            (BTreeMap::new(), None)
        } else {
            let path = PathBuf::from(&config_path);
            (config::load_config_file(&path)?, Some(path))
        };

        let effective = config::resolve(&descriptors, &matches, &config_doc, &env_doc)?;
        sub.configure(&effective)
            .map_err(|e| Error::Configuration(format!("configure failed: {e:#}")))?;

        // Preparing.
        let log_level = effective.str(OPT_LOG_LEVEL)?.to_string();
        logging::init(&log_level)?;
        tracing::debug!(phase = ?Phase::Preparing, subcommand = %resolution.name, "preparing run");

        let args = bind_positionals(&resolution)?;

        let data_dir = PathBuf::from(effective.str(OPT_DATA_DIR)?);
        fs::create_dir_all(&data_dir).map_err(|e| {
            Error::Configuration(format!(
                "cannot create data directory '{}': {}",
                data_dir.display(),
                e
            ))
        })?;

        if effective.bool(OPT_VERSION)? {
            println!("{}", self.version);
            return Ok(());
        }

        if effective.bool(OPT_ENABLE_PPROF)? {
            let address = effective.str(OPT_PPROF_ADDRESS)?;
            match &self.diagnostics {
                Some(server) => {
                    tracing::info!(%address, "starting diagnostics endpoint");
                    server.spawn(address);
                }
                None => {
                    tracing::warn!("enable-pprof is set but no diagnostics server is registered")
                }
            }
        }

        let (ctx, cancel) = RunContext::new(
            resolution.name.clone(),
            data_dir.clone(),
            config_file,
            log_level,
            args,
        );

        self.cache
            .init(&data_dir.join(cache_file_name(&resolution.name)))?;
        if sub.snapshot().is_some() {
            if let Some(doc) = self.cache.load::<serde_json::Value>()? {
                sub.restore(doc)
                    .map_err(|e| Error::Persistence(format!("cannot restore persisted state: {e:#}")))?;
            }
        }

        // Running.
        tracing::debug!(phase = ?Phase::Running, subcommand = %resolution.name, "starting");
        sub.init(&ctx)
            .await
            .map_err(|e| Error::Lifecycle(format!("init failed: {e:#}")))?;

        let start_sub = Arc::clone(&sub);
        let start_ctx = ctx.clone();
        let mut handle = tokio::spawn(async move { start_sub.start(start_ctx).await });

        // Draining: race start completion against interrupt escalation.
        let mut baseline: Option<Error> = None;
        let mut remaining = INTERRUPT_BUDGET;
        let mut interrupts_open = true;
        let mut forced = false;
        loop {
            tokio::select! {
                received = interrupts.recv(), if interrupts_open => {
                    match received {
                        Some(()) => {
                            if remaining == INTERRUPT_BUDGET {
                                cancel.cancel();
                                tracing::info!("interrupt received, exiting");
                            } else {
                                tracing::info!(remaining, "interrupt received, exiting");
                            }
                            remaining -= 1;
                            if remaining == 0 {
                                forced = true;
                                break;
                            }
                        }
                        None => interrupts_open = false,
                    }
                }
                joined = &mut handle => {
                    baseline = match joined {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => Some(Error::Lifecycle(format!("start failed: {e:#}"))),
                        Err(e) => Some(Error::Lifecycle(format!("start task panicked: {e}"))),
                    };
                    break;
                }
            }
        }
        tracing::debug!(phase = ?Phase::Draining, forced, "run loop exited");

        // Exited: every teardown step runs; failures chain, never mask.
        let mut failures = Vec::new();
        if let Some(hook) = &self.before_exit {
            if let Err(e) = hook(&ctx) {
                failures.push(Error::Lifecycle(format!("pre-teardown hook failed: {e:#}")));
            }
        }
        if let Some(doc) = sub.snapshot() {
            if let Err(e) = self.cache.save(&doc) {
                failures.push(e);
            }
        }
        self.cache.close();
        if let Err(e) = sub.on_exited(&ctx).await {
            failures.push(Error::Lifecycle(format!("on_exited failed: {e:#}")));
        }
        if let Some(hook) = &self.after_exit {
            if let Err(e) = hook(&ctx) {
                failures.push(Error::Lifecycle(format!("post-teardown hook failed: {e:#}")));
            }
        }
        tracing::debug!(phase = ?Phase::Exited, failures = failures.len(), "teardown complete");

        ShutdownError {
            baseline: baseline.map(Box::new),
            failures,
        }
        .into_result()
    }

    /// Resolve the effective configuration for argv without running the
    /// lifecycle. Intended for tools that present configuration.
    pub fn resolve_config(&self, argv: Vec<String>) -> Result<ResolvedConfig> {
        let resolution = self.registry.resolve(&argv)?;
        let mut descriptors = builtin_options(&self.app_name);
        descriptors.extend(self.common_options.iter().cloned());
        descriptors.extend(resolution.info.subcommand.options());
        check_duplicates(&descriptors)?;
        let matches = match parse_flags(
            &self.app_name,
            &self.description,
            &descriptors,
            &resolution.flag_tokens,
        )? {
            FlagLayer::Parsed(m) => m,
            FlagLayer::HelpRequested => {
                return Err(Error::Configuration("help requested".to_string()))
            }
        };
        let bootstrap = config::resolve(&descriptors, &matches, &BTreeMap::new(), &BTreeMap::new())?;
        let env_file = PathBuf::from(bootstrap.str(OPT_ENV_FILE)?);
        let env_doc = if env_file.exists() {
            config::load_env_file(&env_file)?
        } else {
            BTreeMap::new()
        };
        let with_env = config::resolve(&descriptors, &matches, &BTreeMap::new(), &env_doc)?;
        let config_path = with_env.str(OPT_CONFIG)?.to_string();
        let config_doc = if config_path.is_empty() {
            BTreeMap::new()
        } else {
            config::load_config_file(Path::new(&config_path))?
        };
        config::resolve(&descriptors, &matches, &config_doc, &env_doc)
    }
}

/// Bind declared positional names to the tokens after `--`, in order.
fn bind_positionals(resolution: &Resolution) -> Result<BTreeMap<String, String>> {
    let mut args = BTreeMap::new();
    for (i, name) in resolution.info.args.iter().enumerate() {
        match resolution.positional_tokens.get(i) {
            Some(token) => {
                args.insert(name.clone(), token.clone());
            }
            None => {
                return Err(Error::Argument {
                    name: name.clone(),
                    supplied: resolution.positional_tokens.len(),
                })
            }
        }
    }
    Ok(args)
}

/// Forward SIGINT/SIGTERM into the interrupt channel, one `()` per signal.
#[cfg(unix)]
fn spawn_signal_forwarder(tx: UnboundedSender<()>) {
    use tokio::signal::unix::{signal, SignalKind};
    tokio::spawn(async move {
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("cannot install SIGINT handler: {}", e);
                return;
            }
        };
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("cannot install SIGTERM handler: {}", e);
                return;
            }
        };
        loop {
            tokio::select! {
                _ = interrupt.recv() => {}
                _ = terminate.recv() => {}
            }
            if tx.send(()).is_err() {
                return;
            }
        }
    });
}

/// Forward Ctrl-C into the interrupt channel on non-Unix targets.
#[cfg(not(unix))]
fn spawn_signal_forwarder(tx: UnboundedSender<()>) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if tx.send(()).is_err() {
                return;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subcommand::Subcommand;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Subcommand for Noop {
        async fn start(&self, _ctx: RunContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn closed_interrupts() -> UnboundedReceiver<()> {
        let (_tx, rx) = mpsc::unbounded_channel();
        rx
    }

    mod dispatch_failures {
        use super::*;

        #[tokio::test]
        async fn unknown_subcommand_is_surfaced() {
            let commander = Commander::new("test-app", "v0.0.1", "");
            let err = commander
                .run_from(vec!["bogus".to_string()], closed_interrupts())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Dispatch(_)));
        }

        #[tokio::test]
        async fn missing_default_is_surfaced() {
            let commander = Commander::new("test-app", "v0.0.1", "");
            let err = commander
                .run_from(Vec::new(), closed_interrupts())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::Dispatch(_)));
        }
    }

    mod builder {
        use super::*;
        use std::sync::Arc;

        #[test]
        fn registration_and_common_options() {
            let mut commander = Commander::new("test-app", "v0.0.1", "");
            commander
                .register("serve", SubcommandInfo::new("serve", &[], Arc::new(Noop)))
                .register_default(SubcommandInfo::new("default", &[], Arc::new(Noop)))
                .add_common_options(vec![OptionDescriptor::flag("shared", "common flag")]);
            assert!(commander.registry.get("serve").is_some());
            assert!(commander.registry.get("default").is_some());
            assert_eq!(commander.common_options.len(), 1);
        }
    }

    mod positionals {
        use super::*;

        #[test]
        fn binding_error_names_the_first_missing_argument() {
            let resolution = Resolution {
                name: "x".into(),
                info: SubcommandInfo::new("", &["input", "output"], Arc::new(Noop)),
                flag_tokens: Vec::new(),
                positional_tokens: vec!["only-one.txt".to_string()],
            };
            match bind_positionals(&resolution) {
                Err(Error::Argument { name, supplied }) => {
                    assert_eq!(name, "output");
                    assert_eq!(supplied, 1);
                }
                other => panic!("expected argument error, got {:?}", other.map(|_| ())),
            }
        }
    }
}
