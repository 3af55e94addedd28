//! registry
//!
//! Subcommand registration and argv resolution.
//!
//! # Resolution rules
//!
//! The first argv token selects the subcommand when it is present and does
//! not start with the option prefix `-`; otherwise the reserved name
//! `"default"` is used. Tokens after the `--` separator are positional and
//! are never interpreted as flags.
//!
//! With dispatch disabled (single-purpose tools), a non-option first token
//! is not a subcommand name at all; it becomes the first positional argument
//! of the default subcommand.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::subcommand::Subcommand;

/// Reserved name used when argv supplies no subcommand token.
pub const DEFAULT_NAME: &str = "default";

/// Descriptor for one registered subcommand.
#[derive(Clone)]
pub struct SubcommandInfo {
    /// Human description, used in help output.
    pub desc: String,
    /// Ordered names of the expected positional arguments.
    pub args: Vec<String>,
    /// The implementation.
    pub subcommand: Arc<dyn Subcommand>,
}

impl SubcommandInfo {
    /// Build a descriptor.
    pub fn new(desc: &str, args: &[&str], subcommand: Arc<dyn Subcommand>) -> Self {
        Self {
            desc: desc.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            subcommand,
        }
    }
}

// Manual impl: the trait object has no Debug bound.
impl fmt::Debug for SubcommandInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubcommandInfo")
            .field("desc", &self.desc)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Outcome of argv resolution.
#[derive(Debug)]
pub struct Resolution {
    /// The active subcommand's name.
    pub name: String,
    /// Its descriptor.
    pub info: SubcommandInfo,
    /// Tokens for the flag layer (subcommand token and positionals removed).
    pub flag_tokens: Vec<String>,
    /// Tokens after the `--` separator, in order.
    pub positional_tokens: Vec<String>,
}

/// Name-keyed registry of subcommand descriptors.
///
/// At most one descriptor per name; registering a name twice overwrites.
/// Registered once at startup, immutable during the run.
#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<String, SubcommandInfo>,
    dispatch_enabled: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            dispatch_enabled: true,
        }
    }

    /// Store or overwrite the descriptor for `name`.
    pub fn register(&mut self, name: &str, info: SubcommandInfo) {
        self.entries.insert(name.to_string(), info);
    }

    /// Sugar for `register("default", info)`.
    pub fn register_default(&mut self, info: SubcommandInfo) {
        self.register(DEFAULT_NAME, info);
    }

    /// Disable subcommand dispatch: the first non-option token becomes a
    /// positional argument of the default subcommand instead of a name.
    pub fn disable_dispatch(&mut self) {
        self.dispatch_enabled = false;
    }

    /// Look up a descriptor.
    pub fn get(&self, name: &str) -> Option<&SubcommandInfo> {
        self.entries.get(name)
    }

    /// Iterate `(name, descriptor)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SubcommandInfo)> {
        self.entries.iter()
    }

    /// Resolve the active subcommand from argv (without the program name).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Dispatch`] when a consumed name has no descriptor,
    /// or when no default subcommand is registered and argv names none.
    pub fn resolve(&self, argv: &[String]) -> Result<Resolution> {
        // Split at the first separator; everything after is positional.
        let (head, positional_tokens) = match argv.iter().position(|t| t == "--") {
            Some(i) => (&argv[..i], argv[i + 1..].to_vec()),
            None => (argv, Vec::new()),
        };

        let mut positional_tokens = positional_tokens;
        let mut flag_tokens: Vec<String> = head.to_vec();
        let mut name = DEFAULT_NAME.to_string();

        if let Some(first) = head.first() {
            if !first.starts_with('-') {
                if self.dispatch_enabled {
                    name = flag_tokens.remove(0);
                } else {
                    // Single-purpose tool: the token is the first positional.
                    positional_tokens.insert(0, flag_tokens.remove(0));
                }
            }
        }

        let info = self.get(&name).cloned().ok_or_else(|| {
            if name == DEFAULT_NAME {
                Error::Dispatch("no default subcommand is registered".to_string())
            } else {
                Error::Dispatch(format!("'{}' is not a registered subcommand", name))
            }
        })?;

        Ok(Resolution {
            name,
            info,
            flag_tokens,
            positional_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Subcommand for Noop {
        async fn start(&self, _ctx: RunContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn registry() -> Registry {
        let mut reg = Registry::new();
        reg.register("serve", SubcommandInfo::new("serve things", &[], Arc::new(Noop)));
        reg.register_default(SubcommandInfo::new("default behavior", &[], Arc::new(Noop)));
        reg
    }

    fn argv(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    mod dispatch {
        use super::*;

        #[test]
        fn first_token_selects_registered_subcommand() {
            let res = registry().resolve(&argv(&["serve", "--port=80"])).unwrap();
            assert_eq!(res.name, "serve");
            assert_eq!(res.flag_tokens, argv(&["--port=80"]));
        }

        #[test]
        fn option_prefixed_first_token_selects_default() {
            let res = registry().resolve(&argv(&["--port=80"])).unwrap();
            assert_eq!(res.name, DEFAULT_NAME);
            assert_eq!(res.flag_tokens, argv(&["--port=80"]));
        }

        #[test]
        fn empty_argv_selects_default() {
            let res = registry().resolve(&[]).unwrap();
            assert_eq!(res.name, DEFAULT_NAME);
        }

        #[test]
        fn unknown_name_is_a_dispatch_error() {
            let err = registry().resolve(&argv(&["bogus"])).unwrap_err();
            assert!(matches!(err, Error::Dispatch(_)));
            assert!(err.to_string().contains("bogus"));
        }

        #[test]
        fn missing_default_is_a_dispatch_error() {
            let reg = Registry::new();
            let err = reg.resolve(&[]).unwrap_err();
            assert!(matches!(err, Error::Dispatch(_)));
        }

        #[test]
        fn resolution_debug_output_names_the_subcommand() {
            let res = registry().resolve(&argv(&["serve", "--port=80"])).unwrap();
            let text = format!("{:?}", res);
            assert!(text.contains("serve"));
            assert!(text.contains("SubcommandInfo"));
        }

        #[test]
        fn registering_twice_overwrites() {
            let mut reg = registry();
            reg.register("serve", SubcommandInfo::new("replacement", &[], Arc::new(Noop)));
            assert_eq!(reg.get("serve").unwrap().desc, "replacement");
        }
    }

    mod separator {
        use super::*;

        #[test]
        fn positionals_follow_the_separator() {
            let res = registry()
                .resolve(&argv(&["serve", "--port=80", "--", "a.txt", "b.txt"]))
                .unwrap();
            assert_eq!(res.flag_tokens, argv(&["--port=80"]));
            assert_eq!(res.positional_tokens, argv(&["a.txt", "b.txt"]));
        }

        #[test]
        fn tokens_after_separator_are_never_flags() {
            let res = registry()
                .resolve(&argv(&["--", "--looks-like-a-flag"]))
                .unwrap();
            assert!(res.flag_tokens.is_empty());
            assert_eq!(res.positional_tokens, argv(&["--looks-like-a-flag"]));
        }
    }

    mod disabled_dispatch {
        use super::*;

        #[test]
        fn first_token_becomes_positional() {
            let mut reg = registry();
            reg.disable_dispatch();
            let res = reg
                .resolve(&argv(&["report.txt", "--verbose", "--", "extra"]))
                .unwrap();
            assert_eq!(res.name, DEFAULT_NAME);
            assert_eq!(res.flag_tokens, argv(&["--verbose"]));
            assert_eq!(res.positional_tokens, argv(&["report.txt", "extra"]));
        }
    }
}
