//! options
//!
//! Typed option descriptors and resolved values.
//!
//! # Overview
//!
//! Every option a run can observe is declared up front as an
//! [`OptionDescriptor`]: a dashed name, a primitive [`OptionKind`], an
//! optional default, and help text. Subcommands enumerate their options as a
//! plain list; the resolver merges them with the built-in set and never has
//! to inspect a configuration struct at runtime.
//!
//! # Built-in options
//!
//! The orchestrator itself recognizes `version`, `log-level`, `config`,
//! `env-file`, `enable-pprof`, `pprof-address`, and `data-dir` regardless of
//! the active subcommand. See [`builtin_options`].

use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Primitive kinds an option value can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// UTF-8 string (also used for paths).
    Str,
    /// Boolean flag.
    Bool,
    /// Signed integer.
    Int,
    /// Floating-point number.
    Float,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionKind::Str => "string",
            OptionKind::Bool => "bool",
            OptionKind::Int => "int",
            OptionKind::Float => "float",
        };
        f.write_str(name)
    }
}

/// A resolved option value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl OptionValue {
    /// The kind this value belongs to.
    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::Str(_) => OptionKind::Str,
            OptionValue::Bool(_) => OptionKind::Bool,
            OptionValue::Int(_) => OptionKind::Int,
            OptionValue::Float(_) => OptionKind::Float,
        }
    }

    /// The zero value for a kind: `""`, `false`, `0`, `0.0`.
    pub fn zero(kind: OptionKind) -> Self {
        match kind {
            OptionKind::Str => OptionValue::Str(String::new()),
            OptionKind::Bool => OptionValue::Bool(false),
            OptionKind::Int => OptionValue::Int(0),
            OptionKind::Float => OptionValue::Float(0.0),
        }
    }

    /// Parse source text into a value of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the option when the text does
    /// not parse as the declared kind.
    pub fn parse(name: &str, kind: OptionKind, text: &str) -> Result<Self> {
        match kind {
            OptionKind::Str => Ok(OptionValue::Str(text.to_string())),
            OptionKind::Bool => match text {
                "true" | "1" => Ok(OptionValue::Bool(true)),
                "false" | "0" | "" => Ok(OptionValue::Bool(false)),
                other => Err(Error::Configuration(format!(
                    "option '{}': cannot parse '{}' as bool",
                    name, other
                ))),
            },
            OptionKind::Int => text.parse::<i64>().map(OptionValue::Int).map_err(|e| {
                Error::Configuration(format!(
                    "option '{}': cannot parse '{}' as int: {}",
                    name, text, e
                ))
            }),
            OptionKind::Float => text.parse::<f64>().map(OptionValue::Float).map_err(|e| {
                Error::Configuration(format!(
                    "option '{}': cannot parse '{}' as float: {}",
                    name, text, e
                ))
            }),
        }
    }

    /// True for the values the precedence resolver treats as "empty":
    /// the empty string. All other values, including `false` and `0`, are
    /// considered supplied.
    pub fn is_empty_text(&self) -> bool {
        matches!(self, OptionValue::Str(s) if s.is_empty())
    }

    /// String accessor; `None` when the value is not a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Bool accessor.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer accessor.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float accessor.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            OptionValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Convert to a JSON value for the merged configuration document.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            OptionValue::Str(s) => serde_json::Value::String(s.clone()),
            OptionValue::Bool(b) => serde_json::Value::Bool(*b),
            OptionValue::Int(i) => serde_json::Value::Number((*i).into()),
            OptionValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Which configuration source supplied a resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Explicit command-line flag.
    Flag,
    /// Process environment variable.
    Env,
    /// Config file entry.
    ConfigFile,
    /// Env/secret file entry.
    EnvFile,
    /// Descriptor default.
    Default,
    /// The kind's zero value; no source supplied anything.
    Zero,
}

/// Static declaration of one named option.
#[derive(Debug, Clone)]
pub struct OptionDescriptor {
    /// Dashed option name, e.g. `log-level`. Also the `--long` flag name.
    pub name: String,
    /// Primitive kind of the value.
    pub kind: OptionKind,
    /// Default applied when no source supplies a value.
    pub default: Option<OptionValue>,
    /// One-line help text.
    pub help: String,
}

impl OptionDescriptor {
    /// Declare a string option with a default.
    pub fn string(name: &str, default: &str, help: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: OptionKind::Str,
            default: Some(OptionValue::Str(default.to_string())),
            help: help.to_string(),
        }
    }

    /// Declare a boolean flag, defaulting to false.
    pub fn flag(name: &str, help: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: OptionKind::Bool,
            default: Some(OptionValue::Bool(false)),
            help: help.to_string(),
        }
    }

    /// Declare an integer option with a default.
    pub fn int(name: &str, default: i64, help: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: OptionKind::Int,
            default: Some(OptionValue::Int(default)),
            help: help.to_string(),
        }
    }

    /// Declare a float option with a default.
    pub fn float(name: &str, default: f64, help: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: OptionKind::Float,
            default: Some(OptionValue::Float(default)),
            help: help.to_string(),
        }
    }

    /// Declare a default given as text, parsed against the declared kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the text does not parse as the
    /// kind. This is the typed replacement for the default-tag parse failure
    /// of tag-driven option discovery.
    pub fn with_text_default(name: &str, kind: OptionKind, default: &str, help: &str) -> Result<Self> {
        let value = OptionValue::parse(name, kind, default)?;
        Ok(Self {
            name: name.to_string(),
            kind,
            default: Some(value),
            help: help.to_string(),
        })
    }

    /// The environment variable matched against this option:
    /// the dashed name, upper-snake-cased (`log-level` -> `LOG_LEVEL`).
    pub fn env_var(&self) -> String {
        self.name.to_ascii_uppercase().replace('-', "_")
    }
}

/// Name of the built-in `version` option.
pub const OPT_VERSION: &str = "version";
/// Name of the built-in `log-level` option.
pub const OPT_LOG_LEVEL: &str = "log-level";
/// Name of the built-in `config` option.
pub const OPT_CONFIG: &str = "config";
/// Name of the built-in `env-file` option.
pub const OPT_ENV_FILE: &str = "env-file";
/// Name of the built-in `enable-pprof` option.
pub const OPT_ENABLE_PPROF: &str = "enable-pprof";
/// Name of the built-in `pprof-address` option.
pub const OPT_PPROF_ADDRESS: &str = "pprof-address";
/// Name of the built-in `data-dir` option.
pub const OPT_DATA_DIR: &str = "data-dir";

/// The options the orchestrator recognizes regardless of subcommand.
pub fn builtin_options(app_name: &str) -> Vec<OptionDescriptor> {
    vec![
        OptionDescriptor::flag(OPT_VERSION, "print version string"),
        OptionDescriptor::string(
            OPT_LOG_LEVEL,
            "info",
            "set log verbosity: trace, debug, info, warn, or error",
        ),
        OptionDescriptor::string(OPT_CONFIG, "", "path to config file"),
        OptionDescriptor::string(OPT_ENV_FILE, ".env", "path to env file"),
        OptionDescriptor::flag(OPT_ENABLE_PPROF, "enable the diagnostics endpoint"),
        OptionDescriptor::string(
            OPT_PPROF_ADDRESS,
            "0.0.0.0:9191",
            "<addr>:<port> the diagnostics endpoint listens on",
        ),
        OptionDescriptor::string(
            OPT_DATA_DIR,
            &default_data_dir(app_name).display().to_string(),
            "data directory",
        ),
    ]
}

/// `$HOME/.<app-name>`, falling back to a relative `.<app-name>` when the
/// home directory cannot be determined.
pub fn default_data_dir(app_name: &str) -> PathBuf {
    let leaf = format!(".{}", app_name);
    match dirs::home_dir() {
        Some(home) => home.join(leaf),
        None => PathBuf::from(leaf),
    }
}
