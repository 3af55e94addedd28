//! config
//!
//! Layered configuration resolution.
//!
//! # Precedence
//!
//! Values are resolved per option, highest tier first (first non-empty value
//! wins, and each tier is consulted at most once per option):
//!
//! 1. Explicit command-line flags
//! 2. Process environment variables (`log-level` -> `LOG_LEVEL`)
//! 3. Config file entries (TOML table of scalars)
//! 4. Env/secret file entries (`KEY=VALUE` lines)
//! 5. Descriptor defaults
//! 6. The kind's zero value
//!
//! Every resolved option records which tier won as its [`Provenance`].
//!
//! # Typed extraction
//!
//! After resolution the merged document can be deserialized back into a
//! subcommand's configuration struct via [`ResolvedConfig::typed`], matched
//! by dashed option name, so subcommands observe typed configuration rather
//! than a generic map.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::options::{OptionDescriptor, OptionKind, OptionValue, Provenance};

/// One option after resolution.
#[derive(Debug, Clone)]
pub struct ResolvedOption {
    /// Dashed option name.
    pub name: String,
    /// The winning value.
    pub value: OptionValue,
    /// Which tier supplied it.
    pub provenance: Provenance,
}

/// The effective configuration for one run.
///
/// Ordered by declaration (built-ins first, then common options, then the
/// subcommand's own), read-only after resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    entries: Vec<ResolvedOption>,
    index: BTreeMap<String, usize>,
}

impl ResolvedConfig {
    /// Look up a resolved option by name.
    pub fn get(&self, name: &str) -> Option<&ResolvedOption> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Iterate options in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedOption> {
        self.entries.iter()
    }

    /// Provenance of an option, if declared.
    pub fn provenance(&self, name: &str) -> Option<Provenance> {
        self.get(name).map(|o| o.provenance)
    }

    /// String value of a declared option.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the option is undeclared or not
    /// a string.
    pub fn str(&self, name: &str) -> Result<&str> {
        self.get(name)
            .and_then(|o| o.value.as_str())
            .ok_or_else(|| Error::Configuration(format!("option '{}' is not a declared string", name)))
    }

    /// Boolean value of a declared option.
    pub fn bool(&self, name: &str) -> Result<bool> {
        self.get(name)
            .and_then(|o| o.value.as_bool())
            .ok_or_else(|| Error::Configuration(format!("option '{}' is not a declared bool", name)))
    }

    /// Integer value of a declared option.
    pub fn int(&self, name: &str) -> Result<i64> {
        self.get(name)
            .and_then(|o| o.value.as_int())
            .ok_or_else(|| Error::Configuration(format!("option '{}' is not a declared int", name)))
    }

    /// Float value of a declared option.
    pub fn float(&self, name: &str) -> Result<f64> {
        self.get(name)
            .and_then(|o| o.value.as_float())
            .ok_or_else(|| Error::Configuration(format!("option '{}' is not a declared float", name)))
    }

    /// The merged document as a JSON object keyed by option name.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for entry in &self.entries {
            map.insert(entry.name.clone(), entry.value.to_json());
        }
        serde_json::Value::Object(map)
    }

    /// Deserialize the merged document into a typed configuration struct.
    ///
    /// Field names are matched against dashed option names, so config
    /// structs typically carry `#[serde(rename_all = "kebab-case")]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the document does not fit `T`.
    pub fn typed<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json())
            .map_err(|e| Error::Configuration(format!("cannot deserialize configuration: {}", e)))
    }
}

/// Outcome of parsing the flag layer.
#[derive(Debug)]
pub(crate) enum FlagLayer {
    /// Flags parsed; matches carry per-flag provenance.
    Parsed(ArgMatches),
    /// `--help` (or `-h`) was requested and has been rendered.
    HelpRequested,
}

/// Build the clap command for a descriptor set.
///
/// Help rendering is clap's job; this crate only declares the args.
pub(crate) fn build_command(
    app_name: &str,
    about: &str,
    descriptors: &[OptionDescriptor],
) -> clap::Command {
    let mut cmd = clap::Command::new(app_name.to_string())
        .about(about.to_string())
        .disable_version_flag(true);
    for desc in descriptors {
        let mut arg = Arg::new(desc.name.clone())
            .long(desc.name.clone())
            .help(desc.help.clone());
        arg = match desc.kind {
            OptionKind::Bool => arg.action(ArgAction::SetTrue),
            _ => arg.action(ArgAction::Set).value_name(desc.kind.to_string().to_uppercase()),
        };
        cmd = cmd.arg(arg);
    }
    cmd
}

/// Parse flag tokens against the descriptor set.
///
/// # Errors
///
/// Unknown flags and malformed values are [`Error::Configuration`] errors;
/// a help request is not an error (see [`FlagLayer::HelpRequested`]).
pub(crate) fn parse_flags(
    app_name: &str,
    about: &str,
    descriptors: &[OptionDescriptor],
    flag_tokens: &[String],
) -> Result<FlagLayer> {
    let cmd = build_command(app_name, about, descriptors);
    let argv = std::iter::once(app_name.to_string()).chain(flag_tokens.iter().cloned());
    match cmd.try_get_matches_from(argv) {
        Ok(matches) => Ok(FlagLayer::Parsed(matches)),
        Err(e) if e.kind() == clap::error::ErrorKind::DisplayHelp => {
            let _ = e.print();
            Ok(FlagLayer::HelpRequested)
        }
        Err(e) => Err(Error::Configuration(format!("flag parse error: {}", e))),
    }
}

/// Reject duplicate names across built-in, common, and subcommand options.
pub(crate) fn check_duplicates(descriptors: &[OptionDescriptor]) -> Result<()> {
    let mut seen = BTreeMap::new();
    for desc in descriptors {
        if seen.insert(desc.name.clone(), ()).is_some() {
            return Err(Error::Configuration(format!(
                "option '{}' is declared more than once",
                desc.name
            )));
        }
    }
    Ok(())
}

/// Load a TOML config file as a flat table of scalars.
///
/// # Errors
///
/// Unreadable or unparsable files are [`Error::Configuration`] errors; so
/// are nested tables and arrays, which have no option to map onto.
pub(crate) fn load_config_file(path: &Path) -> Result<BTreeMap<String, toml::Value>> {
    let contents = fs::read_to_string(path).map_err(|e| Error::config_io(path, e))?;
    let table: toml::Table = toml::from_str(&contents).map_err(|e| {
        Error::Configuration(format!("failed to parse '{}': {}", path.display(), e))
    })?;
    let mut doc = BTreeMap::new();
    for (key, value) in table {
        match value {
            toml::Value::Table(_) | toml::Value::Array(_) => {
                return Err(Error::Configuration(format!(
                    "config file '{}': key '{}' must be a scalar",
                    path.display(),
                    key
                )));
            }
            scalar => {
                doc.insert(key, scalar);
            }
        }
    }
    Ok(doc)
}

/// Load a dotenv-style env/secret file.
///
/// Accepts `KEY=VALUE` lines, `#` comments, an optional `export ` prefix,
/// and single or double quotes around the value.
pub(crate) fn load_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let contents = fs::read_to_string(path).map_err(|e| Error::config_io(path, e))?;
    let mut doc = BTreeMap::new();
    for (lineno, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = line.split_once('=').ok_or_else(|| {
            Error::Configuration(format!(
                "env file '{}': line {} is not KEY=VALUE",
                path.display(),
                lineno + 1
            ))
        })?;
        let key = key.trim().to_string();
        let mut value = value.trim();
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        doc.insert(key, value.to_string());
    }
    Ok(doc)
}

/// Convert a config-file scalar to an option value of the declared kind.
fn coerce_toml(name: &str, kind: OptionKind, value: &toml::Value) -> Result<OptionValue> {
    match (kind, value) {
        (_, toml::Value::String(s)) => OptionValue::parse(name, kind, s),
        (OptionKind::Bool, toml::Value::Boolean(b)) => Ok(OptionValue::Bool(*b)),
        (OptionKind::Int, toml::Value::Integer(i)) => Ok(OptionValue::Int(*i)),
        (OptionKind::Float, toml::Value::Float(f)) => Ok(OptionValue::Float(*f)),
        (OptionKind::Float, toml::Value::Integer(i)) => Ok(OptionValue::Float(*i as f64)),
        (kind, other) => Err(Error::Configuration(format!(
            "config key '{}': expected {}, got {}",
            name, kind, other
        ))),
    }
}

/// Extract the explicit flag value for a descriptor, if one was supplied.
fn flag_value(matches: &ArgMatches, desc: &OptionDescriptor) -> Result<Option<OptionValue>> {
    if matches.value_source(&desc.name) != Some(ValueSource::CommandLine) {
        return Ok(None);
    }
    let value = match desc.kind {
        OptionKind::Bool => OptionValue::Bool(matches.get_flag(&desc.name)),
        _ => {
            let text = matches
                .get_one::<String>(&desc.name)
                .cloned()
                .unwrap_or_default();
            OptionValue::parse(&desc.name, desc.kind, &text)?
        }
    };
    Ok(Some(value))
}

/// Resolve the effective configuration for one run.
///
/// `matches` is the parsed flag layer; `config_doc` and `env_doc` are the
/// already-loaded file layers (empty maps when the files are absent).
pub(crate) fn resolve(
    descriptors: &[OptionDescriptor],
    matches: &ArgMatches,
    config_doc: &BTreeMap<String, toml::Value>,
    env_doc: &BTreeMap<String, String>,
) -> Result<ResolvedConfig> {
    let mut entries = Vec::with_capacity(descriptors.len());
    let mut index = BTreeMap::new();

    for desc in descriptors {
        let (value, provenance) = resolve_one(desc, matches, config_doc, env_doc)?;
        index.insert(desc.name.clone(), entries.len());
        entries.push(ResolvedOption {
            name: desc.name.clone(),
            value,
            provenance,
        });
    }

    Ok(ResolvedConfig { entries, index })
}

fn resolve_one(
    desc: &OptionDescriptor,
    matches: &ArgMatches,
    config_doc: &BTreeMap<String, toml::Value>,
    env_doc: &BTreeMap<String, String>,
) -> Result<(OptionValue, Provenance)> {
    // 1. Explicit flag.
    if let Some(value) = flag_value(matches, desc)? {
        return Ok((value, Provenance::Flag));
    }

    // 2. Process environment.
    if let Ok(text) = std::env::var(desc.env_var()) {
        if !text.is_empty() {
            let value = OptionValue::parse(&desc.name, desc.kind, &text)?;
            return Ok((value, Provenance::Env));
        }
    }

    // 3. Config file.
    if let Some(raw) = config_doc.get(&desc.name) {
        let value = coerce_toml(&desc.name, desc.kind, raw)?;
        if !value.is_empty_text() {
            return Ok((value, Provenance::ConfigFile));
        }
    }

    // 4. Env/secret file, matched by the same upper-snake key.
    if let Some(text) = env_doc.get(&desc.env_var()) {
        if !text.is_empty() {
            let value = OptionValue::parse(&desc.name, desc.kind, text)?;
            return Ok((value, Provenance::EnvFile));
        }
    }

    // 5. Descriptor default.
    if let Some(default) = &desc.default {
        if !default.is_empty_text() {
            return Ok((default.clone(), Provenance::Default));
        }
    }

    // 6. Zero value.
    Ok((OptionValue::zero(desc.kind), Provenance::Zero))
}
