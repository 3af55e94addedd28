//! Integration tests for layered configuration resolution.
//!
//! These drive `Commander::resolve_config` with real config and env files on
//! disk, checking both the winning value and its recorded provenance. Every
//! probe option (and therefore its environment variable) has a unique name so
//! parallel tests cannot interfere through the process environment.

use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use commandant::{
    Commander, Error, OptionDescriptor, Provenance, RunContext, Subcommand, SubcommandInfo,
};

/// Subcommand that only declares options.
struct Declares {
    descriptors: Vec<OptionDescriptor>,
}

#[async_trait]
impl Subcommand for Declares {
    fn options(&self) -> Vec<OptionDescriptor> {
        self.descriptors.clone()
    }

    async fn start(&self, _ctx: RunContext) -> anyhow::Result<()> {
        Ok(())
    }
}

fn commander_declaring(descriptors: Vec<OptionDescriptor>) -> Commander {
    let mut commander = Commander::new("test-app", "v0.0.1", "");
    commander.register_default(SubcommandInfo::new(
        "declares options",
        &[],
        Arc::new(Declares { descriptors }),
    ));
    commander
}

fn argv(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| t.to_string()).collect()
}

#[test]
fn flag_wins_over_every_other_layer() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("config.toml");
    fs::write(&config_path, "stack-probe-a = \"file-sentinel\"\n").unwrap();
    let env_path = temp.path().join("probe.env");
    fs::write(&env_path, "STACK_PROBE_A=envfile-sentinel\n").unwrap();
    std::env::set_var("STACK_PROBE_A", "env-sentinel");

    let commander = commander_declaring(vec![OptionDescriptor::string(
        "stack-probe-a",
        "default-sentinel",
        "",
    )]);
    let resolved = commander
        .resolve_config(argv(&[
            "--stack-probe-a=flag-sentinel",
            "--config",
            config_path.to_str().unwrap(),
            "--env-file",
            env_path.to_str().unwrap(),
        ]))
        .unwrap();

    assert_eq!(resolved.str("stack-probe-a").unwrap(), "flag-sentinel");
    assert_eq!(resolved.provenance("stack-probe-a"), Some(Provenance::Flag));
    std::env::remove_var("STACK_PROBE_A");
}

#[test]
fn env_wins_when_no_flag_is_supplied() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("config.toml");
    fs::write(&config_path, "stack-probe-b = \"file-sentinel\"\n").unwrap();
    std::env::set_var("STACK_PROBE_B", "env-sentinel");

    let commander = commander_declaring(vec![OptionDescriptor::string(
        "stack-probe-b",
        "default-sentinel",
        "",
    )]);
    let resolved = commander
        .resolve_config(argv(&["--config", config_path.to_str().unwrap()]))
        .unwrap();

    assert_eq!(resolved.str("stack-probe-b").unwrap(), "env-sentinel");
    assert_eq!(resolved.provenance("stack-probe-b"), Some(Provenance::Env));
    std::env::remove_var("STACK_PROBE_B");
}

#[test]
fn config_file_wins_over_env_file_and_default() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("config.toml");
    fs::write(&config_path, "stack-probe-c = \"file-sentinel\"\n").unwrap();
    let env_path = temp.path().join("probe.env");
    fs::write(&env_path, "STACK_PROBE_C=envfile-sentinel\n").unwrap();

    let commander = commander_declaring(vec![OptionDescriptor::string(
        "stack-probe-c",
        "default-sentinel",
        "",
    )]);
    let resolved = commander
        .resolve_config(argv(&[
            "--config",
            config_path.to_str().unwrap(),
            "--env-file",
            env_path.to_str().unwrap(),
        ]))
        .unwrap();

    assert_eq!(resolved.str("stack-probe-c").unwrap(), "file-sentinel");
    assert_eq!(
        resolved.provenance("stack-probe-c"),
        Some(Provenance::ConfigFile)
    );
}

#[test]
fn env_file_wins_over_default() {
    let temp = TempDir::new().unwrap();
    let env_path = temp.path().join("probe.env");
    fs::write(&env_path, "STACK_PROBE_D=envfile-sentinel\n").unwrap();

    let commander = commander_declaring(vec![OptionDescriptor::string(
        "stack-probe-d",
        "default-sentinel",
        "",
    )]);
    let resolved = commander
        .resolve_config(argv(&["--env-file", env_path.to_str().unwrap()]))
        .unwrap();

    assert_eq!(resolved.str("stack-probe-d").unwrap(), "envfile-sentinel");
    assert_eq!(
        resolved.provenance("stack-probe-d"),
        Some(Provenance::EnvFile)
    );
}

#[test]
fn declared_default_applies_when_no_source_supplies_a_value() {
    let commander = commander_declaring(vec![
        OptionDescriptor::string("stack-probe-e", "default-sentinel", ""),
        OptionDescriptor::int("stack-probe-workers", 4, ""),
    ]);
    let resolved = commander.resolve_config(Vec::new()).unwrap();

    assert_eq!(resolved.str("stack-probe-e").unwrap(), "default-sentinel");
    assert_eq!(
        resolved.provenance("stack-probe-e"),
        Some(Provenance::Default)
    );
    assert_eq!(resolved.int("stack-probe-workers").unwrap(), 4);
}

#[test]
fn builtin_options_resolve_to_their_defaults() {
    let commander = commander_declaring(Vec::new());
    let resolved = commander.resolve_config(Vec::new()).unwrap();

    assert_eq!(resolved.str("log-level").unwrap(), "info");
    assert_eq!(resolved.str("pprof-address").unwrap(), "0.0.0.0:9191");
    assert!(!resolved.bool("enable-pprof").unwrap());
    assert_eq!(resolved.provenance("log-level"), Some(Provenance::Default));
    // `config` has no default; it resolves to the string zero value.
    assert_eq!(resolved.str("config").unwrap(), "");
    assert_eq!(resolved.provenance("config"), Some(Provenance::Zero));
}

#[test]
fn env_file_can_supply_the_config_path() {
    // The config path is itself an option, so a CONFIG entry in the env
    // file must be honored before the config layer is loaded.
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("config.toml");
    fs::write(&config_path, "stack-probe-f = \"file-sentinel\"\n").unwrap();
    let env_path = temp.path().join("probe.env");
    fs::write(
        &env_path,
        format!("CONFIG={}\n", config_path.to_str().unwrap()),
    )
    .unwrap();

    let commander = commander_declaring(vec![OptionDescriptor::string(
        "stack-probe-f",
        "default-sentinel",
        "",
    )]);
    let resolved = commander
        .resolve_config(argv(&["--env-file", env_path.to_str().unwrap()]))
        .unwrap();

    assert_eq!(resolved.provenance("config"), Some(Provenance::EnvFile));
    assert_eq!(resolved.str("stack-probe-f").unwrap(), "file-sentinel");
    assert_eq!(
        resolved.provenance("stack-probe-f"),
        Some(Provenance::ConfigFile)
    );
}

#[test]
fn explicit_config_path_that_cannot_be_read_is_fatal() {
    let commander = commander_declaring(Vec::new());
    let err = commander
        .resolve_config(argv(&["--config", "/nonexistent/config.toml"]))
        .unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn subcommand_option_resolves_through_the_full_chain() {
    // A named subcommand's own option goes through the same layers as the
    // built-ins.
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("config.toml");
    fs::write(&config_path, "stack-probe-g = 8\n").unwrap();

    let mut commander = Commander::new("test-app", "v0.0.1", "");
    commander.register(
        "work",
        SubcommandInfo::new(
            "does work",
            &[],
            Arc::new(Declares {
                descriptors: vec![OptionDescriptor::int("stack-probe-g", 4, "")],
            }),
        ),
    );

    let resolved = commander
        .resolve_config(argv(&["work", "--config", config_path.to_str().unwrap()]))
        .unwrap();
    assert_eq!(resolved.int("stack-probe-g").unwrap(), 8);
    assert_eq!(
        resolved.provenance("stack-probe-g"),
        Some(Provenance::ConfigFile)
    );
}
