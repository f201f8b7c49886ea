// tests/config_loader.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, canonical_services};

use std::io::Write;

use tempfile::NamedTempFile;

use hpcexec::config::{ConfigFile, load_and_validate, load_from_path, load_with_policy};
use hpcexec::errors::HpcExecError;
use hpcexec::types::PoolPolicy;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{text}").unwrap();
    file
}

#[test]
fn full_config_loads_in_declaration_order() {
    let file = write_config(
        r#"
[defaults]
collect_output = true

[allocation]
policy = "colocated"
partition = "compute"
exclusive = false

[[service]]
name = "client"
nodes = 16
colors = "RED:16"

[[service]]
name = "server"
nodes = 16
colors = "BLUE:16"

[[service]]
name = "app"
nodes = 16
colors = "RED:4+BLUE:4+GREEN:8"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert!(cfg.defaults.collect_output);
    assert!(!cfg.defaults.hide_output);
    assert_eq!(cfg.allocation.policy, PoolPolicy::Colocated);
    assert_eq!(cfg.allocation.partition.as_deref(), Some("compute"));
    assert!(!cfg.allocation.exclusive);

    let names: Vec<&str> = cfg.architecture.services().map(|s| s.name()).collect();
    assert_eq!(names, ["client", "server", "app"]);
    assert_eq!(cfg.architecture.num_nodes_needed(), 40);
}

#[test]
fn allocation_section_defaults_to_exclusive() {
    let file = write_config(
        r#"
[[service]]
name = "only"
nodes = 2
colors = "RED"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.allocation.policy, PoolPolicy::Exclusive);
    assert!(cfg.allocation.exclusive);
    assert_eq!(cfg.allocation.partition, None);
}

#[test]
fn config_without_services_is_rejected() {
    let file = write_config("[defaults]\nhide_output = true\n");

    match load_and_validate(file.path()) {
        Err(HpcExecError::ConfigError(msg)) => assert!(msg.contains("[[service]]")),
        other => panic!("expected ConfigError, got {other:?}"),
    }

    // The raw loader does not care.
    let raw = load_from_path(file.path()).unwrap();
    assert!(raw.defaults.hide_output);
    assert!(raw.service.is_empty());
}

#[test]
fn unknown_keys_are_toml_errors() {
    let file = write_config(
        r#"
[[service]]
name = "svc"
nodes = 1
colors = "RED"
colour = "typo"
"#,
    );
    assert!(matches!(
        load_and_validate(file.path()),
        Err(HpcExecError::TomlError(_))
    ));
}

#[test]
fn unknown_policy_is_a_toml_error() {
    let file = write_config(
        r#"
[allocation]
policy = "greedy"

[[service]]
name = "svc"
nodes = 1
colors = "RED"
"#,
    );
    assert!(matches!(
        load_and_validate(file.path()),
        Err(HpcExecError::TomlError(_))
    ));
}

#[test]
fn missing_file_error_names_the_path() {
    let err = load_and_validate("/definitely/not/here.toml").unwrap_err();
    assert!(matches!(err, HpcExecError::ConfigRead { .. }));
    assert!(err.to_string().contains("/definitely/not/here.toml"), "{err}");
}

#[test]
fn policy_override_replaces_the_configured_policy() {
    let file = write_config(
        r#"
[allocation]
policy = "exclusive"

[[service]]
name = "client"
nodes = 4
colors = "RED:4"

[[service]]
name = "app"
nodes = 2
colors = "RED:2"
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(HpcExecError::PoolOverflow { .. })
    ));

    let cfg = load_with_policy(file.path(), Some(PoolPolicy::Colocated)).unwrap();
    assert_eq!(cfg.allocation.policy, PoolPolicy::Colocated);
    assert_eq!(cfg.architecture.num_nodes_needed(), 4);
}

#[test]
fn shared_colors_overflow_under_the_default_policy() {
    let raw = canonical_services().raw();
    match ConfigFile::try_from(raw) {
        Err(HpcExecError::PoolOverflow { color, .. }) => assert_eq!(color, "RED"),
        other => panic!("expected PoolOverflow, got {other:?}"),
    }

    let cfg = canonical_services()
        .with_policy(PoolPolicy::Colocated)
        .build();
    assert_eq!(cfg.architecture.len(), 3);
}

#[test]
fn duplicate_and_malformed_services_fail_validation() {
    let dup = ConfigFileBuilder::new()
        .with_service("svc", 1, "RED")
        .with_service("svc", 1, "BLUE")
        .raw();
    assert!(matches!(
        ConfigFile::try_from(dup),
        Err(HpcExecError::DuplicateService(_))
    ));

    let bad = ConfigFileBuilder::new()
        .with_service("svc", 4, "RED:1+BLUE:1")
        .raw();
    assert!(matches!(
        ConfigFile::try_from(bad),
        Err(HpcExecError::ConfigError(_))
    ));
}

#[test]
fn node_list_larger_than_demand_is_rejected() {
    let mut raw = ConfigFileBuilder::new().with_service("svc", 2, "RED").raw();
    raw.allocation.node_list = Some("n[1-4]".to_string());

    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(HpcExecError::ConfigError(_))
    ));
}

#[test]
fn huge_node_list_is_rejected_without_expanding() {
    let mut raw = ConfigFileBuilder::new().with_service("svc", 2, "RED").raw();
    raw.allocation.node_list = Some("n[0-9999999999]".to_string());

    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(HpcExecError::ConfigError(_))
    ));
}
