// tests/exec_config.rs

mod common;
use crate::common::path_only;

use std::path::Path;
use std::time::Duration;

use hpcexec::errors::HpcExecError;
use hpcexec::exec::{ExecConfig, ExecDefaults};
use hpcexec::hosts::Hostfile;
use hpcexec::types::ExecMode;

fn ambient(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn default_node_set_is_localhost() {
    let config = ExecConfig::builder().build_with_ambient(path_only()).unwrap();

    assert_eq!(config.mode(), ExecMode::Local);
    assert_eq!(config.hostfile().hosts(), ["localhost".to_string()]);
    assert!(config.hostfile().is_local());
    assert!(config.sudoenv());
    assert!(!config.exec_async());
}

#[test]
fn hosts_and_hostfile_together_is_a_config_error() {
    let result = ExecConfig::builder()
        .hosts(vec!["n1", "n2"])
        .hostfile("/tmp/does-not-matter")
        .build_with_ambient(path_only());

    match result {
        Err(HpcExecError::ConfigError(msg)) => assert!(msg.contains("hosts or hostfile")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn allow_listed_variables_are_adopted_unless_overridden() {
    let config = ExecConfig::builder()
        .env_var("PATH", "/opt/bin")
        .env_var("MY_FLAG", "1")
        .build_with_ambient(ambient(&[
            ("PATH", "/usr/bin"),
            ("JAVA_HOME", "/opt/java"),
            ("HOME", "/home/me"),
        ]))
        .unwrap();

    let env = config.env();
    assert_eq!(env.get("PATH").map(String::as_str), Some("/opt/bin"));
    assert_eq!(env.get("JAVA_HOME").map(String::as_str), Some("/opt/java"));
    assert_eq!(env.get("MY_FLAG").map(String::as_str), Some("1"));
    assert!(!env.contains_key("HOME"), "HOME is not on the allow-list");
    assert_eq!(config.forwarded_env(), config.env());
}

#[test]
fn forwarded_env_never_contains_ld_preload() {
    let config = ExecConfig::builder()
        .env_var("LD_PRELOAD", "/lib/libhook.so")
        .build_with_ambient(ambient(&[("LD_PRELOAD", "/lib/ambient.so")]))
        .unwrap();

    assert_eq!(
        config.env().get("LD_PRELOAD").map(String::as_str),
        Some("/lib/libhook.so")
    );
    assert!(!config.forwarded_env().contains_key("LD_PRELOAD"));
}

#[test]
fn ambient_ld_preload_is_never_adopted() {
    let config = ExecConfig::builder()
        .build_with_ambient(ambient(&[("LD_PRELOAD", "/lib/ambient.so")]))
        .unwrap();
    assert!(!config.env().contains_key("LD_PRELOAD"));
}

#[test]
fn modify_carries_every_field_and_overrides_what_is_set() {
    let base = ExecConfig::builder()
        .mode(ExecMode::Ssh)
        .hosts("node[1-3]")
        .user("alice")
        .port(2222)
        .cwd("/work")
        .timeout(Duration::from_secs(5))
        .build_with_ambient(path_only())
        .unwrap();

    let derived = base.modify().port(22).exec_async(true).build().unwrap();

    assert_eq!(derived.mode(), ExecMode::Ssh);
    assert_eq!(derived.hostfile().hosts(), base.hostfile().hosts());
    assert_eq!(derived.user(), Some("alice"));
    assert_eq!(derived.port(), Some(22));
    assert_eq!(derived.cwd(), Some(Path::new("/work")));
    assert_eq!(derived.timeout(), Some(Duration::from_secs(5)));
    assert!(derived.exec_async());

    // The original is untouched.
    assert_eq!(base.port(), Some(2222));
    assert!(!base.exec_async());
}

#[test]
fn modify_reuses_the_original_snapshot() {
    let base = ExecConfig::builder()
        .build_with_ambient(ambient(&[("PATH", "/snapshot/bin")]))
        .unwrap();

    let derived = base.modify().build().unwrap();
    assert_eq!(
        derived.forwarded_env().get("PATH").map(String::as_str),
        Some("/snapshot/bin")
    );
}

#[test]
fn replacing_overrides_on_a_derived_config_keeps_the_snapshot() {
    let base = ExecConfig::builder()
        .env_var("OLD", "1")
        .build_with_ambient(ambient(&[
            ("PATH", "/opt/bin"),
            ("LD_LIBRARY_PATH", "/opt/lib"),
        ]))
        .unwrap();

    let derived = base.modify().env([("FOO", "bar")]).build().unwrap();

    let forwarded = derived.forwarded_env();
    assert_eq!(forwarded.get("PATH").map(String::as_str), Some("/opt/bin"));
    assert_eq!(
        forwarded.get("LD_LIBRARY_PATH").map(String::as_str),
        Some("/opt/lib")
    );
    assert_eq!(forwarded.get("FOO").map(String::as_str), Some("bar"));
    assert!(!forwarded.contains_key("OLD"), "replaced overrides are dropped");
}

#[test]
fn modify_can_replace_inherited_hosts_with_a_hostfile() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts");
    std::fs::write(&path, "a1\na2\n").unwrap();

    let base = ExecConfig::builder()
        .hosts(vec!["n1", "n2"])
        .build_with_ambient(path_only())
        .unwrap();
    let derived = base.modify().hostfile(path.clone()).build().unwrap();

    assert_eq!(derived.hostfile().hosts(), ["a1".to_string(), "a2".to_string()]);
    assert_eq!(derived.hostfile().path(), Some(path.as_path()));
}

#[test]
fn host_patterns_are_expanded() {
    let config = ExecConfig::builder()
        .hosts("node[01-03]")
        .build_with_ambient(path_only())
        .unwrap();
    assert_eq!(
        config.hostfile().hosts(),
        ["node01", "node02", "node03"].map(String::from)
    );
}

#[test]
fn parsed_hostfile_is_accepted_as_hosts() {
    let hostfile = Hostfile::parse("x1\nx2\n").unwrap();
    let config = ExecConfig::builder()
        .hosts(hostfile.clone())
        .build_with_ambient(path_only())
        .unwrap();
    assert_eq!(config.hostfile(), &hostfile);
}

#[test]
fn debugging_without_a_port_is_rejected() {
    let result = ExecConfig::builder()
        .do_dbg(true)
        .build_with_ambient(path_only());
    assert!(matches!(result, Err(HpcExecError::ConfigError(_))));

    let ok = ExecConfig::builder()
        .do_dbg(true)
        .dbg_port(4000)
        .build_with_ambient(path_only());
    assert!(ok.is_ok());
}

#[test]
fn zero_process_counts_are_rejected() {
    assert!(matches!(
        ExecConfig::builder().nprocs(0).build_with_ambient(path_only()),
        Err(HpcExecError::ConfigError(_))
    ));
    assert!(matches!(
        ExecConfig::builder().ppn(0).build_with_ambient(path_only()),
        Err(HpcExecError::ConfigError(_))
    ));
}

#[test]
fn output_defaults_apply_only_to_unset_flags() {
    let defaults = ExecDefaults {
        collect_output: true,
        hide_output: true,
    };

    let from_defaults = ExecConfig::builder()
        .defaults(defaults)
        .build_with_ambient(path_only())
        .unwrap();
    assert!(from_defaults.collect_output());
    assert!(from_defaults.hide_output());

    let explicit = ExecConfig::builder()
        .defaults(defaults)
        .collect_output(false)
        .build_with_ambient(path_only())
        .unwrap();
    assert!(!explicit.collect_output());
    assert!(explicit.hide_output());
}

#[test]
fn local_config_snapshots_the_process_environment() {
    let config = ExecConfig::local();
    match std::env::var("PATH") {
        Ok(path) => assert_eq!(config.forwarded_env().get("PATH"), Some(&path)),
        Err(_) => assert!(!config.forwarded_env().contains_key("PATH")),
    }
}
