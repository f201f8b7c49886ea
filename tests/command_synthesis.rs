// tests/command_synthesis.rs

use std::collections::BTreeMap;

use hpcexec::exec::executable::{
    CommandList, debug_cmd, is_failure, shell_quote, smash_cmd,
};

fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn plain_commands_are_joined_with_semicolons() {
    let cmds = CommandList::from(["echo a", "echo b"]);
    assert_eq!(smash_cmd(&cmds, false, &env(&[("A", "1")]), true), "echo a;echo b");
}

#[test]
fn sudo_with_env_prefixes_every_statement_in_key_order() {
    let cmds = CommandList::from(vec!["make", "make install"]);
    let line = smash_cmd(&cmds, true, &env(&[("PATH", "/bin"), ("CPATH", "/inc")]), true);
    assert_eq!(
        line,
        "sudo -E CPATH=\"/inc\" -E PATH=\"/bin\" make;sudo -E CPATH=\"/inc\" -E PATH=\"/bin\" make install"
    );
}

#[test]
fn sudo_without_env_preservation() {
    let cmds = CommandList::from("whoami");
    assert_eq!(smash_cmd(&cmds, true, &env(&[("PATH", "/bin")]), false), "sudo whoami");
}

#[test]
fn debug_wrapper_sets_preload_explicitly() {
    assert_eq!(
        debug_cmd("./app", 2000, &env(&[])),
        "gdbserver localhost:2000 ./app"
    );
    assert_eq!(
        debug_cmd("./app", 2000, &env(&[("LD_PRELOAD", "/lib/hook.so")])),
        "gdbserver localhost:2000 env LD_PRELOAD=/lib/hook.so ./app"
    );
}

#[test]
fn shell_quote_leaves_plain_words_alone() {
    assert_eq!(shell_quote("node-01.cluster"), "node-01.cluster");
    assert_eq!(shell_quote("echo hi"), "'echo hi'");
    assert_eq!(shell_quote("it's"), "'it'\\''s'");
    assert_eq!(shell_quote(""), "''");
}

#[test]
fn failure_requires_a_present_non_zero_status() {
    assert!(!is_failure(None));
    assert!(!is_failure(Some(0)));
    assert!(is_failure(Some(1)));
    assert!(is_failure(Some(137)));
}
