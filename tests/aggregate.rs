// tests/aggregate.rs

use std::collections::BTreeMap;

use hpcexec::exec::Output;
use hpcexec::exec::executable::{
    Executable, first_failure, per_host_outputs, smash_list_outputs, wait_all,
};
use hpcexec_test_utils::fake_executable::FakeExecutable;

#[tokio::test]
async fn wait_all_waits_on_every_run() {
    let mut runs = vec![
        FakeExecutable::new(0, "a\n", ""),
        FakeExecutable::new(1, "b\n", "bad\n"),
    ];
    assert!(runs.iter().all(|r| r.exit_code().is_none()));

    wait_all(&mut runs).await.unwrap();

    assert!(runs.iter().all(|r| r.waits == 1));
    assert_eq!(runs[0].exit_code(), Some(0));
    assert_eq!(runs[1].exit_code(), Some(1));
}

#[test]
fn sequential_outputs_are_joined_per_stream() {
    let runs = vec![
        FakeExecutable::finished(0, "first", "e1"),
        FakeExecutable::finished(0, "second", ""),
        FakeExecutable::finished(0, "third", "e3"),
    ];

    let (stdout, stderr) = smash_list_outputs(&runs);

    assert_eq!(stdout, Output::Text("first\nsecond\nthird".to_string()));
    assert_eq!(stderr, Output::Text("e1\n\ne3".to_string()));
}

#[test]
fn per_host_outputs_are_keyed_by_host() {
    let a = FakeExecutable::finished(0, "from a\n", "");
    let b = FakeExecutable::finished(0, "from b\n", "warn b\n");

    let (stdout, stderr) = per_host_outputs([("node-a", &a), ("node-b", &b)]);

    let mut expected = BTreeMap::new();
    expected.insert("node-a".to_string(), "from a\n".to_string());
    expected.insert("node-b".to_string(), "from b\n".to_string());
    assert_eq!(stdout, Output::PerHost(expected));
    assert_eq!(stderr.for_host("node-b"), Some("warn b\n"));
    assert_eq!(stderr.for_host("node-a"), Some(""));
    assert_eq!(stderr.for_host("node-c"), None);
    assert_eq!(stdout.as_text(), None);
    assert_eq!(stdout.joined(), "from a\n\nfrom b\n");
}

#[test]
fn first_non_zero_status_wins() {
    let runs = vec![
        FakeExecutable::finished(0, "", ""),
        FakeExecutable::finished(2, "", ""),
        FakeExecutable::finished(3, "", ""),
    ];
    assert_eq!(first_failure(&runs), Some(2));
}

#[test]
fn all_successful_runs_combine_to_zero() {
    let runs = vec![
        FakeExecutable::finished(0, "", ""),
        FakeExecutable::unfinished(),
    ];
    assert_eq!(first_failure(&runs), Some(0));
}

#[test]
fn unfinished_runs_have_no_combined_status() {
    let runs = vec![FakeExecutable::unfinished(), FakeExecutable::unfinished()];
    assert_eq!(first_failure(&runs), None);
    assert!(!runs[0].failed());
}
