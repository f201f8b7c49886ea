#![allow(dead_code)]

pub use hpcexec_test_utils::builders;
pub use hpcexec_test_utils::{init_tracing, with_timeout};

/// An ambient environment holding only `PATH`, as the tests' snapshot source.
pub fn path_only() -> Vec<(String, String)> {
    vec![("PATH".to_string(), "/usr/bin:/bin".to_string())]
}
