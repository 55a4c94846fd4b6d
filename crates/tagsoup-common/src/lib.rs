//! # Tagsoup Common
//!
//! Logging configuration shared by the tagsoup tokenizer, tree and parser
//! crates.
//!
//! The engine itself only emits `tracing` events; embedding applications
//! and test suites use [`init_logging`] to install a subscriber that
//! renders them.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Target prefix used by every tagsoup crate, handy for filter strings
/// such as `tagsoup_parser=trace`.
pub const LOG_TARGET_PREFIX: &str = "tagsoup";

/// Build a filter directive enabling `level` for all tagsoup crates.
pub fn crate_filter(level: &str) -> String {
    [
        "tagsoup_grammar",
        "tagsoup_tree",
        "tagsoup_parser",
    ]
    .iter()
    .map(|krate| format!("{krate}={level}"))
    .collect::<Vec<_>>()
    .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_filter() {
        let filter = crate_filter("debug");
        assert_eq!(
            filter,
            "tagsoup_grammar=debug,tagsoup_tree=debug,tagsoup_parser=debug"
        );
        assert!(filter.starts_with(LOG_TARGET_PREFIX));
    }
}
