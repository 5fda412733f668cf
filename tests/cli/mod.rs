//! CLI command integration tests
//!
//! These run the `codestruct` binary and check exit codes and output
//! formats (text, toon, json) for every subcommand.

pub mod generate_tests;
pub mod query_tests;
pub mod validate_tests;
