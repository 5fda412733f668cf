//! Common test utilities and fixtures for codestruct integration tests
//!
//! This module provides:
//! - `TestRepo` builder for creating source trees and driving the CLI
//! - Custom assertions for validating CLI output and structure documents

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod assertions;
pub mod test_repo;

pub use assertions::*;
pub use test_repo::TestRepo;
