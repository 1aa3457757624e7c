//! Consolidated integration tests for hcert-verify-core.
//!
//! This module structure avoids the "cargo test hang" issue that occurs
//! when multiple external test files with proptest run in parallel.
//! See: https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod support;

mod base45;
mod cli;
mod end_to_end;
mod revocation;
mod rules;
mod signature;
