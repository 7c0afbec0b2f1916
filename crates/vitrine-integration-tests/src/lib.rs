//! Cross-crate integration test harness.
//!
//! The workspace root is a virtual workspace (no `[package]`), so
//! repository-root `tests/` are not discovered by Cargo. This crate exists
//! solely to host integration tests that span the builder, the
//! synchronizer, and the search consumer.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]
