#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
// Ignore the warning that the `coverage_nightly` cfg is not recognized.
#![cfg_attr(test, allow(unexpected_cfgs))]
// https://github.com/taiki-e/coverage-helper?tab=readme-ov-file#usage
#![cfg_attr(all(test, coverage_nightly), feature(coverage_attribute))]

pub mod app;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod job;
pub mod queue;
pub mod tracing;
pub mod util;
pub mod work;
pub mod worker;
