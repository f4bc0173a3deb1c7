//! The core library of lymbo, a parallel test runner for large test suites.
//!
//! This crate implements the execution engine only: the test-plan model,
//! the grouping/parameter-expansion logic it consumes, and the concurrent
//! scheduler with its hierarchical scoped-resource lifecycle and
//! report-file synchronization protocol. The source-file parser, the CLI
//! front-end, and the terminal renderer are external collaborators; see
//! `lymbo-macros` and `lymbo-cli` for the reference implementations of
//! those roles.

pub mod broker;
pub mod collector;
pub mod controller;
pub mod convert;
pub mod error;
pub mod exec;
pub mod filter;
pub mod identity;
pub mod model;
pub mod params;
pub mod plan;
pub mod report;
pub mod scope;

/// Re-exported so `lymbo_macros::test`'s generated code can call
/// `::lymbo_core::inventory::submit!` without requiring every crate that
/// declares tests to add its own direct dependency on `inventory`.
pub use inventory;
