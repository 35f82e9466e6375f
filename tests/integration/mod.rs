//! Integration test suite for release-vector
//!
//! These tests drive the compiled binary against release vectors stored as
//! local files and addressed through file:// URLs.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **resolve**: The `resolve` command, nesting, precedence and the cache
//! - **releases**: The `releases` command
//! - **roles**: Role installation from git repositories
//! - **cache_command**: The `cache` subcommands

#[path = "../common/mod.rs"]
mod common;

mod cache_command;
mod releases;
mod resolve;
mod roles;
