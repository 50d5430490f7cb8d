//! CLI command implementations for libvirt-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `config`: Configuration file generation
//! - `test`: One-shot scrapes printed to stdout
//! - `check-requirements`: Runtime requirement validation

pub mod config;

// Re-export command functions
pub use config::command_config;
pub use test::command_test;
