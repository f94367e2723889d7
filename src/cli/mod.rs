// src/cli/mod.rs
//! Command-line interface

/// clap command definitions
pub mod commands;

pub use commands::{Action, BenchOptions, Commands, InitOptions, MineOptions};
