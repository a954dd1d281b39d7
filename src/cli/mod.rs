//! CLI module for the kp tool.
//!
//! This module provides the command-line interface for importing kpack
//! dependencies and validating secret parameters.

mod commands;
mod output;

pub use commands::{Cli, Commands, ImportArgs, OutputFormat, SecretArgs, SecretCommands};
pub use output::{ConsoleReporter, OutputFormatter};
