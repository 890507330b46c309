//! CLI argument definitions for d2item
//!
//! This module contains all clap-derived structs and enums for CLI parsing.

mod core;
mod edit;

pub use core::{Cli, Commands, InputArgs};
pub use edit::EditOp;
