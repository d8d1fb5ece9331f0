//! yamltag CLI library
//!
//! This module exposes the CLI main function so the binary stays a
//! one-line wrapper.

mod cli;

pub use cli::run;
