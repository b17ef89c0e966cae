//! # fieldtree-cli
//!
//! Command-line front end for the `fieldtree` engine: loads a schema and a
//! document from disk, shows the resolved field tree, applies edits and
//! writes the document back.
//!
//! ## Modules
//!
//! - [`cli`] - Argument definitions
//! - [`config`] - `.fieldtree.toml` editor settings
//! - [`ctx`] - Resolved paths and settings for one invocation
//! - [`commands`] - Command handlers

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

pub mod cli;

/// Editor settings loaded from TOML.
pub mod config;

/// Invocation context.
pub mod ctx;

pub mod commands;

pub use cli::Cli;
