//! The field-tree engine.
//!
//! [`registry`] says what each tag is, [`resolve`] turns parent → child edges
//! into addresses, [`walk`] resolves a whole scope against a document,
//! [`group`] edits repeating groups and [`nest`] tracks drill-in scopes.
//! [`lint`] checks schemas for overlapping addresses.

/// List add, delete and swap.
pub mod group;
/// Schema checks.
pub mod lint;
/// Drill-in scopes.
pub mod nest;
/// Tag to behavior table.
pub mod registry;
/// Parent to child address rules.
pub mod resolve;
/// Schema against document resolution.
pub mod walk;
