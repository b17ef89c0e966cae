//! Data the engine works on.
//!
//! - [`schema`] - Field tree parsed from schema JSON
//! - [`item`] - Empty values and value checks for leaf kinds
//! - [`document`] - The edited document with debounced commits
//! - [`session`] - One editing session over a document

/// Field tree model and schema JSON parsing.
pub mod schema;

/// Leaf value rules.
pub mod item;

/// Document store.
pub mod document;

/// Edit session tying schema, store, navigation and persistence together.
pub mod session;

pub use document::DocumentStore;
pub use schema::{FieldNode, FieldSchema};
pub use session::EditSession;
