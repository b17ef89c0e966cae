//! # fieldtree
//!
//! A recursive, schema-driven form engine over nested JSON documents.
//!
//! A [`FieldSchema`] is a tree of typed field nodes. The engine walks that
//! tree against a document, computes the document [`Address`] every field
//! reads and writes, and lets callers edit leaves, grow and shrink repeating
//! groups, and drill into nested scopes. Rendering is left to the caller.
//!
//! ## Features
//!
//! - Field types resolved through a [`FieldRegistry`], so new tags can be
//!   registered without touching the walk
//! - Grouped, flattened (`section` with `groupdata: false`) and relocated
//!   (`pull`) addressing
//! - Repeating groups (`accordion`, `leaf-array`, `bundle-manager`) with
//!   atomic add, delete and adjacent swap
//! - Debounced writes with change notification on commit only
//! - Async persistence behind the [`Persistence`] trait, with a JSON/TOML
//!   file implementation that keeps timestamped backups
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fieldtree::{EditSession, FilePersistence, SessionOptions, addr};
//!
//! # async fn demo() -> fieldtree::Result<()> {
//! let mut session = EditSession::open(
//!     FilePersistence::new(),
//!     "post.json",
//!     "post-schema.json",
//!     SessionOptions::default(),
//! )
//! .await?;
//!
//! session.edit_now(&addr!["title"], "Hello".into())?;
//! session.list(&addr!["gallery"])?.add()?;
//! session.save().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`address`] - Document addresses and their string form
//! - [`data`] - Schema model, document store and the edit session
//! - [`engine`] - Registry, address resolution, the walk and structural edits
//! - [`persist`] - Persistence collaborator and its file implementation
//! - [`run`] - One-shot batch runner over a document

#[macro_use]
extern crate log;

/// Document addresses.
pub mod address;

/// Schema model, document store and edit session.
///
/// This module holds the data the engine works on: the parsed field tree,
/// leaf value rules and the document with its debounced commit log.
pub mod data;

/// Registry, address resolution, the walk and structural edits.
pub mod engine;

/// Engine error type.
pub mod error;

/// Loading and saving documents and schemas.
pub mod persist;

/// Batch runner.
pub mod run;

pub use address::{Address, Segment};
pub use data::{
    document::{Change, ChangeObserver, DocumentStore, StructuralKind, SubscriptionId},
    schema::{FieldKind, FieldNode, FieldSchema, ItemTemplate, SchemaPath, SelectOption},
    session::{EditSession, SessionOptions},
};
pub use engine::{
    group::GroupController,
    lint::{IssueKind, SchemaIssue, lint_schema},
    nest::{NestNavigator, Scope},
    registry::{Arity, FieldBehavior, FieldRegistry},
    resolve::{Grouping, resolve_child_address},
    walk::{BindingContent, Problem, Resolution, ResolvedBinding, Resolver, ValueOrigin},
};
pub use error::{FieldError, Result};
pub use persist::{FilePersistence, MemoryPersistence, Persistence};
pub use run::*;
pub use serde_json::Value;
