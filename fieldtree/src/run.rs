use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    address::Address,
    data::{
        document::Change,
        session::{EditSession, SessionOptions},
    },
    error::Result,
    persist::Persistence,
};

/// One edit applied by [`run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum EditOp {
    Set { address: Address, value: Value },
    Add { address: Address },
    Delete { address: Address, index: usize },
    Swap { address: Address, from: usize, to: usize },
}

impl EditOp {
    /// Apply to `session`, committing immediately.
    pub fn apply<P: Persistence>(&self, session: &mut EditSession<P>) -> Result<()> {
        match self {
            EditOp::Set { address, value } => session.edit_now(address, value.clone()),
            EditOp::Add { address } => session.list(address)?.add().map(|_| ()),
            EditOp::Delete { address, index } => session.list(address)?.delete(*index).map(|_| ()),
            EditOp::Swap { address, from, to } => session.list(address)?.swap(*from, *to),
        }
    }
}

/// Outcome of [`run`].
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// The document as saved.
    pub document: Value,
    /// Every committed change, in order.
    pub changes: Vec<Change>,
    /// Whether the document was saved.
    pub saved: bool,
}

/// Open a session, apply `ops` in order and save if anything changed.
///
/// The first failing op aborts the run before anything is saved.
///
/// # Errors
///
/// Returns errors when loading, any op, or saving fails.
pub async fn run<P: Persistence>(
    persistence: P,
    document_id: &str,
    schema_id: &str,
    options: SessionOptions,
    ops: &[EditOp],
) -> Result<RunReport> {
    let mut session = EditSession::open(persistence, document_id, schema_id, options).await?;

    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = changes.clone();
    session.subscribe(Address::root(), move |c| {
        if let Ok(mut v) = sink.lock() {
            v.push(c.clone());
        }
    });

    for op in ops {
        debug!("apply {op:?}");
        op.apply(&mut session)?;
    }

    let saved = session.needs_save();
    if saved {
        session.save().await?;
    }

    let changes = changes
        .lock()
        .map(|mut v| std::mem::take(&mut *v))
        .unwrap_or_default();
    Ok(RunReport {
        document: session.store().committed().clone(),
        changes,
        saved,
    })
}
