use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::{
    address::Address,
    data::{
        document::{Change, ChangeObserver, DocumentStore, SubscriptionId},
        schema::FieldSchema,
    },
    engine::{
        group::GroupController,
        lint::lint_schema,
        nest::{NestNavigator, Scope},
        registry::FieldRegistry,
        walk::{BindingContent, Resolution, ResolvedBinding, Resolver},
    },
    error::{FieldError, Result},
    persist::Persistence,
};

/// Knobs for one edit session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// How long a leaf edit waits for a newer edit to the same address
    /// before it is committed.
    pub debounce: Duration,
    /// Save after debounced writes are committed.
    pub autosave: bool,
    /// Refuse schemas with lint findings.
    pub strict_schema: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            debounce: Duration::from_millis(500),
            autosave: true,
            strict_schema: false,
        }
    }
}

/// One document being edited against one schema.
///
/// The session is the single writer of its document: every leaf edit,
/// structural edit and save goes through it.
pub struct EditSession<P> {
    persistence: P,
    document_id: String,
    schema: FieldSchema,
    registry: FieldRegistry,
    store: DocumentStore,
    navigator: NestNavigator,
    options: SessionOptions,
    saved_revision: u64,
}

impl<P: Persistence> EditSession<P> {
    /// Load the schema and the document, then check the schema.
    pub async fn open(
        persistence: P,
        document_id: &str,
        schema_id: &str,
        options: SessionOptions,
    ) -> Result<Self> {
        let schema = persistence
            .load_schema(schema_id)
            .await
            .map_err(|e| FieldError::persistence(schema_id, e))?;
        let document = persistence
            .load_document(document_id)
            .await
            .map_err(|e| FieldError::persistence(document_id, e))?;
        Self::from_parts(
            persistence,
            document_id,
            schema,
            document,
            FieldRegistry::with_builtins(),
            options,
        )
    }

    /// Build a session from already loaded parts.
    pub fn from_parts(
        persistence: P,
        document_id: &str,
        schema: FieldSchema,
        document: Value,
        registry: FieldRegistry,
        options: SessionOptions,
    ) -> Result<Self> {
        let issues = lint_schema(&schema, &registry);
        for issue in &issues {
            warn!("schema: {issue}");
        }
        if options.strict_schema
            && let Some(issue) = issues.first()
        {
            return Err(FieldError::InvalidSchema {
                path: format!("{:?}", issue.schema_path.steps()),
                reason: issue.to_string(),
            });
        }

        debug!("opened {document_id} with {} top-level fields", schema.fields.len());
        Ok(EditSession {
            persistence,
            document_id: document_id.to_string(),
            schema,
            registry,
            store: DocumentStore::new(document),
            navigator: NestNavigator::new(),
            options,
            saved_revision: 0,
        })
    }

    /// Id the document is loaded from and saved to.
    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Storage collaborator.
    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    /// Underlying store, for inspecting committed state.
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// The document including edits still inside their debounce window.
    pub fn document(&self) -> &Value {
        self.store.working()
    }

    /// Working value at `address`.
    pub fn get(&self, address: &Address) -> Option<&Value> {
        self.store.get(address)
    }

    /// Listen for committed changes at or around `address`.
    pub fn subscribe(
        &mut self,
        address: Address,
        listener: impl FnMut(&Change) + Send + 'static,
    ) -> SubscriptionId {
        self.store.subscribe(address, listener)
    }

    /// Register a [`ChangeObserver`] for `address`.
    pub fn observe(
        &mut self,
        address: Address,
        observer: impl ChangeObserver + 'static,
    ) -> SubscriptionId {
        self.store.observe(address, observer)
    }

    /// Drop a listener or observer.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    /// Scope currently being edited.
    pub fn scope(&self) -> Scope {
        self.navigator.current()
    }

    /// Scopes from the root down to the current one.
    pub fn breadcrumbs(&self) -> Vec<Address> {
        self.navigator.breadcrumbs()
    }

    /// Fields of the current scope bound to the current document.
    pub fn bindings(&self) -> Result<Resolution<'_>> {
        Resolver::new(&self.schema, &self.registry)
            .resolve(self.store.working(), &self.navigator.current())
    }

    /// Every field of the document, nests included.
    pub fn resolve_all(&self) -> Resolution<'_> {
        Resolver::new(&self.schema, &self.registry).resolve_all(self.store.working())
    }

    /// Debounced leaf edit stamped with the current time.
    pub fn edit(&mut self, address: &Address, value: Value) -> Result<()> {
        self.edit_at(address, value, Instant::now())
    }

    /// Debounced leaf edit stamped with `now`.
    pub fn edit_at(&mut self, address: &Address, value: Value, now: Instant) -> Result<()> {
        self.check_edit(address, &value)?;
        self.store
            .set_debounced(address, value, self.options.debounce, now)
    }

    /// Leaf edit committed right away.
    pub fn edit_now(&mut self, address: &Address, value: Value) -> Result<()> {
        self.check_edit(address, &value)?;
        self.store.set(address, value)
    }

    fn check_edit(&self, address: &Address, value: &Value) -> Result<()> {
        let resolution = self.resolve_all();
        let Some(binding) = resolution.find(address) else {
            return Err(FieldError::resolution(address, "no field is bound here"));
        };
        check_binding(&self.registry, binding, value)
    }

    /// Structural controller for the list field at `address`.
    ///
    /// Pending edits beneath the list are committed before any structural
    /// change is applied.
    pub fn list(&mut self, address: &Address) -> Result<GroupController<'_>> {
        let resolver = Resolver::new(&self.schema, &self.registry);
        let node = {
            let resolution = resolver.resolve_all(self.store.working());
            match resolution.find(address) {
                Some(binding) => binding.node,
                None => return Err(FieldError::resolution(address, "no field is bound here")),
            }
        };
        GroupController::new(
            &mut self.store,
            &self.schema,
            &self.registry,
            node,
            address.clone(),
        )
    }

    /// Enter the `nest` bound at `address` in the current scope, including
    /// one inside a list item.
    pub fn enter(&mut self, address: &Address) -> Result<Scope> {
        let resolution = Resolver::new(&self.schema, &self.registry)
            .resolve(self.store.working(), &self.navigator.current())?;
        let Some(binding) = resolution.find(address) else {
            return Err(FieldError::resolution(
                address,
                "not visible in the current scope",
            ));
        };
        self.navigator.enter(binding)
    }

    /// Leave the current scope. Returns the scope now being edited, or
    /// `None` when already at the root.
    pub fn back(&mut self) -> Option<Scope> {
        self.navigator.back()
    }

    /// Whether anything changed since the last successful save.
    pub fn needs_save(&self) -> bool {
        self.store.revision() != self.saved_revision || self.store.has_pending()
    }

    /// Commit every pending edit and save the document.
    ///
    /// On failure the in-memory document is kept and
    /// [`needs_save`](Self::needs_save) stays set.
    pub async fn save(&mut self) -> Result<()> {
        let flushed = self.store.flush();
        if flushed > 0 {
            debug!("flushed {flushed} pending writes before save");
        }
        self.persist_committed().await
    }

    /// Commit debounced edits that are due at `now`, then autosave if
    /// enabled and something was committed. Returns how many edits were
    /// committed.
    pub async fn sync(&mut self, now: Instant) -> Result<usize> {
        let committed = self.store.commit_due(now);
        if committed > 0 && self.options.autosave {
            self.persist_committed().await?;
        }
        Ok(committed)
    }

    /// Wait until every pending edit is committed, then autosave if enabled.
    pub async fn settle(&mut self) -> Result<()> {
        while let Some(deadline) = self.store.next_deadline() {
            tokio::time::sleep_until(deadline).await;
            self.store.commit_due(Instant::now());
        }
        if self.options.autosave && self.needs_save() {
            self.persist_committed().await?;
        }
        Ok(())
    }

    async fn persist_committed(&mut self) -> Result<()> {
        let revision = self.store.revision();
        let snapshot = self.store.committed().clone();
        if let Err(e) = self
            .persistence
            .save_document_as(&self.document_id, &snapshot, &self.schema)
            .await
        {
            warn!("save of {} failed: {e:#}", self.document_id);
            return Err(FieldError::persistence(&self.document_id, e));
        }
        self.saved_revision = revision;
        info!("saved {} at revision {revision}", self.document_id);
        Ok(())
    }
}

fn check_binding(registry: &FieldRegistry, binding: &ResolvedBinding<'_>, value: &Value) -> Result<()> {
    match &binding.content {
        BindingContent::Leaf => {
            let behavior = registry.lookup(binding.node, &binding.address)?;
            (behavior.check)(binding.node, value, &binding.address)
        }
        BindingContent::List(_) => match value {
            Value::Array(_) | Value::Null => Ok(()),
            other => Err(FieldError::mismatch(&binding.address, "a list", other)),
        },
        BindingContent::Group(_) | BindingContent::Navigation { .. } => Err(FieldError::mismatch(
            &binding.address,
            "a value field",
            format!("`{}` field", binding.node.tag()),
        )),
    }
}
