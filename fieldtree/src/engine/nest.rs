//! Drill-in navigation for `nest` fields.
//!
//! Entering a nest only changes which address acts as the rendering root;
//! nothing in the document is touched, so leaving and re-entering shows the
//! same committed values.

use crate::{
    address::Address,
    data::schema::{FieldKind, FieldNode, SchemaPath},
    engine::walk::{BindingContent, ResolvedBinding},
    error::{FieldError, Result},
};

/// The current editing root: a document address plus the schema node whose
/// children are shown there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// Address acting as the editing root.
    pub address: Address,
    /// Schema node whose fields the scope shows.
    pub schema_path: SchemaPath,
}

impl Scope {
    /// The document root scope.
    pub fn root() -> Self {
        Scope::default()
    }

    /// Whether this is the document root.
    pub fn is_root(&self) -> bool {
        self.schema_path.is_root()
    }
}

/// Scope address after entering `nest` from `current`.
pub fn enter(current: &Address, nest: &FieldNode) -> Result<Address> {
    match nest.kind {
        FieldKind::Nest { .. } => Ok(current.key(&nest.key)),
        _ => Err(FieldError::NotANest {
            key: nest.key.clone(),
            tag: nest.tag().to_string(),
        }),
    }
}

/// Scope address after leaving `scope`.
pub fn exit(scope: &Address) -> Address {
    scope.drop_last()
}

/// Stack of entered scopes.
#[derive(Debug, Clone, Default)]
pub struct NestNavigator {
    stack: Vec<Scope>,
}

impl NestNavigator {
    /// Navigator at the root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope currently being edited; the root when nothing is entered.
    pub fn current(&self) -> Scope {
        self.stack.last().cloned().unwrap_or_default()
    }

    /// How many scopes have been entered.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Enter the navigation target of a resolved `nest` binding.
    pub fn enter(&mut self, binding: &ResolvedBinding<'_>) -> Result<Scope> {
        let BindingContent::Navigation { scope } = &binding.content else {
            return Err(FieldError::NotANest {
                key: binding.node.key.clone(),
                tag: binding.node.tag().to_string(),
            });
        };
        self.push(scope.clone());
        Ok(scope.clone())
    }

    /// Enter `scope` without checking it.
    pub fn push(&mut self, scope: Scope) {
        debug!("enter scope {}", scope.address);
        self.stack.push(scope);
    }

    /// Leave the current scope, returning the one now current.
    pub fn back(&mut self) -> Option<Scope> {
        let left = self.stack.pop()?;
        debug!("leave scope {}", left.address);
        Some(self.current())
    }

    /// Back to the root.
    pub fn reset(&mut self) {
        self.stack.clear();
    }

    /// Addresses from the root down to the current scope.
    pub fn breadcrumbs(&self) -> Vec<Address> {
        std::iter::once(Address::root())
            .chain(self.stack.iter().map(|s| s.address.clone()))
            .collect()
    }
}
