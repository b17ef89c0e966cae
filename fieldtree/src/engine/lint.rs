//! Static checks over a schema.
//!
//! The engine accepts every schema the parser accepts; overlapping addresses
//! simply mean the last write wins. `lint_schema` reports those overlaps so
//! callers can warn about them or, in strict mode, refuse the schema.

use std::{collections::HashMap, fmt};

use crate::{
    address::Address,
    data::schema::{FieldKind, FieldNode, FieldSchema, ItemTemplate, SchemaPath},
    engine::{
        registry::{Arity, FieldRegistry},
        resolve::{Grouping, relocation_key, resolve_with},
    },
};

/// One lint finding.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaIssue {
    /// Offending node.
    pub schema_path: SchemaPath,
    /// Address of the node, with list items shown at index 0.
    pub address: Address,
    /// What is wrong.
    pub kind: IssueKind,
}

/// Kinds of schema findings.
#[derive(Debug, Clone, PartialEq)]
pub enum IssueKind {
    /// Two direct siblings share a key.
    DuplicateKey { key: String },
    /// A pull's group equals the key of a sibling, so both sub-trees share a
    /// document location.
    GroupCollision { group: String },
    /// Two value-holding fields resolve to the same address.
    AddressCollision { other: SchemaPath },
    /// The tag has no registry entry.
    UnknownType { tag: String },
    /// The node's children cannot be addressed.
    Unresolvable { reason: String },
}

impl IssueKind {
    /// Whether the issue means two fields share storage.
    pub fn is_collision(&self) -> bool {
        matches!(
            self,
            IssueKind::DuplicateKey { .. }
                | IssueKind::GroupCollision { .. }
                | IssueKind::AddressCollision { .. }
        )
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::DuplicateKey { key } => {
                write!(f, "{}: duplicate sibling key `{key}`", self.address)
            }
            IssueKind::GroupCollision { group } => write!(
                f,
                "{}: pull group `{group}` collides with a sibling key",
                self.address
            ),
            IssueKind::AddressCollision { other } => write!(
                f,
                "{}: shared with the field at schema path {:?}",
                self.address,
                other.steps()
            ),
            IssueKind::UnknownType { tag } => {
                write!(f, "{}: unknown field type `{tag}`", self.address)
            }
            IssueKind::Unresolvable { reason } => write!(f, "{}: {reason}", self.address),
        }
    }
}

struct Linter<'a> {
    registry: &'a FieldRegistry,
    issues: Vec<SchemaIssue>,
    storage: HashMap<Address, SchemaPath>,
}

/// Check `schema` against `registry`.
pub fn lint_schema(schema: &FieldSchema, registry: &FieldRegistry) -> Vec<SchemaIssue> {
    let mut linter = Linter {
        registry,
        issues: Vec::new(),
        storage: HashMap::new(),
    };
    linter.fields(&Address::root(), None, &schema.fields, &SchemaPath::root());
    linter.issues
}

impl Linter<'_> {
    fn push(&mut self, schema_path: SchemaPath, address: Address, kind: IssueKind) {
        self.issues.push(SchemaIssue {
            schema_path,
            address,
            kind,
        });
    }

    fn fields(
        &mut self,
        parent_address: &Address,
        parent: Option<(&FieldNode, Grouping)>,
        fields: &[FieldNode],
        parent_path: &SchemaPath,
    ) {
        self.siblings(parent_address, fields, parent_path);

        for (i, child) in fields.iter().enumerate() {
            let path = parent_path.child(i);
            let address = match parent {
                Some((node, grouping)) => resolve_with(grouping, parent_address, node, child),
                None => Ok(parent_address.key(&child.key)),
            };
            let address = match address {
                Ok(a) => a,
                Err(e) => {
                    self.push(
                        path,
                        parent_address.clone(),
                        IssueKind::Unresolvable {
                            reason: e.to_string(),
                        },
                    );
                    continue;
                }
            };
            self.node(child, address, path);
        }
    }

    fn siblings(&mut self, parent_address: &Address, fields: &[FieldNode], parent_path: &SchemaPath) {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        for (i, child) in fields.iter().enumerate() {
            // A pull's own key never becomes an address segment.
            if matches!(child.kind, FieldKind::Pull { .. }) || child.key.is_empty() {
                continue;
            }
            if seen.insert(child.key.as_str(), i).is_some() {
                self.push(
                    parent_path.child(i),
                    parent_address.key(&child.key),
                    IssueKind::DuplicateKey {
                        key: child.key.clone(),
                    },
                );
            }
        }
        for (i, child) in fields.iter().enumerate() {
            let FieldKind::Pull { .. } = child.kind else {
                continue;
            };
            let here = parent_address.key(&child.key);
            if let Ok(group) = relocation_key(child, &here)
                && seen.contains_key(group)
            {
                self.push(
                    parent_path.child(i),
                    parent_address.key(group),
                    IssueKind::GroupCollision {
                        group: group.to_string(),
                    },
                );
            }
        }
    }

    fn claim(&mut self, address: &Address, path: &SchemaPath) {
        if let Some(other) = self.storage.get(address) {
            let other = other.clone();
            self.push(
                path.clone(),
                address.clone(),
                IssueKind::AddressCollision { other },
            );
        } else {
            self.storage.insert(address.clone(), path.clone());
        }
    }

    fn node(&mut self, node: &FieldNode, address: Address, path: SchemaPath) {
        let Some(behavior) = self.registry.get(node.tag()) else {
            self.push(
                path,
                address,
                IssueKind::UnknownType {
                    tag: node.tag().to_string(),
                },
            );
            return;
        };
        match behavior.arity {
            Arity::Leaf => self.claim(&address, &path),
            Arity::FixedComposite => {
                let grouping = (behavior.grouping)(node);
                self.fields(&address, Some((node, grouping)), node.child_nodes(), &path);
            }
            Arity::HomogeneousList => {
                self.claim(&address, &path);
                let item = address.index(0);
                match node.item_template() {
                    ItemTemplate::Record(fields) => self.fields(&item, None, fields, &path),
                    ItemTemplate::Scalar(field) => {
                        if self.registry.get(field.tag()).is_none() {
                            self.push(
                                path.child(0),
                                item,
                                IssueKind::UnknownType {
                                    tag: field.tag().to_string(),
                                },
                            );
                        }
                    }
                }
            }
        }
    }
}
