//! Structural edits on list fields (`accordion`, `leaf-array`,
//! `bundle-manager`).
//!
//! Items are positional: deleting shifts every later item down by one and
//! swapping exchanges content between two addresses. Every operation runs as
//! a single [`DocumentStore::update_list`] call, so it is validated before
//! anything is touched and no other edit can interleave with the shift.

use serde_json::Value;

use crate::{
    address::Address,
    data::{
        document::{DocumentStore, StructuralKind},
        schema::{FieldNode, FieldSchema},
    },
    engine::{
        registry::{Arity, FieldRegistry},
        resolve::item_address,
        walk::Resolver,
    },
    error::{FieldError, Result},
};

/// Controller for one list field instance bound to a document address.
pub struct GroupController<'a> {
    store: &'a mut DocumentStore,
    resolver: Resolver<'a>,
    node: &'a FieldNode,
    address: Address,
}

impl<'a> GroupController<'a> {
    /// Bind `node` at `address`. Fails if the registry does not treat
    /// `node` as a homogeneous list.
    pub fn new(
        store: &'a mut DocumentStore,
        schema: &'a FieldSchema,
        registry: &'a FieldRegistry,
        node: &'a FieldNode,
        address: Address,
    ) -> Result<Self> {
        let behavior = registry.lookup(node, &address)?;
        if behavior.arity != Arity::HomogeneousList {
            return Err(FieldError::mismatch(
                &address,
                "a list field",
                format!("`{}` field", node.tag()),
            ));
        }
        Ok(GroupController {
            store,
            resolver: Resolver::new(schema, registry),
            node,
            address,
        })
    }

    /// Address of the list itself.
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn node(&self) -> &FieldNode {
        self.node
    }

    /// Current items. A missing list reads as its declared default, or as
    /// empty when there is none.
    pub fn items(&self) -> &[Value] {
        match self.store.get(&self.address) {
            Some(Value::Array(items)) => items.as_slice(),
            None | Some(Value::Null) => match &self.node.default {
                Some(Value::Array(items)) => items.as_slice(),
                _ => &[],
            },
            _ => &[],
        }
    }

    /// Items a missing list starts from before its first structural edit.
    fn seed(&self) -> Vec<Value> {
        match self.store.get(&self.address) {
            None | Some(Value::Null) => self.items().to_vec(),
            _ => Vec::new(),
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Address of item `index`, if it exists.
    pub fn item_address(&self, index: usize) -> Result<Address> {
        let len = self.len();
        if index >= len {
            return Err(self.out_of_range(index, len));
        }
        Ok(item_address(&self.address, index))
    }

    /// Append an item built from the template defaults and return its
    /// address. Existing items keep their indices.
    pub fn add(&mut self) -> Result<Address> {
        let item = self.resolver.template_defaults(self.node);
        self.add_value(item)
    }

    /// Append `item` as-is.
    pub fn add_value(&mut self, item: Value) -> Result<Address> {
        let seed = self.seed();
        let index = self
            .store
            .update_list(&self.address, StructuralKind::Add, move |items| {
                seed_missing(items, seed);
                items.push(item);
                Ok(items.len() - 1)
            })?;
        debug!("added item {index} to {}", self.address);
        Ok(item_address(&self.address, index))
    }

    /// Remove item `index`; later items move down by one. Returns the
    /// removed value.
    pub fn delete(&mut self, index: usize) -> Result<Value> {
        let address = self.address.clone();
        let seed = self.seed();
        let removed = self
            .store
            .update_list(&self.address, StructuralKind::Delete, move |items| {
                seed_missing(items, seed);
                if index >= items.len() {
                    return Err(FieldError::StructuralIndex {
                        address,
                        index,
                        len: items.len(),
                    });
                }
                Ok(items.remove(index))
            })?;
        debug!("deleted item {index} from {}", self.address);
        Ok(removed)
    }

    /// Exchange the contents of two neighbouring items.
    pub fn swap(&mut self, from: usize, to: usize) -> Result<()> {
        if from.abs_diff(to) != 1 {
            return Err(FieldError::NonAdjacentSwap {
                address: self.address.clone(),
                from,
                to,
            });
        }
        let address = self.address.clone();
        let seed = self.seed();
        self.store
            .update_list(&self.address, StructuralKind::Swap, move |items| {
                seed_missing(items, seed);
                let len = items.len();
                let bad = from.max(to);
                if bad >= len {
                    return Err(FieldError::StructuralIndex {
                        address,
                        index: bad,
                        len,
                    });
                }
                items.swap(from, to);
                Ok(())
            })?;
        debug!("swapped items {from} and {to} of {}", self.address);
        Ok(())
    }

    /// Move item `index` one place towards the front.
    pub fn move_up(&mut self, index: usize) -> Result<()> {
        if index == 0 {
            return Err(self.out_of_range(index, self.len()));
        }
        self.swap(index - 1, index)
    }

    /// Move item `index` one place towards the back.
    pub fn move_down(&mut self, index: usize) -> Result<()> {
        let Some(next) = index.checked_add(1) else {
            return Err(self.out_of_range(index, self.len()));
        };
        self.swap(index, next)
    }

    fn out_of_range(&self, index: usize, len: usize) -> FieldError {
        FieldError::StructuralIndex {
            address: self.address.clone(),
            index,
            len,
        }
    }
}

// `update_list` hands a missing list over as empty.
fn seed_missing(items: &mut Vec<Value>, seed: Vec<Value>) {
    if items.is_empty() {
        *items = seed;
    }
}
