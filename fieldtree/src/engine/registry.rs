//! Tag → behavior lookup table.
//!
//! The walk never matches on concrete field kinds; it asks the registry what
//! a tag is (its [`Arity`]), how it groups its children, whether it opens a
//! drill-in view, what an empty value looks like and how leaf values are
//! checked. Registering a new tag is all it takes to support a new field
//! type.

use std::collections::HashMap;

use serde_json::Value;

use crate::{
    address::Address,
    data::{
        item::{check_leaf_value, empty_leaf_value},
        schema::FieldNode,
    },
    engine::resolve::Grouping,
    error::{FieldError, Result},
};

/// How many children a field has and where they come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No children.
    Leaf,
    /// A static `fields` list.
    FixedComposite,
    /// N runtime instances of one item template.
    HomogeneousList,
}

/// Behavior bound to a tag.
#[derive(Debug, Clone, Copy)]
pub struct FieldBehavior {
    /// Leaf, composite or list.
    pub arity: Arity,
    /// Whether the walk produces a navigation target instead of children.
    pub navigable: bool,
    /// How children are addressed.
    pub grouping: fn(&FieldNode) -> Grouping,
    /// Value for a new field without a default.
    pub empty_value: fn(&FieldNode) -> Value,
    /// Leaf value check.
    pub check: fn(&FieldNode, &Value, &Address) -> Result<()>,
}

fn no_check(_: &FieldNode, _: &Value, _: &Address) -> Result<()> {
    Ok(())
}

fn empty_mapping(_: &FieldNode) -> Value {
    Value::Object(Default::default())
}

fn empty_list(_: &FieldNode) -> Value {
    Value::Array(Vec::new())
}

impl FieldBehavior {
    /// Leaf behavior with the builtin checks.
    pub fn leaf() -> Self {
        FieldBehavior {
            arity: Arity::Leaf,
            navigable: false,
            grouping: Grouping::of,
            empty_value: empty_leaf_value,
            check: check_leaf_value,
        }
    }

    /// Fixed composite grouping its children.
    pub fn composite() -> Self {
        FieldBehavior {
            arity: Arity::FixedComposite,
            navigable: false,
            grouping: Grouping::of,
            empty_value: empty_mapping,
            check: no_check,
        }
    }

    /// Homogeneous list.
    pub fn list() -> Self {
        FieldBehavior {
            arity: Arity::HomogeneousList,
            navigable: false,
            grouping: |_| Grouping::Indexed,
            empty_value: empty_list,
            check: no_check,
        }
    }

    /// Make the field a drill-in target.
    pub fn navigable(mut self) -> Self {
        self.navigable = true;
        self
    }

    /// Replace the grouping rule.
    pub fn with_grouping(mut self, grouping: fn(&FieldNode) -> Grouping) -> Self {
        self.grouping = grouping;
        self
    }

    /// Replace the empty value.
    pub fn with_empty_value(mut self, empty_value: fn(&FieldNode) -> Value) -> Self {
        self.empty_value = empty_value;
        self
    }

    /// Replace the leaf check.
    pub fn with_check(mut self, check: fn(&FieldNode, &Value, &Address) -> Result<()>) -> Self {
        self.check = check;
        self
    }
}

/// Registry of field behaviors keyed by tag.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    behaviors: HashMap<String, FieldBehavior>,
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FieldRegistry {
    /// A registry that knows no tags at all.
    pub fn empty() -> Self {
        FieldRegistry {
            behaviors: HashMap::new(),
        }
    }

    /// A registry with every built-in field type.
    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        for tag in ["string", "number", "boolean", "date", "select"] {
            reg.register(tag, FieldBehavior::leaf());
        }
        reg.register("section", FieldBehavior::composite());
        reg.register("pull", FieldBehavior::composite());
        reg.register("nest", FieldBehavior::composite().navigable());
        for tag in ["accordion", "leaf-array", "bundle-manager"] {
            reg.register(tag, FieldBehavior::list());
        }
        reg
    }

    /// Bind `tag` to `behavior`, returning the previous binding.
    pub fn register(&mut self, tag: &str, behavior: FieldBehavior) -> Option<FieldBehavior> {
        self.behaviors.insert(tag.to_string(), behavior)
    }

    /// Remove `tag`, returning its behavior.
    pub fn unregister(&mut self, tag: &str) -> Option<FieldBehavior> {
        self.behaviors.remove(tag)
    }

    /// Whether `tag` is registered.
    pub fn contains(&self, tag: &str) -> bool {
        self.behaviors.contains_key(tag)
    }

    /// Behavior for `tag`.
    pub fn get(&self, tag: &str) -> Option<&FieldBehavior> {
        self.behaviors.get(tag)
    }

    /// Behavior for `node`, failing closed for unknown tags.
    pub fn lookup(&self, node: &FieldNode, address: &Address) -> Result<&FieldBehavior> {
        self.behaviors
            .get(node.tag())
            .ok_or_else(|| FieldError::UnknownFieldType {
                tag: node.tag().to_string(),
                address: address.clone(),
            })
    }

    /// Registered tags, in no particular order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.behaviors.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_arity() {
        let reg = FieldRegistry::with_builtins();
        let at = Address::root();
        let arity = |node: FieldNode| reg.lookup(&node, &at).unwrap().arity;
        assert_eq!(arity(FieldNode::string("a")), Arity::Leaf);
        assert_eq!(arity(FieldNode::select("a", &["x"])), Arity::Leaf);
        assert_eq!(arity(FieldNode::section("a", true, vec![])), Arity::FixedComposite);
        assert_eq!(arity(FieldNode::pull("a", None, vec![])), Arity::FixedComposite);
        assert_eq!(arity(FieldNode::accordion("a", vec![])), Arity::HomogeneousList);
        assert_eq!(
            arity(FieldNode::leaf_array("a", FieldNode::string(""))),
            Arity::HomogeneousList
        );
        assert!(reg.get("nest").unwrap().navigable);
        assert!(!reg.get("section").unwrap().navigable);
    }

    #[test]
    fn test_unknown_tag_fails_closed() {
        let reg = FieldRegistry::with_builtins();
        let err = reg
            .lookup(&FieldNode::custom("body", "markdown"), &crate::addr!["body"])
            .unwrap_err();
        assert!(matches!(err, FieldError::UnknownFieldType { ref tag, .. } if tag == "markdown"));
    }

    #[test]
    fn test_register_custom_tag() {
        let mut reg = FieldRegistry::with_builtins();
        assert!(reg.register("markdown", FieldBehavior::leaf()).is_none());
        let node = FieldNode::custom("body", "markdown");
        let behavior = reg.lookup(&node, &Address::root()).unwrap();
        assert_eq!(behavior.arity, Arity::Leaf);
        assert!(reg.unregister("markdown").is_some());
        assert!(!reg.contains("markdown"));
    }
}
