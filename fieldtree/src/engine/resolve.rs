//! Address arithmetic for parent → child edges of the field tree.
//!
//! Rules, in precedence order:
//!
//! 1. A `pull` parent relocates: its own key segment is replaced by its
//!    `group` (falling back to its key), so the child lands at
//!    `drop_last(parent) + [group] + [child]`.
//! 2. A `section` with `groupdata: false` is transparent: the child lands at
//!    `drop_last(parent) + [child]`.
//! 3. Everything else nests the child under the parent:
//!    `parent + [child]`.
//! 4. List items sit at `list + [index]`; record fields of an item then
//!    follow rules 1–3 relative to that indexed address.
//!
//! When a pull's group equals a sibling's key, both sub-trees address the
//! same document location and the last write wins. This is accepted here;
//! [`lint_schema`](crate::engine::lint::lint_schema) reports it.

use serde_json::Value;

use crate::{
    address::Address,
    data::schema::{FieldKind, FieldNode},
    error::{FieldError, Result},
};

/// How a composite places its children in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    /// Children under the composite's own key.
    Grouped,
    /// Children directly under the composite's parent.
    Transparent,
    /// Children under a (possibly different) group key next to the composite.
    Relocate,
    /// Children are indexed list items.
    Indexed,
}

impl Grouping {
    /// Default grouping of the built-in kinds.
    pub fn of(node: &FieldNode) -> Grouping {
        match &node.kind {
            FieldKind::Pull { .. } => Grouping::Relocate,
            FieldKind::Section {
                groupdata: false, ..
            } => Grouping::Transparent,
            FieldKind::Accordion { .. }
            | FieldKind::LeafArray { .. }
            | FieldKind::BundleManager { .. } => Grouping::Indexed,
            _ => Grouping::Grouped,
        }
    }
}

/// Key that replaces a relocating parent's own segment.
pub fn relocation_key<'n>(parent: &'n FieldNode, parent_address: &Address) -> Result<&'n str> {
    let group = match &parent.kind {
        FieldKind::Pull { group, .. } => group.as_deref(),
        FieldKind::Custom { attrs, .. } => attrs.get("group").and_then(Value::as_str),
        _ => None,
    };
    match group {
        Some("") => Err(FieldError::resolution(
            parent_address,
            format!("`{}` has an empty group", parent.key),
        )),
        Some(group) => Ok(group),
        None if parent.key.is_empty() => Err(FieldError::resolution(
            parent_address,
            "relocating field has neither a group nor a key",
        )),
        None => Ok(&parent.key),
    }
}

/// Resolve `child`'s address under `parent` using the built-in grouping of
/// `parent`.
pub fn resolve_child_address(
    parent_address: &Address,
    parent: &FieldNode,
    child: &FieldNode,
) -> Result<Address> {
    resolve_with(Grouping::of(parent), parent_address, parent, child)
}

/// Resolve `child`'s address under `parent` with an explicit grouping, as
/// supplied by the registry.
pub fn resolve_with(
    grouping: Grouping,
    parent_address: &Address,
    parent: &FieldNode,
    child: &FieldNode,
) -> Result<Address> {
    if child.key.is_empty() {
        return Err(FieldError::resolution(
            parent_address,
            format!("child of `{}` has an empty key", parent.key),
        ));
    }
    match grouping {
        Grouping::Relocate => {
            let group = relocation_key(parent, parent_address)?;
            Ok(parent_address.drop_last().key(group).key(&child.key))
        }
        Grouping::Transparent => Ok(parent_address.drop_last().key(&child.key)),
        Grouping::Grouped | Grouping::Indexed => Ok(parent_address.key(&child.key)),
    }
}

/// Address of the `index`-th item of the list at `list_address`.
pub fn item_address(list_address: &Address, index: usize) -> Address {
    list_address.index(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr;

    #[test]
    fn test_grouped_section_nests_children() {
        let section = FieldNode::section("meta", true, vec![]);
        let child = FieldNode::string("title");
        let a = resolve_child_address(&addr!["meta"], &section, &child).unwrap();
        assert_eq!(a, addr!["meta", "title"]);
    }

    #[test]
    fn test_flat_section_is_transparent() {
        let section = FieldNode::section("meta", false, vec![]);
        let child = FieldNode::string("title");
        let a = resolve_child_address(&addr!["meta"], &section, &child).unwrap();
        assert_eq!(a, addr!["title"]);

        let deep = resolve_child_address(&addr!["page", "meta"], &section, &child).unwrap();
        assert_eq!(deep, addr!["page", "title"]);
    }

    #[test]
    fn test_pull_relocates_to_group() {
        let pull = FieldNode::pull("ignored", Some("seo"), vec![]);
        let child = FieldNode::string("description");
        let a = resolve_child_address(&addr!["ignored"], &pull, &child).unwrap();
        assert_eq!(a, addr!["seo", "description"]);

        let in_item = resolve_child_address(&addr!["blocks", 3, "ignored"], &pull, &child).unwrap();
        assert_eq!(in_item, addr!["blocks", 3, "seo", "description"]);
    }

    #[test]
    fn test_pull_without_group_uses_its_key() {
        let pull = FieldNode::pull("params", None, vec![]);
        let child = FieldNode::string("x");
        let a = resolve_child_address(&addr!["params"], &pull, &child).unwrap();
        assert_eq!(a, addr!["params", "x"]);
    }

    #[test]
    fn test_empty_group_or_key_is_unresolvable() {
        let pull = FieldNode::pull("p", Some(""), vec![]);
        let err = resolve_child_address(&addr!["p"], &pull, &FieldNode::string("x")).unwrap_err();
        assert!(matches!(err, FieldError::AddressResolution { .. }));

        let section = FieldNode::section("s", true, vec![]);
        assert!(resolve_child_address(&addr!["s"], &section, &FieldNode::string("")).is_err());
    }

    #[test]
    fn test_nest_and_items() {
        let nest = FieldNode::nest("author", vec![]);
        let a = resolve_child_address(&addr!["author"], &nest, &FieldNode::string("name")).unwrap();
        assert_eq!(a, addr!["author", "name"]);
        assert_eq!(item_address(&addr!["gallery"], 2), addr!["gallery", 2]);
    }
}
