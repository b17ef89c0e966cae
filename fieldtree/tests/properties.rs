//! Property tests for addressing, list edits and nest navigation.

use fieldtree::{
    Address, DocumentStore, FieldNode, FieldRegistry, FieldSchema, GroupController, Segment, addr,
    engine::nest::{enter, exit},
    resolve_child_address,
};
use proptest::prelude::*;
use serde_json::{Value, json};

const MAX_SEGMENTS: usize = 6;
const MAX_OPS: usize = 40;

fn segment() -> impl Strategy<Value = Segment> {
    prop_oneof![
        "[a-z0-9._\\\\]{1,6}".prop_map(Segment::Key),
        any::<usize>().prop_map(Segment::Index),
    ]
}

fn address() -> impl Strategy<Value = Address> {
    prop::collection::vec(segment(), 0..MAX_SEGMENTS).prop_map(Address::new)
}

#[derive(Debug, Clone)]
enum ListOp {
    Add,
    Delete(usize),
    Swap(usize),
}

fn list_op() -> impl Strategy<Value = ListOp> {
    prop_oneof![
        Just(ListOp::Add),
        (0usize..12).prop_map(ListOp::Delete),
        (0usize..12).prop_map(ListOp::Swap),
    ]
}

proptest! {
    #[test]
    fn address_string_round_trip(a in address()) {
        let s = a.to_string();
        prop_assert_eq!(Address::parse(&s).unwrap(), a);
    }

    #[test]
    fn pull_group_is_independent_of_its_key(
        parent in address(),
        own_key in "[a-z]{1,8}",
        group in "[a-z]{1,8}",
        child_key in "[a-z]{1,8}",
    ) {
        let pull = FieldNode::pull(&own_key, Some(group.as_str()), vec![]);
        let child = FieldNode::string(&child_key);
        let resolved = resolve_child_address(&parent.key(own_key.as_str()), &pull, &child).unwrap();
        prop_assert_eq!(resolved, parent.key(group.as_str()).key(child_key.as_str()));
    }

    #[test]
    fn list_indices_stay_contiguous(ops in prop::collection::vec(list_op(), 0..MAX_OPS)) {
        let schema = FieldSchema::new(vec![FieldNode::accordion("items", vec![FieldNode::number("id")])]);
        let registry = FieldRegistry::with_builtins();
        let mut store = DocumentStore::default();
        let mut model: Vec<Value> = Vec::new();
        let mut next = 0;

        for op in ops {
            let mut list = GroupController::new(
                &mut store,
                &schema,
                &registry,
                &schema.fields[0],
                addr!["items"],
            )
            .unwrap();
            match op {
                ListOp::Add => {
                    let item = json!({"id": next});
                    next += 1;
                    let at = list.add_value(item.clone()).unwrap();
                    prop_assert_eq!(at, addr!["items", model.len()]);
                    model.push(item);
                }
                ListOp::Delete(i) => {
                    let res = list.delete(i);
                    if i < model.len() {
                        let expected = model.remove(i);
                        prop_assert_eq!(res.unwrap(), expected);
                    } else {
                        prop_assert!(res.is_err());
                    }
                }
                ListOp::Swap(i) => {
                    let res = list.swap(i, i + 1);
                    if i + 1 < model.len() {
                        prop_assert!(res.is_ok());
                        model.swap(i, i + 1);
                    } else {
                        prop_assert!(res.is_err());
                    }
                }
            }

            prop_assert_eq!(list.items(), model.as_slice());
            for i in 0..model.len() {
                prop_assert_eq!(list.item_address(i).unwrap(), addr!["items", i]);
            }
            prop_assert!(list.item_address(model.len()).is_err());
        }
    }

    #[test]
    fn nest_enter_exit_round_trip(scope in address(), key in "[a-z_]{1,8}") {
        let nest = FieldNode::nest(&key, vec![]);
        let inner = enter(&scope, &nest).unwrap();
        prop_assert_eq!(inner.len(), scope.len() + 1);
        prop_assert_eq!(exit(&inner), scope);
    }
}
