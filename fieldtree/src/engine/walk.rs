//! Depth-first resolution of a schema against a document.

use serde_json::{Map, Value};

use crate::{
    address::Address,
    data::{
        document::{set_value_at, value_at},
        schema::{FieldNode, FieldSchema, ItemTemplate, SchemaPath},
    },
    engine::{
        nest::Scope,
        registry::{Arity, FieldRegistry},
        resolve::{Grouping, item_address, resolve_with},
    },
    error::{FieldError, Result},
};

/// Where a binding's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOrigin {
    Document,
    Default,
    Missing,
}

/// A field paired with its address and current value.
#[derive(Debug, Clone)]
pub struct ResolvedBinding<'s> {
    /// Schema node.
    pub node: &'s FieldNode,
    /// Storage address.
    pub address: Address,
    /// Position in the schema.
    pub schema_path: SchemaPath,
    /// Current value for leaves and lists; `None` for fixed composites.
    pub value: Option<Value>,
    /// Where `value` came from.
    pub origin: ValueOrigin,
    pub content: BindingContent<'s>,
}

/// What sits below a binding.
#[derive(Debug, Clone)]
pub enum BindingContent<'s> {
    Leaf,
    Group(Vec<ResolvedBinding<'s>>),
    List(Vec<ResolvedItem<'s>>),
    /// Drill-in target; children are resolved when the scope is entered.
    Navigation { scope: Scope },
}

/// One instance of a list's item template.
#[derive(Debug, Clone)]
pub struct ResolvedItem<'s> {
    /// Item position.
    pub index: usize,
    pub address: Address,
    /// Bindings of the item.
    pub fields: Vec<ResolvedBinding<'s>>,
}

/// A node-local failure met during the walk. The node was skipped.
#[derive(Debug)]
pub struct Problem {
    pub schema_path: SchemaPath,
    pub error: FieldError,
}

/// Result of resolving one scope.
#[derive(Debug)]
pub struct Resolution<'s> {
    /// Scope that was resolved.
    pub scope: Scope,
    /// Top-level bindings of the scope.
    pub bindings: Vec<ResolvedBinding<'s>>,
    /// Node-local failures; their siblings still resolved.
    pub problems: Vec<Problem>,
}

impl<'s> ResolvedBinding<'s> {
    /// Bindings directly below this one (list items flattened).
    pub fn children(&self) -> Vec<&ResolvedBinding<'s>> {
        match &self.content {
            BindingContent::Group(children) => children.iter().collect(),
            BindingContent::List(items) => items.iter().flat_map(|i| i.fields.iter()).collect(),
            BindingContent::Leaf | BindingContent::Navigation { .. } => Vec::new(),
        }
    }

    fn find(&self, address: &Address) -> Option<&ResolvedBinding<'s>> {
        if &self.address == address {
            return Some(self);
        }
        self.children().into_iter().find_map(|c| c.find(address))
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a ResolvedBinding<'s>)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }
}

impl<'s> Resolution<'s> {
    /// First binding whose address is `address`, depth-first.
    pub fn find(&self, address: &Address) -> Option<&ResolvedBinding<'s>> {
        self.bindings.iter().find_map(|b| b.find(address))
    }

    /// Every binding in depth-first order.
    pub fn flatten(&self) -> Vec<&ResolvedBinding<'s>> {
        let mut out = Vec::new();
        for binding in &self.bindings {
            binding.visit(&mut |b| out.push(b));
        }
        out
    }
}

#[derive(Clone, Copy)]
struct Parent<'n> {
    node: &'n FieldNode,
    grouping: Grouping,
}

/// Walks a schema against a document using a registry.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    schema: &'a FieldSchema,
    registry: &'a FieldRegistry,
    expand_nests: bool,
}

impl<'a> Resolver<'a> {
    /// Resolver over `schema` using `registry`.
    pub fn new(schema: &'a FieldSchema, registry: &'a FieldRegistry) -> Self {
        Resolver {
            schema,
            registry,
            expand_nests: false,
        }
    }

    /// Resolve the fields visible in `scope`. Nests produce navigation
    /// targets. Fails only if `scope` does not point into the schema.
    pub fn resolve(&self, document: &Value, scope: &Scope) -> Result<Resolution<'a>> {
        let Some(fields) = self.schema.fields_at(&scope.schema_path) else {
            return Err(FieldError::resolution(
                &scope.address,
                "scope does not point at a schema node",
            ));
        };
        let parent = match self.schema.node_at(&scope.schema_path) {
            Some(node) => {
                let behavior = self.registry.lookup(node, &scope.address)?;
                Some(Parent {
                    node,
                    grouping: (behavior.grouping)(node),
                })
            }
            None => None,
        };

        let mut problems = Vec::new();
        let bindings = self.resolve_fields(
            document,
            &scope.address,
            parent,
            fields,
            &scope.schema_path,
            &mut problems,
        );
        Ok(Resolution {
            scope: scope.clone(),
            bindings,
            problems,
        })
    }

    /// Resolve the whole tree from the root, descending into nests as well.
    pub fn resolve_all(&self, document: &Value) -> Resolution<'a> {
        let expanded = Resolver {
            expand_nests: true,
            ..*self
        };
        let mut problems = Vec::new();
        let bindings = expanded.resolve_fields(
            document,
            &Address::root(),
            None,
            &self.schema.fields,
            &SchemaPath::root(),
            &mut problems,
        );
        Resolution {
            scope: Scope::root(),
            bindings,
            problems,
        }
    }

    fn child_address(
        parent: Option<Parent<'_>>,
        parent_address: &Address,
        child: &FieldNode,
    ) -> Result<Address> {
        match parent {
            Some(p) => resolve_with(p.grouping, parent_address, p.node, child),
            None if child.key.is_empty() => Err(FieldError::resolution(
                parent_address,
                "top-level field has an empty key",
            )),
            None => Ok(parent_address.key(&child.key)),
        }
    }

    fn resolve_fields(
        &self,
        document: &Value,
        parent_address: &Address,
        parent: Option<Parent<'a>>,
        fields: &'a [FieldNode],
        parent_path: &SchemaPath,
        problems: &mut Vec<Problem>,
    ) -> Vec<ResolvedBinding<'a>> {
        let mut out = Vec::with_capacity(fields.len());
        for (i, child) in fields.iter().enumerate() {
            let path = parent_path.child(i);
            let address = match Self::child_address(parent, parent_address, child) {
                Ok(a) => a,
                Err(error) => {
                    warn!("skipping `{}`: {error}", child.key);
                    problems.push(Problem {
                        schema_path: path,
                        error,
                    });
                    continue;
                }
            };
            if let Some(binding) = self.resolve_node(document, child, address, path, problems) {
                out.push(binding);
            }
        }
        out
    }

    fn resolve_node(
        &self,
        document: &Value,
        node: &'a FieldNode,
        address: Address,
        path: SchemaPath,
        problems: &mut Vec<Problem>,
    ) -> Option<ResolvedBinding<'a>> {
        let behavior = match self.registry.lookup(node, &address) {
            Ok(b) => b,
            Err(error) => {
                warn!("skipping `{}`: {error}", node.key);
                problems.push(Problem {
                    schema_path: path,
                    error,
                });
                return None;
            }
        };

        let binding = match behavior.arity {
            Arity::Leaf => {
                let (value, origin) = read_value(document, &address, node);
                ResolvedBinding {
                    node,
                    address,
                    schema_path: path,
                    value,
                    origin,
                    content: BindingContent::Leaf,
                }
            }
            Arity::FixedComposite if behavior.navigable && !self.expand_nests => ResolvedBinding {
                node,
                content: BindingContent::Navigation {
                    scope: Scope {
                        address: address.clone(),
                        schema_path: path.clone(),
                    },
                },
                address,
                schema_path: path,
                value: None,
                origin: ValueOrigin::Missing,
            },
            Arity::FixedComposite => {
                let parent = Parent {
                    node,
                    grouping: (behavior.grouping)(node),
                };
                let children = self.resolve_fields(
                    document,
                    &address,
                    Some(parent),
                    node.child_nodes(),
                    &path,
                    problems,
                );
                ResolvedBinding {
                    node,
                    address,
                    schema_path: path,
                    value: None,
                    origin: ValueOrigin::Missing,
                    content: BindingContent::Group(children),
                }
            }
            Arity::HomogeneousList => {
                let (value, origin) = read_value(document, &address, node);
                let len = match &value {
                    Some(Value::Array(items)) => items.len(),
                    None => 0,
                    Some(other) => {
                        let error = FieldError::resolution(
                            &address,
                            format!("expected a list, found {other}"),
                        );
                        warn!("treating `{}` as empty: {error}", node.key);
                        problems.push(Problem {
                            schema_path: path.clone(),
                            error,
                        });
                        0
                    }
                };
                // Defaults seed the view but are not in the document, so
                // only document-backed lists fan out into addressable items.
                let len = if origin == ValueOrigin::Document { len } else { 0 };
                let items = (0..len)
                    .map(|index| {
                        let item_addr = item_address(&address, index);
                        let fields = match node.item_template() {
                            ItemTemplate::Record(fields) => self.resolve_fields(
                                document,
                                &item_addr,
                                None,
                                fields,
                                &path,
                                problems,
                            ),
                            ItemTemplate::Scalar(field) => self
                                .resolve_node(
                                    document,
                                    field,
                                    item_addr.clone(),
                                    path.child(0),
                                    problems,
                                )
                                .into_iter()
                                .collect(),
                        };
                        ResolvedItem {
                            index,
                            address: item_addr,
                            fields,
                        }
                    })
                    .collect();
                ResolvedBinding {
                    node,
                    address,
                    schema_path: path,
                    value,
                    origin,
                    content: BindingContent::List(items),
                }
            }
        };
        Some(binding)
    }

    /// A fresh item for the list `list`, built from its template's defaults.
    ///
    /// Record fields without a declared default get their kind's empty
    /// value; nested composites are laid out with the same address rules as
    /// the walk, so a `pull` inside the template lands on its group key.
    pub fn template_defaults(&self, list: &FieldNode) -> Value {
        match list.item_template() {
            ItemTemplate::Scalar(field) => self.node_default(field, &Address::root()),
            ItemTemplate::Record(fields) => {
                let mut item = Value::Object(Map::new());
                self.write_defaults(&mut item, &Address::root(), None, fields);
                item
            }
        }
    }

    fn node_default(&self, node: &FieldNode, address: &Address) -> Value {
        if let Some(default) = &node.default {
            return default.clone();
        }
        match self.registry.lookup(node, address) {
            Ok(behavior) => (behavior.empty_value)(node),
            Err(_) => Value::Null,
        }
    }

    fn write_defaults(
        &self,
        target: &mut Value,
        parent_address: &Address,
        parent: Option<Parent<'_>>,
        fields: &[FieldNode],
    ) {
        for child in fields {
            let Ok(address) = Self::child_address(parent, parent_address, child) else {
                continue;
            };
            let Ok(behavior) = self.registry.lookup(child, &address) else {
                continue;
            };
            let value = match behavior.arity {
                Arity::FixedComposite => {
                    let parent = Parent {
                        node: child,
                        grouping: (behavior.grouping)(child),
                    };
                    self.write_defaults(target, &address, Some(parent), child.child_nodes());
                    continue;
                }
                Arity::Leaf | Arity::HomogeneousList => self.node_default(child, &address),
            };
            if let Err(e) = set_value_at(target, &address, value) {
                warn!("cannot seed default at {address}: {e}");
            }
        }
    }
}

fn read_value(document: &Value, address: &Address, node: &FieldNode) -> (Option<Value>, ValueOrigin) {
    match value_at(document, address) {
        Some(v) if !v.is_null() => (Some(v.clone()), ValueOrigin::Document),
        _ => match &node.default {
            Some(d) => (Some(d.clone()), ValueOrigin::Default),
            None => (None, ValueOrigin::Missing),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr;
    use serde_json::json;

    fn leaf_addresses(res: &Resolution<'_>) -> Vec<String> {
        res.flatten()
            .into_iter()
            .filter(|b| matches!(b.content, BindingContent::Leaf))
            .map(|b| b.address.to_string())
            .collect()
    }

    #[test]
    fn test_flat_section_at_root() {
        let schema = FieldSchema::new(vec![FieldNode::section(
            "meta",
            false,
            vec![FieldNode::string("title")],
        )]);
        let reg = FieldRegistry::with_builtins();
        let res = Resolver::new(&schema, &reg)
            .resolve(&json!({}), &Scope::root())
            .unwrap();
        assert_eq!(leaf_addresses(&res), vec!["root.title"]);
    }

    #[test]
    fn test_values_and_defaults() {
        let schema = FieldSchema::new(vec![
            FieldNode::string("title"),
            FieldNode::boolean("draft").with_default(json!(true)),
            FieldNode::string("subtitle"),
        ]);
        let reg = FieldRegistry::with_builtins();
        let res = Resolver::new(&schema, &reg)
            .resolve(&json!({"title": "Hello", "subtitle": null}), &Scope::root())
            .unwrap();
        let b = &res.bindings;
        assert_eq!(b[0].value, Some(json!("Hello")));
        assert_eq!(b[0].origin, ValueOrigin::Document);
        assert_eq!(b[1].value, Some(json!(true)));
        assert_eq!(b[1].origin, ValueOrigin::Default);
        assert_eq!(b[2].value, None);
        assert_eq!(b[2].origin, ValueOrigin::Missing);
    }

    #[test]
    fn test_unknown_type_skipped_siblings_kept() {
        let schema = FieldSchema::new(vec![
            FieldNode::string("a"),
            FieldNode::custom("b", "markdown"),
            FieldNode::string("c"),
        ]);
        let reg = FieldRegistry::with_builtins();
        let res = Resolver::new(&schema, &reg)
            .resolve(&json!({}), &Scope::root())
            .unwrap();
        assert_eq!(leaf_addresses(&res), vec!["root.a", "root.c"]);
        assert_eq!(res.problems.len(), 1);
        assert!(matches!(
            res.problems[0].error,
            FieldError::UnknownFieldType { .. }
        ));
        assert_eq!(res.problems[0].schema_path, SchemaPath::root().child(1));
    }

    #[test]
    fn test_accordion_items_fan_out() {
        let schema = FieldSchema::new(vec![FieldNode::accordion(
            "gallery",
            vec![
                FieldNode::string("src"),
                FieldNode::pull("p", Some("meta"), vec![FieldNode::string("alt")]),
            ],
        )]);
        let reg = FieldRegistry::with_builtins();
        let doc = json!({"gallery": [{"src": "a.png"}, {"src": "b.png", "meta": {"alt": "B"}}]});
        let res = Resolver::new(&schema, &reg)
            .resolve(&doc, &Scope::root())
            .unwrap();
        assert_eq!(
            leaf_addresses(&res),
            vec![
                "root.gallery.0.src",
                "root.gallery.0.meta.alt",
                "root.gallery.1.src",
                "root.gallery.1.meta.alt"
            ]
        );
        let alt = res.find(&addr!["gallery", 1, "meta", "alt"]).unwrap();
        assert_eq!(alt.value, Some(json!("B")));
    }

    #[test]
    fn test_leaf_array_items_use_item_address() {
        let schema = FieldSchema::new(vec![FieldNode::leaf_array(
            "tags",
            FieldNode::string(""),
        )]);
        let reg = FieldRegistry::with_builtins();
        let res = Resolver::new(&schema, &reg)
            .resolve(&json!({"tags": ["rust", "cms"]}), &Scope::root())
            .unwrap();
        assert_eq!(leaf_addresses(&res), vec!["root.tags.0", "root.tags.1"]);
        assert_eq!(
            res.find(&addr!["tags", 1]).unwrap().value,
            Some(json!("cms"))
        );
    }

    #[test]
    fn test_non_list_value_is_treated_as_empty() {
        let schema = FieldSchema::new(vec![FieldNode::accordion(
            "gallery",
            vec![FieldNode::string("src")],
        )]);
        let reg = FieldRegistry::with_builtins();
        let res = Resolver::new(&schema, &reg)
            .resolve(&json!({"gallery": "oops"}), &Scope::root())
            .unwrap();
        let BindingContent::List(items) = &res.bindings[0].content else {
            panic!("expected list");
        };
        assert!(items.is_empty());
        assert_eq!(res.problems.len(), 1);
    }

    #[test]
    fn test_nest_is_navigation_until_entered() {
        let schema = FieldSchema::new(vec![
            FieldNode::string("title"),
            FieldNode::nest("author", vec![FieldNode::string("name")]),
        ]);
        let reg = FieldRegistry::with_builtins();
        let resolver = Resolver::new(&schema, &reg);
        let doc = json!({"author": {"name": "Ada"}});
        let res = resolver.resolve(&doc, &Scope::root()).unwrap();
        let BindingContent::Navigation { scope } = &res.bindings[1].content else {
            panic!("expected navigation");
        };
        assert_eq!(scope.address, addr!["author"]);
        assert_eq!(leaf_addresses(&res), vec!["root.title"]);

        let inner = resolver.resolve(&doc, scope).unwrap();
        assert_eq!(inner.bindings[0].address, addr!["author", "name"]);
        assert_eq!(inner.bindings[0].value, Some(json!("Ada")));

        let all = resolver.resolve_all(&doc);
        assert_eq!(leaf_addresses(&all), vec!["root.title", "root.author.name"]);
    }

    #[test]
    fn test_bad_scope_is_an_error() {
        let schema = FieldSchema::new(vec![FieldNode::string("title")]);
        let reg = FieldRegistry::with_builtins();
        let scope = Scope {
            address: addr!["x"],
            schema_path: SchemaPath::root().child(9),
        };
        assert!(Resolver::new(&schema, &reg).resolve(&json!({}), &scope).is_err());
    }

    #[test]
    fn test_template_defaults() {
        let list = FieldNode::accordion(
            "blocks",
            vec![
                FieldNode::string("heading").with_default(json!("Untitled")),
                FieldNode::boolean("wide"),
                FieldNode::section("style", false, vec![FieldNode::number("cols").with_default(json!(2))]),
                FieldNode::pull("x", Some("seo"), vec![FieldNode::string("alt")]),
                FieldNode::leaf_array("tags", FieldNode::string("")),
                FieldNode::custom("body", "markdown"),
            ],
        );
        let schema = FieldSchema::default();
        let reg = FieldRegistry::with_builtins();
        let item = Resolver::new(&schema, &reg).template_defaults(&list);
        assert_eq!(
            item,
            json!({
                "heading": "Untitled",
                "wide": false,
                "cols": 2,
                "seo": {"alt": ""},
                "tags": []
            })
        );

        let scalar = FieldNode::leaf_array("n", FieldNode::number("").with_default(json!(7)));
        assert_eq!(Resolver::new(&schema, &reg).template_defaults(&scalar), json!(7));
    }
}
