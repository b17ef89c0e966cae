use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{FieldError, Result};

/// Root of a field schema: an optional title and the top-level fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSchema {
    /// Display title.
    pub title: Option<String>,
    /// Top-level fields.
    pub fields: Vec<FieldNode>,
}

/// One node of the field tree.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    /// Document key of this field, unique among siblings.
    pub key: String,
    /// Label shown by the rendering layer.
    pub title: Option<String>,
    /// Value used when the document has nothing at the field's address.
    pub default: Option<Value>,
    /// Help text.
    pub tip: Option<String>,
    /// Kind-specific attributes and children.
    pub kind: FieldKind,
}

/// Closed set of field kinds, plus [`FieldKind::Custom`] for tags the parser
/// does not know. Whether a custom tag is usable is decided by the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String {
        multiline: bool,
    },
    Number {
        min: Option<f64>,
        max: Option<f64>,
    },
    Boolean,
    Date,
    Select {
        options: Vec<SelectOption>,
    },
    /// Visual grouping. With `groupdata` the children live under the
    /// section's key; without it they are flattened into the parent.
    Section {
        groupdata: bool,
        fields: Vec<FieldNode>,
    },
    /// Grouped sub-tree edited in its own drill-in view.
    Nest {
        fields: Vec<FieldNode>,
    },
    /// Sub-tree relocated under `group` (or the pull's own key).
    Pull {
        group: Option<String>,
        fields: Vec<FieldNode>,
    },
    /// Ordered list of records shaped by `fields`.
    Accordion {
        fields: Vec<FieldNode>,
    },
    /// Ordered list of scalars shaped by `field`.
    LeafArray {
        field: Box<FieldNode>,
    },
    /// Ordered list of page-bundle resources shaped by `fields`.
    BundleManager {
        path: Option<String>,
        extensions: Vec<String>,
        fields: Vec<FieldNode>,
    },
    Custom {
        tag: String,
        fields: Vec<FieldNode>,
        field: Option<Box<FieldNode>>,
        attrs: Map<String, Value>,
    },
}

/// A choice of a `select` field.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOption {
    /// Stored value.
    pub value: Value,
    /// Label shown instead of the value.
    pub text: Option<String>,
}

/// Shape of one item of a homogeneous list.
#[derive(Debug, Clone, Copy)]
pub enum ItemTemplate<'a> {
    /// Each item is a mapping built from these fields.
    Record(&'a [FieldNode]),
    /// Each item is the value of this single field.
    Scalar(&'a FieldNode),
}

/// Position of a node in the schema tree, as child indices from the root.
///
/// This is how bindings and navigation scopes refer back into the schema
/// without holding references into it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SchemaPath(Vec<usize>);

impl SchemaPath {
    /// Path of the schema root.
    pub fn root() -> Self {
        SchemaPath(Vec::new())
    }

    /// Path of child `index` below this one.
    pub fn child(&self, index: usize) -> SchemaPath {
        let mut steps = self.0.clone();
        steps.push(index);
        SchemaPath(steps)
    }

    /// Child indices from the root down.
    pub fn steps(&self) -> &[usize] {
        &self.0
    }

    /// Whether this is the schema root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl FieldKind {
    /// The `type` tag used in schema JSON.
    pub fn tag(&self) -> &str {
        match self {
            FieldKind::String { .. } => "string",
            FieldKind::Number { .. } => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::Select { .. } => "select",
            FieldKind::Section { .. } => "section",
            FieldKind::Nest { .. } => "nest",
            FieldKind::Pull { .. } => "pull",
            FieldKind::Accordion { .. } => "accordion",
            FieldKind::LeafArray { .. } => "leaf-array",
            FieldKind::BundleManager { .. } => "bundle-manager",
            FieldKind::Custom { tag, .. } => tag,
        }
    }
}

impl FieldNode {
    fn with_kind(key: &str, kind: FieldKind) -> Self {
        FieldNode {
            key: key.to_string(),
            title: None,
            default: None,
            tip: None,
            kind,
        }
    }

    /// Single-line `string` field.
    pub fn string(key: &str) -> Self {
        Self::with_kind(key, FieldKind::String { multiline: false })
    }

    /// Unbounded `number` field.
    pub fn number(key: &str) -> Self {
        Self::with_kind(
            key,
            FieldKind::Number {
                min: None,
                max: None,
            },
        )
    }

    /// `boolean` field.
    pub fn boolean(key: &str) -> Self {
        Self::with_kind(key, FieldKind::Boolean)
    }

    /// `date` field.
    pub fn date(key: &str) -> Self {
        Self::with_kind(key, FieldKind::Date)
    }

    /// `select` field over string options.
    pub fn select(key: &str, options: &[&str]) -> Self {
        let options = options
            .iter()
            .map(|o| SelectOption {
                value: Value::String(o.to_string()),
                text: None,
            })
            .collect();
        Self::with_kind(key, FieldKind::Select { options })
    }

    /// `section`; with `groupdata` false its fields sit at the parent level.
    pub fn section(key: &str, groupdata: bool, fields: Vec<FieldNode>) -> Self {
        Self::with_kind(key, FieldKind::Section { groupdata, fields })
    }

    /// `nest` opening its own editing scope.
    pub fn nest(key: &str, fields: Vec<FieldNode>) -> Self {
        Self::with_kind(key, FieldKind::Nest { fields })
    }

    /// `pull` storing its fields under `group` instead of its key.
    pub fn pull(key: &str, group: Option<&str>, fields: Vec<FieldNode>) -> Self {
        Self::with_kind(
            key,
            FieldKind::Pull {
                group: group.map(str::to_string),
                fields,
            },
        )
    }

    /// `accordion` list of records.
    pub fn accordion(key: &str, fields: Vec<FieldNode>) -> Self {
        Self::with_kind(key, FieldKind::Accordion { fields })
    }

    /// `leaf-array` list of scalars shaped like `field`.
    pub fn leaf_array(key: &str, field: FieldNode) -> Self {
        Self::with_kind(
            key,
            FieldKind::LeafArray {
                field: Box::new(field),
            },
        )
    }

    /// `bundle-manager` list of records.
    pub fn bundle_manager(key: &str, fields: Vec<FieldNode>) -> Self {
        Self::with_kind(
            key,
            FieldKind::BundleManager {
                path: None,
                extensions: Vec::new(),
                fields,
            },
        )
    }

    /// Field with a tag the builtins do not know.
    pub fn custom(key: &str, tag: &str) -> Self {
        Self::with_kind(
            key,
            FieldKind::Custom {
                tag: tag.to_string(),
                fields: Vec::new(),
                field: None,
                attrs: Map::new(),
            },
        )
    }

    /// Set the declared default.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the display title.
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Type tag as written in schema JSON.
    pub fn tag(&self) -> &str {
        self.kind.tag()
    }

    /// Structural children in schema order: the fixed `fields` of a
    /// composite, the record fields of a list, or the single scalar template.
    pub fn child_nodes(&self) -> &[FieldNode] {
        match &self.kind {
            FieldKind::Section { fields, .. }
            | FieldKind::Nest { fields }
            | FieldKind::Pull { fields, .. }
            | FieldKind::Accordion { fields }
            | FieldKind::BundleManager { fields, .. } => fields,
            FieldKind::LeafArray { field } => std::slice::from_ref(field.as_ref()),
            FieldKind::Custom { fields, field, .. } => match field {
                Some(field) if fields.is_empty() => std::slice::from_ref(field.as_ref()),
                _ => fields,
            },
            _ => &[],
        }
    }

    /// Item shape when this node is used as a homogeneous list.
    pub fn item_template(&self) -> ItemTemplate<'_> {
        match &self.kind {
            FieldKind::LeafArray { field } => ItemTemplate::Scalar(field),
            FieldKind::Custom {
                field: Some(field),
                fields,
                ..
            } if fields.is_empty() => ItemTemplate::Scalar(field),
            _ => ItemTemplate::Record(self.child_nodes()),
        }
    }

    /// Parse a node from schema JSON. `path` names the node in errors.
    ///
    /// Unknown attributes are ignored; unknown tags become
    /// [`FieldKind::Custom`].
    pub fn from_json(value: &Value, path: &str) -> Result<FieldNode> {
        parse_node(value, path, true)
    }

    /// Serialize back to schema JSON.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("key".into(), Value::String(self.key.clone()));
        obj.insert("type".into(), Value::String(self.tag().to_string()));
        if let Some(title) = &self.title {
            obj.insert("title".into(), Value::String(title.clone()));
        }
        if let Some(default) = &self.default {
            obj.insert("default".into(), default.clone());
        }
        if let Some(tip) = &self.tip {
            obj.insert("tip".into(), Value::String(tip.clone()));
        }
        let fields_json = |fields: &[FieldNode]| Value::Array(fields.iter().map(Self::to_json).collect());
        match &self.kind {
            FieldKind::String { multiline } => {
                if *multiline {
                    obj.insert("multiline".into(), Value::Bool(true));
                }
            }
            FieldKind::Number { min, max } => {
                if let Some(min) = min {
                    obj.insert("min".into(), Value::from(*min));
                }
                if let Some(max) = max {
                    obj.insert("max".into(), Value::from(*max));
                }
            }
            FieldKind::Boolean | FieldKind::Date => {}
            FieldKind::Select { options } => {
                let options = options
                    .iter()
                    .map(|o| match &o.text {
                        Some(text) => {
                            let mut m = Map::new();
                            m.insert("value".into(), o.value.clone());
                            m.insert("text".into(), Value::String(text.clone()));
                            Value::Object(m)
                        }
                        None => o.value.clone(),
                    })
                    .collect();
                obj.insert("options".into(), Value::Array(options));
            }
            FieldKind::Section { groupdata, fields } => {
                if !*groupdata {
                    obj.insert("groupdata".into(), Value::Bool(false));
                }
                obj.insert("fields".into(), fields_json(fields));
            }
            FieldKind::Nest { fields } | FieldKind::Accordion { fields } => {
                obj.insert("fields".into(), fields_json(fields));
            }
            FieldKind::Pull { group, fields } => {
                if let Some(group) = group {
                    obj.insert("group".into(), Value::String(group.clone()));
                }
                obj.insert("fields".into(), fields_json(fields));
            }
            FieldKind::LeafArray { field } => {
                obj.insert("field".into(), field.to_json());
            }
            FieldKind::BundleManager {
                path,
                extensions,
                fields,
            } => {
                if let Some(path) = path {
                    obj.insert("path".into(), Value::String(path.clone()));
                }
                if !extensions.is_empty() {
                    obj.insert(
                        "extensions".into(),
                        Value::Array(extensions.iter().cloned().map(Value::String).collect()),
                    );
                }
                obj.insert("fields".into(), fields_json(fields));
            }
            FieldKind::Custom {
                fields,
                field,
                attrs,
                ..
            } => {
                for (k, v) in attrs {
                    obj.entry(k.clone()).or_insert_with(|| v.clone());
                }
                if !fields.is_empty() {
                    obj.insert("fields".into(), fields_json(fields));
                }
                if let Some(field) = field {
                    obj.insert("field".into(), field.to_json());
                }
            }
        }
        Value::Object(obj)
    }
}

const COMMON_ATTRS: &[&str] = &["key", "type", "title", "default", "tip", "fields", "field"];

fn invalid(path: &str, reason: impl Into<String>) -> FieldError {
    FieldError::InvalidSchema {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn opt_str(obj: &Map<String, Value>, name: &str, path: &str) -> Result<Option<String>> {
    match obj.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid(path, format!("`{name}` must be a string, got {other}"))),
    }
}

fn parse_fields(obj: &Map<String, Value>, path: &str) -> Result<Vec<FieldNode>> {
    match obj.get("fields") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let child = if path.is_empty() {
                    format!("fields[{i}]")
                } else {
                    format!("{path}.fields[{i}]")
                };
                parse_node(v, &child, true)
            })
            .collect(),
        Some(other) => Err(invalid(path, format!("`fields` must be an array, got {other}"))),
    }
}

fn parse_field(obj: &Map<String, Value>, path: &str) -> Result<Option<Box<FieldNode>>> {
    match obj.get("field") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => Ok(Some(Box::new(parse_node(v, &format!("{path}.field"), false)?))),
    }
}

fn parse_node(value: &Value, path: &str, require_key: bool) -> Result<FieldNode> {
    let Value::Object(obj) = value else {
        return Err(invalid(path, format!("expected an object, got {value}")));
    };

    let key = match opt_str(obj, "key", path)? {
        Some(key) => key,
        None if !require_key => String::new(),
        None => return Err(invalid(path, "missing `key`")),
    };
    let Some(tag) = opt_str(obj, "type", path)? else {
        return Err(invalid(path, "missing `type`"));
    };
    // Paths in errors read better with the key than with the bare index.
    let path = if key.is_empty() {
        path.to_string()
    } else {
        format!("{path}({key})")
    };
    let path = path.as_str();

    let kind = match tag.as_str() {
        "string" => FieldKind::String {
            multiline: obj.get("multiline").and_then(Value::as_bool).unwrap_or(false),
        },
        "number" => FieldKind::Number {
            min: obj.get("min").and_then(Value::as_f64),
            max: obj.get("max").and_then(Value::as_f64),
        },
        "boolean" => FieldKind::Boolean,
        "date" => FieldKind::Date,
        "select" => FieldKind::Select {
            options: parse_options(obj, path)?,
        },
        "section" => FieldKind::Section {
            groupdata: obj.get("groupdata").and_then(Value::as_bool).unwrap_or(true),
            fields: parse_fields(obj, path)?,
        },
        "nest" => FieldKind::Nest {
            fields: parse_fields(obj, path)?,
        },
        "pull" => FieldKind::Pull {
            group: opt_str(obj, "group", path)?,
            fields: parse_fields(obj, path)?,
        },
        "accordion" => {
            let mut fields = parse_fields(obj, path)?;
            if fields.is_empty()
                && let Some(field) = parse_field(obj, path)?
            {
                fields.push(*field);
            }
            FieldKind::Accordion { fields }
        }
        "leaf-array" => {
            let Some(field) = parse_field(obj, path)? else {
                return Err(invalid(path, "leaf-array without an item `field`"));
            };
            FieldKind::LeafArray { field }
        }
        "bundle-manager" => FieldKind::BundleManager {
            path: opt_str(obj, "path", path)?,
            extensions: obj
                .get("extensions")
                .and_then(Value::as_array)
                .map(|exts| {
                    exts.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            fields: parse_fields(obj, path)?,
        },
        _ => FieldKind::Custom {
            tag: tag.clone(),
            fields: parse_fields(obj, path)?,
            field: parse_field(obj, path)?,
            attrs: obj
                .iter()
                .filter(|(k, _)| !COMMON_ATTRS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        },
    };

    Ok(FieldNode {
        key,
        title: opt_str(obj, "title", path)?,
        default: obj.get("default").filter(|v| !v.is_null()).cloned(),
        tip: opt_str(obj, "tip", path)?,
        kind,
    })
}

fn parse_options(obj: &Map<String, Value>, path: &str) -> Result<Vec<SelectOption>> {
    let Some(options) = obj.get("options") else {
        return Ok(Vec::new());
    };
    let Value::Array(options) = options else {
        return Err(invalid(path, "`options` must be an array"));
    };
    options
        .iter()
        .map(|o| match o {
            Value::Object(m) => {
                let value = m
                    .get("value")
                    .cloned()
                    .ok_or_else(|| invalid(path, "select option without `value`"))?;
                Ok(SelectOption {
                    value,
                    text: m.get("text").and_then(Value::as_str).map(str::to_string),
                })
            }
            other => Ok(SelectOption {
                value: other.clone(),
                text: None,
            }),
        })
        .collect()
}

impl FieldSchema {
    /// Untitled schema with `fields`.
    pub fn new(fields: Vec<FieldNode>) -> Self {
        FieldSchema {
            title: None,
            fields,
        }
    }

    /// Parse schema JSON: either a bare array of fields or an object with a
    /// `fields` array and an optional `title`.
    pub fn from_json(value: &Value) -> Result<FieldSchema> {
        match value {
            Value::Array(_) => {
                let mut wrapper = Map::new();
                wrapper.insert("fields".into(), value.clone());
                Ok(FieldSchema {
                    title: None,
                    fields: parse_fields(&wrapper, "")?,
                })
            }
            Value::Object(obj) => Ok(FieldSchema {
                title: opt_str(obj, "title", "")?,
                fields: parse_fields(obj, "")?,
            }),
            other => Err(invalid("", format!("expected an array or object, got {other}"))),
        }
    }

    /// Serialize back to schema JSON.
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        if let Some(title) = &self.title {
            obj.insert("title".into(), Value::String(title.clone()));
        }
        obj.insert(
            "fields".into(),
            Value::Array(self.fields.iter().map(FieldNode::to_json).collect()),
        );
        Value::Object(obj)
    }

    /// Look up the node at `path`.
    pub fn node_at(&self, path: &SchemaPath) -> Option<&FieldNode> {
        let (last, init) = path.steps().split_last()?;
        let mut fields = self.fields.as_slice();
        for &step in init {
            fields = fields.get(step)?.child_nodes();
        }
        fields.get(*last)
    }

    /// Fields visible at `path`: the top-level fields for the root, otherwise
    /// the children of the node at `path`.
    pub fn fields_at(&self, path: &SchemaPath) -> Option<&[FieldNode]> {
        if path.is_root() {
            return Some(&self.fields);
        }
        self.node_at(path).map(FieldNode::child_nodes)
    }
}

impl Serialize for FieldNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        FieldNode::from_json(&value, "").map_err(serde::de::Error::custom)
    }
}

impl Serialize for FieldSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        FieldSchema::from_json(&value).map_err(serde::de::Error::custom)
    }
}
