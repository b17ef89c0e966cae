//! Loading and saving documents and schemas.
//!
//! The engine only talks to storage through [`Persistence`]. Ids are opaque
//! to the engine; [`FilePersistence`] treats them as file paths.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::SystemTime,
};

use anyhow::{Context, bail};
use serde_json::{Map, Value};

use crate::{
    address::Address,
    data::schema::{FieldKind, FieldSchema},
    engine::{registry::FieldRegistry, walk::Resolver},
};

/// Storage collaborator used by an edit session.
pub trait Persistence: Send + Sync {
    fn load_document(&self, id: &str) -> impl Future<Output = anyhow::Result<Value>> + Send;

    fn save_document(
        &self,
        id: &str,
        document: &Value,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn load_schema(&self, id: &str) -> impl Future<Output = anyhow::Result<FieldSchema>> + Send;

    /// Save `document` knowing the schema it was edited against, so formats
    /// with typed scalars can keep them typed.
    fn save_document_as(
        &self,
        id: &str,
        document: &Value,
        schema: &FieldSchema,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        let _ = schema;
        self.save_document(id, document)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> anyhow::Result<Self> {
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match ext {
            "json" => Ok(Format::Json),
            "toml" | "tml" => Ok(Format::Toml),
            _ => bail!("Unsupported file extension: {ext:?}"),
        }
    }

    fn parse(self, content: &str) -> anyhow::Result<Value> {
        let value = match self {
            Format::Json => serde_json::from_str(content)?,
            Format::Toml => {
                let table: toml::Table = toml::from_str(content)?;
                toml_to_json(toml::Value::Table(table))
            }
        };
        Ok(value)
    }

    /// Render `value`. String values at `dates` are written as TOML
    /// datetimes when they parse as one.
    fn render(self, value: &Value, dates: &HashSet<Address>) -> anyhow::Result<String> {
        let s = match self {
            Format::Json => serde_json::to_string_pretty(value)?,
            Format::Toml => {
                let Some(toml::Value::Table(table)) = json_to_toml(value, &Address::root(), dates)
                else {
                    bail!("document root must be a mapping");
                };
                toml::to_string_pretty(&table).context("document cannot be written as TOML")?
            }
        };
        Ok(s)
    }
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

// TOML has no null: null entries are dropped from tables and arrays alike,
// and read back as absent.
fn json_to_toml(value: &Value, at: &Address, dates: &HashSet<Address>) -> Option<toml::Value> {
    let v = match value {
        Value::Null => return None,
        Value::Bool(b) => toml::Value::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => toml::Value::Integer(i),
            None => toml::Value::Float(n.as_f64()?),
        },
        Value::String(s) if dates.contains(at) => match s.parse::<toml::value::Datetime>() {
            Ok(dt) => toml::Value::Datetime(dt),
            Err(_) => toml::Value::String(s.clone()),
        },
        Value::String(s) => toml::Value::String(s.clone()),
        Value::Array(items) => toml::Value::Array(
            items
                .iter()
                .enumerate()
                .filter_map(|(i, v)| json_to_toml(v, &at.index(i), dates))
                .collect(),
        ),
        Value::Object(map) => toml::Value::Table(
            map.iter()
                .filter_map(|(k, v)| Some((k.clone(), json_to_toml(v, &at.key(k.as_str()), dates)?)))
                .collect(),
        ),
    };
    Some(v)
}

/// Addresses of the `date` fields bound in `document`.
fn date_addresses(document: &Value, schema: &FieldSchema) -> HashSet<Address> {
    let registry = FieldRegistry::with_builtins();
    Resolver::new(schema, &registry)
        .resolve_all(document)
        .flatten()
        .into_iter()
        .filter(|b| matches!(b.node.kind, FieldKind::Date))
        .map(|b| b.address.clone())
        .collect()
}

/// Documents and schemas stored as `.json` or `.toml` files.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    backup: bool,
}

impl Default for FilePersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl FilePersistence {
    /// File persistence that backs up the previous file on every save.
    pub fn new() -> Self {
        FilePersistence { backup: true }
    }

    /// Turn the pre-save backup on or off.
    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    async fn write(
        &self,
        id: &str,
        document: &Value,
        dates: &HashSet<Address>,
    ) -> anyhow::Result<()> {
        let path = Path::new(id);
        let format = Format::of(path)?;
        let content = format.render(document, dates)?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        if self.backup && tokio::fs::try_exists(path).await.unwrap_or(false) {
            let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
            let secs = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)?
                .as_secs();
            let bk = backup_path(path, ext, secs);
            tokio::fs::copy(path, &bk)
                .await
                .with_context(|| format!("Failed to back up {id}"))?;
            debug!("backed up {id} to {}", bk.display());
        }

        let tmp = path.with_extension(format!(
            "{}.tmp",
            path.extension().and_then(|s| s.to_str()).unwrap_or("")
        ));
        tokio::fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to write {id}"))?;
        Ok(())
    }

    async fn read(path: &Path) -> anyhow::Result<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

/// Path of the timestamped copy made before overwriting `path`.
pub fn backup_path(path: &Path, ext: &str, secs: u64) -> PathBuf {
    path.with_extension(format!("bk-{secs}.{ext}"))
}

impl Persistence for FilePersistence {
    async fn load_document(&self, id: &str) -> anyhow::Result<Value> {
        let path = Path::new(id);
        let format = Format::of(path)?;
        let content = Self::read(path).await?.unwrap_or_default();
        if content.trim().is_empty() {
            debug!("{id} is missing or empty, starting from an empty document");
            return Ok(Value::Object(Map::new()));
        }
        let value = format
            .parse(&content)
            .with_context(|| format!("Failed to parse {id}"))?;
        if !value.is_object() {
            bail!("{id}: document root must be a mapping");
        }
        Ok(value)
    }

    async fn save_document(&self, id: &str, document: &Value) -> anyhow::Result<()> {
        self.write(id, document, &HashSet::new()).await
    }

    async fn save_document_as(
        &self,
        id: &str,
        document: &Value,
        schema: &FieldSchema,
    ) -> anyhow::Result<()> {
        let dates = date_addresses(document, schema);
        self.write(id, document, &dates).await
    }

    async fn load_schema(&self, id: &str) -> anyhow::Result<FieldSchema> {
        let path = Path::new(id);
        let format = Format::of(path)?;
        let Some(content) = Self::read(path).await? else {
            bail!("Schema file does not exist: {id}");
        };
        let value = format
            .parse(&content)
            .with_context(|| format!("Failed to parse {id}"))?;
        let schema = FieldSchema::from_json(&value)?;
        Ok(schema)
    }
}

/// In-memory persistence. Keeps every snapshot it was asked to save.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    documents: Mutex<HashMap<String, Value>>,
    schemas: Mutex<HashMap<String, FieldSchema>>,
    saved: Mutex<Vec<(String, Value)>>,
    fail_saves: AtomicBool,
}

impl MemoryPersistence {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed document `id`.
    pub fn with_document(self, id: &str, document: Value) -> Self {
        lock(&self.documents).insert(id.to_string(), document);
        self
    }

    /// Seed schema `id`.
    pub fn with_schema(self, id: &str, schema: FieldSchema) -> Self {
        lock(&self.schemas).insert(id.to_string(), schema);
        self
    }

    /// Make every following save fail (or succeed again).
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Every successful save, oldest first.
    pub fn saved(&self) -> Vec<(String, Value)> {
        lock(&self.saved).clone()
    }

    /// Current stored document for `id`.
    pub fn document(&self, id: &str) -> Option<Value> {
        lock(&self.documents).get(id).cloned()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Persistence for MemoryPersistence {
    async fn load_document(&self, id: &str) -> anyhow::Result<Value> {
        Ok(self
            .document(id)
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    async fn save_document(&self, id: &str, document: &Value) -> anyhow::Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            bail!("save of {id} rejected");
        }
        lock(&self.documents).insert(id.to_string(), document.clone());
        lock(&self.saved).push((id.to_string(), document.clone()));
        Ok(())
    }

    async fn load_schema(&self, id: &str) -> anyhow::Result<FieldSchema> {
        match lock(&self.schemas).get(id) {
            Some(schema) => Ok(schema.clone()),
            None => bail!("unknown schema `{id}`"),
        }
    }
}
