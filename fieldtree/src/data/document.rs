use std::{collections::BTreeMap, fmt, time::Duration};

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::{
    address::{Address, Segment},
    error::{FieldError, Result},
};

/// Kind of a list-shape change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuralKind {
    Add,
    Delete,
    Swap,
}

impl fmt::Display for StructuralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StructuralKind::Add => "add",
            StructuralKind::Delete => "delete",
            StructuralKind::Swap => "swap",
        };
        f.write_str(s)
    }
}

/// Notification delivered to subscribers when something is committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "change", rename_all = "lowercase")]
pub enum Change {
    /// A value was committed at `address`. `value` is `None` when the
    /// location no longer exists.
    Field {
        address: Address,
        value: Option<Value>,
    },
    /// The list at `address` changed shape.
    Structural {
        address: Address,
        kind: StructuralKind,
    },
}

impl Change {
    /// Address the change happened at.
    pub fn address(&self) -> &Address {
        match self {
            Change::Field { address, .. } | Change::Structural { address, .. } => address,
        }
    }
}

/// Receiver of committed changes, for layers that re-render on change.
pub trait ChangeObserver: Send {
    fn on_field_change(&mut self, address: &Address, value: Option<&Value>);

    fn on_structural_change(&mut self, address: &Address, kind: StructuralKind);
}

/// Handle returned by [`DocumentStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&Change) + Send>;

struct Subscription {
    id: SubscriptionId,
    address: Address,
    listener: Listener,
}

#[derive(Debug, Clone)]
struct PendingWrite {
    deadline: Instant,
    seq: u64,
}

/// Holds the document being edited.
///
/// Writes land in a working copy right away, so reads always see the latest
/// value. Debounced writes become *committed* only once their window passes
/// without a newer write to the same address; subscribers and persistence
/// only ever see committed values.
pub struct DocumentStore {
    working: Value,
    committed: Value,
    pending: BTreeMap<Address, PendingWrite>,
    subscriptions: Vec<Subscription>,
    next_subscription: u64,
    next_seq: u64,
    revision: u64,
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("working", &self.working)
            .field("pending", &self.pending.keys().collect::<Vec<_>>())
            .field("subscriptions", &self.subscriptions.len())
            .field("revision", &self.revision)
            .finish()
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl DocumentStore {
    /// Store holding `document` as both working and committed tree.
    pub fn new(document: Value) -> Self {
        DocumentStore {
            working: document.clone(),
            committed: document,
            pending: BTreeMap::new(),
            subscriptions: Vec::new(),
            next_subscription: 0,
            next_seq: 0,
            revision: 0,
        }
    }

    /// Latest value at `address`, including writes still inside their
    /// debounce window.
    pub fn get(&self, address: &Address) -> Option<&Value> {
        value_at(&self.working, address)
    }

    /// The document as last committed.
    pub fn committed(&self) -> &Value {
        &self.committed
    }

    /// The document including uncommitted writes.
    pub fn working(&self) -> &Value {
        &self.working
    }

    /// Number of commits since the store was created.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether any debounced write is still waiting.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Earliest moment a pending write becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Write and commit immediately.
    pub fn set(&mut self, address: &Address, value: Value) -> Result<()> {
        set_value_at(&mut self.working, address, value)?;
        self.drop_pending_below(address);
        self.commit(address);
        Ok(())
    }

    /// Write now, commit once `debounce` passes without another write to the
    /// same address. A zero debounce commits immediately.
    pub fn set_debounced(
        &mut self,
        address: &Address,
        value: Value,
        debounce: Duration,
        now: Instant,
    ) -> Result<()> {
        if debounce.is_zero() {
            return self.set(address, value);
        }
        set_value_at(&mut self.working, address, value)?;
        // A write to an ancestor supersedes anything pending beneath it.
        self.drop_pending_below(address);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(
            address.clone(),
            PendingWrite {
                deadline: now + debounce,
                seq,
            },
        );
        debug!("staged write at {address}, due in {debounce:?}");
        Ok(())
    }

    /// Commit every pending write whose window has passed, oldest first.
    /// Returns how many were committed.
    pub fn commit_due(&mut self, now: Instant) -> usize {
        let mut due: Vec<(Address, PendingWrite)> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(a, p)| (a.clone(), p.clone()))
            .collect();
        due.sort_by_key(|(_, p)| (p.deadline, p.seq));
        for (address, _) in &due {
            self.pending.remove(address);
            self.commit(address);
        }
        due.len()
    }

    /// Commit every pending write regardless of its window.
    pub fn flush(&mut self) -> usize {
        self.flush_matching(|_| true)
    }

    /// Commit pending writes at, above or below `address`.
    pub fn flush_overlapping(&mut self, address: &Address) -> usize {
        self.flush_matching(|a| a.overlaps(address))
    }

    fn flush_matching(&mut self, pred: impl Fn(&Address) -> bool) -> usize {
        let mut matching: Vec<(Address, u64)> = self
            .pending
            .iter()
            .filter(|(a, _)| pred(a))
            .map(|(a, p)| (a.clone(), p.seq))
            .collect();
        matching.sort_by_key(|(_, seq)| *seq);
        for (address, _) in &matching {
            self.pending.remove(address);
            self.commit(address);
        }
        matching.len()
    }

    /// Run `op` on the list at `address` as one atomic structural edit.
    ///
    /// Pending writes touching the list are committed first so no index shift
    /// interleaves with an unsettled edit. A missing list is materialized as
    /// empty. If `op` fails nothing is changed.
    pub fn update_list<T>(
        &mut self,
        address: &Address,
        kind: StructuralKind,
        op: impl FnOnce(&mut Vec<Value>) -> Result<T>,
    ) -> Result<T> {
        self.flush_overlapping(address);

        let mut items = match value_at(&self.working, address) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(FieldError::resolution(
                    address,
                    format!("expected a list, found {}", type_name(other)),
                ));
            }
        };
        let out = op(&mut items)?;
        set_value_at(&mut self.working, address, Value::Array(items))?;
        self.commit_silently(address);
        self.notify(&Change::Structural {
            address: address.clone(),
            kind,
        });
        Ok(out)
    }

    /// Listen for commits at `address`, its ancestors or its descendants.
    pub fn subscribe(
        &mut self,
        address: Address,
        listener: impl FnMut(&Change) + Send + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscriptions.push(Subscription {
            id,
            address,
            listener: Box::new(listener),
        });
        id
    }

    /// Route commits at or around `address` to `observer`.
    pub fn observe(
        &mut self,
        address: Address,
        mut observer: impl ChangeObserver + 'static,
    ) -> SubscriptionId {
        self.subscribe(address, move |change| match change {
            Change::Field { address, value } => observer.on_field_change(address, value.as_ref()),
            Change::Structural { address, kind } => {
                observer.on_structural_change(address, *kind)
            }
        })
    }

    /// Drop a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    fn drop_pending_below(&mut self, address: &Address) {
        self.pending
            .retain(|a, _| !(a.starts_with(address) && a != address));
    }

    fn commit_silently(&mut self, address: &Address) -> Option<Value> {
        let value = value_at(&self.working, address).cloned();
        match &value {
            Some(v) => {
                // The working copy already proved this path writable.
                if let Err(e) = set_value_at(&mut self.committed, address, v.clone()) {
                    warn!("commit at {address} failed: {e}");
                }
            }
            None => remove_value_at(&mut self.committed, address),
        }
        self.revision += 1;
        value
    }

    fn commit(&mut self, address: &Address) {
        let value = self.commit_silently(address);
        debug!("committed {address}");
        self.notify(&Change::Field {
            address: address.clone(),
            value,
        });
    }

    fn notify(&mut self, change: &Change) {
        for sub in &mut self.subscriptions {
            if sub.address.overlaps(change.address()) {
                (sub.listener)(change);
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Read the value at `address`.
pub fn value_at<'v>(root: &'v Value, address: &Address) -> Option<&'v Value> {
    let mut cur = root;
    for seg in address.segments() {
        cur = match (seg, cur) {
            (Segment::Key(k), Value::Object(obj)) => obj.get(k)?,
            (Segment::Index(i), Value::Array(arr)) => arr.get(*i)?,
            _ => return None,
        };
    }
    Some(cur)
}

// Walk without mutating to find the first segment whose container has the
// wrong shape, so a failing write leaves no half-built path behind.
fn check_writable(root: &Value, address: &Address) -> Result<()> {
    let mut cur = root;
    for (depth, seg) in address.segments().iter().enumerate() {
        let next = match (seg, cur) {
            (_, Value::Null) => return Ok(()),
            (Segment::Key(k), Value::Object(obj)) => obj.get(k),
            (Segment::Index(i), Value::Array(arr)) => arr.get(*i),
            (seg, other) => {
                let at = Address::new(address.segments()[..depth].to_vec());
                let expected = match seg {
                    Segment::Key(_) => "mapping",
                    Segment::Index(_) => "list",
                };
                return Err(FieldError::resolution(
                    &at,
                    format!("expected a {expected}, found {}", type_name(other)),
                ));
            }
        };
        match next {
            Some(v) => cur = v,
            None => return Ok(()),
        }
    }
    Ok(())
}

/// Write `value` at `address`, creating missing mappings and lists along the
/// way. Lists are padded with `null` up to the written index.
pub fn set_value_at(root: &mut Value, address: &Address, value: Value) -> Result<()> {
    check_writable(root, address)?;
    let mut cur = root;
    for seg in address.segments() {
        if cur.is_null() {
            *cur = match seg {
                Segment::Key(_) => Value::Object(Map::new()),
                Segment::Index(_) => Value::Array(Vec::new()),
            };
        }
        cur = match (seg, cur) {
            (Segment::Key(k), Value::Object(obj)) => obj.entry(k.clone()).or_insert(Value::Null),
            (Segment::Index(i), Value::Array(arr)) => {
                if arr.len() <= *i {
                    arr.resize(*i + 1, Value::Null);
                }
                &mut arr[*i]
            }
            _ => return Err(FieldError::resolution(address, "container shape changed")),
        };
    }
    *cur = value;
    Ok(())
}

/// Remove whatever is at `address`. Removing a list index truncates the list
/// there.
pub fn remove_value_at(root: &mut Value, address: &Address) {
    let Some((last, init)) = address.segments().split_last() else {
        *root = Value::Null;
        return;
    };
    let mut cur = root;
    for seg in init {
        let next = match (seg, cur) {
            (Segment::Key(k), Value::Object(obj)) => obj.get_mut(k),
            (Segment::Index(i), Value::Array(arr)) => arr.get_mut(*i),
            _ => None,
        };
        match next {
            Some(v) => cur = v,
            None => return,
        }
    }
    match (last, cur) {
        (Segment::Key(k), Value::Object(obj)) => {
            obj.remove(k);
        }
        (Segment::Index(i), Value::Array(arr)) => arr.truncate(*i),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn recorder(store: &mut DocumentStore, at: Address) -> Arc<Mutex<Vec<Change>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(at, move |c| sink.lock().unwrap().push(c.clone()));
        seen
    }

    #[test]
    fn test_set_materializes_intermediate_containers() {
        let mut store = DocumentStore::default();
        store
            .set(&crate::addr!["gallery", 1, "caption"], json!("hi"))
            .unwrap();
        assert_eq!(
            store.committed(),
            &json!({"gallery": [null, {"caption": "hi"}]})
        );
        assert_eq!(
            store.get(&crate::addr!["gallery", 1, "caption"]),
            Some(&json!("hi"))
        );
    }

    #[test]
    fn test_set_through_scalar_fails_without_side_effects() {
        let mut store = DocumentStore::new(json!({"title": "x"}));
        let err = store
            .set(&crate::addr!["title", "nested", "deeper"], json!(1))
            .unwrap_err();
        assert!(matches!(err, FieldError::AddressResolution { .. }));
        assert_eq!(store.working(), &json!({"title": "x"}));
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_get_after_debounced_set_sees_latest() {
        let mut store = DocumentStore::default();
        let now = Instant::now();
        let at = crate::addr!["title"];
        store
            .set_debounced(&at, json!("draft"), Duration::from_millis(300), now)
            .unwrap();
        assert_eq!(store.get(&at), Some(&json!("draft")));
        assert_eq!(store.committed(), &json!({}));
        assert!(store.has_pending());
    }

    #[test]
    fn test_debounced_writes_coalesce() {
        let mut store = DocumentStore::default();
        let at = crate::addr!["title"];
        let seen = recorder(&mut store, at.clone());
        let t0 = Instant::now();
        let window = Duration::from_millis(300);

        store.set_debounced(&at, json!("a"), window, t0).unwrap();
        store
            .set_debounced(&at, json!("ab"), window, t0 + Duration::from_millis(100))
            .unwrap();
        assert_eq!(store.commit_due(t0 + Duration::from_millis(350)), 0);
        assert_eq!(store.commit_due(t0 + Duration::from_millis(400)), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![Change::Field {
                address: at,
                value: Some(json!("ab"))
            }]
        );
    }

    #[test]
    fn test_independent_addresses_commit_independently() {
        let mut store = DocumentStore::default();
        let t0 = Instant::now();
        store
            .set_debounced(&crate::addr!["a"], json!(1), Duration::from_millis(100), t0)
            .unwrap();
        store
            .set_debounced(&crate::addr!["b"], json!(2), Duration::from_millis(500), t0)
            .unwrap();
        assert_eq!(store.next_deadline(), Some(t0 + Duration::from_millis(100)));
        store.commit_due(t0 + Duration::from_millis(100));
        assert_eq!(store.committed(), &json!({"a": 1}));
        store.flush();
        assert_eq!(store.committed(), &json!({"a": 1, "b": 2}));
        assert!(!store.has_pending());
    }

    #[test]
    fn test_subscription_scope() {
        let mut store = DocumentStore::default();
        let seo = recorder(&mut store, crate::addr!["seo"]);
        let other = recorder(&mut store, crate::addr!["other"]);
        store
            .set(&crate::addr!["seo", "description"], json!("d"))
            .unwrap();
        store.set(&Address::root(), json!({"fresh": true})).unwrap();
        assert_eq!(seo.lock().unwrap().len(), 2);
        assert_eq!(other.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let mut store = DocumentStore::default();
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        let id = store.subscribe(Address::root(), move |_| *c.lock().unwrap() += 1);
        store.set(&crate::addr!["x"], json!(1)).unwrap();
        assert!(store.unsubscribe(id));
        store.set(&crate::addr!["x"], json!(2)).unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
        assert!(!store.unsubscribe(id));
    }

    #[test]
    fn test_update_list_flushes_pending_items_first() {
        let mut store = DocumentStore::new(json!({"items": [{"t": "a"}, {"t": "b"}]}));
        let t0 = Instant::now();
        store
            .set_debounced(
                &crate::addr!["items", 1, "t"],
                json!("B"),
                Duration::from_secs(5),
                t0,
            )
            .unwrap();
        store
            .update_list(&crate::addr!["items"], StructuralKind::Delete, |items| {
                items.remove(0);
                Ok(())
            })
            .unwrap();
        assert!(!store.has_pending());
        assert_eq!(store.committed(), &json!({"items": [{"t": "B"}]}));
    }

    #[test]
    fn test_update_list_rejects_non_list() {
        let mut store = DocumentStore::new(json!({"items": "nope"}));
        let err = store
            .update_list(&crate::addr!["items"], StructuralKind::Add, |_| Ok(()))
            .unwrap_err();
        assert!(err.to_string().contains("expected a list"));
    }

    #[test]
    fn test_remove_value_at() {
        let mut v = json!({"a": {"b": 1, "c": 2}, "l": [1, 2, 3]});
        remove_value_at(&mut v, &crate::addr!["a", "b"]);
        remove_value_at(&mut v, &crate::addr!["l", 1]);
        remove_value_at(&mut v, &crate::addr!["missing", "x"]);
        assert_eq!(v, json!({"a": {"c": 2}, "l": [1]}));
    }

    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<String>>>);

    impl ChangeObserver for Log {
        fn on_field_change(&mut self, address: &Address, value: Option<&Value>) {
            self.0.lock().unwrap().push(format!("{address}={value:?}"));
        }

        fn on_structural_change(&mut self, address: &Address, kind: StructuralKind) {
            self.0.lock().unwrap().push(format!("{kind} {address}"));
        }
    }

    #[test]
    fn test_observer_sees_field_and_structural_changes() {
        let mut store = DocumentStore::default();
        let log = Log::default();
        store.observe(Address::root(), log.clone());
        store.set(&crate::addr!["title"], json!("x")).unwrap();
        store
            .update_list(&crate::addr!["tags"], StructuralKind::Add, |items| {
                items.push(json!("rust"));
                Ok(())
            })
            .unwrap();
        assert_eq!(
            *log.0.lock().unwrap(),
            vec![
                "root.title=Some(String(\"x\"))".to_string(),
                "add root.tags".to_string()
            ]
        );
    }
}
