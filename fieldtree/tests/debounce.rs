use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use fieldtree::{
    Change, EditSession, FieldNode, FieldRegistry, FieldSchema, MemoryPersistence, SessionOptions,
    addr,
};
use serde_json::{Value, json};
use tokio::time::{Instant, advance};

fn schema() -> FieldSchema {
    FieldSchema::new(vec![
        FieldNode::string("title"),
        FieldNode::string("subtitle"),
        FieldNode::accordion("gallery", vec![FieldNode::string("caption")]),
    ])
}

fn session(doc: Value, autosave: bool) -> EditSession<MemoryPersistence> {
    EditSession::from_parts(
        MemoryPersistence::new(),
        "post",
        schema(),
        doc,
        FieldRegistry::with_builtins(),
        SessionOptions {
            debounce: Duration::from_millis(300),
            autosave,
            strict_schema: false,
        },
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn only_the_latest_write_reaches_save() {
    let mut s = session(json!({}), true);
    let heard = Arc::new(Mutex::new(Vec::new()));
    let sink = heard.clone();
    s.subscribe(addr!["title"], move |c: &Change| {
        sink.lock().unwrap().push(c.clone());
    });

    s.edit(&addr!["title"], json!("v1")).unwrap();
    advance(Duration::from_millis(100)).await;
    s.edit(&addr!["title"], json!("v2")).unwrap();
    assert_eq!(s.get(&addr!["title"]), Some(&json!("v2")));

    // The first write's window has passed, but the second reset it.
    advance(Duration::from_millis(250)).await;
    assert_eq!(s.sync(Instant::now()).await.unwrap(), 0);
    assert!(s.persistence().saved().is_empty());

    s.settle().await.unwrap();

    let saved = s.persistence().saved();
    assert_eq!(saved, vec![("post".to_string(), json!({"title": "v2"}))]);
    assert_eq!(
        *heard.lock().unwrap(),
        vec![Change::Field {
            address: addr!["title"],
            value: Some(json!("v2"))
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn writes_to_different_addresses_commit_independently() {
    let mut s = session(json!({}), true);
    s.edit(&addr!["title"], json!("t")).unwrap();
    advance(Duration::from_millis(200)).await;
    s.edit(&addr!["subtitle"], json!("s")).unwrap();

    advance(Duration::from_millis(150)).await;
    assert_eq!(s.sync(Instant::now()).await.unwrap(), 1);
    // Autosave only carries what is committed.
    assert_eq!(
        s.persistence().saved().last().unwrap().1,
        json!({"title": "t"})
    );
    assert!(s.needs_save());

    advance(Duration::from_millis(200)).await;
    assert_eq!(s.sync(Instant::now()).await.unwrap(), 1);
    assert_eq!(
        s.persistence().document("post"),
        Some(json!({"title": "t", "subtitle": "s"}))
    );
    assert!(!s.needs_save());
}

#[tokio::test(start_paused = true)]
async fn autosave_off_waits_for_explicit_save() {
    let mut s = session(json!({}), false);
    s.edit(&addr!["title"], json!("x")).unwrap();
    s.settle().await.unwrap();
    assert!(s.persistence().saved().is_empty());
    assert!(s.needs_save());

    s.save().await.unwrap();
    assert_eq!(s.persistence().saved().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn explicit_save_flushes_pending_writes() {
    let mut s = session(json!({}), true);
    s.edit(&addr!["title"], json!("draft")).unwrap();
    s.save().await.unwrap();
    assert_eq!(s.persistence().document("post"), Some(json!({"title": "draft"})));
    assert!(!s.store().has_pending());
}

#[tokio::test(start_paused = true)]
async fn structural_edit_settles_pending_item_write_first() {
    let mut s = session(
        json!({"gallery": [{"caption": "a"}, {"caption": "b"}, {"caption": "c"}]}),
        true,
    );
    s.edit(&addr!["gallery", 2, "caption"], json!("C")).unwrap();
    s.list(&addr!["gallery"]).unwrap().delete(0).unwrap();

    // The edit landed on the item it was made against, which is now index 1.
    assert_eq!(s.get(&addr!["gallery", 1, "caption"]), Some(&json!("C")));
    advance(Duration::from_secs(1)).await;
    assert_eq!(s.sync(Instant::now()).await.unwrap(), 0);
    assert_eq!(
        s.store().committed(),
        &json!({"gallery": [{"caption": "b"}, {"caption": "C"}]})
    );
}
