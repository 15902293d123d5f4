//! Snapshot round-trip tests.

use chorus::{Document, DocumentSnapshot, Map, RootKind, Text};

use crate::helpers::*;

#[test]
fn test_snapshot_restore_round_trip() {
    let doc = setup_doc();
    put_entry(&doc, "answer", 42);
    doc.insert("notes", &Text::from("remember me")).unwrap();

    let snapshot = doc.snapshot().unwrap();
    let restored = Document::restore(&snapshot).unwrap();

    // Same state, same roots, same content.
    assert_eq!(restored.get_state().unwrap(), doc.get_state().unwrap());
    let mut keys = restored.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["data", "notes"]);

    let map = restored.get_or_insert::<Map>("data").unwrap();
    let txn = restored.read_transaction().unwrap();
    assert_eq!(map.get(&txn, "answer").unwrap().as_int(), Some(42));
    let notes = restored.get_in(&txn, "notes").unwrap();
    assert_eq!(
        notes.as_text().unwrap().get_string(&txn).unwrap(),
        "remember me"
    );
}

#[test]
fn test_snapshot_survives_serde() {
    let doc = setup_doc();
    put_entry(&doc, "k", 1);

    let snapshot = doc.snapshot().unwrap();
    let encoded = serde_json::to_string(&snapshot).unwrap();
    let decoded: DocumentSnapshot = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded.update(), snapshot.update());
    assert_eq!(decoded.roots(), snapshot.roots());

    let restored = Document::restore(&decoded).unwrap();
    let map = restored.get_or_insert::<Map>("data").unwrap();
    let txn = restored.read_transaction().unwrap();
    assert_eq!(map.get(&txn, "k").unwrap().as_int(), Some(1));
}

#[test]
fn test_restore_installs_empty_declared_roots() {
    let doc = Document::builder()
        .root("config", RootKind::Map)
        .root("log", RootKind::Array)
        .build()
        .unwrap();

    let snapshot = doc.snapshot().unwrap();
    assert_eq!(snapshot.roots().len(), 2);

    let restored = Document::restore(&snapshot).unwrap();
    let mut keys = restored.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["config", "log"]);
}

#[test]
fn test_empty_document_snapshot() {
    let doc = setup_doc();
    let snapshot = doc.snapshot().unwrap();
    assert!(snapshot.roots().is_empty());

    let restored = Document::restore(&snapshot).unwrap();
    assert!(restored.keys().unwrap().is_empty());
}
