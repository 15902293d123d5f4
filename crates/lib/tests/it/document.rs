//! Document façade tests: root access, update exchange between replicas and
//! the twin validation hook.

use std::sync::Arc;

use chorus::{
    Array, Document, DocumentError, Error, Map, RootKind, Text, UpdateValidator,
};

use crate::helpers::*;

#[test]
fn test_declared_roots_are_installed() {
    let doc = Document::builder()
        .root("config", RootKind::Map)
        .root("entries", RootKind::Array)
        .root("notes", RootKind::Text)
        .build()
        .unwrap();

    let mut keys = doc.keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["config", "entries", "notes"]);

    assert!(doc.get("config").unwrap().as_map().is_some());
    assert!(doc.get("entries").unwrap().as_array().is_some());
    assert!(doc.get("notes").unwrap().as_text().is_some());
}

#[test]
fn test_missing_root_is_not_found() {
    let doc = setup_doc();
    let err = doc.get("nope").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_empty_root_name_is_rejected() {
    let doc = setup_doc();
    let err = doc.insert("", &Map::new()).unwrap_err();
    assert!(matches!(
        err,
        Error::Document(DocumentError::InvalidRootKey)
    ));
    let err = doc.get_or_insert::<Map>("").unwrap_err();
    assert!(matches!(
        err,
        Error::Document(DocumentError::InvalidRootKey)
    ));
}

#[test]
fn test_root_type_mismatch_is_rejected() {
    let doc = setup_doc();
    doc.get_or_insert::<Map>("data").unwrap();
    let err = doc.get_or_insert::<Text>("data").unwrap_err();
    assert!(matches!(
        err,
        Error::Document(DocumentError::RootTypeMismatch { .. })
    ));
}

#[test]
fn test_items_resolve_root_values() {
    let doc = setup_doc();
    put_entry(&doc, "k", 1);
    doc.get_or_insert::<Text>("notes").unwrap();

    let items = doc.items().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(doc.values().unwrap().len(), 2);
    for (name, value) in items {
        match name.as_str() {
            "data" => assert!(value.as_map().is_some()),
            "notes" => assert!(value.as_text().is_some()),
            other => panic!("unexpected root {other}"),
        }
    }
}

#[test]
fn test_update_exchange_between_replicas() {
    let doc_a = setup_doc();
    let doc_b = setup_doc();

    put_entry(&doc_a, "from_a", 1);
    sync_docs(&doc_a, &doc_b);

    let map_b = doc_b.get_or_insert::<Map>("data").unwrap();
    {
        let txn = doc_b.read_transaction().unwrap();
        assert_eq!(map_b.get(&txn, "from_a").unwrap().as_int(), Some(1));
    }

    put_entry(&doc_b, "from_b", 2);
    sync_docs(&doc_b, &doc_a);

    let map_a = doc_a.get_or_insert::<Map>("data").unwrap();
    let txn = doc_a.read_transaction().unwrap();
    assert_eq!(map_a.get(&txn, "from_b").unwrap().as_int(), Some(2));

    // Both replicas converge to the same state.
    drop(txn);
    assert_eq!(doc_a.get_state().unwrap(), doc_b.get_state().unwrap());
}

#[test]
fn test_incremental_updates_are_small() {
    let doc_a = setup_doc();
    let doc_b = setup_doc();

    put_entry(&doc_a, "k0", 0);
    sync_docs(&doc_a, &doc_b);

    put_entry(&doc_a, "k1", 1);
    let state_b = doc_b.get_state().unwrap();
    let diff = doc_a.get_update(Some(state_b.as_slice())).unwrap();
    let full = doc_a.get_update(None).unwrap();
    assert!(diff.len() < full.len());
}

#[test]
fn test_malformed_update_is_rejected() {
    let doc = setup_doc();
    let err = doc.apply_update(&[0xff, 0xff, 0xff, 0xff]).unwrap_err();
    assert!(err.is_malformed());

    let err = doc.get_update(Some(&[0xff, 0xff][..])).unwrap_err();
    assert!(err.is_malformed());
}

#[test]
fn test_fixed_client_id() {
    let doc = Document::builder().client_id(7).build().unwrap();
    assert_eq!(doc.client_id(), 7);
}

#[test]
fn test_subdocument_round_trip_through_map() {
    let doc = setup_doc();
    let map = doc.get_or_insert::<Map>("data").unwrap();

    let subdoc = Document::new();
    let guid = subdoc.guid();
    {
        let mut txn = doc.transaction(None).unwrap();
        map.insert(&mut txn, "nested", subdoc).unwrap();
    }

    let txn = doc.read_transaction().unwrap();
    let value = map.get(&txn, "nested").unwrap();
    let nested = value.as_doc().expect("nested value should be a document");
    assert_eq!(nested.guid(), guid);
}

/// Rejects any update that leaves a `forbidden` key in the config root.
struct ForbidKey;

impl UpdateValidator for ForbidKey {
    fn validate(&self, doc: &Document) -> Result<(), String> {
        let txn = doc.read_transaction().map_err(|err| err.to_string())?;
        let config = match doc.get_in(&txn, "config") {
            Ok(value) => value,
            Err(_) => return Ok(()),
        };
        let Some(map) = config.as_map() else {
            return Err("config root is not a map".to_owned());
        };
        if map
            .contains_key(&txn, "forbidden")
            .map_err(|err| err.to_string())?
        {
            Err("config contains a forbidden key".to_owned())
        } else {
            Ok(())
        }
    }
}

#[test]
fn test_validator_accepts_clean_updates() {
    let primary = Document::builder()
        .root("config", RootKind::Map)
        .validator(Arc::new(ForbidKey))
        .build()
        .unwrap();

    let source = setup_doc();
    let config = source.get_or_insert::<Map>("config").unwrap();
    {
        let mut txn = source.transaction(None).unwrap();
        config.insert(&mut txn, "version", 1).unwrap();
    }

    sync_docs(&source, &primary);
    let map = primary.get_or_insert::<Map>("config").unwrap();
    let txn = primary.read_transaction().unwrap();
    assert_eq!(map.get(&txn, "version").unwrap().as_int(), Some(1));
}

#[test]
fn test_validator_rejection_leaves_primary_untouched() {
    let primary = Document::builder()
        .root("config", RootKind::Map)
        .validator(Arc::new(ForbidKey))
        .build()
        .unwrap();

    let source = setup_doc();
    let config = source.get_or_insert::<Map>("config").unwrap();
    {
        let mut txn = source.transaction(None).unwrap();
        config.insert(&mut txn, "version", 1).unwrap();
    }
    sync_docs(&source, &primary);
    let state_before = primary.get_state().unwrap();

    // Introduce the forbidden key at the source and offer the diff.
    {
        let mut txn = source.transaction(None).unwrap();
        config.insert(&mut txn, "forbidden", true).unwrap();
    }
    let state = primary.get_state().unwrap();
    let bad_update = source.get_update(Some(state.as_slice())).unwrap();
    let err = primary.apply_update(&bad_update).unwrap_err();
    assert!(err.is_validation());

    // The rejected update never reached the primary.
    assert_eq!(primary.get_state().unwrap(), state_before);

    // After the source retracts the key, the next update passes again:
    // the twin was rebuilt from the primary, not left poisoned.
    {
        let mut txn = source.transaction(None).unwrap();
        config.remove(&mut txn, "forbidden").unwrap();
        config.insert(&mut txn, "version", 2).unwrap();
    }
    let state = primary.get_state().unwrap();
    let good_update = source.get_update(Some(state.as_slice())).unwrap();
    primary.apply_update(&good_update).unwrap();

    let map = primary.get_or_insert::<Map>("config").unwrap();
    let txn = primary.read_transaction().unwrap();
    assert_eq!(map.get(&txn, "version").unwrap().as_int(), Some(2));
    assert!(!map.contains_key(&txn, "forbidden").unwrap());
}

#[test]
fn test_array_and_text_roots_work_via_insert() {
    let doc = setup_doc();
    doc.insert("entries", &Array::from([1, 2, 3])).unwrap();
    doc.insert("notes", &Text::from("hello")).unwrap();

    let txn = doc.read_transaction().unwrap();
    let entries = doc.get_in(&txn, "entries").unwrap();
    assert_eq!(entries.as_array().unwrap().len(&txn).unwrap(), 3);
    let notes = doc.get_in(&txn, "notes").unwrap();
    assert_eq!(notes.as_text().unwrap().get_string(&txn).unwrap(), "hello");
}
