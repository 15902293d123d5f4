use chorus::{Document, Map};

/// Fresh single-threaded document.
pub fn setup_doc() -> Document {
    Document::new()
}

/// Fresh document allowing cross-thread transactions.
pub fn setup_mt_doc() -> Document {
    Document::builder()
        .allow_multithreading(true)
        .build()
        .expect("Failed to build multithreaded document")
}

/// Bring `to` up to date with everything `from` has seen.
pub fn sync_docs(from: &Document, to: &Document) {
    let state = to.get_state().expect("Failed to read target state");
    let update = from
        .get_update(Some(state.as_slice()))
        .expect("Failed to compute update");
    to.apply_update(&update).expect("Failed to apply update");
}

/// Create a `data` map root and set one key inside its own transaction.
pub fn put_entry(doc: &Document, key: &str, value: i64) {
    let map = doc
        .get_or_insert::<Map>("data")
        .expect("Failed to get data root");
    let mut txn = doc.transaction(None).expect("Failed to open transaction");
    map.insert(&mut txn, key, value).expect("Failed to insert");
    txn.commit();
}
