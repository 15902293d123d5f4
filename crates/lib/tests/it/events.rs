//! Event distribution tests: callback observers, stream fan-out, ordering,
//! backpressure eviction and lazy teardown of the native callback.

use std::sync::{Arc, Mutex};

use chorus::{Document, Map, Origin};

use crate::helpers::*;

fn mutate(doc: &Document, map: &Map, origin: &str, key: &str) {
    let mut txn = doc.transaction(Some(origin.into())).unwrap();
    map.insert(&mut txn, key, 1).unwrap();
    txn.commit();
}

#[tokio::test]
async fn test_fanout_delivers_one_event_per_stream() {
    let doc = setup_doc();
    let map = doc.get_or_insert::<Map>("data").unwrap();

    let mut first = doc.commit_events(None).unwrap();
    let mut second = doc.commit_events(None).unwrap();

    mutate(&doc, &map, "edit", "k");

    let event_a = first.recv().await.unwrap();
    let event_b = second.recv().await.unwrap();
    assert!(!event_a.update.is_empty());
    assert_eq!(event_a.update, event_b.update);
    assert_eq!(event_a.origin, Some(Origin::from("edit")));

    // Exactly one event each.
    assert!(first.try_recv().is_none());
    assert!(second.try_recv().is_none());
}

#[tokio::test]
async fn test_events_arrive_in_commit_order() {
    let doc = setup_doc();
    let map = doc.get_or_insert::<Map>("data").unwrap();
    let mut stream = doc.commit_events(None).unwrap();

    mutate(&doc, &map, "first", "a");
    mutate(&doc, &map, "second", "b");
    mutate(&doc, &map, "third", "c");

    for expected in ["first", "second", "third"] {
        let event = stream.recv().await.unwrap();
        assert_eq!(event.origin, Some(Origin::from(expected)));
    }
}

#[tokio::test]
async fn test_dropping_one_stream_leaves_the_other_intact() {
    let doc = setup_doc();
    let map = doc.get_or_insert::<Map>("data").unwrap();

    let mut kept = doc.commit_events(None).unwrap();
    let dropped = doc.commit_events(None).unwrap();
    drop(dropped);

    mutate(&doc, &map, "one", "a");
    mutate(&doc, &map, "two", "b");

    assert_eq!(
        kept.recv().await.unwrap().origin,
        Some(Origin::from("one"))
    );
    assert_eq!(
        kept.recv().await.unwrap().origin,
        Some(Origin::from("two"))
    );
}

#[tokio::test]
async fn test_last_stream_drop_releases_native_callback() {
    let doc = setup_doc();
    let map = doc.get_or_insert::<Map>("data").unwrap();

    let stream = doc.commit_events(None).unwrap();
    drop(stream);

    // This commit evicts the dead queue and unregisters the native callback.
    mutate(&doc, &map, "unseen", "a");

    // A fresh stream re-registers and only sees events from here on.
    let mut stream = doc.commit_events(None).unwrap();
    mutate(&doc, &map, "seen", "b");

    let event = stream.recv().await.unwrap();
    assert_eq!(event.origin, Some(Origin::from("seen")));
    assert!(stream.try_recv().is_none());
}

#[tokio::test]
async fn test_bounded_stream_overflow_evicts_only_that_stream() {
    let doc = setup_doc();
    let map = doc.get_or_insert::<Map>("data").unwrap();

    let mut slow = doc.commit_events(Some(1)).unwrap();
    let mut fast = doc.commit_events(None).unwrap();

    // The slow consumer never drains: the second commit overflows its
    // buffer and evicts it; the third still reaches the fast consumer.
    mutate(&doc, &map, "one", "a");
    mutate(&doc, &map, "two", "b");
    mutate(&doc, &map, "three", "c");

    for expected in ["one", "two", "three"] {
        let event = fast.recv().await.unwrap();
        assert_eq!(event.origin, Some(Origin::from(expected)));
    }

    // The evicted stream still drains what it buffered, then ends.
    assert_eq!(
        slow.recv().await.unwrap().origin,
        Some(Origin::from("one"))
    );
    assert!(slow.recv().await.is_none());
}

#[tokio::test]
async fn test_subdoc_events_report_added_guids() {
    let doc = setup_doc();
    let map = doc.get_or_insert::<Map>("data").unwrap();
    let mut stream = doc.subdoc_events(None).unwrap();

    let subdoc = Document::new();
    let guid = subdoc.guid();
    {
        let mut txn = doc.transaction(None).unwrap();
        map.insert(&mut txn, "nested", subdoc).unwrap();
    }

    let event = stream.recv().await.unwrap();
    assert!(event.added.contains(&guid));
}

#[test]
fn test_observe_callback_and_unobserve() {
    let doc = setup_doc();
    let map = doc.get_or_insert::<Map>("data").unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let subscription = {
        let seen = Arc::clone(&seen);
        doc.observe(move |event| seen.lock().unwrap().push(event.origin))
            .unwrap()
    };

    mutate(&doc, &map, "tag", "a");
    assert_eq!(seen.lock().unwrap().as_slice(), &[Some(Origin::from("tag"))]);

    assert!(doc.unobserve(subscription));
    assert!(!doc.unobserve(subscription));

    mutate(&doc, &map, "tag", "b");
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[test]
fn test_observe_subdocs_callback() {
    let doc = setup_doc();
    let map = doc.get_or_insert::<Map>("data").unwrap();

    let added = Arc::new(Mutex::new(Vec::new()));
    {
        let added = Arc::clone(&added);
        doc.observe_subdocs(move |event| {
            added.lock().unwrap().extend(event.added.clone());
        })
        .unwrap();
    }

    let subdoc = Document::new();
    let guid = subdoc.guid();
    {
        let mut txn = doc.transaction(None).unwrap();
        map.insert(&mut txn, "nested", subdoc).unwrap();
    }

    assert!(added.lock().unwrap().contains(&guid));
}
