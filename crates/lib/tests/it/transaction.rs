//! Transaction acquisition protocol tests: origin reuse, mutual exclusion,
//! timeouts, read-only enforcement and guaranteed release.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use chorus::{Map, Origin};

use crate::helpers::*;

#[test]
fn test_nested_same_origin_reuses_transaction() {
    let doc = setup_doc();
    let map = doc.get_or_insert::<Map>("data").unwrap();

    let origin = Origin::from("sync");
    let mut txn = doc.transaction(Some(origin.clone())).unwrap();

    // A nested scope asking for the same origin gets the same transaction.
    {
        let nested = txn.nested(Some(&origin)).unwrap();
        map.insert(nested, "from_nested", 1).unwrap();
    }
    // Asking for no origin always succeeds.
    {
        let nested = txn.nested(None).unwrap();
        map.insert(nested, "from_unset", 2).unwrap();
    }
    txn.commit();

    let txn = doc.read_transaction().unwrap();
    assert_eq!(map.get(&txn, "from_nested").unwrap().as_int(), Some(1));
    assert_eq!(map.get(&txn, "from_unset").unwrap().as_int(), Some(2));
}

#[test]
fn test_nested_different_origin_fails() {
    let doc = setup_doc();

    let mut txn = doc.transaction(Some("sync".into())).unwrap();
    let undo = Origin::from("undo");
    let err = txn.nested(Some(&undo)).unwrap_err();
    assert!(err.is_incompatible_origin());

    // An unset active origin is just as incompatible with an explicit one.
    drop(txn);
    let mut txn = doc.transaction(None).unwrap();
    let err = txn.nested(Some(&undo)).unwrap_err();
    assert!(err.is_incompatible_origin());
}

#[test]
fn test_reentrant_acquisition_is_a_conflict() {
    let doc = setup_doc();
    let _txn = doc.transaction(None).unwrap();

    let err = doc.transaction(None).unwrap_err();
    assert!(err.is_conflict());
}

#[test]
fn test_blocking_acquisition_requires_multithreading() {
    let doc = setup_doc();
    let txn = doc.transaction(None).unwrap();

    let other = doc.clone();
    let err = thread::spawn(move || other.transaction(None).unwrap_err())
        .join()
        .unwrap();
    assert!(err.is_conflict());
    drop(txn);
}

#[test]
fn test_mutual_exclusion_across_threads() {
    let doc = setup_mt_doc();
    let released = Arc::new(AtomicBool::new(false));

    let txn = doc.transaction(None).unwrap();

    let waiter = {
        let doc = doc.clone();
        let released = Arc::clone(&released);
        thread::spawn(move || {
            let txn = doc.new_transaction_blocking(None, None).unwrap();
            // The holder must have released before we got the slot.
            assert!(released.load(Ordering::SeqCst));
            drop(txn);
        })
    };

    // Give the waiter time to block on the slot.
    thread::sleep(Duration::from_millis(100));
    released.store(true, Ordering::SeqCst);
    drop(txn);

    waiter.join().unwrap();
}

#[test]
fn test_acquisition_timeout_leaves_document_usable() {
    let doc = setup_mt_doc();
    let state_before = doc.get_state().unwrap();

    let (hold_tx, hold_rx) = mpsc::channel::<()>();
    let holder = {
        let doc = doc.clone();
        thread::spawn(move || {
            let txn = doc.transaction(None).unwrap();
            hold_rx.recv().unwrap();
            drop(txn);
        })
    };

    // Wait until the holder actually has the slot.
    thread::sleep(Duration::from_millis(50));
    let err = doc
        .new_transaction_blocking(None, Some(Duration::from_millis(30)))
        .unwrap_err();
    assert!(err.is_timeout());

    hold_tx.send(()).unwrap();
    holder.join().unwrap();

    // The failed attempt mutated nothing and left no stale waiter behind.
    assert_eq!(doc.get_state().unwrap(), state_before);
    let txn = doc.transaction(None).unwrap();
    drop(txn);
}

#[tokio::test]
async fn test_async_acquisition_honors_timeout_without_multithreading() {
    let doc = setup_doc();
    let txn = doc.transaction(None).unwrap();

    let err = doc
        .new_transaction(None, Some(Duration::from_millis(30)))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    drop(txn);
    let txn = doc.new_transaction(None, None).await.unwrap();
    drop(txn);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_acquisition_waits_for_release() {
    let doc = setup_mt_doc();
    let txn = doc.transaction(None).unwrap();

    let waiter = {
        let doc = doc.clone();
        tokio::spawn(async move {
            let txn = doc
                .new_transaction(None, Some(Duration::from_secs(5)))
                .await?;
            drop(txn);
            Ok::<_, chorus::Error>(())
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(txn);
    waiter.await.unwrap().unwrap();
}

#[test]
fn test_read_only_transaction_rejects_mutations() {
    let doc = setup_doc();
    let map = doc.get_or_insert::<Map>("data").unwrap();
    {
        let mut txn = doc.transaction(None).unwrap();
        map.insert(&mut txn, "present", 1).unwrap();
    }
    let state_before = doc.get_state().unwrap();

    {
        let mut txn = doc.read_transaction().unwrap();
        assert!(!txn.is_writable());

        let err = map.insert(&mut txn, "nope", 2).unwrap_err();
        assert!(err.is_read_only());
        let err = map.remove(&mut txn, "present").unwrap_err();
        assert!(err.is_read_only());
        let err = doc.apply_update_in(&mut txn, &[0, 0]).unwrap_err();
        assert!(err.is_read_only());
        let err = doc.insert_in(&mut txn, "other", &Map::new()).unwrap_err();
        assert!(err.is_read_only());

        // Reads still work under the same guard.
        assert_eq!(map.get(&txn, "present").unwrap().as_int(), Some(1));
    }

    // Engine state is byte-for-byte unchanged.
    assert_eq!(doc.get_state().unwrap(), state_before);
}

#[test]
fn test_slot_released_when_holder_panics() {
    let doc = setup_doc();
    {
        let doc = doc.clone();
        let result = thread::spawn(move || {
            let _txn = doc.transaction(None).unwrap();
            panic!("holder died");
        })
        .join();
        assert!(result.is_err());
    }

    // The slot was released on unwind; the document is not locked forever.
    let txn = doc.transaction(None).unwrap();
    drop(txn);
}

#[test]
fn test_with_transaction_commits_and_releases() {
    let doc = setup_doc();
    let map = doc.get_or_insert::<Map>("data").unwrap();

    doc.with_transaction(Some("batch".into()), |txn| {
        map.insert(txn, "a", 1)?;
        map.insert(txn, "b", 2)?;
        Ok(())
    })
    .unwrap();

    let txn = doc.read_transaction().unwrap();
    assert_eq!(map.len(&txn).unwrap(), 2);
}

#[test]
fn test_transaction_from_other_document_is_rejected() {
    let doc_a = setup_doc();
    let doc_b = setup_doc();
    let map = doc_a.get_or_insert::<Map>("data").unwrap();

    let mut txn_b = doc_b.transaction(None).unwrap();
    let err = map.insert(&mut txn_b, "x", 1).unwrap_err();
    assert!(err.is_conflict());
}
