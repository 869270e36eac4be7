//! Engine contract conformance suite.
//!
//! Every backend is expected to pass this suite. The checks mirror the
//! guarantees listed in the [`crate::engine`] module docs: one writer,
//! snapshot-isolated readers, ordered lazy iteration in both directions,
//! discard-on-drop, and errors on finished transactions.
//!
//! Usage, from a backend's test module:
//!
//! ```ignore
//! genji::engine::conformance::run_all(MyEngine::new);
//! ```

use super::{Direction, Engine};
use std::sync::mpsc;
use std::time::Duration;

/// Runs every conformance check, each against a fresh engine.
pub fn run_all<E, F>(new_engine: F)
where
    E: Engine + 'static,
    F: Fn() -> E,
{
    check_put_get_delete(&new_engine());
    check_iterate_ascending(&new_engine());
    check_iterate_descending(&new_engine());
    check_rollback_discards(&new_engine());
    check_drop_discards(&new_engine());
    check_snapshot_isolation(&new_engine());
    check_finished_transaction_errors(&new_engine());
    check_single_writer(new_engine());
}

pub fn check_put_get_delete(engine: &dyn Engine) {
    let mut tx = engine.begin(true).unwrap();
    assert_eq!(tx.get(b"a").unwrap(), None);
    tx.put(b"a", b"1").unwrap();
    tx.put(b"a", b"2").unwrap();
    assert_eq!(tx.get(b"a").unwrap(), Some(b"2".to_vec()), "put must overwrite");
    tx.delete(b"a").unwrap();
    assert!(tx.delete(b"a").is_err(), "deleting an absent key must fail");
    tx.commit().unwrap();
}

pub fn check_iterate_ascending(engine: &dyn Engine) {
    let mut tx = engine.begin(true).unwrap();
    for key in [&b"b"[..], b"d", b"a", b"c"] {
        tx.put(key, key).unwrap();
    }
    tx.commit().unwrap();

    let tx = engine.begin(false).unwrap();
    let keys: Vec<_> = tx
        .iterate(b"b", Direction::Forward)
        .unwrap()
        .map(|r| r.unwrap().0)
        .collect();
    assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
}

pub fn check_iterate_descending(engine: &dyn Engine) {
    let mut tx = engine.begin(true).unwrap();
    for key in [&b"a"[..], b"b", b"c"] {
        tx.put(key, key).unwrap();
    }
    tx.commit().unwrap();

    let tx = engine.begin(false).unwrap();
    let keys: Vec<_> = tx
        .iterate(b"b", Direction::Reverse)
        .unwrap()
        .map(|r| r.unwrap().0)
        .collect();
    assert_eq!(keys, vec![b"b".to_vec(), b"a".to_vec()]);
}

pub fn check_rollback_discards(engine: &dyn Engine) {
    let mut tx = engine.begin(true).unwrap();
    tx.put(b"k", b"v").unwrap();
    tx.rollback().unwrap();

    let tx = engine.begin(false).unwrap();
    assert_eq!(tx.get(b"k").unwrap(), None, "rollback must discard writes");
}

pub fn check_drop_discards(engine: &dyn Engine) {
    {
        let mut tx = engine.begin(true).unwrap();
        tx.put(b"k", b"v").unwrap();
    }
    let tx = engine.begin(false).unwrap();
    assert_eq!(tx.get(b"k").unwrap(), None, "drop without commit must discard");
}

pub fn check_snapshot_isolation(engine: &dyn Engine) {
    let mut tx = engine.begin(true).unwrap();
    tx.put(b"k", b"old").unwrap();
    tx.commit().unwrap();

    let reader = engine.begin(false).unwrap();

    let mut writer = engine.begin(true).unwrap();
    writer.put(b"k", b"new").unwrap();
    writer.put(b"k2", b"v2").unwrap();
    writer.commit().unwrap();

    assert_eq!(
        reader.get(b"k").unwrap(),
        Some(b"old".to_vec()),
        "reader must keep seeing its snapshot after a later commit"
    );
    assert_eq!(reader.get(b"k2").unwrap(), None);

    let fresh = engine.begin(false).unwrap();
    assert_eq!(fresh.get(b"k").unwrap(), Some(b"new".to_vec()));
}

pub fn check_finished_transaction_errors(engine: &dyn Engine) {
    let mut tx = engine.begin(true).unwrap();
    tx.commit().unwrap();
    assert!(tx.get(b"k").is_err());
    assert!(tx.put(b"k", b"v").is_err());
    assert!(tx.iterate(b"", Direction::Forward).is_err());
    assert!(tx.commit().is_err());
    assert!(tx.rollback().is_err());

    let mut tx = engine.begin(false).unwrap();
    assert!(tx.put(b"k", b"v").is_err(), "read-only transaction must reject writes");
}

/// A second writer must block until the first finishes, then proceed.
pub fn check_single_writer<E: Engine + 'static>(engine: E) {
    let engine = std::sync::Arc::new(engine);
    let mut first = engine.begin(true).unwrap();
    first.put(b"k", b"v").unwrap();

    let (sender, receiver) = mpsc::channel();
    let engine2 = std::sync::Arc::clone(&engine);
    let handle = std::thread::spawn(move || {
        let mut tx = engine2.begin(true).unwrap();
        sender.send(()).unwrap();
        tx.put(b"k2", b"v2").unwrap();
        tx.commit().unwrap();
    });

    assert!(
        receiver.recv_timeout(Duration::from_millis(200)).is_err(),
        "second writer must block while the first is active"
    );

    first.commit().unwrap();
    receiver
        .recv_timeout(Duration::from_secs(5))
        .expect("second writer must proceed once the first commits");
    handle.join().unwrap();

    let tx = engine.begin(false).unwrap();
    assert_eq!(tx.get(b"k2").unwrap(), Some(b"v2".to_vec()));
}
