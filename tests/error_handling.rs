//! Error handling and edge case tests.

use atomkv::{
    canonicalize, parse_revision_hint, Engine, EngineConfig, Key, KvError, Revision,
    SubscriptionPath,
};
use std::thread;
use std::time::Duration;

fn test_engine() -> Engine {
    Engine::new(EngineConfig::default()).unwrap()
}

// --- Syntax Errors ---

#[test]
fn test_invalid_keys_never_reach_the_engine() {
    for raw in ["", "/", "fib", "/fib/", "/a//b", "/a b", "/a?b"] {
        assert!(
            matches!(Key::parse(raw), Err(KvError::InvalidKey(_))),
            "{raw:?} should be rejected"
        );
    }
}

#[test]
fn test_root_cannot_be_subscribed() {
    assert!(matches!(
        SubscriptionPath::parse("/"),
        Err(KvError::InvalidPath(_))
    ));
}

#[test]
fn test_invalid_payload() {
    let err = canonicalize(b"{not json}").unwrap_err();
    assert!(matches!(err, KvError::InvalidPayload(_)));
    assert!(err.to_string().starts_with("invalid JSON"));
}

#[test]
fn test_missing_or_invalid_revision_hint() {
    assert!(matches!(parse_revision_hint(None), Err(KvError::MissingRevision)));
    assert!(matches!(
        parse_revision_hint(Some("1.5")),
        Err(KvError::InvalidRevision(_))
    ));
}

// --- Conflicts ---

#[test]
fn test_conflict_leaves_state_unchanged() {
    let engine = test_engine();
    let k = Key::parse("/stable").unwrap();
    engine.set(&k, "1").unwrap();

    for stale in [0, 2, 5, u64::MAX] {
        assert!(!engine.update(&k, "bad", Revision(stale)).unwrap());
    }

    let entry = engine.get(&k).unwrap().unwrap();
    assert_eq!(entry.value, "1");
    assert_eq!(entry.revision, Revision(0));
}

// --- Closed Engine ---

#[test]
fn test_operations_after_close_fail_fast() {
    let engine = test_engine();
    let k = Key::parse("/k").unwrap();
    let p = SubscriptionPath::parse("/k").unwrap();
    engine.set(&k, "1").unwrap();
    engine.close();

    assert!(matches!(engine.get(&k), Err(KvError::Closed)));
    assert!(matches!(engine.set(&k, "2"), Err(KvError::Closed)));
    assert!(matches!(engine.update(&k, "2", Revision(1)), Err(KvError::Closed)));
    assert!(matches!(engine.delete(&k), Err(KvError::Closed)));
    assert!(matches!(engine.subscribe(&p), Err(KvError::Closed)));
    assert!(matches!(engine.stats(), Err(KvError::Closed)));
}

#[test]
fn test_close_from_another_clone() {
    let engine = test_engine();
    let other = engine.clone();

    let closer = thread::spawn(move || other.close());
    closer.join().unwrap();

    assert!(engine.is_closed());
    assert!(matches!(
        engine.get(&Key::parse("/x").unwrap()),
        Err(KvError::Closed)
    ));
}

#[test]
fn test_close_disconnects_subscribers() {
    let engine = test_engine();
    let handle = engine
        .subscribe(&SubscriptionPath::parse("/live/").unwrap())
        .unwrap();
    engine.close();

    // The worker dropped every sender on exit.
    assert!(handle.recv_timeout(Duration::from_secs(1)).is_err());
    assert!(handle.recv().is_err());
}

#[test]
fn test_drop_last_clone_stops_worker() {
    let engine = test_engine();
    let handle = engine
        .subscribe(&SubscriptionPath::parse("/d").unwrap())
        .unwrap();
    drop(engine);
    assert!(handle.recv().is_err());
}

// --- Error Messages ---

#[test]
fn test_error_display() {
    assert_eq!(KvError::Closed.to_string(), "engine closed");
    assert_eq!(KvError::MissingRevision.to_string(), "missing revision");
    assert_eq!(
        KvError::conflict("/k", Revision(3)).to_string(),
        "revision conflict on /k: expected 3"
    );
}
