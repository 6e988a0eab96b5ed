use seqkv::{SequencedStore, ValueRecord};
use std::sync::Arc;

// Sequence numbers for one key are exactly 1..=N in call order
#[test]
fn leader_sequences_are_gap_free() {
    let store = SequencedStore::new();
    let seqs: Vec<u64> = (0..10)
        .map(|i| store.put_with_seq("key1".to_owned(), format!("value{i}")))
        .collect();
    assert_eq!(seqs, (1..=10).collect::<Vec<_>>());
    assert_eq!(store.get("key1"), Some(ValueRecord::new("value9", 10)));
}

#[test]
fn get_missing_key_is_none() {
    let store = SequencedStore::new();
    store.put_with_seq("key1".to_owned(), "value1".to_owned());
    assert_eq!(store.get("key2"), None);
}

#[test]
fn stale_replication_is_ignored() {
    let store = SequencedStore::new();
    assert!(store.replicate("key1".to_owned(), "new".to_owned(), 5));

    assert!(!store.replicate("key1".to_owned(), "equal".to_owned(), 5));
    assert!(!store.replicate("key1".to_owned(), "older".to_owned(), 2));
    assert_eq!(store.get("key1"), Some(ValueRecord::new("new", 5)));
}

#[test]
fn newer_replication_is_applied() {
    let store = SequencedStore::new();
    assert!(store.replicate("key1".to_owned(), "v1".to_owned(), 1));
    assert!(store.replicate("key1".to_owned(), "v9".to_owned(), 9));
    assert_eq!(store.get("key1"), Some(ValueRecord::new("v9", 9)));
}

#[test]
fn duplicate_delivery_is_idempotent() {
    let store = SequencedStore::new();
    assert!(store.replicate("key1".to_owned(), "v".to_owned(), 1));
    let before = store.dump();
    assert!(!store.replicate("key1".to_owned(), "v".to_owned(), 1));
    assert_eq!(store.dump(), before);
}

// Delivering 2, 1, 3 must end on 3 and never regress to 1
#[test]
fn out_of_order_delivery_converges() {
    let store = SequencedStore::new();
    assert!(store.replicate("key1".to_owned(), "two".to_owned(), 2));
    assert!(!store.replicate("key1".to_owned(), "one".to_owned(), 1));
    assert_eq!(store.get("key1"), Some(ValueRecord::new("two", 2)));
    assert!(store.replicate("key1".to_owned(), "three".to_owned(), 3));
    assert!(!store.replicate("key1".to_owned(), "one".to_owned(), 1));
    assert_eq!(store.get("key1"), Some(ValueRecord::new("three", 3)));
}

#[test]
fn dump_and_reset() {
    let store = SequencedStore::new();
    store.put_with_seq("b".to_owned(), "2".to_owned());
    store.put_with_seq("a".to_owned(), "1".to_owned());
    store.replicate("c".to_owned(), "3".to_owned(), 4);

    let dump = store.dump();
    assert_eq!(
        dump.keys().cloned().collect::<Vec<_>>(),
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    );
    assert_eq!(dump["c"], ValueRecord::new("3", 4));

    store.reset();
    assert!(store.dump().is_empty());
    assert_eq!(store.put_with_seq("a".to_owned(), "again".to_owned()), 1);
}

// Readers racing writers never see a record ahead of what was assigned, nor one
// which goes backwards.
#[test]
fn concurrent_dumps_are_never_torn() {
    let store = Arc::new(SequencedStore::new());
    let writer = {
        let store = store.clone();
        std::thread::spawn(move || {
            for i in 0..1000 {
                store.put_with_seq("a".to_owned(), i.to_string());
                store.put_with_seq("b".to_owned(), i.to_string());
            }
        })
    };

    let mut last = 0;
    for _ in 0..200 {
        let dump = store.dump();
        let a = dump.get("a").map(|r| r.seq).unwrap_or(0);
        let b = dump.get("b").map(|r| r.seq).unwrap_or(0);
        // "a" is always written first, so a snapshot sees it at most one ahead.
        assert!(a == b || a == b + 1, "torn snapshot a={a} b={b}");
        assert!(a >= last);
        last = a;
    }
    writer.join().unwrap();
    assert_eq!(store.get("b").unwrap().seq, 1000);
}
