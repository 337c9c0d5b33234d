use tablekv::cluster::hkey;
use tablekv::{Entry, StoreConfig, TableStore};

fn store() -> TableStore {
    TableStore::new(StoreConfig::default())
}

#[test]
fn read_after_write() {
    let mut store = store();
    let hk = hkey("test", "alpha");

    let entry = Entry::new("alpha", b"value-1", 10);
    let _ = store.put(hk, &entry).unwrap();
    assert_eq!(store.get(hk).unwrap(), entry);

    // A later put on the same hkey shadows the previous value.
    let replacement = Entry::new("alpha", b"value-2", 20);
    let _ = store.put(hk, &replacement).unwrap();
    assert_eq!(store.get(hk).unwrap(), replacement);
}

#[test]
fn missing_keys_report_key_not_found() {
    let store = store();
    assert!(store.get(12345).is_err());
    assert!(store.get_raw(12345).is_err());
    assert!(store.get_ttl(12345).is_err());
    assert!(store.get_key(12345).is_err());
    assert!(!store.check(12345));
}

#[test]
fn overflow_appends_table_and_signals_fragmentation() {
    let mut store = store();
    let payload = vec![0xABu8; 30 * 1024];

    // Two 30 kB entries fit in the 64 KiB first table; the third spills.
    let first = store.put(hkey("test", "k0"), &Entry::new("k0", &payload, 1)).unwrap();
    let second = store.put(hkey("test", "k1"), &Entry::new("k1", &payload, 2)).unwrap();
    assert!(!first.is_fragmented());
    assert!(!second.is_fragmented());
    assert_eq!(store.num_tables(), 1);

    let third = store.put(hkey("test", "k2"), &Entry::new("k2", &payload, 3)).unwrap();
    assert!(third.is_fragmented());
    assert_eq!(store.num_tables(), 2);

    // Reads still resolve across the chain.
    for key in ["k0", "k1", "k2"] {
        assert_eq!(store.get(hkey("test", key)).unwrap().key(), key);
    }
}

#[test]
fn chain_shadowing_prefers_the_newest_table() {
    let mut store = store();
    let payload = vec![1u8; 30 * 1024];
    let hk = hkey("test", "shadowed");

    let _ = store.put(hk, &Entry::new("shadowed", b"old", 1)).unwrap();

    // Force the chain to grow, then overwrite in the newest table.
    let _ = store.put(hkey("test", "f0"), &Entry::new("f0", &payload, 2)).unwrap();
    let _ = store.put(hkey("test", "f1"), &Entry::new("f1", &payload, 3)).unwrap();
    let _ = store.put(hkey("test", "f2"), &Entry::new("f2", &payload, 4)).unwrap();
    assert!(store.num_tables() > 1);

    let _ = store.put(hk, &Entry::new("shadowed", b"new", 5)).unwrap();
    assert_eq!(store.get(hk).unwrap().value(), b"new");

    // Both copies are indexed, newest wins.
    assert_eq!(
        store.len(),
        5,
        "the stale frozen-table copy remains indexed until deleted"
    );
}

#[test]
fn delete_is_total_across_the_chain() {
    let mut store = store();
    let payload = vec![2u8; 30 * 1024];
    let hk = hkey("test", "doomed");

    let _ = store.put(hk, &Entry::new("doomed", b"v1", 1)).unwrap();
    let _ = store.put(hkey("test", "f0"), &Entry::new("f0", &payload, 2)).unwrap();
    let _ = store.put(hkey("test", "f1"), &Entry::new("f1", &payload, 3)).unwrap();
    let _ = store.put(hkey("test", "f2"), &Entry::new("f2", &payload, 4)).unwrap();
    let _ = store.put(hk, &Entry::new("doomed", b"v2", 5)).unwrap();
    assert!(store.num_tables() > 1);

    let _ = store.delete(hk);
    assert!(store.get(hk).is_err(), "no frozen-table copy may resurrect");
    assert!(!store.check(hk));
}

#[test]
fn raw_round_trip_preserves_the_frame() {
    let mut source = store();
    let mut target = store();
    let hk = hkey("test", "raw");

    let entry = Entry::new("raw", b"replicated", 9).with_ttl(1_000);
    let _ = source.put(hk, &entry).unwrap();

    let frame = source.get_raw(hk).unwrap().to_vec();
    let _ = target.put_raw(hk, &frame).unwrap();

    assert_eq!(target.get(hk).unwrap(), entry);
    assert_eq!(target.get_ttl(hk).unwrap(), 1_000);
    assert_eq!(target.get_key(hk).unwrap(), "raw");
}

#[test]
fn range_visits_newest_first_and_stops_on_false() {
    let mut store = store();
    for i in 0..10 {
        let key = format!("key-{i}");
        let _ = store
            .put(hkey("test", &key), &Entry::new(&key, b"v", i))
            .unwrap();
    }

    let mut seen = 0;
    store.range(|_, _| {
        seen += 1;
        true
    });
    assert_eq!(seen, 10);

    let mut visited = 0;
    store.range(|_, _| {
        visited += 1;
        visited < 3
    });
    assert_eq!(visited, 3);
}

#[test]
fn match_on_key_filters_by_pattern() {
    let mut store = store();
    for key in ["user:1", "user:2", "session:1"] {
        let _ = store
            .put(hkey("test", key), &Entry::new(key, b"v", 1))
            .unwrap();
    }

    let mut users = Vec::new();
    store
        .match_on_key("^user:", |_, entry| {
            users.push(entry.key().to_string());
            true
        })
        .unwrap();
    users.sort();
    assert_eq!(users, ["user:1", "user:2"]);

    assert!(store.match_on_key("(unclosed", |_, _| true).is_err());
}

#[test]
fn update_ttl_rewrites_frozen_entries_into_the_newest_table() {
    let mut store = store();
    let payload = vec![3u8; 30 * 1024];
    let hk = hkey("test", "ttl-key");

    let _ = store
        .put(hk, &Entry::new("ttl-key", b"v", 1).with_ttl(500))
        .unwrap();
    let _ = store.put(hkey("test", "f0"), &Entry::new("f0", &payload, 2)).unwrap();
    let _ = store.put(hkey("test", "f1"), &Entry::new("f1", &payload, 3)).unwrap();
    let _ = store.put(hkey("test", "f2"), &Entry::new("f2", &payload, 4)).unwrap();
    assert!(store.num_tables() > 1);

    let refreshed = Entry::new("ttl-key", b"v", 6).with_ttl(9_000);
    let _ = store.update_ttl(hk, &refreshed).unwrap();

    assert_eq!(store.get_ttl(hk).unwrap(), 9_000);
    assert_eq!(store.get(hk).unwrap().value(), b"v");
    // The frozen copy was deleted during the rewrite, so the key is
    // indexed exactly once.
    let _ = store.delete(hk);
    assert!(!store.check(hk));
}

#[test]
fn update_ttl_for_missing_key_fails() {
    let mut store = store();
    let refreshed = Entry::new("ghost", b"", 1).with_ttl(10);
    assert!(store.update_ttl(hkey("test", "ghost"), &refreshed).is_err());
}

#[test]
fn stats_sum_across_tables() {
    let mut store = store();
    let payload = vec![4u8; 30 * 1024];
    for i in 0..3 {
        let key = format!("k{i}");
        let _ = store
            .put(hkey("test", &key), &Entry::new(&key, &payload, i))
            .unwrap();
    }

    let stats = store.stats();
    assert_eq!(stats.num_tables, store.num_tables());
    assert_eq!(stats.inuse, store.inuse());
    assert!(stats.allocated >= stats.inuse + stats.garbage);
    assert_eq!(store.len(), 3);
}

#[test]
fn fork_yields_an_empty_engine_with_the_same_configuration() {
    let mut store = TableStore::new(StoreConfig { table_size: 1 << 17 });
    let _ = store
        .put(hkey("test", "k"), &Entry::new("k", b"v", 1))
        .unwrap();

    let fork = store.fork();
    assert!(fork.is_empty());
    assert_eq!(fork.stats().allocated, 1 << 17);
}
