//! EntryTable: structural layer mapping keys to slots behind stable handles.

use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;

/// Stable, generational address of one entry. A handle taken before an
/// entry is removed never resolves to a later entry reusing the same slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(DefaultKey);

impl Handle {
    pub(crate) fn new(k: DefaultKey) -> Self {
        Handle(k)
    }
    pub(crate) fn raw_handle(&self) -> DefaultKey {
        self.0
    }
}

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    hash: u64,
}

/// Result of [`EntryTable::upsert_with`].
#[derive(Debug)]
pub enum Upsert<K, V> {
    /// The key was new.
    Inserted,
    /// The key existed. The stored key is kept; the duplicate `key` passed in
    /// and the previous `value` are handed back so the caller chooses where
    /// they are dropped.
    Replaced { key: K, value: V },
}

pub struct EntryTable<K, V, S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Entry<K, V>>, // storage using generational keys
}

#[cfg(test)]
impl<K, V> EntryTable<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_capacity_and_hasher(0, Default::default())
    }
}

/// Iterator over entries in `EntryTable`.
pub struct Iter<'a, K, V> {
    it: slotmap::basic::Iter<'a, DefaultKey, Entry<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (Handle, &'a K, &'a V);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it
            .next()
            .map(|(k, e)| (Handle::new(k), &e.key, &e.value))
    }
}

impl<K, V, S> EntryTable<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    #[cfg(test)]
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(0, hasher)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            index: HashTable::with_capacity(capacity),
            hasher,
            slots: SlotMap::with_capacity_and_key(capacity),
        }
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn find<Q>(&self, q: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find_hashed(self.make_hash(q), q)
    }

    fn find_hashed<Q>(&self, hash: u64, q: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|e| e.key.borrow() == q)
                    .unwrap_or(false)
            })
            .map(|&k| Handle::new(k))
    }

    #[cfg(test)]
    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(q).is_some()
    }

    /// Insert `key`, or replace the value of the existing entry for it.
    ///
    /// `make` receives the entry's handle before the value is installed, so
    /// the value may embed its own address. On replace the handle is the
    /// existing one; the entry keeps its original key.
    pub fn upsert_with<F>(&mut self, key: K, make: F) -> Upsert<K, V>
    where
        F: FnOnce(Handle) -> V,
    {
        let hash = self.make_hash(&key);
        if let Some(handle) = self.find_hashed(hash, &key) {
            if let Some(e) = self.slots.get_mut(handle.raw_handle()) {
                let value = core::mem::replace(&mut e.value, make(handle));
                return Upsert::Replaced { key, value };
            }
        }
        let k = self.slots.insert_with_key(|k| Entry {
            key,
            value: make(Handle::new(k)),
            hash,
        });
        let slots = &self.slots;
        let _ = self.index.insert_unique(hash, k, |&kk| {
            slots.get(kk).map(|e| e.hash).unwrap_or(0)
        });
        Upsert::Inserted
    }

    pub fn remove(&mut self, handle: Handle) -> Option<(K, V)> {
        let k = handle.raw_handle();

        // Remove slot
        let entry = self.slots.remove(k)?;

        // Unlink from index via occupied entry removal
        if let Ok(found) = self.index.find_entry(entry.hash, |&kk| kk == k) {
            found.remove();
        }

        Some((entry.key, entry.value))
    }

    pub fn remove_key<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let handle = self.find(q)?;
        self.remove(handle)
    }

    /// Remove every entry, handing them back in storage order.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        self.index.clear();
        self.slots.drain().map(|(_, e)| (e.key, e.value)).collect()
    }

    #[cfg(test)]
    pub fn handle_key(&self, h: Handle) -> Option<&K> {
        self.slots.get(h.raw_handle()).map(|e| &e.key)
    }

    pub fn handle_value(&self, h: Handle) -> Option<&V> {
        self.slots.get(h.raw_handle()).map(|e| &e.value)
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let h = self.find(q)?;
        self.handle_value(h)
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            it: self.slots.iter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn insert(m: &mut EntryTable<String, i32>, k: &str, v: i32) -> Handle {
        let mut handle = None;
        m.upsert_with(k.to_string(), |h| {
            handle = Some(h);
            v
        });
        handle.expect("constructor called")
    }

    /// Invariant: upserting an existing key replaces its value in place and
    /// keeps the handle; the duplicate key and previous value come back.
    #[test]
    fn upsert_replaces_in_place() {
        let mut m: EntryTable<String, i32> = EntryTable::new();
        let h1 = insert(&mut m, "dup", 1);
        match m.upsert_with("dup".to_string(), |_| 2) {
            Upsert::Replaced { key, value } => {
                assert_eq!(key, "dup");
                assert_eq!(value, 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(m.find("dup"), Some(h1));
        assert_eq!(m.handle_value(h1), Some(&2));
        assert_eq!(m.len(), 1);
    }

    /// Invariant: the constructor closure sees the handle the entry ends up at.
    #[test]
    fn upsert_passes_final_handle() {
        let mut m: EntryTable<&'static str, Option<Handle>> = EntryTable::new();
        m.upsert_with("k", Some);
        let h = m.find("k").expect("inserted");
        assert_eq!(m.handle_value(h), Some(&Some(h)));
        assert!(matches!(m.upsert_with("k", Some), Upsert::Replaced { .. }));
        assert_eq!(m.find("k"), Some(h));
        assert_eq!(m.handle_value(h), Some(&Some(h)));
    }

    /// Invariant: `find(k).is_some() == contains_key(k)` for present/absent keys.
    #[test]
    fn find_contains_parity() {
        let mut m: EntryTable<String, i32> = EntryTable::new();
        let present = ["a", "b", "c"];
        for (i, k) in present.iter().enumerate() {
            insert(&mut m, k, i as i32);
        }

        for k in present {
            assert!(m.find(k).is_some());
            assert!(m.contains_key(k));
        }

        for k in ["x", "y", "z"] {
            assert!(m.find(k).is_none());
            assert!(!m.contains_key(k));
        }
    }

    /// Invariant: borrowed lookup works (store `String`, query with `&str`).
    #[test]
    fn borrowed_lookup_with_str() {
        let mut m: EntryTable<String, i32> = EntryTable::new();
        insert(&mut m, "hello", 1);
        assert_eq!(m.get("hello"), Some(&1));
        assert_eq!(m.get("world"), None);
    }

    /// Invariant: removing an entry invalidates its handle and does not alias a
    /// new entry inserted afterward, even if the physical slot is reused.
    #[test]
    fn stale_handle_does_not_alias_new_entry() {
        let mut m: EntryTable<String, i32> = EntryTable::new();
        let h1 = insert(&mut m, "old", 1);
        let (_k, _v) = m.remove(h1).unwrap();
        let h2 = insert(&mut m, "new", 2);
        assert_ne!(h1, h2, "handles must differ across generations");
        assert!(m.handle_value(h1).is_none(), "stale handle must not resolve");
        assert!(m.remove(h1).is_none());
        assert!(m.contains_key("new"));
        assert!(!m.contains_key("old"));
    }

    /// Invariant: after `remove_key`, the key is absent and reinsertion starts
    /// a fresh entry.
    #[test]
    fn remove_key_then_reinsert() {
        let mut m: EntryTable<String, i32> = EntryTable::new();
        let h1 = insert(&mut m, "k", 1);
        assert_eq!(m.remove_key("k"), Some(("k".to_string(), 1)));
        assert_eq!(m.remove_key("k"), None);
        assert!(m.find("k").is_none());

        let h2 = insert(&mut m, "k", 2);
        assert_ne!(h1, h2);
        assert_eq!(m.get("k"), Some(&2));
        assert_eq!(m.handle_key(h2).map(String::as_str), Some("k"));
    }

    /// Invariant: lookups work under heavy hash collisions.
    #[test]
    fn collision_handling_with_const_hasher() {
        #[derive(Clone, Default)]
        struct ConstBuildHasher;
        struct ConstHasher;
        impl BuildHasher for ConstBuildHasher {
            type Hasher = ConstHasher;
            fn build_hasher(&self) -> Self::Hasher {
                ConstHasher
            }
        }
        impl core::hash::Hasher for ConstHasher {
            fn write(&mut self, _bytes: &[u8]) {}
            fn finish(&self) -> u64 {
                0
            } // force all keys into the same hash bucket
        }

        let mut m: EntryTable<String, i32, ConstBuildHasher> =
            EntryTable::with_hasher(ConstBuildHasher);
        m.upsert_with("a".to_string(), |_| 1);
        m.upsert_with("b".to_string(), |_| 2);

        let ha = m.find("a").expect("find a");
        let hb = m.find("b").expect("find b");
        assert_ne!(ha, hb);
        assert_eq!(m.handle_value(ha), Some(&1));
        assert_eq!(m.handle_value(hb), Some(&2));

        m.remove(ha);
        assert!(m.find("a").is_none());
        assert_eq!(m.get("b"), Some(&2));
    }

    /// Invariant: iteration yields each entry once; drain empties the table.
    #[test]
    fn iteration_and_drain() {
        let mut m: EntryTable<String, i32> = EntryTable::new();
        let keys = ["k1", "k2", "k3"];
        for (i, k) in keys.iter().enumerate() {
            insert(&mut m, k, i as i32);
        }

        let seen: BTreeSet<String> = m.iter().map(|(_h, k, _v)| k.clone()).collect();
        let expected: BTreeSet<String> = keys.iter().map(|s| (*s).to_string()).collect();
        assert_eq!(seen, expected);

        let drained: BTreeSet<String> = m.drain().into_iter().map(|(k, _)| k).collect();
        assert_eq!(drained, expected);
        assert!(m.is_empty());
        assert!(m.find("k1").is_none());
    }
}
