#![cfg(test)]

// Property tests for EntryTable kept inside the crate since the table is
// not part of the public surface.

use crate::entry_table::{EntryTable, Handle, Upsert};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hasher};

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Pool-indexed operations so shrinking moves towards earlier keys.
#[derive(Clone, Debug)]
enum Op {
    Upsert(usize, i32),
    Remove(usize),
    RemoveKey(usize),
    Find(usize),
    Contains(String),
    Iterate,
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=8).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Upsert(i, v)),
            idx.clone().prop_map(Op::Remove),
            idx.clone().prop_map(Op::RemoveKey),
            idx.clone().prop_map(Op::Find),
            prop_oneof![contains_pool, "[a-z]{0,5}".prop_map(|s| s)].prop_map(Op::Contains),
            Just(Op::Iterate),
        ];
        proptest::collection::vec(op, 1..60).prop_map(move |ops| (pool.clone(), ops))
    })
}

// State-machine equivalence against std::collections::HashMap:
// - Upsert keeps the handle of an existing key and hands back the old value.
// - `find`/`contains_key` parity with the model; handles stay stable.
// - `remove`/`remove_key` return the owned pair and invalidate the handle.
// - `iter` yields each entry once; stale handles never resolve.
fn run_scenario<S: BuildHasher>(
    mut sut: EntryTable<Key, i32, S>,
    pool: Vec<String>,
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let key_from = |i: usize| Key(pool[i].clone());
    let mut model: HashMap<Key, i32> = HashMap::new();
    let mut live: HashMap<Key, Handle> = HashMap::new();
    let mut stale: Vec<Handle> = Vec::new();

    for op in ops {
        match op {
            Op::Upsert(i, v) => {
                let k = key_from(i);
                let seen = std::cell::Cell::new(None);
                let res = sut.upsert_with(k.clone(), |h| {
                    seen.set(Some(h));
                    v
                });
                let h = sut.find(&k);
                prop_assert!(h.is_some());
                prop_assert_eq!(seen.get(), h);
                match res {
                    Upsert::Inserted => {
                        prop_assert!(!model.contains_key(&k));
                        live.insert(k.clone(), h.expect("present"));
                    }
                    Upsert::Replaced { key, value } => {
                        prop_assert_eq!(h.as_ref(), live.get(&k));
                        prop_assert_eq!(key, k.clone());
                        prop_assert_eq!(Some(value), model.get(&k).copied());
                    }
                }
                model.insert(k, v);
            }
            Op::Remove(i) => {
                let k = key_from(i);
                if let Some(h) = live.remove(&k) {
                    let (kk, vv) = sut.remove(h).expect("handle valid for removal");
                    prop_assert_eq!(&kk, &k);
                    prop_assert_eq!(Some(vv), model.remove(&k));
                    stale.push(h);
                } else {
                    prop_assert!(sut.find(&k).is_none());
                }
            }
            Op::RemoveKey(i) => {
                let k = key_from(i);
                let got = sut.remove_key(k.0.as_str());
                let expected = model.remove(&k).map(|v| (k.clone(), v));
                prop_assert_eq!(got, expected);
                if let Some(h) = live.remove(&k) {
                    stale.push(h);
                }
            }
            Op::Find(i) => {
                let k = key_from(i);
                let s = sut.find(&k);
                prop_assert_eq!(s.is_some(), model.contains_key(&k));
                if let Some(h) = s {
                    prop_assert_eq!(Some(&h), live.get(&k));
                    prop_assert_eq!(sut.handle_value(h), model.get(&k));
                }
            }
            Op::Contains(s) => {
                let has_model = model.keys().any(|k| k.0 == s);
                prop_assert_eq!(sut.contains_key(s.as_str()), has_model);
            }
            Op::Iterate => {
                let s_keys: BTreeSet<_> = sut.iter().map(|(_, k, _)| k.clone()).collect();
                let m_keys: BTreeSet<_> = model.keys().cloned().collect();
                prop_assert_eq!(s_keys, m_keys);
            }
        }

        for &h in &stale {
            prop_assert!(sut.handle_value(h).is_none());
        }
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
    }
    Ok(())
}

// Collision variant using a constant hasher to stress equality resolution.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_scenario(EntryTable::new(), pool, ops)?;
    }

    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_scenario(EntryTable::with_hasher(ConstBuildHasher), pool, ops)?;
    }
}
