use crate::entry_table::{EntryTable, Handle, Upsert};
use crate::reclaim::{self, Outcome};
use crate::registry::FinalizationRegistry;
use crate::slot::{Slot, Value};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::sync::{Arc, Weak};

const TARGET: &str = "weak_value_map";

/// Counts reported by one collection cycle.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CollectStats {
    /// Registrations whose referent was found dead by this cycle.
    pub swept: usize,
    /// Entries removed from the table.
    pub reclaimed: usize,
    /// Notifications ignored because the entry's slot had been replaced.
    pub stale: usize,
    /// Notifications for entries that no longer exist.
    pub absent: usize,
}

/// Registrations tolerated before `set` runs a cycle on its own.
const MIN_AUTO_SWEEP: usize = 64;

struct State<K, P, T: ?Sized, S> {
    table: EntryTable<K, Slot<P, T>, S>,
    registry: FinalizationRegistry<T, Handle>,
    /// `set` runs a cycle once the registry reaches this size. Reset to twice
    /// the registrations surviving each cycle.
    sweep_at: usize,
}

impl<K, P, T, S> State<K, P, T, S>
where
    K: Eq + Hash,
    T: ?Sized,
    S: BuildHasher,
{
    /// One collection cycle under the caller's lock. Evicted entries are
    /// handed back to be dropped after unlocking.
    fn cycle(&mut self) -> (CollectStats, Vec<(K, Slot<P, T>)>) {
        let mut stats = CollectStats {
            swept: self.registry.sweep(),
            ..CollectStats::default()
        };
        let mut evicted = Vec::new();
        for n in self.registry.drain_pending() {
            match reclaim::on_reclaimed(&mut self.table, n) {
                Outcome::Removed(key, slot) => {
                    stats.reclaimed += 1;
                    evicted.push((key, slot));
                }
                Outcome::Stale => stats.stale += 1,
                Outcome::Absent => stats.absent += 1,
            }
        }
        self.sweep_at = MIN_AUTO_SWEEP.max(self.registry.len().saturating_mul(2));
        (stats, evicted)
    }
}

pub(crate) struct Shared<K, P, T: ?Sized, S> {
    state: Mutex<State<K, P, T, S>>, // one lock for the table, the registry and the listener
}

impl<K, P, T, S> Shared<K, P, T, S>
where
    K: Eq + Hash,
    T: ?Sized,
    S: BuildHasher,
{
    pub(crate) fn collect(&self) -> CollectStats {
        let (stats, evicted, remaining) = {
            let mut state = self.state.lock();
            let (stats, evicted) = state.cycle();
            (stats, evicted, state.table.len())
        };
        // Keys run user destructors; keep them out of the critical section.
        drop(evicted);
        tracing::debug!(
            target: TARGET,
            swept = stats.swept,
            reclaimed = stats.reclaimed,
            stale = stats.stale,
            absent = stats.absent,
            remaining,
            "collection cycle complete"
        );
        stats
    }
}

/// A map with strongly-held keys and weakly-held object values.
///
/// Object values (`Value::Object`) are stored as `Weak` references; once the
/// last outside `Arc` is dropped, the entry reads as absent and is removed
/// from the table by the next collection cycle. Cycles run on `collect`, on a
/// [`crate::Sweeper`], and from `set` whenever the number of registrations
/// has doubled since the previous cycle. Primitive values are stored by
/// value and never expire.
///
/// All operations take `&self` and serialise on a single table-wide lock, so
/// the map can be shared across threads and swept by a [`crate::Sweeper`].
pub struct WeakValueMap<K, P, T: ?Sized, S = RandomState> {
    inner: Arc<Shared<K, P, T, S>>,
}

impl<K, P, T> WeakValueMap<K, P, T>
where
    K: Eq + Hash,
    T: ?Sized,
{
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }
}

impl<K, P, T> Default for WeakValueMap<K, P, T>
where
    K: Eq + Hash,
    T: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P, T, S> WeakValueMap<K, P, T, S>
where
    K: Eq + Hash,
    T: ?Sized,
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(0, hasher)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        Self {
            inner: Arc::new(Shared {
                state: Mutex::new(State {
                    table: EntryTable::with_capacity_and_hasher(capacity, hasher),
                    registry: FinalizationRegistry::new(),
                    sweep_at: MIN_AUTO_SWEEP,
                }),
            }),
        }
    }

    pub(crate) fn downgrade_shared(&self) -> Weak<Shared<K, P, T, S>> {
        Arc::downgrade(&self.inner)
    }

    /// Number of entries held by the table. Entries whose object has died
    /// but that have not been reclaimed by a collection cycle yet are
    /// included.
    pub fn len(&self) -> usize {
        self.inner.state.lock().table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().table.is_empty()
    }

    /// Number of object entries still waiting for their value to die.
    pub fn registrations(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    /// Install `value` under `key`, replacing any previous slot. Returns the
    /// displaced entry so it is dropped by the caller, outside the lock.
    ///
    /// Once the registry has grown past its threshold a collection cycle
    /// runs in the same critical section, so a map nobody collects
    /// explicitly still stays bounded by its live entries.
    fn install(&self, key: K, value: Value<P, T>) -> Option<(K, Slot<P, T>)> {
        let (incoming, keepalive) = value.classify();
        let (displaced, evicted) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let State {
                table, registry, ..
            } = &mut *state;
            let upsert = table.upsert_with(key, |handle| {
                incoming.into_slot(|referent| registry.register(referent, handle))
            });
            let displaced = match upsert {
                Upsert::Inserted => None,
                Upsert::Replaced { key, value } => {
                    // The new slot and this cancellation become visible together.
                    if let Some(token) = value.token() {
                        registry.unregister(token);
                        tracing::trace!(target: TARGET, ?token, "cancelled replaced registration");
                    }
                    Some((key, value))
                }
            };
            let evicted = if state.registry.len() >= state.sweep_at {
                let (stats, evicted) = state.cycle();
                tracing::debug!(
                    target: TARGET,
                    swept = stats.swept,
                    reclaimed = stats.reclaimed,
                    next = state.sweep_at,
                    "automatic collection cycle"
                );
                evicted
            } else {
                Vec::new()
            };
            (displaced, evicted)
        };
        drop(evicted);
        drop(keepalive);
        displaced
    }

    /// Insert or replace the value for `key`. Chainable.
    pub fn set(&self, key: K, value: impl Into<Value<P, T>>) -> &Self {
        drop(self.install(key, value.into()));
        self
    }

    /// Insert or replace the value for `key`, returning the previous value if
    /// it was still live.
    pub fn insert(&self, key: K, value: impl Into<Value<P, T>>) -> Option<Value<P, T>> {
        self.install(key, value.into())
            .and_then(|(_key, slot)| slot.into_value())
    }

    /// Look up `key`. `None` means no entry, or an entry whose object is gone.
    pub fn get<Q>(&self, q: &Q) -> Option<Value<P, T>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        P: Clone,
    {
        self.inner.state.lock().table.get(q).and_then(Slot::resolve)
    }

    /// Whether `key` maps to a live value.
    pub fn has<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.inner
            .state
            .lock()
            .table
            .get(q)
            .is_some_and(Slot::is_live)
    }

    /// Unlink the entry for `q` and cancel its registration.
    fn take<Q>(&self, q: &Q) -> Option<(K, Slot<P, T>)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let mut guard = self.inner.state.lock();
        let State { table, registry, .. } = &mut *guard;
        let (key, slot) = table.remove_key(q)?;
        if let Some(token) = slot.token() {
            registry.unregister(token);
            tracing::trace!(target: TARGET, ?token, "cancelled deleted registration");
        }
        Some((key, slot))
    }

    /// Remove the entry for `key`. Returns true if a live entry was removed.
    /// An entry whose object is already gone is dropped as well but reported
    /// as absent, matching what `get` would have said.
    pub fn delete<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.take(q).is_some_and(|(_key, slot)| slot.is_live())
    }

    /// Remove the entry for `key`, returning its value if it was live.
    pub fn remove<Q>(&self, q: &Q) -> Option<Value<P, T>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.take(q).and_then(|(_key, slot)| slot.into_value())
    }

    /// Remove every entry and cancel every registration.
    pub fn clear(&self) {
        let drained = {
            let mut guard = self.inner.state.lock();
            guard.registry.clear();
            guard.table.drain()
        };
        drop(drained);
    }

    /// Run one collection cycle: find registrations whose object died and
    /// remove the entries they belong to.
    pub fn collect(&self) -> CollectStats {
        self.inner.collect()
    }

    /// Snapshot of live `(key, value)` pairs at the time of the call.
    pub fn iter(&self) -> Iter<K, P, T>
    where
        K: Clone,
        P: Clone,
    {
        let guard = self.inner.state.lock();
        let items: Vec<_> = guard
            .table
            .iter()
            .filter_map(|(_h, k, slot)| slot.resolve().map(|v| (k.clone(), v)))
            .collect();
        drop(guard);
        Iter {
            items: items.into_iter(),
        }
    }

    /// Snapshot of keys with live values at the time of the call.
    pub fn keys(&self) -> Keys<K>
    where
        K: Clone,
    {
        let guard = self.inner.state.lock();
        let items: Vec<_> = guard
            .table
            .iter()
            .filter(|(_h, _k, slot)| slot.is_live())
            .map(|(_h, k, _slot)| k.clone())
            .collect();
        drop(guard);
        Keys {
            items: items.into_iter(),
        }
    }
}

impl<K, P, T, S> fmt::Debug for WeakValueMap<K, P, T, S>
where
    K: Eq + Hash,
    T: ?Sized,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.state.lock();
        f.debug_struct("WeakValueMap")
            .field("entries", &guard.table.len())
            .field("registry", &guard.registry)
            .finish()
    }
}

/// Snapshot iterator returned by [`WeakValueMap::iter`].
pub struct Iter<K, P, T: ?Sized> {
    items: std::vec::IntoIter<(K, Value<P, T>)>,
}

impl<K, P, T: ?Sized> Iterator for Iter<K, P, T> {
    type Item = (K, Value<P, T>);
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl<K, P, T: ?Sized> ExactSizeIterator for Iter<K, P, T> {}

/// Snapshot iterator returned by [`WeakValueMap::keys`].
pub struct Keys<K> {
    items: std::vec::IntoIter<K>,
}

impl<K> Iterator for Keys<K> {
    type Item = K;
    #[inline]
    fn next(&mut self) -> Option<K> {
        self.items.next()
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

impl<K> ExactSizeIterator for Keys<K> {}
