//! Reclamation listener: applies finalization notifications to the table.

use crate::entry_table::{EntryTable, Handle};
use crate::registry::Reclaimed;
use crate::slot::Slot;
use core::hash::{BuildHasher, Hash};

/// What a single notification did to the table.
#[derive(Debug)]
pub(crate) enum Outcome<K, P, T: ?Sized> {
    /// The entry still carried the notified token and was unlinked. Key and
    /// slot are returned so they can be dropped outside the table lock.
    Removed(K, Slot<P, T>),
    /// The entry exists but was replaced after the registration was made.
    Stale,
    /// No entry lives at the handle any more.
    Absent,
}

/// Remove the entry named by `n` if, and only if, its slot still carries
/// the notified token.
pub(crate) fn on_reclaimed<K, P, T, S>(
    table: &mut EntryTable<K, Slot<P, T>, S>,
    n: Reclaimed<Handle>,
) -> Outcome<K, P, T>
where
    K: Eq + Hash,
    T: ?Sized,
    S: BuildHasher,
{
    let Some(slot) = table.handle_value(n.held) else {
        tracing::trace!(target: "weak_value_map", token = ?n.token, "reclaimed entry already absent");
        return Outcome::Absent;
    };
    if slot.token() != Some(n.token) {
        tracing::trace!(target: "weak_value_map", token = ?n.token, "ignoring stale reclamation");
        return Outcome::Stale;
    }
    match table.remove(n.held) {
        Some((key, slot)) => {
            tracing::trace!(target: "weak_value_map", token = ?n.token, "reclaimed entry removed");
            Outcome::Removed(key, slot)
        }
        None => Outcome::Absent,
    }
}
