//! weak-value-map: a thread-safe map with strongly-held keys and weakly-held
//! values, whose entries disappear once nothing else references their value.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: let callers index `Arc` objects by key without the index keeping
//!   them alive, and without manual eviction.
//! - Layers:
//!   - EntryTable<K, V, S>: structural map returning stable generational
//!     handles; hash index over slot storage, each entry stores its hash.
//!   - Slot / Value: a value is either a primitive stored by value or an
//!     object stored as a `Weak` plus the token of its registration.
//!   - FinalizationRegistry<T, H>: cancellable registrations over weak
//!     targets; a sweep queues registrations whose target died.
//!   - reclaim: the listener applying sweep notifications to the table.
//!   - WeakValueMap<K, P, T, S>: public API wiring the above under one lock.
//!   - Sweeper: optional background thread running collection cycles.
//!
//! Read path vs reclamation path
//! - `get`/`has`/`iter` resolve weak slots directly with `Weak::upgrade`,
//!   so a dead object reads as absent immediately.
//! - The listener only bounds bookkeeping memory. It runs during a
//!   collection cycle and removes an entry only if the slot still carries
//!   the token of the notified registration.
//! - Cycles run on `collect()`, on a `Sweeper`, and inside `set` once the
//!   registry reaches twice the size that survived the last cycle (never
//!   below a small floor). Dead entries therefore stay proportional to the
//!   live ones even if nobody collects explicitly.
//!
//! Tokens and overwrite safety
//! - Every registration gets a generational slotmap key as its token. A
//!   slot replaced by `set` has its registration cancelled in the same
//!   critical section that installs the new slot, so a late notification for
//!   the old object can never remove the new entry.
//! - Two keys holding the same object have independent registrations.
//!
//! Concurrency and reentrancy policy
//! - One `parking_lot::Mutex` guards table and registry together; the
//!   listener runs under it as well.
//! - Keys, primitives and caller `Arc`s leaving the map are dropped after
//!   the lock is released, so their `Drop` may call back into the map.
//! - `K: Eq + Hash` and `P: Clone` run under the lock and must not re-enter
//!   the same map.
//!
//! Notes and non-goals
//! - No weak keys, no persistence, no ordering among entries.
//! - `len()` counts bookkeeping entries, including dead ones not yet reclaimed.

mod entry_table;
mod entry_table_proptest;
mod error;
mod reclaim;
pub mod registry;
mod slot;
mod sweeper;
pub mod tokens;
mod weak_value_map;

// Public surface
pub use error::SweepError;
pub use registry::{FinalizationRegistry, Reclaimed};
pub use slot::Value;
pub use sweeper::{Sweeper, SweeperConfig};
pub use tokens::RegistrationToken;
pub use weak_value_map::{CollectStats, Iter, Keys, WeakValueMap};
