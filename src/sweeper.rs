//! Background collection cycles.
//!
//! A `Sweeper` owns one thread that wakes every `interval` and runs
//! `WeakValueMap::collect`. It only keeps a `Weak` to the map's shared
//! state: once the map is dropped the thread notices on its next wake-up and
//! exits without touching anything. Dropping the `Sweeper` stops the thread
//! and joins it.

use crate::error::SweepError;
use crate::weak_value_map::{CollectStats, Shared, WeakValueMap};
use core::hash::{BuildHasher, Hash};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::any::Any;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

const TARGET: &str = "weak_value_map::sweeper";

/// Type-erased access to a map's collection cycle.
pub(crate) trait Collect: Send + Sync {
    fn collect(&self) -> CollectStats;
}

impl<K, P, T, S> Collect for Shared<K, P, T, S>
where
    K: Eq + Hash + Send,
    P: Send,
    T: ?Sized + Send + Sync,
    S: BuildHasher + Send,
{
    fn collect(&self) -> CollectStats {
        Shared::collect(self)
    }
}

/// Configuration for [`Sweeper::spawn`].
#[derive(Clone, Debug)]
pub struct SweeperConfig {
    /// Time between two collection cycles.
    pub interval: Duration,
    /// Name given to the sweeper thread.
    pub thread_name: String,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            thread_name: "weak-value-map-sweeper".to_string(),
        }
    }
}

impl SweeperConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

#[derive(Default)]
struct Signal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Handle to a background thread running periodic collection cycles.
pub struct Sweeper {
    signal: Arc<Signal>,
    thread: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub fn spawn<K, P, T, S>(
        map: &WeakValueMap<K, P, T, S>,
        config: SweeperConfig,
    ) -> Result<Self, SweepError>
    where
        K: Eq + Hash + Send + 'static,
        P: Send + 'static,
        T: ?Sized + Send + Sync + 'static,
        S: BuildHasher + Send + 'static,
    {
        if config.interval.is_zero() {
            return Err(SweepError::ZeroInterval);
        }
        let target: Weak<dyn Collect> = map.downgrade_shared();
        let signal = Arc::new(Signal::default());
        let thread_signal = Arc::clone(&signal);
        let interval = config.interval;
        let thread = std::thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run(target, thread_signal, interval))?;
        tracing::debug!(
            target: TARGET,
            thread = %config.thread_name,
            interval_ms = interval.as_millis() as u64,
            "sweeper started"
        );
        Ok(Self {
            signal,
            thread: Some(thread),
        })
    }

    /// Whether the thread is still running. It exits on its own once the map
    /// has been dropped.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        *self.signal.stopped.lock() = true;
        self.signal.wake.notify_all();
        if let Some(thread) = self.thread.take() {
            match thread.join() {
                Ok(()) => tracing::debug!(target: TARGET, "sweeper stopped"),
                Err(payload) => tracing::warn!(
                    target: TARGET,
                    panic = panic_message(payload.as_ref()),
                    "sweeper thread panicked"
                ),
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message<'a>(payload: &'a (dyn Any + Send + 'static)) -> &'a str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn run(target: Weak<dyn Collect>, signal: Arc<Signal>, interval: Duration) {
    let mut stopped = signal.stopped.lock();
    while !*stopped {
        signal.wake.wait_for(&mut stopped, interval);
        if *stopped {
            break;
        }
        let Some(map) = target.upgrade() else {
            tracing::debug!(target: TARGET, "map dropped; sweeper exiting");
            break;
        };
        // Callers stopping the sweeper must not wait behind a cycle.
        MutexGuard::unlocked(&mut stopped, || {
            map.collect();
            drop(map);
        });
    }
}
