//! Finalization registry: weak targets with cancellable registrations.
//!
//! Each registration holds its own `Weak` to a target plus a caller-chosen
//! `held` value. A sweep moves registrations whose target has no strong
//! owners left to a pending queue; draining the queue yields one
//! [`Reclaimed`] notification per registration. A registration is delivered
//! at most once and never after it has been unregistered.

use crate::tokens::{RegistrationKey, RegistrationToken};
use slotmap::SlotMap;
use std::sync::Weak;

struct Registration<T: ?Sized, H> {
    /// Not upgraded by the registry except to test liveness.
    target: Weak<T>,
    held: H,
}

/// Notification that a registered target was reclaimed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Reclaimed<H> {
    pub token: RegistrationToken,
    pub held: H,
}

pub struct FinalizationRegistry<T: ?Sized, H> {
    registrations: SlotMap<RegistrationKey, Registration<T, H>>,
    /// Registrations whose target died, in sweep order.
    pending: Vec<Reclaimed<H>>,
}

impl<T: ?Sized, H: Copy> FinalizationRegistry<T, H> {
    pub fn new() -> Self {
        Self {
            registrations: SlotMap::with_key(),
            pending: Vec::new(),
        }
    }

    /// Register `target`; `held` is handed back when it is reclaimed.
    pub fn register(&mut self, target: Weak<T>, held: H) -> RegistrationToken {
        RegistrationToken::new(self.registrations.insert(Registration { target, held }))
    }

    /// Cancel a registration. Returns false if it already fired or was
    /// cancelled before; that case is not an error.
    pub fn unregister(&mut self, token: RegistrationToken) -> bool {
        if self.registrations.remove(token.raw_key()).is_some() {
            return true;
        }
        let before = self.pending.len();
        self.pending.retain(|r| r.token != token);
        self.pending.len() != before
    }

    pub fn is_registered(&self, token: RegistrationToken) -> bool {
        self.registrations.contains_key(token.raw_key())
            || self.pending.iter().any(|r| r.token == token)
    }

    /// Number of registrations still waiting for their target to die.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Queue every registration whose target is gone. Returns how many were
    /// queued by this sweep.
    pub fn sweep(&mut self) -> usize {
        let pending = &mut self.pending;
        let before = pending.len();
        self.registrations.retain(|k, r| {
            if r.target.strong_count() == 0 {
                pending.push(Reclaimed {
                    token: RegistrationToken::new(k),
                    held: r.held,
                });
                false
            } else {
                true
            }
        });
        pending.len() - before
    }

    /// Drain pending notifications.
    pub fn drain_pending(&mut self) -> Vec<Reclaimed<H>> {
        core::mem::take(&mut self.pending)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drop every registration and pending notification.
    pub fn clear(&mut self) {
        self.registrations.clear();
        self.pending.clear();
    }
}

impl<T: ?Sized, H: Copy> Default for FinalizationRegistry<T, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized, H> core::fmt::Debug for FinalizationRegistry<T, H> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FinalizationRegistry")
            .field("registrations", &self.registrations.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}
