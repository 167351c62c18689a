//! Registration tokens.
//!
//! A token is the generational key of one finalization registration. It is
//! minted by `FinalizationRegistry::register`, stored in the weak slot that
//! owns the registration, and carried back in the reclamation notification.
//! Because slotmap keys carry a version, a token stays distinct from every
//! token minted before it, even when the registry reuses storage.

use slotmap::new_key_type;

new_key_type! {
    pub(crate) struct RegistrationKey;
}

/// Opaque handle correlating one registration with one slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct RegistrationToken(RegistrationKey);

impl RegistrationToken {
    #[inline]
    pub(crate) fn new(k: RegistrationKey) -> Self {
        RegistrationToken(k)
    }

    #[inline]
    pub(crate) fn raw_key(&self) -> RegistrationKey {
        self.0
    }
}
