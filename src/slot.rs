//! Values and the per-entry slots that hold them.

use crate::tokens::RegistrationToken;
use core::fmt;
use std::sync::{Arc, Weak};

/// A value as seen by callers of the map.
///
/// `Primitive` values have no collectible identity and are stored by value.
/// `Object` values are heap objects; the map only ever keeps a weak
/// reference to them.
pub enum Value<P, T: ?Sized> {
    Primitive(P),
    Object(Arc<T>),
}

impl<P, T: ?Sized> Value<P, T> {
    /// Whether the map holds this value weakly. Agrees with the storage
    /// `classify` picks for it.
    #[inline]
    pub fn is_collectible(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn as_primitive(&self) -> Option<&P> {
        match self {
            Value::Primitive(p) => Some(p),
            Value::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<T>> {
        match self {
            Value::Primitive(_) => None,
            Value::Object(o) => Some(o),
        }
    }

    pub fn into_object(self) -> Option<Arc<T>> {
        match self {
            Value::Primitive(_) => None,
            Value::Object(o) => Some(o),
        }
    }

    /// Identity comparison: objects by allocation, primitives never match.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<P, T: ?Sized> Value<P, T> {
    /// Split a value into what the slot will store and the strong reference
    /// the caller passed in. The strong reference must outlive the slot's
    /// installation and be dropped outside the table lock. Called once per
    /// `set`; this is where a value's variant becomes its storage.
    pub(crate) fn classify(self) -> (Incoming<P, T>, Option<Arc<T>>) {
        match self {
            Value::Primitive(p) => (Incoming::Primitive(p), None),
            Value::Object(o) => (Incoming::Object(Arc::downgrade(&o)), Some(o)),
        }
    }
}

/// A classified value on its way into a slot.
pub(crate) enum Incoming<P, T: ?Sized> {
    Primitive(P),
    Object(Weak<T>),
}

impl<P, T: ?Sized> Incoming<P, T> {
    /// Build the slot, registering object referents through `register`.
    pub(crate) fn into_slot<F>(self, register: F) -> Slot<P, T>
    where
        F: FnOnce(Weak<T>) -> RegistrationToken,
    {
        match self {
            Incoming::Primitive(p) => Slot::Primitive(p),
            Incoming::Object(referent) => {
                let token = register(referent.clone());
                Slot::Weak { referent, token }
            }
        }
    }
}

impl<P, T: ?Sized> From<Arc<T>> for Value<P, T> {
    fn from(o: Arc<T>) -> Self {
        Value::Object(o)
    }
}

impl<P: Clone, T: ?Sized> Clone for Value<P, T> {
    fn clone(&self) -> Self {
        match self {
            Value::Primitive(p) => Value::Primitive(p.clone()),
            Value::Object(o) => Value::Object(Arc::clone(o)),
        }
    }
}

/// Structural equality; objects compare by contents, not identity.
impl<P: PartialEq, T: ?Sized + PartialEq> PartialEq for Value<P, T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Primitive(a), Value::Primitive(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => **a == **b,
            _ => false,
        }
    }
}

impl<P: fmt::Debug, T: ?Sized + fmt::Debug> fmt::Debug for Value<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Primitive(p) => f.debug_tuple("Primitive").field(p).finish(),
            Value::Object(o) => f.debug_tuple("Object").field(o).finish(),
        }
    }
}

/// Storage for one entry.
pub(crate) enum Slot<P, T: ?Sized> {
    Primitive(P),
    Weak {
        referent: Weak<T>,
        token: RegistrationToken,
    },
}

impl<P, T: ?Sized> Slot<P, T> {
    /// Resolve to a live value, or `None` if the referent is gone. This holds
    /// whether or not the reclamation notification has been processed yet.
    pub(crate) fn resolve(&self) -> Option<Value<P, T>>
    where
        P: Clone,
    {
        match self {
            Slot::Primitive(p) => Some(Value::Primitive(p.clone())),
            Slot::Weak { referent, .. } => referent.upgrade().map(Value::Object),
        }
    }

    /// Liveness without materialising a strong reference.
    pub(crate) fn is_live(&self) -> bool {
        match self {
            Slot::Primitive(_) => true,
            Slot::Weak { referent, .. } => referent.strong_count() > 0,
        }
    }

    pub(crate) fn token(&self) -> Option<RegistrationToken> {
        match self {
            Slot::Primitive(_) => None,
            Slot::Weak { token, .. } => Some(*token),
        }
    }

    /// Like `resolve`, but consuming; used when the slot leaves the table.
    pub(crate) fn into_value(self) -> Option<Value<P, T>> {
        match self {
            Slot::Primitive(p) => Some(Value::Primitive(p)),
            Slot::Weak { referent, .. } => referent.upgrade().map(Value::Object),
        }
    }
}

impl<P, T: ?Sized> fmt::Debug for Slot<P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Primitive(_) => f.write_str("Primitive"),
            Slot::Weak { referent, token } => f
                .debug_struct("Weak")
                .field("strong", &referent.strong_count())
                .field("token", token)
                .finish(),
        }
    }
}
