//! Wire handles for frames and values.
//!
//! Handles are minted from a single process-wide counter so a handle issued in
//! one suspend episode can never be confused with one issued in a later
//! episode. Identity of the underlying object is kept separately in
//! [`IdentityKey`] and never leaks onto the wire.

use crate::value::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Opaque integer addressing a frame or value for one suspend episode.
///
/// `0` is never minted; on the wire it means "no children".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(i64);

impl Handle {
    /// Wraps a raw handle received from a client.
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequential handle source shared by every session of a registry.
#[derive(Debug)]
pub struct HandleAllocator {
    next: AtomicI64,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    /// Returns a handle that has never been returned before.
    pub fn mint(&self) -> Handle {
        Handle(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of a tracked object inside one session.
///
/// Frames and values live in separate namespaces because the tracing engine
/// is free to reuse the same numeric id for a frame and a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Frame(ObjectId),
    Value(ObjectId),
}
