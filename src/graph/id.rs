//! Identity types for the graph system.
//!
//! Node and handle ids are process-unique `u64`s from monotonic counters.
//! A [`HandleId`] is the *logical* identity preserved across hot-swaps; a
//! [`NodeUid`] identifies one concrete node object and changes when a
//! replacement object is swapped in behind the same handle.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_NODE_UID: AtomicU64 = AtomicU64::new(1);
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one concrete node object.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeUid(u64);

impl NodeUid {
    pub fn next() -> Self {
        Self(NEXT_NODE_UID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for NodeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeUid({})", self.0)
    }
}

impl fmt::Display for NodeUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Stable logical identity of a node handle; survives hot-swaps.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandleId({})", self.0)
    }
}

/// Identity of one notifier subscription on a parameter or node.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}
