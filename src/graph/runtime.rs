//! Process-wide runtime context: the reset broadcast scope.
//!
//! Replaces an ambient signal bus with an explicit observer registry whose
//! lifetime is defined: constructed when the first data stream acquires it,
//! torn down when the last owner drops. Nodes register on construction if a
//! context is alive; the hot-reload bridge fires [`broadcast_reset`]
//! (`RuntimeContext::broadcast_reset`) after a swap so every live node
//! re-runs `init(false)`.

use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

use crate::graph::node::Node;

static CURRENT: OnceLock<Mutex<Weak<RuntimeContext>>> = OnceLock::new();

fn slot() -> &'static Mutex<Weak<RuntimeContext>> {
    CURRENT.get_or_init(|| Mutex::new(Weak::new()))
}

/// Observer registry for the process-wide reset broadcast.
pub struct RuntimeContext {
    nodes: Mutex<Vec<Weak<Node>>>,
}

impl RuntimeContext {
    /// The live context, or a fresh one if none remains. Data streams hold
    /// the returned `Arc`; when the last drops, the context is torn down.
    pub fn acquire() -> Arc<RuntimeContext> {
        let mut current = slot().lock();
        if let Some(runtime) = current.upgrade() {
            return runtime;
        }
        let runtime = Arc::new(RuntimeContext {
            nodes: Mutex::new(Vec::new()),
        });
        *current = Arc::downgrade(&runtime);
        tracing::debug!("runtime context constructed");
        runtime
    }

    /// The live context, if any data stream currently holds one.
    pub fn current() -> Option<Arc<RuntimeContext>> {
        slot().lock().upgrade()
    }

    pub fn register_node(&self, node: &Arc<Node>) {
        self.nodes.lock().push(Arc::downgrade(node));
    }

    /// Live registered nodes (dead entries are pruned).
    pub fn node_count(&self) -> usize {
        let mut nodes = self.nodes.lock();
        nodes.retain(|w| w.strong_count() > 0);
        nodes.len()
    }

    /// Re-run `init(false)` on every live node.
    pub fn broadcast_reset(&self) {
        let live: Vec<Arc<Node>> = {
            let mut nodes = self.nodes.lock();
            nodes.retain(|w| w.strong_count() > 0);
            nodes.iter().filter_map(|w| w.upgrade()).collect()
        };
        tracing::debug!(nodes = live.len(), "reset broadcast");
        for node in live {
            node.init(false);
        }
    }
}

impl Drop for RuntimeContext {
    fn drop(&mut self) {
        tracing::debug!("runtime context torn down");
    }
}
