//! Hot-swap identity preservation.
//!
//! Every holder of a node — parent child-lists, data-stream roots, GUI-side
//! variables — stores a [`NodeHandle`], never the node object itself. The
//! handle pairs a stable logical id with an atomically repointable target,
//! so a recompiled replacement slots in behind existing references without
//! re-running graph construction: subtree structure, parameter bindings and
//! tree names all survive.
//!
//! The compiler driving recompilation is an external collaborator
//! ([`ObjectManager`]); the engine only reports dependency edges to it and
//! applies the swaps it requests through [`SwapCoordinator`].

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::error::{AquilaError, Result};
use crate::graph::id::HandleId;
use crate::graph::node::Node;
use crate::graph::registry::NodeRegistry;
use crate::graph::runtime::RuntimeContext;
use crate::graph::stream::DataStream;

/// Stable indirection handle: logical id plus the current node object.
pub struct NodeHandle {
    id: HandleId,
    target: RwLock<Option<Arc<Node>>>,
}

impl NodeHandle {
    /// Wrap a node in a fresh handle and bind it back to the node.
    pub fn new(node: Arc<Node>) -> Arc<NodeHandle> {
        let handle = Arc::new(NodeHandle {
            id: HandleId::next(),
            target: RwLock::new(Some(node.clone())),
        });
        node.bind_handle(&handle);
        handle
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// The node currently behind this handle; `None` once detached.
    pub fn current(&self) -> Option<Arc<Node>> {
        self.target.read().clone()
    }

    /// Atomically repoint the handle at a replacement node.
    pub fn repoint(self: &Arc<Self>, node: Arc<Node>) {
        node.bind_handle(self);
        *self.target.write() = Some(node);
    }

    /// Unset the target. Lingering references (e.g. a children snapshot
    /// taken mid-pass) observe the detachment instead of a stale node.
    pub fn detach(&self) -> Option<Arc<Node>> {
        self.target.write().take()
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field(
                "target",
                &self.current().map(|n| n.full_tree_name()),
            )
            .finish()
    }
}

/// External compiler collaborator.
///
/// The engine reports node constructions to it (so the compiler can track
/// which modules are live) and notifies it when a swap lands. Compilation
/// mechanics are entirely its own business.
#[cfg_attr(test, mockall::automock)]
pub trait ObjectManager: Send + Sync {
    /// A node of `type_name` was constructed from the registry.
    fn on_node_constructed(&self, type_name: &str);

    /// A swap of `type_name` was applied to a live handle.
    fn on_swap_applied(&self, type_name: &str);
}

/// Applies recompiled implementations to live handles.
///
/// Swap protocol: every attached data stream must be paused with no pass in
/// flight; the replacement is built from the registry's *current*
/// constructor for the type, adopts the old node's state, and the handle is
/// repointed. The reset broadcast then re-runs `init(false)` everywhere.
pub struct SwapCoordinator {
    registry: Arc<NodeRegistry>,
    streams: Mutex<Vec<Weak<DataStream>>>,
}

impl SwapCoordinator {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            streams: Mutex::new(Vec::new()),
        }
    }

    /// Track a stream whose pause state gates swaps.
    pub fn attach_stream(&self, stream: &Arc<DataStream>) {
        self.streams.lock().push(Arc::downgrade(stream));
    }

    fn ensure_paused(&self, type_name: &str) -> Result<()> {
        let mut streams = self.streams.lock();
        streams.retain(|w| w.strong_count() > 0);
        for weak in streams.iter() {
            if let Some(stream) = weak.upgrade() {
                if !stream.is_swap_safe() {
                    return Err(AquilaError::SwapWhileRunning(type_name.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Swap the node behind `handle` for a freshly constructed instance of
    /// the same type. On failure the graph is left structurally intact.
    pub fn apply_swap(&self, handle: &Arc<NodeHandle>) -> Result<()> {
        let old = handle
            .current()
            .ok_or_else(|| AquilaError::DetachedHandle(format!("{:?}", handle.id())))?;
        let type_name = old.node_name().to_string();
        self.ensure_paused(&type_name)?;

        let replacement = self.registry.construct_node(&type_name)?;
        replacement.adopt_state_from(&old);
        handle.repoint(replacement);
        drop(old);

        if let Some(runtime) = RuntimeContext::current() {
            runtime.broadcast_reset();
        }
        if let Some(om) = self.registry.object_manager() {
            om.on_swap_applied(&type_name);
        }
        tracing::info!(node_type = %type_name, handle = ?handle.id(), "hot swap applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::transform::{AnyTransform, BuiltinTransform};
    use crate::graph::transforms::GainTransform;

    fn gain_handle() -> Arc<NodeHandle> {
        NodeHandle::new(Node::new(
            "Gain",
            AnyTransform::Builtin(BuiltinTransform::Gain(GainTransform::new())),
        ))
    }

    #[test]
    fn test_handle_identity_survives_repoint() {
        let handle = gain_handle();
        let id = handle.id();
        let old_uid = handle.current().unwrap().uid();

        let replacement = Node::new(
            "Gain",
            AnyTransform::Builtin(BuiltinTransform::Gain(GainTransform::new())),
        );
        handle.repoint(replacement);

        assert_eq!(handle.id(), id);
        let node = handle.current().unwrap();
        assert_ne!(node.uid(), old_uid);
        // The replacement is bound back to the same handle.
        assert_eq!(node.handle().unwrap().id(), id);
    }

    #[test]
    fn test_detach() {
        let handle = gain_handle();
        assert!(handle.current().is_some());
        handle.detach();
        assert!(handle.current().is_none());
    }

    #[test]
    fn test_swap_requires_paused_streams() {
        let registry = Arc::new(NodeRegistry::with_builtins());
        let coordinator = SwapCoordinator::new(registry.clone());

        let stream = DataStream::new(registry);
        coordinator.attach_stream(&stream);

        let handle = gain_handle();
        stream.add_root(handle.clone());

        // Not paused: refused, and the graph untouched.
        let uid = handle.current().unwrap().uid();
        assert!(matches!(
            coordinator.apply_swap(&handle),
            Err(AquilaError::SwapWhileRunning(_))
        ));
        assert_eq!(handle.current().unwrap().uid(), uid);

        stream.pause();
        coordinator.apply_swap(&handle).unwrap();
        assert_ne!(handle.current().unwrap().uid(), uid);
    }

    #[test]
    fn test_object_manager_notified() {
        let registry = Arc::new(NodeRegistry::with_builtins());
        let mut mock = MockObjectManager::new();
        mock.expect_on_node_constructed().times(1..).return_const(());
        mock.expect_on_swap_applied()
            .withf(|name| name == "Gain")
            .times(1)
            .return_const(());
        registry.set_object_manager(Arc::new(mock));

        let coordinator = SwapCoordinator::new(registry.clone());
        let handle = registry.create("Gain").unwrap();
        coordinator.apply_swap(&handle).unwrap();
    }
}
