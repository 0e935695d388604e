//! Node factory: type-name → transform constructor.
//!
//! Front-ends create nodes by type name; the hot-reload bridge re-registers
//! a type's constructor when its implementation is recompiled, and the swap
//! coordinator builds replacements from whatever constructor is current.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{AquilaError, Result};
use crate::graph::hotswap::{NodeHandle, ObjectManager};
use crate::graph::node::Node;
use crate::graph::transform::{AnyTransform, BuiltinTransform};
use crate::graph::transforms::{
    BoxBlurTransform, GainTransform, OverlayTransform, ScriptTransform, TestPatternTransform,
    ThresholdTransform,
};

type TransformCtor = Box<dyn Fn() -> AnyTransform + Send + Sync>;

/// Registry of constructable node types.
pub struct NodeRegistry {
    constructors: RwLock<BTreeMap<String, TransformCtor>>,
    object_manager: RwLock<Option<Arc<dyn ObjectManager>>>,
}

impl NodeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            constructors: RwLock::new(BTreeMap::new()),
            object_manager: RwLock::new(None),
        }
    }

    /// A registry with the built-in transform library registered.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register("TestPattern", || {
            AnyTransform::Builtin(BuiltinTransform::TestPattern(TestPatternTransform::new()))
        });
        registry.register("Gain", || {
            AnyTransform::Builtin(BuiltinTransform::Gain(GainTransform::new()))
        });
        registry.register("BoxBlur", || {
            AnyTransform::Builtin(BuiltinTransform::BoxBlur(BoxBlurTransform::new()))
        });
        registry.register("Threshold", || {
            AnyTransform::Builtin(BuiltinTransform::Threshold(ThresholdTransform::new()))
        });
        registry.register("Overlay", || {
            AnyTransform::Builtin(BuiltinTransform::Overlay(OverlayTransform::new()))
        });
        registry.register("Script", || {
            AnyTransform::Builtin(BuiltinTransform::Script(ScriptTransform::new()))
        });
        registry
    }

    /// Register (or replace) a constructor. Replacing is how a recompiled
    /// implementation becomes the one future constructions — and swaps —
    /// pick up.
    pub fn register(
        &self,
        type_name: impl Into<String>,
        ctor: impl Fn() -> AnyTransform + Send + Sync + 'static,
    ) {
        let type_name = type_name.into();
        tracing::debug!(node_type = %type_name, "registered node type");
        self.constructors.write().insert(type_name, Box::new(ctor));
    }

    /// Register a script-backed node type; new instances start from
    /// `source`.
    pub fn register_script(&self, type_name: impl Into<String>, source: impl Into<String>) {
        let source = source.into();
        self.register(type_name, move || {
            AnyTransform::Builtin(BuiltinTransform::Script(ScriptTransform::with_source(
                source.clone(),
            )))
        });
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.constructors.read().contains_key(type_name)
    }

    /// Constructable type names, sorted. Console and web front-ends list
    /// these for the operator.
    pub fn type_names(&self) -> Vec<String> {
        self.constructors.read().keys().cloned().collect()
    }

    /// Construct a bare node of `type_name` (used by the swap path, which
    /// repoints an existing handle).
    pub fn construct_node(&self, type_name: &str) -> Result<Arc<Node>> {
        let constructors = self.constructors.read();
        let ctor = constructors
            .get(type_name)
            .ok_or_else(|| AquilaError::UnknownNodeType(type_name.to_string()))?;
        let node = Node::new(type_name, ctor());
        drop(constructors);
        if let Some(om) = self.object_manager() {
            om.on_node_constructed(type_name);
        }
        Ok(node)
    }

    /// Construct a node of `type_name` behind a fresh handle.
    pub fn create(&self, type_name: &str) -> Result<Arc<NodeHandle>> {
        Ok(NodeHandle::new(self.construct_node(type_name)?))
    }

    /// Attach the external compiler collaborator.
    pub fn set_object_manager(&self, om: Arc<dyn ObjectManager>) {
        *self.object_manager.write() = Some(om);
    }

    pub fn object_manager(&self) -> Option<Arc<dyn ObjectManager>> {
        self.object_manager.read().clone()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
