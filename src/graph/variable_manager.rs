//! Per-graph registry of output parameters.
//!
//! One `VariableManager` is scoped to one data stream's graph — it is not
//! process-global. It indexes the live `OUTPUT` parameters across all nodes
//! in the graph so front-ends and the config loader can resolve binding
//! candidates by kind and tree name. Entries are weak; the registry is
//! rebuilt lazily whenever the owning stream's topology changes.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::graph::hotswap::NodeHandle;
use crate::graph::node::Node;
use crate::graph::param::{ParamFlags, Parameter, ValueKind};

#[derive(Default)]
pub struct VariableManager {
    outputs: Mutex<Vec<Weak<Parameter>>>,
}

impl VariableManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one output parameter.
    pub fn register_output(&self, param: &Arc<Parameter>) {
        if param.has_flag(ParamFlags::OUTPUT) {
            self.outputs.lock().push(Arc::downgrade(param));
        }
    }

    /// Register every output parameter a node owns.
    pub fn register_node(&self, node: &Arc<Node>) {
        let mut outputs = self.outputs.lock();
        for p in node.parameters() {
            if p.has_flag(ParamFlags::OUTPUT) {
                outputs.push(Arc::downgrade(&p));
            }
        }
    }

    /// Drop everything and re-index the trees under `roots`.
    pub fn rebuild_from(&self, roots: &[Arc<NodeHandle>]) {
        let mut fresh: Vec<Weak<Parameter>> = Vec::new();
        for root in roots {
            collect_outputs(root, &mut fresh);
        }
        tracing::debug!(outputs = fresh.len(), "variable manager rebuilt");
        *self.outputs.lock() = fresh;
    }

    /// Live registered outputs.
    pub fn len(&self) -> usize {
        let mut outputs = self.outputs.lock();
        outputs.retain(|w| w.strong_count() > 0);
        outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self) -> Vec<Arc<Parameter>> {
        let mut outputs = self.outputs.lock();
        outputs.retain(|w| w.strong_count() > 0);
        outputs.iter().filter_map(|w| w.upgrade()).collect()
    }

    /// Tree names of live outputs of the given kind.
    pub fn outputs_of_kind(&self, kind: ValueKind) -> Vec<String> {
        self.live()
            .iter()
            .filter(|p| p.kind() == kind)
            .map(|p| p.tree_name())
            .collect()
    }

    /// Candidate sources for an input parameter: live outputs whose kind
    /// the input accepts, excluding the input's own node. Names, not
    /// references — selection results stay serializable and displayable.
    pub fn find_compatible(&self, input: &Parameter) -> Vec<String> {
        let own_root = input.tree_root();
        self.live()
            .iter()
            .filter(|p| p.tree_root() != own_root && input.accepts_input(p))
            .map(|p| p.tree_name())
            .collect()
    }

    /// Resolve a fully qualified parameter tree name to the live parameter.
    pub fn resolve(&self, tree_name: &str) -> Option<Arc<Parameter>> {
        self.live().into_iter().find(|p| p.tree_name() == tree_name)
    }
}

fn collect_outputs(handle: &Arc<NodeHandle>, out: &mut Vec<Weak<Parameter>>) {
    let Some(node) = handle.current() else { return };
    for p in node.parameters() {
        if p.has_flag(ParamFlags::OUTPUT) {
            out.push(Arc::downgrade(&p));
        }
    }
    for child in node.children() {
        collect_outputs(&child, out);
    }
}
