//! The core Node entity: one position in a processing tree.
//!
//! A node owns its parameters and its ordered children (insertion order is
//! the fan-out order), holds a weak back-reference to its parent, and
//! exposes [`Node::process`]. All tree and child references are
//! [`NodeHandle`]s — the hot-swap indirection — never bare node objects.
//!
//! ## Locking discipline
//!
//! The node's own lock is reentrant; the process algorithm acquires it
//! first, then every owned parameter's lock in declared order, before the
//! transform body runs. Same-thread re-entry never deadlocks; a different
//! thread blocks. A transform must never block on another node's node lock
//! while its own parameter locks are held — cross-node reads go through
//! parameter bindings, which take only the producer parameter's lock
//! transiently.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::ReentrantMutex;

use crate::error::{AquilaError, Result};
use crate::gpu::{CudaStream, DoubleBuffer, GpuFrame};
use crate::graph::hotswap::NodeHandle;
use crate::graph::id::{NodeUid, SubscriptionId};
use crate::graph::param::{ParamFlags, ParamSet, ParamSubscription, Parameter};
use crate::graph::profiling::{ProfileTrace, RollingMean};
use crate::graph::runtime::RuntimeContext;
use crate::graph::transform::{AnyTransform, TransformContext};
use crate::types::{LogCallback, LogSeverity, ProcessStats};

/// Per-pass context threaded through the tree by the owning data stream.
pub struct PassContext<'a> {
    /// The graph's execution stream.
    pub stream: &'a CudaStream,
    /// Cooperative interruption flag, checked at the top of every
    /// `process` call.
    pub interrupt: &'a AtomicBool,
}

type UpdatedFn = dyn Fn(&Node) + Send + Sync;

struct NodeState {
    tree_name: String,
    full_tree_name: String,
    enabled: bool,
    profile: bool,
    draw_results: bool,
    external_display: bool,
    unique_id: i64,
    self_handle: Weak<NodeHandle>,
    parent: Weak<NodeHandle>,
    children: Vec<Arc<NodeHandle>>,
    /// Monotone per-base-name counters: indices are never reused, even
    /// after an earlier sibling is deleted.
    sibling_counters: HashMap<String, usize>,
    params: ParamSet,
    /// Taken out while the body runs; a re-entrant pass on the same thread
    /// sees `None` and passes through.
    transform: Option<AnyTransform>,
    child_slot: DoubleBuffer<GpuFrame>,
    frame_times: RollingMean,
    passes: u64,
    last_breakdown: Option<String>,
    log_callback: Option<LogCallback>,
    updated_subs: Vec<(SubscriptionId, Arc<UpdatedFn>)>,
    /// Wiring of parameter updates into the node-updated signal.
    notifier_subs: Vec<ParamSubscription>,
    /// Subscriptions registered via `register_parameter_callback`;
    /// disconnected when the node drops.
    user_param_subs: Vec<ParamSubscription>,
}

/// A unit of graph computation owning parameters and child nodes.
pub struct Node {
    uid: NodeUid,
    node_name: String,
    state: ReentrantMutex<RefCell<NodeState>>,
}

impl Node {
    /// Construct a node of type `node_name` around a transform body and run
    /// its first init. Registers with the process-wide runtime context (for
    /// the reset broadcast) when one is alive.
    pub fn new(node_name: impl Into<String>, transform: AnyTransform) -> Arc<Node> {
        let node_name = node_name.into();
        let node = Arc::new(Node {
            uid: NodeUid::next(),
            node_name: node_name.clone(),
            state: ReentrantMutex::new(RefCell::new(NodeState {
                tree_name: node_name.clone(),
                full_tree_name: node_name.clone(),
                enabled: true,
                profile: false,
                draw_results: false,
                external_display: false,
                unique_id: 0,
                self_handle: Weak::new(),
                parent: Weak::new(),
                children: Vec::new(),
                sibling_counters: HashMap::new(),
                params: ParamSet::new(),
                transform: Some(transform),
                child_slot: DoubleBuffer::new(),
                frame_times: RollingMean::default(),
                passes: 0,
                last_breakdown: None,
                log_callback: None,
                updated_subs: Vec::new(),
                notifier_subs: Vec::new(),
                user_param_subs: Vec::new(),
            })),
        });
        node.init(true);
        if let Some(runtime) = RuntimeContext::current() {
            runtime.register_node(&node);
        }
        tracing::trace!(node = %node_name, uid = %node.uid, "constructed");
        node
    }

    /// (Re)initialize: run the transform's parameter declarations (which
    /// are idempotent) and rewire update notifiers. The reset broadcast
    /// calls this with `first_init = false` on every live node.
    pub fn init(self: &Arc<Self>, first_init: bool) {
        let transform = {
            let g = self.state.lock();
            let taken = g.borrow_mut().transform.take();
            taken
        };
        if let Some(mut tf) = transform {
            {
                let g = self.state.lock();
                let mut st = g.borrow_mut();
                tf.init(&mut st.params, first_init);
                st.transform = Some(tf);
            }
            let root = self.full_tree_name();
            let params: Vec<Arc<Parameter>> = {
                let g = self.state.lock();
                let p = g.borrow().params.iter().cloned().collect();
                p
            };
            for p in &params {
                p.set_tree_root(&root);
            }
        }
        self.wire_param_notifiers();
    }

    fn wire_param_notifiers(self: &Arc<Self>) {
        let params: Vec<Arc<Parameter>> = {
            let g = self.state.lock();
            let p = g.borrow().params.iter().cloned().collect();
            p
        };
        let mut subs = Vec::with_capacity(params.len());
        for p in &params {
            let weak = Arc::downgrade(self);
            subs.push(p.on_update(move |_| {
                if let Some(node) = weak.upgrade() {
                    node.emit_updated();
                }
            }));
        }
        let g = self.state.lock();
        g.borrow_mut().notifier_subs = subs;
    }

    // ── Identity & attributes ──

    pub fn uid(&self) -> NodeUid {
        self.uid
    }

    /// The factory type name.
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Unique-within-siblings name, `<node_name>-<index>`.
    pub fn tree_name(&self) -> String {
        self.state.lock().borrow().tree_name.clone()
    }

    /// Dot-joined path from the tree root.
    pub fn full_tree_name(&self) -> String {
        self.state.lock().borrow().full_tree_name.clone()
    }

    pub fn enabled(&self) -> bool {
        self.state.lock().borrow().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().borrow_mut().enabled = enabled;
    }

    pub fn profile(&self) -> bool {
        self.state.lock().borrow().profile
    }

    pub fn set_profile(&self, profile: bool) {
        self.state.lock().borrow_mut().profile = profile;
    }

    pub fn draw_results(&self) -> bool {
        self.state.lock().borrow().draw_results
    }

    pub fn set_draw_results(&self, draw: bool) {
        self.state.lock().borrow_mut().draw_results = draw;
    }

    pub fn external_display(&self) -> bool {
        self.state.lock().borrow().external_display
    }

    pub fn set_external_display(&self, external: bool) {
        self.state.lock().borrow_mut().external_display = external;
    }

    pub fn unique_id(&self) -> i64 {
        self.state.lock().borrow().unique_id
    }

    pub fn set_unique_id(&self, id: i64) {
        self.state.lock().borrow_mut().unique_id = id;
    }

    /// Whether the body is skipped on empty input (delegates to the
    /// transform; sources return false).
    pub fn skip_empty(&self) -> bool {
        let g = self.state.lock();
        let b = g.borrow();
        b.transform.as_ref().map(|t| t.skip_empty()).unwrap_or(true)
    }

    pub fn stats(&self) -> ProcessStats {
        let g = self.state.lock();
        let st = g.borrow();
        ProcessStats {
            passes: st.passes,
            avg_ms: st.frame_times.mean(),
        }
    }

    /// Rolling mean of per-call duration in milliseconds.
    pub fn processing_time_ms(&self) -> f64 {
        self.state.lock().borrow().frame_times.mean()
    }

    /// The most recent profiling breakdown, if profiling is enabled.
    pub fn profile_breakdown(&self) -> Option<String> {
        self.state.lock().borrow().last_breakdown.clone()
    }

    // ── Handle & parent plumbing ──

    pub(crate) fn bind_handle(&self, handle: &Arc<NodeHandle>) {
        self.state.lock().borrow_mut().self_handle = Arc::downgrade(handle);
    }

    /// This node's hot-swap handle.
    pub fn handle(&self) -> Option<Arc<NodeHandle>> {
        self.state.lock().borrow().self_handle.upgrade()
    }

    pub fn parent_handle(&self) -> Option<Arc<NodeHandle>> {
        self.state.lock().borrow().parent.upgrade()
    }

    pub fn parent(&self) -> Option<Arc<Node>> {
        self.parent_handle().and_then(|h| h.current())
    }

    pub fn set_parent(&self, parent: Option<&Arc<NodeHandle>>) {
        let g = self.state.lock();
        g.borrow_mut().parent = parent.map(Arc::downgrade).unwrap_or_default();
    }

    // ── Tree management ──

    /// Add `child` as the last child. Assigns its tree name from the
    /// monotone per-base-name counter, sets its parent back-reference and
    /// propagates this node's log callback. Returns the same handle so
    /// construction can chain.
    pub fn add_child(self: &Arc<Self>, child: Arc<NodeHandle>) -> Result<Arc<NodeHandle>> {
        let child_node = child
            .current()
            .ok_or_else(|| AquilaError::DetachedHandle(format!("{:?}", child.id())))?;
        let self_handle = self
            .handle()
            .ok_or_else(|| AquilaError::NodeNotFound(format!("{} has no handle", self.full_tree_name())))?;

        {
            let g = self.state.lock();
            if g.borrow().children.iter().any(|c| c.id() == child.id()) {
                return Ok(child);
            }
        }

        let log_cb = {
            let g = self.state.lock();
            let cb = g.borrow().log_callback.clone();
            cb
        };
        if let Some(cb) = log_cb {
            child_node.set_log_callback(cb);
        }

        let base = child_node.node_name().to_string();
        let index = {
            let g = self.state.lock();
            let mut st = g.borrow_mut();
            let counter = st.sibling_counters.entry(base.clone()).or_insert(0);
            let index = *counter;
            *counter += 1;
            st.children.push(child.clone());
            index
        };

        child_node.set_parent(Some(&self_handle));
        child_node.set_tree_name(&format!("{base}-{index}"));
        self.log(
            LogSeverity::Trace,
            &format!("added child {}", child_node.tree_name()),
        );
        Ok(child)
    }

    /// Remove the first child whose tree name matches.
    pub fn remove_child_by_name(&self, tree_name: &str) -> bool {
        let removed = {
            let g = self.state.lock();
            let mut st = g.borrow_mut();
            match st.children.iter().position(|c| {
                c.current().map(|n| n.tree_name() == tree_name).unwrap_or(false)
            }) {
                Some(i) => Some(st.children.remove(i)),
                None => None,
            }
        };
        Self::clear_removed_parent(removed)
    }

    pub fn remove_child_at(&self, index: usize) -> bool {
        let removed = {
            let g = self.state.lock();
            let mut st = g.borrow_mut();
            if index < st.children.len() {
                Some(st.children.remove(index))
            } else {
                None
            }
        };
        Self::clear_removed_parent(removed)
    }

    /// Remove a child by handle identity.
    pub fn remove_child(&self, child: &Arc<NodeHandle>) -> bool {
        let removed = {
            let g = self.state.lock();
            let mut st = g.borrow_mut();
            match st.children.iter().position(|c| c.id() == child.id()) {
                Some(i) => Some(st.children.remove(i)),
                None => None,
            }
        };
        Self::clear_removed_parent(removed)
    }

    fn clear_removed_parent(removed: Option<Arc<NodeHandle>>) -> bool {
        match removed {
            Some(handle) => {
                if let Some(node) = handle.current() {
                    node.set_parent(None);
                }
                true
            }
            None => false,
        }
    }

    /// Direct children only, linear scan by tree name.
    pub fn get_child(&self, tree_name: &str) -> Option<Arc<NodeHandle>> {
        let g = self.state.lock();
        let st = g.borrow();
        st.children
            .iter()
            .find(|c| c.current().map(|n| n.tree_name() == tree_name).unwrap_or(false))
            .cloned()
    }

    pub fn get_child_at(&self, index: usize) -> Option<Arc<NodeHandle>> {
        self.state.lock().borrow().children.get(index).cloned()
    }

    pub fn children(&self) -> Vec<Arc<NodeHandle>> {
        self.state.lock().borrow().children.clone()
    }

    pub fn child_count(&self) -> usize {
        self.state.lock().borrow().children.len()
    }

    /// Make sure future children named `base` start numbering at `min`
    /// or later. The config loader restores saved tree names (which may
    /// have gaps after deletions) and then raises the counter past them.
    pub(crate) fn ensure_sibling_counter_at_least(&self, base: &str, min: usize) {
        let g = self.state.lock();
        let mut st = g.borrow_mut();
        let counter = st.sibling_counters.entry(base.to_string()).or_insert(0);
        if *counter < min {
            *counter = min;
        }
    }

    /// Reorder two children in place; changes fan-out order, never names.
    pub fn swap_children(&self, idx1: usize, idx2: usize) -> bool {
        let g = self.state.lock();
        let mut st = g.borrow_mut();
        if idx1 < st.children.len() && idx2 < st.children.len() {
            st.children.swap(idx1, idx2);
            true
        } else {
            false
        }
    }

    pub fn swap_children_by_name(&self, name1: &str, name2: &str) -> bool {
        let g = self.state.lock();
        let mut st = g.borrow_mut();
        let pos = |st: &NodeState, name: &str| {
            st.children.iter().position(|c| {
                c.current().map(|n| n.tree_name() == name).unwrap_or(false)
            })
        };
        match (pos(&st, name1), pos(&st, name2)) {
            (Some(a), Some(b)) => {
                st.children.swap(a, b);
                true
            }
            _ => false,
        }
    }

    pub fn swap_children_by_handle(&self, h1: &Arc<NodeHandle>, h2: &Arc<NodeHandle>) -> bool {
        let g = self.state.lock();
        let mut st = g.borrow_mut();
        let a = st.children.iter().position(|c| c.id() == h1.id());
        let b = st.children.iter().position(|c| c.id() == h2.id());
        match (a, b) {
            (Some(a), Some(b)) => {
                st.children.swap(a, b);
                true
            }
            _ => false,
        }
    }

    /// Rename this node and re-derive every descendant's full tree name.
    /// Owned parameters are re-stamped with the new tree root.
    pub fn set_tree_name(&self, name: &str) {
        let parent_full = self
            .parent_handle()
            .and_then(|h| h.current())
            .map(|p| p.full_tree_name());
        let full = match parent_full {
            Some(pf) => format!("{pf}.{name}"),
            None => name.to_string(),
        };
        {
            let g = self.state.lock();
            g.borrow_mut().tree_name = name.to_string();
        }
        self.set_full_tree_name(&full);

        let children = self.children();
        for child in children {
            if let Some(node) = child.current() {
                let tn = node.tree_name();
                node.set_tree_name(&tn);
            }
        }
    }

    fn set_full_tree_name(&self, full: &str) {
        let params: Vec<Arc<Parameter>> = {
            let g = self.state.lock();
            let mut st = g.borrow_mut();
            st.full_tree_name = full.to_string();
            st.params.iter().cloned().collect()
        };
        for p in params {
            p.set_tree_root(full);
        }
    }

    // ── Scope resolution ──

    fn scope_root(&self) -> Option<Arc<NodeHandle>> {
        let mut current = self.handle()?;
        loop {
            let parent = current.current().and_then(|n| n.parent_handle());
            match parent {
                Some(p) => current = p,
                None => return Some(current),
            }
        }
    }

    /// Every node in this node's tree: walk to the root first, then a
    /// pre-order traversal.
    pub fn nodes_in_scope(&self) -> Vec<Arc<NodeHandle>> {
        let mut nodes = Vec::new();
        if let Some(root) = self.scope_root() {
            collect_preorder(&root, &mut nodes);
        }
        nodes
    }

    /// Resolve a full tree name (e.g. `TestPattern-0.BoxBlur-0`) anywhere
    /// in this node's tree.
    pub fn node_in_scope(&self, name: &str) -> Option<Arc<NodeHandle>> {
        let root = self.scope_root()?;
        let root_node = root.current()?;
        let root_full = root_node.full_tree_name();
        if name == root_full {
            return Some(root);
        }
        let rest = name.strip_prefix(&format!("{root_full}."))?;
        descend(&root, rest)
    }

    // ── Parameters ──

    /// Register a parameter into the owned list and wire its update
    /// notifier into the node-updated signal.
    pub fn add_parameter(self: &Arc<Self>, param: Arc<Parameter>) -> Arc<Parameter> {
        param.set_tree_root(&self.full_tree_name());
        let p = {
            let g = self.state.lock();
            let mut st = g.borrow_mut();
            st.params.declare(param)
        };
        self.wire_param_notifiers();
        p
    }

    /// Write `value` to the named parameter, creating a `CONTROL`
    /// parameter of the value's kind if none exists yet.
    pub fn update_parameter(
        self: &Arc<Self>,
        name: &str,
        value: crate::graph::param::ParamValue,
    ) -> Result<Arc<Parameter>> {
        if let Some(existing) = self.get_parameter_opt(name) {
            existing.write(value)?;
            return Ok(existing);
        }
        let param = self.add_parameter(Parameter::control(name, value));
        Ok(param)
    }

    /// Throwing accessor: the parameter must exist.
    pub fn get_parameter(&self, name: &str) -> Result<Arc<Parameter>> {
        self.state.lock().borrow().params.get(name)
    }

    /// Optional accessor: absence is legitimate, logged at debug only.
    pub fn get_parameter_opt(&self, name: &str) -> Option<Arc<Parameter>> {
        self.state.lock().borrow().params.get_opt(name)
    }

    pub fn get_parameter_at(&self, index: usize) -> Result<Arc<Parameter>> {
        self.state.lock().borrow().params.get_at(index)
    }

    pub fn get_parameter_at_opt(&self, index: usize) -> Option<Arc<Parameter>> {
        self.state.lock().borrow().params.get_at_opt(index)
    }

    pub fn parameters(&self) -> Vec<Arc<Parameter>> {
        self.state.lock().borrow().params.iter().cloned().collect()
    }

    pub fn list_parameters(&self) -> Vec<String> {
        self.state.lock().borrow().params.names()
    }

    pub fn list_inputs(&self) -> Vec<String> {
        self.state
            .lock()
            .borrow()
            .params
            .iter()
            .filter(|p| p.has_flag(ParamFlags::INPUT))
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Subscribe to updates of the named parameter; the subscription lives
    /// as long as the node and disconnects when it drops.
    pub fn register_parameter_callback(
        &self,
        name: &str,
        callback: impl Fn(&Parameter) + Send + Sync + 'static,
    ) -> Result<()> {
        let param = self.get_parameter(name)?;
        let sub = param.on_update(callback);
        self.state.lock().borrow_mut().user_param_subs.push(sub);
        Ok(())
    }

    pub fn register_parameter_callback_at(
        &self,
        index: usize,
        callback: impl Fn(&Parameter) + Send + Sync + 'static,
    ) -> Result<()> {
        let param = self.get_parameter_at(index)?;
        let sub = param.on_update(callback);
        self.state.lock().borrow_mut().user_param_subs.push(sub);
        Ok(())
    }

    // ── Binding ──

    /// Candidate sources for the named input: every `OUTPUT` parameter in
    /// scope whose kind the input accepts, excluding this node's own
    /// parameters. Returns fully qualified tree names, not live references.
    pub fn find_compatible_inputs(&self, input_name: &str) -> Result<Vec<String>> {
        let input = self.get_parameter(input_name)?;
        if !input.has_flag(ParamFlags::INPUT) {
            return Err(AquilaError::NotAnInput(input.tree_name()));
        }
        Ok(self.find_sources_for(&input))
    }

    fn find_sources_for(&self, input: &Parameter) -> Vec<String> {
        let mut out = Vec::new();
        for handle in self.nodes_in_scope() {
            let Some(node) = handle.current() else { continue };
            if node.uid == self.uid {
                continue;
            }
            for p in node.parameters() {
                if p.has_flag(ParamFlags::OUTPUT) && input.accepts_input(&p) {
                    out.push(p.tree_name());
                }
            }
        }
        out
    }

    /// One candidate list per input parameter.
    pub fn find_all_compatible_inputs(&self) -> Vec<(String, Vec<String>)> {
        self.parameters()
            .iter()
            .filter(|p| p.has_flag(ParamFlags::INPUT))
            .map(|p| (p.name().to_string(), self.find_sources_for(p)))
            .collect()
    }

    /// Resolve `<node full tree name>:<param name>` within this node's
    /// scope.
    pub fn resolve_parameter(&self, tree_name: &str) -> Result<Arc<Parameter>> {
        let (node_name, param_name) = tree_name.rsplit_once(':').ok_or_else(|| {
            AquilaError::Config(format!("malformed parameter tree name: {tree_name}"))
        })?;
        let handle = self
            .node_in_scope(node_name)
            .ok_or_else(|| AquilaError::NodeNotFound(node_name.to_string()))?;
        let node = handle
            .current()
            .ok_or_else(|| AquilaError::DetachedHandle(node_name.to_string()))?;
        node.get_parameter(param_name)
    }

    /// Bind the named input to the source at `source_tree_name`.
    pub fn set_input_parameter(&self, source_tree_name: &str, input_name: &str) -> Result<()> {
        let input = self.get_parameter(input_name)?;
        let source = self.resolve_parameter(source_tree_name)?;
        input.set_input(Some(&source))
    }

    pub fn set_input_parameter_at(&self, source_tree_name: &str, input_index: usize) -> Result<()> {
        let input = self.get_parameter_at(input_index)?;
        let source = self.resolve_parameter(source_tree_name)?;
        input.set_input(Some(&source))
    }

    // ── Signals & logging ──

    /// Subscribe to the "this subtree updated" signal.
    pub fn on_updated(&self, f: impl Fn(&Node) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.state
            .lock()
            .borrow_mut()
            .updated_subs
            .push((id, Arc::new(f)));
        id
    }

    pub fn remove_updated_callback(&self, id: SubscriptionId) {
        self.state
            .lock()
            .borrow_mut()
            .updated_subs
            .retain(|(sid, _)| *sid != id);
    }

    /// Fire the updated signal locally, then bubble up the parent chain.
    pub fn emit_updated(&self) {
        let subs: Vec<Arc<UpdatedFn>> = {
            let g = self.state.lock();
            let s = g.borrow().updated_subs.iter().map(|(_, f)| f.clone()).collect();
            s
        };
        for f in subs {
            f(self);
        }
        if let Some(parent) = self.parent() {
            parent.emit_updated();
        }
    }

    /// Attach the pluggable log callback `(severity, message, node path)`.
    /// `add_child` propagates it to new children.
    pub fn set_log_callback(&self, callback: LogCallback) {
        self.state.lock().borrow_mut().log_callback = Some(callback);
    }

    /// Emit a per-node log line through `tracing` and the attached
    /// callback, tagged with this node's full tree name.
    pub fn log(&self, severity: LogSeverity, message: &str) {
        let path = self.full_tree_name();
        match severity {
            LogSeverity::Trace => tracing::trace!(node = %path, "{message}"),
            LogSeverity::Debug => tracing::debug!(node = %path, "{message}"),
            LogSeverity::Info => tracing::info!(node = %path, "{message}"),
            LogSeverity::Warning => tracing::warn!(node = %path, "{message}"),
            LogSeverity::Error => tracing::error!(node = %path, "{message}"),
            LogSeverity::Fatal => tracing::error!(node = %path, fatal = true, "{message}"),
        }
        let callback = {
            let g = self.state.lock();
            let cb = g.borrow().log_callback.clone();
            cb
        };
        if let Some(cb) = callback {
            cb(severity, message, &path);
        }
    }

    // ── Processing ──

    /// Process one frame through this node and its subtree.
    ///
    /// Children form a serial pipeline over the frame: child i's output is
    /// child i+1's input, and when children exist the *last* child's result
    /// is this call's return value.
    pub fn process(&self, mut frame: GpuFrame, ctx: &PassContext<'_>) -> GpuFrame {
        if ctx.interrupt.load(Ordering::Relaxed) {
            return frame;
        }

        if frame.is_empty() && self.skip_empty() {
            self.log(LogSeverity::Trace, "skipped: empty input");
        } else {
            frame = self.run_transform(frame, ctx);
        }

        // Snapshot the children under the node lock so concurrent
        // structural edits do not corrupt iteration; an edit landing after
        // the snapshot is observed on the next pass.
        let children = {
            let g = self.state.lock();
            let c = g.borrow().children.clone();
            c
        };
        if children.is_empty() {
            return frame;
        }

        // Copy the result into the double-buffered child slot so this
        // node's own output buffer is not mutated while children read.
        let mut child_buf = {
            let g = self.state.lock();
            let mut st = g.borrow_mut();
            let slot = st.child_slot.front_mut();
            if frame.is_empty() {
                *slot = GpuFrame::empty();
            } else {
                frame.copy_to(slot, ctx.stream);
            }
            slot.clone()
        };

        self.log(
            LogSeverity::Trace,
            &format!("executing {} child nodes", children.len()),
        );
        for (index, handle) in children.iter().enumerate() {
            match handle.current() {
                Some(child) => child_buf = child.process(child_buf, ctx),
                None => self.log(
                    LogSeverity::Error,
                    &format!("null child with idx: {index}"),
                ),
            }
        }
        child_buf
    }

    fn run_transform(&self, frame: GpuFrame, ctx: &PassContext<'_>) -> GpuFrame {
        let start = Instant::now();
        let mut out = frame;

        let enabled = self.enabled();
        if enabled {
            // Node lock first, then every owned parameter lock in declared
            // order. The fixed order across all nodes keeps acquisition
            // deadlock-free graph-wide.
            let node_guard = self.state.lock();
            let param_snapshot: Vec<Arc<Parameter>> =
                node_guard.borrow().params.iter().cloned().collect();
            let _param_guards: Vec<_> = param_snapshot.iter().map(|p| p.hold_lock()).collect();

            let profile = node_guard.borrow().profile;
            let mut trace = ProfileTrace::new(profile);
            trace.checkpoint("start");

            let transform = {
                let taken = node_guard.borrow_mut().transform.take();
                taken
            };
            match transform {
                None => self.log(
                    LogSeverity::Trace,
                    "re-entrant pass: transform busy, passing through",
                ),
                Some(mut tf) => {
                    let params = node_guard.borrow().params.clone();
                    let result = {
                        let mut tctx = TransformContext::new(ctx.stream, &params, &mut trace);
                        tf.transform(&out, &mut tctx)
                    };
                    node_guard.borrow_mut().transform = Some(tf);
                    match result {
                        Ok(produced) => out = produced,
                        Err(e) => self.log(
                            LogSeverity::Error,
                            &format!("transform failed, passing input through: {e:#}"),
                        ),
                    }
                }
            }

            trace.checkpoint("end");
            if let Some(breakdown) = trace.breakdown() {
                self.log(LogSeverity::Trace, &format!("profile: {breakdown}"));
                node_guard.borrow_mut().last_breakdown = Some(breakdown);
            }
        } else {
            self.log(LogSeverity::Trace, "disabled: passing input through");
        }

        let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;
        {
            let g = self.state.lock();
            let mut st = g.borrow_mut();
            st.frame_times.push(elapsed_ms);
            st.passes += 1;
        }
        out
    }

    // ── Swap support ──

    /// Transfer tree identity and owned state from `old` into this
    /// replacement node. Parameter objects are adopted wholesale, so
    /// bindings, control values, and subscriptions survive the swap;
    /// parameters only the replacement declares are kept too.
    pub(crate) fn adopt_state_from(self: &Arc<Self>, old: &Arc<Node>) {
        let (tree, full, enabled, profile, draw, ext, uid, parent, children, counters, log_cb) = {
            let g = old.state.lock();
            let st = g.borrow();
            (
                st.tree_name.clone(),
                st.full_tree_name.clone(),
                st.enabled,
                st.profile,
                st.draw_results,
                st.external_display,
                st.unique_id,
                st.parent.clone(),
                st.children.clone(),
                st.sibling_counters.clone(),
                st.log_callback.clone(),
            )
        };
        {
            let g = self.state.lock();
            let mut st = g.borrow_mut();
            st.tree_name = tree;
            st.enabled = enabled;
            st.profile = profile;
            st.draw_results = draw;
            st.external_display = ext;
            st.unique_id = uid;
            st.parent = parent;
            st.children = children;
            st.sibling_counters = counters;
            st.log_callback = log_cb;
        }
        {
            let go = old.state.lock();
            let old_params = go.borrow().params.clone();
            let gs = self.state.lock();
            gs.borrow_mut().params.merge_preserving(&old_params);
        }
        self.set_full_tree_name(&full);
        self.wire_param_notifiers();
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        tracing::trace!(node = %self.node_name, uid = %self.uid, "destroyed");
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("uid", &self.uid)
            .field("node_name", &self.node_name)
            .field("full_tree_name", &self.full_tree_name())
            .finish()
    }
}

fn collect_preorder(handle: &Arc<NodeHandle>, out: &mut Vec<Arc<NodeHandle>>) {
    out.push(handle.clone());
    if let Some(node) = handle.current() {
        for child in node.children() {
            collect_preorder(&child, out);
        }
    }
}

fn descend(handle: &Arc<NodeHandle>, rest: &str) -> Option<Arc<NodeHandle>> {
    let node = handle.current()?;
    let (segment, remainder) = match rest.split_once('.') {
        Some((s, r)) => (s, Some(r)),
        None => (rest, None),
    };
    let child = node.get_child(segment)?;
    match remainder {
        None => Some(child),
        Some(r) => descend(&child, r),
    }
}
