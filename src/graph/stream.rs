//! DataStream — owner of one processing graph.
//!
//! A data stream owns the root node handles, the graph's execution stream,
//! the per-graph variable manager, and the interrupt flag, and drives
//! repeated passes on a dedicated thread. Multiple data streams coexist and
//! run independent graphs concurrently; each shares the process-wide
//! runtime context for the reset broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{AquilaError, Result};
use crate::gpu::{CudaStream, GpuFrame};
use crate::graph::bridge::{
    channel_pair, GraphBridge, GraphCommand, GraphEvent, NodeSnapshot, ParamSnapshot,
    TopologySnapshot,
};
use crate::graph::config;
use crate::graph::hotswap::NodeHandle;
use crate::graph::node::PassContext;
use crate::graph::param::ParamFlags;
use crate::graph::registry::NodeRegistry;
use crate::graph::runtime::RuntimeContext;
use crate::graph::variable_manager::VariableManager;
use crate::types::LogCallback;

pub struct DataStream {
    cuda: Arc<CudaStream>,
    registry: Arc<NodeRegistry>,
    variables: VariableManager,
    /// Holding the context keeps the process-wide reset scope alive; it is
    /// torn down when the last data stream drops.
    _runtime: Arc<RuntimeContext>,
    roots: Mutex<Vec<Arc<NodeHandle>>>,
    /// Monotone per-base-name counters for root tree names.
    root_counters: Mutex<HashMap<String, usize>>,
    interrupt: AtomicBool,
    active: AtomicBool,
    paused: AtomicBool,
    running: AtomicBool,
    in_flight: AtomicBool,
    pass: AtomicU64,
}

impl DataStream {
    pub fn new(registry: Arc<NodeRegistry>) -> Arc<Self> {
        Arc::new(Self {
            cuda: Arc::new(CudaStream::new()),
            registry,
            variables: VariableManager::new(),
            _runtime: RuntimeContext::acquire(),
            roots: Mutex::new(Vec::new()),
            root_counters: Mutex::new(HashMap::new()),
            interrupt: AtomicBool::new(false),
            active: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            running: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            pass: AtomicU64::new(0),
        })
    }

    /// Construct the stream and its loop thread, returning the front-end
    /// bridge.
    pub fn spawn(registry: Arc<NodeRegistry>) -> Result<(Arc<Self>, GraphBridge, JoinHandle<()>)> {
        let stream = Self::new(registry);
        let (bridge, cmd_rx, event_tx) = channel_pair();
        let runner = stream.clone();
        let handle = std::thread::Builder::new()
            .name("aquila-datastream".to_string())
            .spawn(move || runner.run(cmd_rx, event_tx))?;
        Ok((stream, bridge, handle))
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn cuda_stream(&self) -> &Arc<CudaStream> {
        &self.cuda
    }

    pub fn variables(&self) -> &VariableManager {
        &self.variables
    }

    // ── Graph building ──

    /// Add a root node, assigning its tree name from the stream's monotone
    /// per-base-name counter, and re-index the variable manager.
    pub fn add_root(&self, handle: Arc<NodeHandle>) -> Arc<NodeHandle> {
        if let Some(node) = handle.current() {
            let base = node.node_name().to_string();
            let index = {
                let mut counters = self.root_counters.lock();
                let counter = counters.entry(base.clone()).or_insert(0);
                let index = *counter;
                *counter += 1;
                index
            };
            node.set_parent(None);
            node.set_tree_name(&format!("{base}-{index}"));
        }
        self.roots.lock().push(handle.clone());
        self.rebuild_variables();
        handle
    }

    /// Create a node by type name and add it as a root.
    pub fn create_root(&self, type_name: &str) -> Result<Arc<NodeHandle>> {
        Ok(self.add_root(self.registry.create(type_name)?))
    }

    pub fn remove_root(&self, handle: &Arc<NodeHandle>) -> bool {
        let removed = {
            let mut roots = self.roots.lock();
            match roots.iter().position(|r| r.id() == handle.id()) {
                Some(i) => {
                    roots.remove(i);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.rebuild_variables();
        }
        removed
    }

    pub fn roots(&self) -> Vec<Arc<NodeHandle>> {
        self.roots.lock().clone()
    }

    /// Re-index the variable manager after a topology change.
    pub fn rebuild_variables(&self) {
        let roots = self.roots();
        self.variables.rebuild_from(&roots);
    }

    /// Resolve a full tree name across all of this stream's trees.
    pub fn node_in_scope(&self, full_name: &str) -> Option<Arc<NodeHandle>> {
        for root in self.roots() {
            if let Some(node) = root.current() {
                if let Some(found) = node.node_in_scope(full_name) {
                    return Some(found);
                }
            }
        }
        None
    }

    // ── Processing ──

    /// Run one pass: feed an empty frame into each root in order. Source
    /// nodes produce content; everything else propagates.
    pub fn process_pass(&self) {
        self.in_flight.store(true, Ordering::SeqCst);
        let roots = self.roots();
        let ctx = PassContext {
            stream: &self.cuda,
            interrupt: &self.interrupt,
        };
        for root in &roots {
            match root.current() {
                Some(node) => {
                    node.process(GpuFrame::empty(), &ctx);
                }
                None => tracing::error!(handle = ?root.id(), "detached root handle"),
            }
        }
        self.pass.fetch_add(1, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
    }

    fn run_pass_guarded(&self) -> bool {
        self.in_flight.store(true, Ordering::SeqCst);
        if !self.active.load(Ordering::SeqCst) || self.paused.load(Ordering::SeqCst) {
            self.in_flight.store(false, Ordering::SeqCst);
            return false;
        }
        let roots = self.roots();
        let ctx = PassContext {
            stream: &self.cuda,
            interrupt: &self.interrupt,
        };
        for root in &roots {
            match root.current() {
                Some(node) => {
                    node.process(GpuFrame::empty(), &ctx);
                }
                None => tracing::error!(handle = ?root.id(), "detached root handle"),
            }
        }
        self.pass.fetch_add(1, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
        true
    }

    pub fn passes(&self) -> u64 {
        self.pass.load(Ordering::SeqCst)
    }

    /// Pause and wait until no pass is in flight. Required before a swap.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        while self.in_flight.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        tracing::debug!("data stream paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Paused with no pass in flight: the precondition for a swap.
    pub fn is_swap_safe(&self) -> bool {
        self.is_paused() && !self.in_flight.load(Ordering::SeqCst)
    }

    /// Set the cooperative interruption flag; the in-progress pass returns
    /// its current buffers without further fan-out.
    pub fn request_interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    pub fn clear_interrupt(&self) {
        self.interrupt.store(false, Ordering::SeqCst);
    }

    // ── Main run loop ──

    /// Run until `Shutdown` is received. Drains commands, then processes
    /// one pass when started and not paused.
    pub fn run(self: &Arc<Self>, cmd_rx: Receiver<GraphCommand>, event_tx: Sender<GraphEvent>) {
        tracing::info!("data stream thread started");
        self.running.store(true, Ordering::SeqCst);

        while self.running.load(Ordering::SeqCst) {
            while let Ok(cmd) = cmd_rx.try_recv() {
                self.handle_command(cmd, &event_tx);
            }

            if self.active.load(Ordering::SeqCst) && !self.paused.load(Ordering::SeqCst) {
                if self.run_pass_guarded() {
                    let _ = event_tx.send(GraphEvent::PassCompleted {
                        pass: self.passes(),
                    });
                }
                std::thread::sleep(Duration::from_millis(1));
            } else {
                std::thread::sleep(Duration::from_millis(5));
            }
        }

        let _ = event_tx.send(GraphEvent::Shutdown);
        tracing::info!("data stream thread exiting");
    }

    fn log_forwarder(event_tx: &Sender<GraphEvent>) -> LogCallback {
        let tx = event_tx.clone();
        Arc::new(move |severity, message, node| {
            let _ = tx.send(GraphEvent::Log {
                severity,
                node: node.to_string(),
                message: message.to_string(),
            });
        })
    }

    /// Apply one front-end command. Failures surface as `GraphError`
    /// events; nothing escapes the pass boundary.
    pub fn handle_command(&self, command: GraphCommand, event_tx: &Sender<GraphEvent>) {
        match command {
            GraphCommand::Start => {
                self.clear_interrupt();
                self.active.store(true, Ordering::SeqCst);
            }
            GraphCommand::Stop => {
                self.active.store(false, Ordering::SeqCst);
            }
            GraphCommand::Pause => {
                self.pause();
                let _ = event_tx.send(GraphEvent::Paused);
            }
            GraphCommand::Resume => {
                self.resume();
                let _ = event_tx.send(GraphEvent::Resumed);
            }
            GraphCommand::Step => {
                self.process_pass();
                let _ = event_tx.send(GraphEvent::PassCompleted {
                    pass: self.passes(),
                });
            }
            GraphCommand::AddNode { type_name, parent } => {
                self.handle_add_node(&type_name, parent.as_deref(), event_tx);
            }
            GraphCommand::RemoveNode { full_name } => {
                self.handle_remove_node(&full_name, event_tx);
            }
            GraphCommand::SwapChildren {
                parent,
                index_a,
                index_b,
            } => match self.node_in_scope(&parent).and_then(|h| h.current()) {
                Some(node) => {
                    if !node.swap_children(index_a, index_b) {
                        let _ = event_tx.send(GraphEvent::GraphError(format!(
                            "cannot swap children {index_a} and {index_b} of {parent}"
                        )));
                    }
                }
                None => {
                    let _ = event_tx.send(GraphEvent::GraphError(format!(
                        "no node named {parent}"
                    )));
                }
            },
            GraphCommand::ConnectInput {
                source_tree_name,
                node,
                input,
            } => match self.node_in_scope(&node).and_then(|h| h.current()) {
                Some(target) => match target.set_input_parameter(&source_tree_name, &input) {
                    Ok(()) => {
                        let _ = event_tx.send(GraphEvent::InputConnected {
                            node,
                            input,
                            source: source_tree_name,
                        });
                    }
                    Err(e) => {
                        let _ = event_tx.send(GraphEvent::GraphError(e.to_string()));
                    }
                },
                None => {
                    let _ = event_tx.send(GraphEvent::GraphError(format!("no node named {node}")));
                }
            },
            GraphCommand::SetParameter { node, param, value } => {
                match self.node_in_scope(&node).and_then(|h| h.current()) {
                    Some(target) => {
                        let result = target
                            .get_parameter(&param)
                            .and_then(|p| p.write(value));
                        if let Err(e) = result {
                            let _ = event_tx.send(GraphEvent::GraphError(e.to_string()));
                        }
                    }
                    None => {
                        let _ =
                            event_tx.send(GraphEvent::GraphError(format!("no node named {node}")));
                    }
                }
            }
            GraphCommand::SetEnabled { node, enabled } => {
                match self.node_in_scope(&node).and_then(|h| h.current()) {
                    Some(target) => target.set_enabled(enabled),
                    None => {
                        let _ =
                            event_tx.send(GraphEvent::GraphError(format!("no node named {node}")));
                    }
                }
            }
            GraphCommand::SaveGraph { path } => {
                match config::save_graph_to_path(&path, &self.roots()) {
                    Ok(()) => {
                        let _ = event_tx.send(GraphEvent::GraphSaved { path });
                    }
                    Err(e) => {
                        let _ = event_tx.send(GraphEvent::GraphError(e.to_string()));
                    }
                }
            }
            GraphCommand::LoadGraph { path } => {
                match config::load_graph_from_path(&path, &self.registry) {
                    Ok(loaded) => {
                        let forwarder = Self::log_forwarder(event_tx);
                        for root in loaded {
                            if let Some(node) = root.current() {
                                node.set_log_callback(forwarder.clone());
                                // Keep the root counter past restored names
                                // so later additions do not collide.
                                let tree_name = node.tree_name();
                                if let Some((base, index)) = tree_name
                                    .rsplit_once('-')
                                    .and_then(|(b, i)| i.parse::<usize>().ok().map(|i| (b, i)))
                                {
                                    let mut counters = self.root_counters.lock();
                                    let counter = counters.entry(base.to_string()).or_insert(0);
                                    if *counter <= index {
                                        *counter = index + 1;
                                    }
                                }
                            }
                            self.roots.lock().push(root);
                        }
                        self.rebuild_variables();
                        let _ = event_tx.send(GraphEvent::GraphLoaded { path });
                    }
                    Err(e) => {
                        let _ = event_tx.send(GraphEvent::GraphError(e.to_string()));
                    }
                }
            }
            GraphCommand::RequestTopology => {
                let _ = event_tx.send(GraphEvent::Topology(self.topology_snapshot()));
            }
            GraphCommand::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    fn handle_add_node(
        &self,
        type_name: &str,
        parent: Option<&str>,
        event_tx: &Sender<GraphEvent>,
    ) {
        let created = match self.registry.create(type_name) {
            Ok(handle) => handle,
            Err(e) => {
                let _ = event_tx.send(GraphEvent::GraphError(e.to_string()));
                return;
            }
        };
        if let Some(node) = created.current() {
            node.set_log_callback(Self::log_forwarder(event_tx));
        }

        let result = match parent {
            None => {
                self.add_root(created.clone());
                Ok(created.clone())
            }
            Some(parent_name) => match self.node_in_scope(parent_name).and_then(|h| h.current()) {
                Some(parent_node) => parent_node.add_child(created.clone()),
                None => Err(AquilaError::NodeNotFound(parent_name.to_string())),
            },
        };

        match result {
            Ok(handle) => {
                self.rebuild_variables();
                if let Some(node) = handle.current() {
                    let _ = event_tx.send(GraphEvent::NodeAdded {
                        full_name: node.full_tree_name(),
                    });
                }
            }
            Err(e) => {
                let _ = event_tx.send(GraphEvent::GraphError(e.to_string()));
            }
        }
    }

    fn handle_remove_node(&self, full_name: &str, event_tx: &Sender<GraphEvent>) {
        let Some(handle) = self.node_in_scope(full_name) else {
            let _ = event_tx.send(GraphEvent::GraphError(format!(
                "no node named {full_name}"
            )));
            return;
        };
        let parent = handle.current().and_then(|n| n.parent());
        let removed = match parent {
            Some(parent_node) => parent_node.remove_child(&handle),
            None => self.remove_root(&handle),
        };
        if removed {
            self.rebuild_variables();
            let _ = event_tx.send(GraphEvent::NodeRemoved {
                full_name: full_name.to_string(),
            });
        } else {
            let _ = event_tx.send(GraphEvent::GraphError(format!(
                "failed to remove {full_name}"
            )));
        }
    }

    /// Snapshot every node in the stream for display.
    pub fn topology_snapshot(&self) -> TopologySnapshot {
        let mut nodes = Vec::new();
        for root in self.roots() {
            if let Some(node) = root.current() {
                for handle in node.nodes_in_scope() {
                    let Some(n) = handle.current() else { continue };
                    let parameters = n
                        .parameters()
                        .iter()
                        .map(|p| ParamSnapshot {
                            name: p.name().to_string(),
                            kind: p.kind(),
                            is_input: p.has_flag(ParamFlags::INPUT),
                            is_output: p.has_flag(ParamFlags::OUTPUT),
                            bound_to: p.input_source().map(|s| s.tree_name()),
                        })
                        .collect();
                    nodes.push(NodeSnapshot {
                        node_name: n.node_name().to_string(),
                        tree_name: n.tree_name(),
                        full_tree_name: n.full_tree_name(),
                        enabled: n.enabled(),
                        processing_time_ms: n.processing_time_ms(),
                        children: n
                            .children()
                            .iter()
                            .filter_map(|c| c.current().map(|cn| cn.tree_name()))
                            .collect(),
                        parameters,
                    });
                }
            }
        }
        TopologySnapshot { nodes }
    }
}
