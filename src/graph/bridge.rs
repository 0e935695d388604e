//! Thread boundary between a data stream and its front-ends.
//!
//! GUI, web, and console layers are external collaborators: they mutate the
//! graph by sending [`GraphCommand`]s and observe it through
//! [`GraphEvent`]s. The channel pair is the whole contract — no front-end
//! code lives in the engine.

use std::path::PathBuf;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::{AquilaError, Result};
use crate::graph::param::{ParamValue, ValueKind};
use crate::types::LogSeverity;

/// Commands sent from a front-end thread to the data stream.
#[derive(Debug, Clone)]
pub enum GraphCommand {
    /// Start the repeated process loop.
    Start,
    /// Stop processing (the graph stays intact).
    Stop,
    /// Pause: the loop idles and in-flight passes drain (swaps need this).
    Pause,
    /// Resume after a pause.
    Resume,
    /// Run exactly one pass, even while paused or stopped.
    Step,
    /// Create a node by type name; `parent` is a full tree name, or `None`
    /// for a new root.
    AddNode {
        type_name: String,
        parent: Option<String>,
    },
    /// Remove the node at the full tree name.
    RemoveNode { full_name: String },
    /// Reorder two children of `parent` (changes fan-out order).
    SwapChildren {
        parent: String,
        index_a: usize,
        index_b: usize,
    },
    /// Bind `node`'s input to the source parameter at `source_tree_name`.
    ConnectInput {
        source_tree_name: String,
        node: String,
        input: String,
    },
    /// Write a parameter value on the node at `node`.
    SetParameter {
        node: String,
        param: String,
        value: ParamValue,
    },
    SetEnabled {
        node: String,
        enabled: bool,
    },
    SaveGraph {
        path: PathBuf,
    },
    LoadGraph {
        path: PathBuf,
    },
    RequestTopology,
    Shutdown,
}

/// Events sent from the data stream back to front-ends.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    NodeAdded { full_name: String },
    NodeRemoved { full_name: String },
    InputConnected {
        node: String,
        input: String,
        source: String,
    },
    Topology(TopologySnapshot),
    PassCompleted { pass: u64 },
    Paused,
    Resumed,
    /// A per-node log line (severity, originating node path, message).
    Log {
        severity: LogSeverity,
        node: String,
        message: String,
    },
    /// A command failed; the reason is user-visible.
    GraphError(String),
    GraphSaved { path: PathBuf },
    GraphLoaded { path: PathBuf },
    Shutdown,
}

/// Snapshot of one parameter for display.
#[derive(Debug, Clone)]
pub struct ParamSnapshot {
    pub name: String,
    pub kind: ValueKind,
    pub is_input: bool,
    pub is_output: bool,
    /// Tree name of the bound source, for bound inputs.
    pub bound_to: Option<String>,
}

/// Snapshot of one node for display.
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub node_name: String,
    pub tree_name: String,
    pub full_tree_name: String,
    pub enabled: bool,
    pub processing_time_ms: f64,
    /// Tree names of direct children, in fan-out order.
    pub children: Vec<String>,
    pub parameters: Vec<ParamSnapshot>,
}

/// Complete topology snapshot of one graph.
#[derive(Debug, Clone, Default)]
pub struct TopologySnapshot {
    pub nodes: Vec<NodeSnapshot>,
}

/// Front-end half of the command/event channel pair.
pub struct GraphBridge {
    commands: Sender<GraphCommand>,
    events: Receiver<GraphEvent>,
}

impl GraphBridge {
    pub fn send(&self, command: GraphCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| AquilaError::ChannelDisconnected)
    }

    /// Non-blocking drain of pending events.
    pub fn drain_events(&self) -> Vec<GraphEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Block for the next event.
    pub fn recv_event(&self) -> Result<GraphEvent> {
        self.events.recv().map_err(|_| AquilaError::ChannelDisconnected)
    }

    pub fn events(&self) -> &Receiver<GraphEvent> {
        &self.events
    }
}

/// Build the bridge plus the stream-side endpoints.
pub fn channel_pair() -> (GraphBridge, Receiver<GraphCommand>, Sender<GraphEvent>) {
    let (cmd_tx, cmd_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    (
        GraphBridge {
            commands: cmd_tx,
            events: event_rx,
        },
        cmd_rx,
        event_tx,
    )
}
