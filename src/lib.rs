//! # Aquila: node-graph engine for GPU vision pipelines
//!
//! Aquila is the execution core of a vision-pipeline framework: operators
//! compose trees of processing nodes that pass GPU frame buffers through
//! per-graph execution streams, bind node outputs to node inputs across the
//! graph, and swap recompiled node implementations into a running process
//! without losing graph state.
//!
//! ## Architecture
//!
//! - **Graph**: `Node` trees behind hot-swap `NodeHandle`s, driven by a
//!   `DataStream` loop thread
//! - **Parameters**: typed, flagged value cells with pull-style
//!   input-to-output bindings and update/delete notification
//! - **Scripting**: Rhai-backed transform bodies that recompile on edit
//! - **Communication**: crossbeam command/event channels for front-ends
//!
//! GUI, web, and console front-ends are external collaborators: they speak
//! `GraphCommand`/`GraphEvent` over the bridge and hold `NodeHandle`s.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use aquila::graph::{DataStream, GraphCommand, NodeRegistry};
//!
//! fn main() -> aquila::Result<()> {
//!     let registry = Arc::new(NodeRegistry::with_builtins());
//!     let (stream, bridge, worker) = DataStream::spawn(registry)?;
//!
//!     bridge.send(GraphCommand::AddNode {
//!         type_name: "TestPattern".into(),
//!         parent: None,
//!     })?;
//!     bridge.send(GraphCommand::AddNode {
//!         type_name: "BoxBlur".into(),
//!         parent: Some("TestPattern-0".into()),
//!     })?;
//!     bridge.send(GraphCommand::Start)?;
//!
//!     // ... drive the UI from bridge events ...
//!
//!     bridge.send(GraphCommand::Shutdown)?;
//!     worker.join().ok();
//!     let _ = stream;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod gpu;
pub mod graph;
pub mod scripting;
pub mod types;

// Re-export commonly used types
pub use error::{AquilaError, Result, ResultExt};
pub use gpu::{CudaStream, GpuFrame};
pub use graph::{
    DataStream, GraphBridge, GraphCommand, GraphEvent, Node, NodeHandle, NodeRegistry,
    ObjectManager, ParamFlags, ParamValue, Parameter, SwapCoordinator, ValueKind,
};
pub use scripting::ScriptEngine;
pub use types::{LogCallback, LogSeverity, ProcessStats};
