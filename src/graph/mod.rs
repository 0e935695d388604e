//! Node-graph execution engine.
//!
//! Frames flow through trees of processing nodes: a parent's transform
//! runs, then its children process the result as a serial pipeline in
//! insertion order. Front-ends mutate the graph through the crossbeam
//! command/event bridge while a dedicated thread drives passes.
//!
//! # Architecture
//!
//! ```text
//! [TestPattern-0] ──► [BoxBlur-0] ──► [Threshold-0] ──► [Overlay-0]
//!                                          │ :mask            ▲
//!                                          └──────── binding ─┘
//! ```
//!
//! # Design
//!
//! - **Handles everywhere** — tree edges and front-end references hold
//!   `NodeHandle`s, so a hot swap repoints one target and every holder
//!   follows.
//! - **Pull-style bindings** — an input parameter reads through its bound
//!   source at process time; nothing is copied until a body reads.
//! - **Reentrant locks** — a node's own callbacks may re-enter it on the
//!   same thread without deadlocking; other threads block.
//! - **Failure isolation** — a transform error degrades that node to a
//!   passthrough for the pass; the rest of the graph is untouched.

pub mod bridge;
pub mod config;
pub mod hotswap;
pub mod id;
pub mod node;
pub mod param;
pub mod profiling;
pub mod registry;
pub mod runtime;
pub mod stream;
pub mod transform;
pub mod transforms;
pub mod variable_manager;

pub use bridge::{
    channel_pair, GraphBridge, GraphCommand, GraphEvent, NodeSnapshot, ParamSnapshot,
    TopologySnapshot,
};
pub use config::{graph_from_config, graph_to_config, GraphConfig, NodeConfig, ParamConfig};
pub use hotswap::{NodeHandle, ObjectManager, SwapCoordinator};
pub use id::{HandleId, NodeUid, SubscriptionId};
pub use node::{Node, PassContext};
pub use param::{
    InputCompat, ParamFlags, ParamSet, ParamSubscription, ParamValue, Parameter, ValueKind,
};
pub use profiling::{ProfileTrace, RollingMean};
pub use registry::NodeRegistry;
pub use runtime::RuntimeContext;
pub use stream::DataStream;
pub use transform::{AnyTransform, BuiltinTransform, Transform, TransformContext};
pub use variable_manager::VariableManager;
