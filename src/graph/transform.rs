//! Transform abstraction for node bodies.
//!
//! Two-layer design:
//! - **`Transform` trait** — for extensibility and plugin node bodies.
//! - **`BuiltinTransform` enum** — for the built-in library. The compiler
//!   can inline match arms, eliminating dynamic dispatch on the hot path.
//!
//! `AnyTransform` wraps either variant so a node can hold both uniformly.
//! A transform body is the opaque per-node algorithm: it reads its declared
//! parameters through the context, enqueues device work on the graph's
//! stream, and returns the output frame. Errors it raises are caught at the
//! node boundary and never abort the pass.

use crate::gpu::{CudaStream, GpuFrame};
use crate::graph::param::ParamSet;
use crate::graph::profiling::ProfileTrace;

/// Context passed to a transform body for one call.
pub struct TransformContext<'a> {
    /// The owning graph's execution stream.
    pub stream: &'a CudaStream,
    /// The node's parameters (locked by the caller for the duration).
    pub params: &'a ParamSet,
    trace: &'a mut ProfileTrace,
}

impl<'a> TransformContext<'a> {
    pub fn new(stream: &'a CudaStream, params: &'a ParamSet, trace: &'a mut ProfileTrace) -> Self {
        Self {
            stream,
            params,
            trace,
        }
    }

    /// Record a profiling checkpoint; a no-op unless the node is profiling.
    pub fn checkpoint(&mut self, label: &'static str) {
        self.trace.checkpoint(label);
    }
}

/// Trait for pluggable/user-defined node bodies.
pub trait Transform: Send {
    /// The factory type name of this transform.
    fn type_name(&self) -> &'static str;

    /// Declare (or refresh) parameters. Called with `first_init = true` at
    /// construction and `false` on every reset broadcast; declarations are
    /// idempotent, so existing values and bindings survive a re-init.
    fn init(&mut self, params: &mut ParamSet, first_init: bool);

    /// Process one frame. The input is borrowed so the caller can pass it
    /// through unchanged if this body fails.
    fn transform(
        &mut self,
        frame: &GpuFrame,
        ctx: &mut TransformContext<'_>,
    ) -> anyhow::Result<GpuFrame>;

    /// Whether the node should skip its body on an empty input frame.
    /// Sources that *produce* frames return `false`.
    fn skip_empty(&self) -> bool {
        true
    }
}

use crate::graph::transforms::{
    BoxBlurTransform, GainTransform, OverlayTransform, ScriptTransform, TestPatternTransform,
    ThresholdTransform,
};

/// Enum dispatch for the built-in transform library.
pub enum BuiltinTransform {
    TestPattern(TestPatternTransform),
    Gain(GainTransform),
    BoxBlur(BoxBlurTransform),
    Threshold(ThresholdTransform),
    Overlay(OverlayTransform),
    Script(ScriptTransform),
}

impl BuiltinTransform {
    pub fn type_name(&self) -> &'static str {
        match self {
            BuiltinTransform::TestPattern(t) => t.type_name(),
            BuiltinTransform::Gain(t) => t.type_name(),
            BuiltinTransform::BoxBlur(t) => t.type_name(),
            BuiltinTransform::Threshold(t) => t.type_name(),
            BuiltinTransform::Overlay(t) => t.type_name(),
            BuiltinTransform::Script(t) => t.type_name(),
        }
    }

    pub fn init(&mut self, params: &mut ParamSet, first_init: bool) {
        match self {
            BuiltinTransform::TestPattern(t) => t.init(params, first_init),
            BuiltinTransform::Gain(t) => t.init(params, first_init),
            BuiltinTransform::BoxBlur(t) => t.init(params, first_init),
            BuiltinTransform::Threshold(t) => t.init(params, first_init),
            BuiltinTransform::Overlay(t) => t.init(params, first_init),
            BuiltinTransform::Script(t) => t.init(params, first_init),
        }
    }

    pub fn transform(
        &mut self,
        frame: &GpuFrame,
        ctx: &mut TransformContext<'_>,
    ) -> anyhow::Result<GpuFrame> {
        match self {
            BuiltinTransform::TestPattern(t) => t.transform(frame, ctx),
            BuiltinTransform::Gain(t) => t.transform(frame, ctx),
            BuiltinTransform::BoxBlur(t) => t.transform(frame, ctx),
            BuiltinTransform::Threshold(t) => t.transform(frame, ctx),
            BuiltinTransform::Overlay(t) => t.transform(frame, ctx),
            BuiltinTransform::Script(t) => t.transform(frame, ctx),
        }
    }

    pub fn skip_empty(&self) -> bool {
        match self {
            BuiltinTransform::TestPattern(t) => t.skip_empty(),
            BuiltinTransform::Gain(t) => t.skip_empty(),
            BuiltinTransform::BoxBlur(t) => t.skip_empty(),
            BuiltinTransform::Threshold(t) => t.skip_empty(),
            BuiltinTransform::Overlay(t) => t.skip_empty(),
            BuiltinTransform::Script(t) => t.skip_empty(),
        }
    }
}

/// Wrapper holding either a built-in transform (enum dispatch) or a plugin
/// (trait object).
pub enum AnyTransform {
    Builtin(BuiltinTransform),
    Plugin(Box<dyn Transform>),
}

impl AnyTransform {
    pub fn type_name(&self) -> &'static str {
        match self {
            AnyTransform::Builtin(t) => t.type_name(),
            AnyTransform::Plugin(t) => t.type_name(),
        }
    }

    pub fn init(&mut self, params: &mut ParamSet, first_init: bool) {
        match self {
            AnyTransform::Builtin(t) => t.init(params, first_init),
            AnyTransform::Plugin(t) => t.init(params, first_init),
        }
    }

    pub fn transform(
        &mut self,
        frame: &GpuFrame,
        ctx: &mut TransformContext<'_>,
    ) -> anyhow::Result<GpuFrame> {
        match self {
            AnyTransform::Builtin(t) => t.transform(frame, ctx),
            AnyTransform::Plugin(t) => t.transform(frame, ctx),
        }
    }

    pub fn skip_empty(&self) -> bool {
        match self {
            AnyTransform::Builtin(t) => t.skip_empty(),
            AnyTransform::Plugin(t) => t.skip_empty(),
        }
    }
}
