//! TestPattern — a source transform producing a constant frame per pass.
//!
//! Sources run even on an empty input (`skip_empty() == false`); every
//! other node in a chain downstream of a source sees its frames.

use crate::graph::param::{ParamSet, ParamValue, Parameter, ValueKind};
use crate::graph::transform::{Transform, TransformContext};
use crate::gpu::GpuFrame;

pub struct TestPatternTransform;

impl TestPatternTransform {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TestPatternTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for TestPatternTransform {
    fn type_name(&self) -> &'static str {
        "TestPattern"
    }

    fn init(&mut self, params: &mut ParamSet, _first_init: bool) {
        params.declare(Parameter::control("rows", ParamValue::Int(8)));
        params.declare(Parameter::control("cols", ParamValue::Int(8)));
        params.declare(Parameter::control("value", ParamValue::Float(1.0)));
        params.declare(Parameter::state("frame_index", ParamValue::Int(0)));
        params.declare(Parameter::output("output", ValueKind::Frame));
    }

    fn transform(
        &mut self,
        _frame: &GpuFrame,
        ctx: &mut TransformContext<'_>,
    ) -> anyhow::Result<GpuFrame> {
        let rows = ctx.params.read_int("rows").unwrap_or(8).max(0) as usize;
        let cols = ctx.params.read_int("cols").unwrap_or(8).max(0) as usize;
        let value = ctx.params.read_float("value").unwrap_or(1.0) as f32;

        ctx.checkpoint("generate");
        ctx.stream.enqueue("test_pattern");
        let out = GpuFrame::from_fn(rows, cols, 1, |_, _, _| value);

        let index = ctx.params.read_int("frame_index").unwrap_or(0);
        ctx.params
            .get("frame_index")?
            .write(ParamValue::Int(index + 1))?;
        ctx.params
            .get("output")?
            .write(ParamValue::Frame(out.clone()))?;

        Ok(out)
    }

    fn skip_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::CudaStream;
    use crate::graph::profiling::ProfileTrace;

    #[test]
    fn test_produces_frame_from_empty_input() {
        let mut t = TestPatternTransform::new();
        let mut params = ParamSet::new();
        t.init(&mut params, true);

        let stream = CudaStream::new();
        let mut trace = ProfileTrace::new(false);
        let mut ctx = TransformContext::new(&stream, &params, &mut trace);

        let out = t.transform(&GpuFrame::empty(), &mut ctx).unwrap();
        assert_eq!(out.rows(), 8);
        assert_eq!(out.cols(), 8);
        assert_eq!(out.at(0, 0, 0), 1.0);
        assert!(!t.skip_empty());
    }

    #[test]
    fn test_frame_index_advances() {
        let mut t = TestPatternTransform::new();
        let mut params = ParamSet::new();
        t.init(&mut params, true);

        let stream = CudaStream::new();
        for _ in 0..3 {
            let mut trace = ProfileTrace::new(false);
            let mut ctx = TransformContext::new(&stream, &params, &mut trace);
            t.transform(&GpuFrame::empty(), &mut ctx).unwrap();
        }
        assert_eq!(params.read_int("frame_index"), Some(3));
    }
}
