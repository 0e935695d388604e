//! Overlay — blend a mask frame pulled from another node's output.
//!
//! The `mask` input binds across the graph through the parameter system;
//! reading it takes only the producer parameter's lock, transiently.

use anyhow::bail;

use crate::graph::param::{InputCompat, ParamSet, ParamValue, Parameter, ValueKind};
use crate::graph::transform::{Transform, TransformContext};
use crate::gpu::GpuFrame;

pub struct OverlayTransform;

impl OverlayTransform {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OverlayTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for OverlayTransform {
    fn type_name(&self) -> &'static str {
        "Overlay"
    }

    fn init(&mut self, params: &mut ParamSet, _first_init: bool) {
        let mask = params.declare(Parameter::input(
            "mask",
            InputCompat::Exact(ValueKind::Frame),
        ));
        mask.set_tooltip("Frame blended over the input");
        let opacity = params.declare(Parameter::control("opacity", ParamValue::Float(0.5)));
        opacity.set_tooltip("Blend weight of the mask");
        params.declare(Parameter::output("output", ValueKind::Frame));
    }

    fn transform(
        &mut self,
        frame: &GpuFrame,
        ctx: &mut TransformContext<'_>,
    ) -> anyhow::Result<GpuFrame> {
        let opacity = ctx.params.read_float("opacity").unwrap_or(0.5) as f32;
        let mask = ctx.params.read_frame("mask");

        let out = match mask {
            None => frame.clone(),
            Some(mask) if mask.is_empty() => frame.clone(),
            Some(mask) => {
                if !mask.same_shape(frame) {
                    bail!(
                        "mask shape {}x{}x{} does not match input {}x{}x{}",
                        mask.rows(),
                        mask.cols(),
                        mask.channels(),
                        frame.rows(),
                        frame.cols(),
                        frame.channels()
                    );
                }
                ctx.checkpoint("blend");
                ctx.stream.enqueue("overlay");
                let mut out = frame.clone();
                for (o, m) in out.data_mut().iter_mut().zip(mask.data()) {
                    *o = *o * (1.0 - opacity) + m * opacity;
                }
                out
            }
        };

        ctx.params
            .get("output")?
            .write(ParamValue::Frame(out.clone()))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::CudaStream;
    use crate::graph::profiling::ProfileTrace;

    #[test]
    fn test_unbound_mask_is_passthrough() {
        let mut t = OverlayTransform::new();
        let mut params = ParamSet::new();
        t.init(&mut params, true);

        let stream = CudaStream::new();
        let mut trace = ProfileTrace::new(false);
        let mut ctx = TransformContext::new(&stream, &params, &mut trace);

        let input = GpuFrame::from_fn(2, 2, 1, |_, _, _| 3.0);
        let out = t.transform(&input, &mut ctx).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_bound_mask_blends() {
        let mut t = OverlayTransform::new();
        let mut params = ParamSet::new();
        t.init(&mut params, true);

        let source = Parameter::output("mask_out", ValueKind::Frame);
        source
            .write(ParamValue::Frame(GpuFrame::from_fn(2, 2, 1, |_, _, _| 1.0)))
            .unwrap();
        params.get("mask").unwrap().set_input(Some(&source)).unwrap();

        let stream = CudaStream::new();
        let mut trace = ProfileTrace::new(false);
        let mut ctx = TransformContext::new(&stream, &params, &mut trace);

        let input = GpuFrame::from_fn(2, 2, 1, |_, _, _| 0.0);
        let out = t.transform(&input, &mut ctx).unwrap();
        // 0.0 * 0.5 + 1.0 * 0.5
        assert_eq!(out.at(0, 0, 0), 0.5);
    }

    #[test]
    fn test_shape_mismatch_is_an_error() {
        let mut t = OverlayTransform::new();
        let mut params = ParamSet::new();
        t.init(&mut params, true);

        let source = Parameter::output("mask_out", ValueKind::Frame);
        source
            .write(ParamValue::Frame(GpuFrame::new(4, 4, 1)))
            .unwrap();
        params.get("mask").unwrap().set_input(Some(&source)).unwrap();

        let stream = CudaStream::new();
        let mut trace = ProfileTrace::new(false);
        let mut ctx = TransformContext::new(&stream, &params, &mut trace);

        let input = GpuFrame::new(2, 2, 1);
        assert!(t.transform(&input, &mut ctx).is_err());
    }
}
