//! Threshold — binary mask plus a host-side scalar readback.
//!
//! The fraction-above scalar needs the device work retired before the host
//! can read it, so this body synchronizes the stream explicitly — the only
//! kind of blocking a node is allowed to do.

use crate::graph::param::{ParamSet, ParamValue, Parameter, ValueKind};
use crate::graph::transform::{Transform, TransformContext};
use crate::gpu::GpuFrame;

pub struct ThresholdTransform;

impl ThresholdTransform {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ThresholdTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for ThresholdTransform {
    fn type_name(&self) -> &'static str {
        "Threshold"
    }

    fn init(&mut self, params: &mut ParamSet, _first_init: bool) {
        let threshold = params.declare(Parameter::control("threshold", ParamValue::Float(0.5)));
        threshold.set_tooltip("Elements above this value map to 1.0");
        params.declare(Parameter::output("mask", ValueKind::Frame));
        params.declare(Parameter::output("fraction_above", ValueKind::Float));
    }

    fn transform(
        &mut self,
        frame: &GpuFrame,
        ctx: &mut TransformContext<'_>,
    ) -> anyhow::Result<GpuFrame> {
        let threshold = ctx.params.read_float("threshold").unwrap_or(0.5) as f32;

        ctx.checkpoint("compare");
        ctx.stream.enqueue("threshold");
        let mut mask = frame.clone();
        let mut above = 0usize;
        for v in mask.data_mut() {
            if *v > threshold {
                *v = 1.0;
                above += 1;
            } else {
                *v = 0.0;
            }
        }

        // Scalar readback: wait for the enqueued compare to retire first.
        ctx.checkpoint("readback");
        ctx.stream.synchronize();
        let fraction = if mask.len() == 0 {
            0.0
        } else {
            above as f64 / mask.len() as f64
        };

        ctx.params
            .get("mask")?
            .write(ParamValue::Frame(mask.clone()))?;
        ctx.params
            .get("fraction_above")?
            .write(ParamValue::Float(fraction))?;
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::CudaStream;
    use crate::graph::profiling::ProfileTrace;

    #[test]
    fn test_threshold_masks_and_counts() {
        let mut t = ThresholdTransform::new();
        let mut params = ParamSet::new();
        t.init(&mut params, true);

        let stream = CudaStream::new();
        let mut trace = ProfileTrace::new(false);
        let mut ctx = TransformContext::new(&stream, &params, &mut trace);

        let input = GpuFrame::from_fn(2, 2, 1, |r, c, _| (r * 2 + c) as f32 * 0.4);
        let out = t.transform(&input, &mut ctx).unwrap();

        // 0.0, 0.4 below; 0.8, 1.2 above the 0.5 default.
        assert_eq!(out.at(0, 0, 0), 0.0);
        assert_eq!(out.at(1, 1, 0), 1.0);
        assert_eq!(params.read_float("fraction_above"), Some(0.5));

        // The readback synchronized the stream.
        assert_eq!(stream.pending(), 0);
    }
}
