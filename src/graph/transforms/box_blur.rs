//! BoxBlur — separable box filter with clamped edges.

use crate::graph::param::{ParamSet, ParamValue, Parameter, ValueKind};
use crate::graph::transform::{Transform, TransformContext};
use crate::gpu::GpuFrame;

pub struct BoxBlurTransform;

impl BoxBlurTransform {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BoxBlurTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for BoxBlurTransform {
    fn type_name(&self) -> &'static str {
        "BoxBlur"
    }

    fn init(&mut self, params: &mut ParamSet, _first_init: bool) {
        let radius = params.declare(Parameter::control("radius", ParamValue::Int(1)));
        radius.set_tooltip("Kernel radius in elements");
        params.declare(Parameter::output("output", ValueKind::Frame));
    }

    fn transform(
        &mut self,
        frame: &GpuFrame,
        ctx: &mut TransformContext<'_>,
    ) -> anyhow::Result<GpuFrame> {
        let radius = ctx.params.read_int("radius").unwrap_or(1).max(0) as usize;
        if radius == 0 {
            return Ok(frame.clone());
        }

        let rows = frame.rows();
        let cols = frame.cols();
        let channels = frame.channels();

        ctx.checkpoint("horizontal");
        ctx.stream.enqueue("box_blur_h");
        let mut horizontal = frame.clone();
        for r in 0..rows {
            for c in 0..cols {
                for ch in 0..channels {
                    let mut sum = 0.0;
                    let mut count = 0.0;
                    let lo = c.saturating_sub(radius);
                    let hi = (c + radius).min(cols - 1);
                    for cc in lo..=hi {
                        sum += frame.at(r, cc, ch);
                        count += 1.0;
                    }
                    *horizontal.at_mut(r, c, ch) = sum / count;
                }
            }
        }

        ctx.checkpoint("vertical");
        ctx.stream.enqueue("box_blur_v");
        let mut out = horizontal.clone();
        for r in 0..rows {
            for c in 0..cols {
                for ch in 0..channels {
                    let mut sum = 0.0;
                    let mut count = 0.0;
                    let lo = r.saturating_sub(radius);
                    let hi = (r + radius).min(rows - 1);
                    for rr in lo..=hi {
                        sum += horizontal.at(rr, c, ch);
                        count += 1.0;
                    }
                    *out.at_mut(r, c, ch) = sum / count;
                }
            }
        }

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
    fn test_blur_smooths_impulse() {
        let mut t = BoxBlurTransform::new();
        let mut params = ParamSet::new();
        t.init(&mut params, true);

        let stream = CudaStream::new();
        let mut trace = ProfileTrace::new(false);
        let mut ctx = TransformContext::new(&stream, &params, &mut trace);

        // Single bright element in the middle of a 3x3 frame.
        let input = GpuFrame::from_fn(3, 3, 1, |r, c, _| if r == 1 && c == 1 { 9.0 } else { 0.0 });
        let out = t.transform(&input, &mut ctx).unwrap();

        // Energy spreads: center drops, corners rise above zero.
        assert!(out.at(1, 1, 0) < 9.0);
        assert!(out.at(0, 0, 0) > 0.0);
    }

    #[test]
    fn test_zero_radius_is_identity() {
        let mut t = BoxBlurTransform::new();
        let mut params = ParamSet::new();
        t.init(&mut params, true);
        params
            .get("radius")
            .unwrap()
            .write(ParamValue::Int(0))
            .unwrap();

        let stream = CudaStream::new();
        let mut trace = ProfileTrace::new(false);
        let mut ctx = TransformContext::new(&stream, &params, &mut trace);

        let input = GpuFrame::from_fn(2, 2, 1, |r, c, _| (r * 2 + c) as f32);
        let out = t.transform(&input, &mut ctx).unwrap();
        assert_eq!(out, input);
    }
}
