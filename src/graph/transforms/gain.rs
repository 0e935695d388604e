//! Gain — multiply every element by a control value.

use crate::graph::param::{ParamSet, ParamValue, Parameter, ValueKind};
use crate::graph::transform::{Transform, TransformContext};
use crate::gpu::GpuFrame;

pub struct GainTransform;

impl GainTransform {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GainTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for GainTransform {
    fn type_name(&self) -> &'static str {
        "Gain"
    }

    fn init(&mut self, params: &mut ParamSet, _first_init: bool) {
        let gain = params.declare(Parameter::control("gain", ParamValue::Float(1.0)));
        gain.set_tooltip("Multiplier applied to every element");
        params.declare(Parameter::output("output", ValueKind::Frame));
    }

    fn transform(
        &mut self,
        frame: &GpuFrame,
        ctx: &mut TransformContext<'_>,
    ) -> anyhow::Result<GpuFrame> {
        let gain = ctx.params.read_float("gain").unwrap_or(1.0) as f32;

        ctx.checkpoint("scale");
        ctx.stream.enqueue("gain");
        let mut out = frame.clone();
        for v in out.data_mut() {
            *v *= gain;
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
    fn test_gain_scales_elements() {
        let mut t = GainTransform::new();
        let mut params = ParamSet::new();
        t.init(&mut params, true);
        params
            .get("gain")
            .unwrap()
            .write(ParamValue::Float(2.5))
            .unwrap();

        let stream = CudaStream::new();
        let mut trace = ProfileTrace::new(false);
        let mut ctx = TransformContext::new(&stream, &params, &mut trace);

        let input = GpuFrame::from_fn(2, 2, 1, |_, _, _| 4.0);
        let out = t.transform(&input, &mut ctx).unwrap();
        assert_eq!(out.at(1, 1, 0), 10.0);

        // Output parameter published for downstream bindings.
        let published = params.read_frame("output").unwrap();
        assert_eq!(published, out);
    }
}
