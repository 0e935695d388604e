//! Rhai engine wrapper for frame scripts.
//!
//! ## Script Interface
//!
//! A frame script receives:
//! - `pixels` - Array of element values (row-major, channel-interleaved)
//! - `rows`, `cols`, `channels` - frame dimensions
//!
//! and must return the (possibly modified) array. Element count must be
//! preserved; the frame keeps its dimensions.
//!
//! ## Helper Functions
//!
//! - `clamp01(x)` - clamp to [0, 1]
//! - `lerp(a, b, t)` - linear interpolation
//! - `smoothstep(e0, e1, x)` - smooth Hermite step
//!
//! Example — invert an intensity frame:
//! ```rhai
//! let len = pixels.len();
//! for i in 0..len {
//!     pixels[i] = 1.0 - pixels[i];
//! }
//! pixels
//! ```

use rhai::{Array, Dynamic, Engine, Scope, AST};

use crate::error::{AquilaError, Result};
use crate::gpu::GpuFrame;

/// The engine used by script-backed transforms.
pub struct ScriptEngine {
    engine: Engine,
}

impl ScriptEngine {
    pub fn new() -> Self {
        let mut engine = Engine::new();

        engine.register_fn("clamp01", |x: f64| x.clamp(0.0, 1.0));
        engine.register_fn("lerp", |a: f64, b: f64, t: f64| a + (b - a) * t);
        engine.register_fn("smoothstep", |e0: f64, e1: f64, x: f64| {
            let t = ((x - e0) / (e1 - e0)).clamp(0.0, 1.0);
            t * t * (3.0 - 2.0 * t)
        });

        Self { engine }
    }

    /// Access the underlying Rhai engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compile a script source to an AST.
    pub fn compile(&self, source: &str) -> Result<AST> {
        self.engine
            .compile(source)
            .map_err(|e| AquilaError::Script(format!("Compile error: {e}")))
    }

    /// Run a compiled frame script against `frame`, returning the new frame.
    pub fn eval_frame(&self, ast: &AST, frame: &GpuFrame) -> Result<GpuFrame> {
        let pixels: Array = frame.data().iter().map(|v| Dynamic::from(*v as f64)).collect();

        let mut scope = Scope::new();
        scope.push("pixels", pixels);
        scope.push("rows", frame.rows() as i64);
        scope.push("cols", frame.cols() as i64);
        scope.push("channels", frame.channels() as i64);

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, ast)
            .map_err(|e| AquilaError::Script(format!("Execution error: {e}")))?;

        let array = result
            .try_cast::<Array>()
            .ok_or_else(|| AquilaError::Script("script must return the pixel array".into()))?;

        if array.len() != frame.len() {
            return Err(AquilaError::Script(format!(
                "script changed element count: {} -> {}",
                frame.len(),
                array.len()
            )));
        }

        let mut out = frame.clone();
        for (dst, item) in out.data_mut().iter_mut().zip(array) {
            *dst = item.as_float().unwrap_or_else(|_| f64::from(*dst)) as f32;
        }
        Ok(out)
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}
