//! Script — a transform whose body is a user-editable Rhai script.
//!
//! The source lives in a `CONTROL` parameter so front-ends edit it like any
//! other control; the body recompiles when it observes a changed source. A
//! failed compile or run surfaces as a transform error — the node boundary
//! passes the input through and logs it, same as any other failing body.

use anyhow::anyhow;
use rhai::AST;

use crate::graph::param::{ParamSet, ParamValue, Parameter, ValueKind};
use crate::graph::transform::{Transform, TransformContext};
use crate::gpu::GpuFrame;
use crate::scripting::ScriptEngine;

pub struct ScriptTransform {
    engine: ScriptEngine,
    /// Source the current AST was compiled from.
    compiled_source: String,
    compiled: Option<AST>,
    initial_source: String,
}

impl ScriptTransform {
    pub fn new() -> Self {
        Self::with_source("")
    }

    /// A script transform whose `source` control starts at `source`.
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            engine: ScriptEngine::new(),
            compiled_source: String::new(),
            compiled: None,
            initial_source: source.into(),
        }
    }

    fn recompile_if_changed(&mut self, source: &str) -> anyhow::Result<()> {
        if source == self.compiled_source && (self.compiled.is_some() || source.is_empty()) {
            return Ok(());
        }
        self.compiled_source = source.to_string();
        if source.is_empty() {
            self.compiled = None;
            return Ok(());
        }
        match self.engine.compile(source) {
            Ok(ast) => {
                self.compiled = Some(ast);
                tracing::debug!("script transform compiled");
                Ok(())
            }
            Err(e) => {
                self.compiled = None;
                Err(anyhow!(e))
            }
        }
    }
}

impl Default for ScriptTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform for ScriptTransform {
    fn type_name(&self) -> &'static str {
        "Script"
    }

    fn init(&mut self, params: &mut ParamSet, _first_init: bool) {
        let source = params.declare(Parameter::control(
            "source",
            ParamValue::Text(self.initial_source.clone()),
        ));
        source.set_tooltip("Rhai script run per frame; receives `pixels`");
        params.declare(Parameter::output("output", ValueKind::Frame));
    }

    fn transform(
        &mut self,
        frame: &GpuFrame,
        ctx: &mut TransformContext<'_>,
    ) -> anyhow::Result<GpuFrame> {
        let source = ctx.params.read_text("source").unwrap_or_default();
        self.recompile_if_changed(&source)?;

        let out = match &self.compiled {
            None => frame.clone(),
            Some(ast) => {
                ctx.checkpoint("script");
                ctx.stream.enqueue("script");
                self.engine.eval_frame(ast, frame)?
            }
        };

        ctx.params
            .get("output")?
            .write(ParamValue::Frame(out.clone()))?;
        Ok(out)
    }
}
