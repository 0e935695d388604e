//! Rhai scripting for script-backed node transforms.
//!
//! Script sources are compiled to an AST once and re-run per frame; editing
//! a source recompiles it, and the hot-swap bridge uses re-registered
//! script sources as its concrete "recompiled implementation" payload.

pub mod engine;

pub use engine::ScriptEngine;
