//! Built-in transform library.
//!
//! Each file holds one transform body in the library. These are the opaque
//! per-node algorithms; the engine only cares that they declare parameters
//! in `init` and produce a frame in `transform`.

pub mod box_blur;
pub mod gain;
pub mod overlay;
pub mod script;
pub mod test_pattern;
pub mod threshold;

pub use box_blur::BoxBlurTransform;
pub use gain::GainTransform;
pub use overlay::OverlayTransform;
pub use script::ScriptTransform;
pub use test_pattern::TestPatternTransform;
pub use threshold::ThresholdTransform;
