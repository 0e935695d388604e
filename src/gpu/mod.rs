//! GPU frame and stream abstractions.
//!
//! CUDA kernel math is outside the engine: a transform body is opaque. What
//! the engine does own is the *shape* of device work — frames flowing
//! through the graph and one execution stream per graph onto which device
//! operations are enqueued asynchronously. A node that needs a scalar on
//! the host (a threshold count, a mean) must synchronize the stream
//! explicitly before reading back; nothing else blocks.

pub mod frame;
pub mod stream;

pub use frame::{DoubleBuffer, GpuFrame};
pub use stream::CudaStream;
