//! Per-graph execution stream.
//!
//! Device work is enqueued onto the owning graph's stream and retires
//! asynchronously; completion is only observable after an explicit
//! [`CudaStream::synchronize`]. Downstream consumers that read a parameter
//! without a synchronization contract must tolerate device-pending data.

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct StreamState {
    enqueued: u64,
    retired: u64,
}

/// One execution stream per graph.
///
/// Tracks enqueued device operations so the engine (and tests) can observe
/// how much work is still pending. The operation bodies of the stand-in
/// execute inline; the asynchrony contract — pending until synchronized —
/// is what the engine depends on.
#[derive(Debug, Default)]
pub struct CudaStream {
    state: Mutex<StreamState>,
}

impl CudaStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue one device operation. `label` names the op for tracing.
    pub fn enqueue(&self, label: &str) {
        let mut state = self.state.lock();
        state.enqueued += 1;
        tracing::trace!(op = label, pending = state.enqueued - state.retired, "stream enqueue");
    }

    /// Number of operations enqueued but not yet retired.
    pub fn pending(&self) -> u64 {
        let state = self.state.lock();
        state.enqueued - state.retired
    }

    /// Total operations ever enqueued.
    pub fn total_enqueued(&self) -> u64 {
        self.state.lock().enqueued
    }

    /// Block until every enqueued operation has retired.
    pub fn synchronize(&self) {
        let mut state = self.state.lock();
        state.retired = state.enqueued;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_and_synchronize() {
        let stream = CudaStream::new();
        assert_eq!(stream.pending(), 0);

        stream.enqueue("blur");
        stream.enqueue("threshold");
        assert_eq!(stream.pending(), 2);
        assert_eq!(stream.total_enqueued(), 2);

        stream.synchronize();
        assert_eq!(stream.pending(), 0);
        assert_eq!(stream.total_enqueued(), 2);
    }
}
