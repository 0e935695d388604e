//! Per-node timing: rolling-window mean and optional sub-stage traces.

use std::collections::VecDeque;
use std::time::Instant;

/// Rolling mean over the last `capacity` samples.
#[derive(Debug)]
pub struct RollingMean {
    window: VecDeque<f64>,
    capacity: usize,
    sum: f64,
}

impl RollingMean {
    /// Window size used for the smoothed per-node processing time.
    pub const DEFAULT_WINDOW: usize = 10;

    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.window.len() == self.capacity {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        self.window.push_back(sample);
        self.sum += sample;
    }

    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.sum / self.window.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }
}

impl Default for RollingMean {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

/// Fine-grained sub-stage timestamps captured during one transform call.
///
/// Disabled traces are free: [`checkpoint`](Self::checkpoint) is a no-op.
/// A transform body marks its stages through
/// `TransformContext::checkpoint`; the node renders the collected marks as
/// a human-readable breakdown after the call.
#[derive(Debug)]
pub struct ProfileTrace {
    enabled: bool,
    marks: Vec<(Instant, &'static str)>,
}

impl ProfileTrace {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            marks: Vec::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn checkpoint(&mut self, label: &'static str) {
        if self.enabled {
            self.marks.push((Instant::now(), label));
        }
    }

    /// Render `(stage_a,stage_b,delta_ms)` pairs between consecutive marks.
    /// Returns `None` unless at least two marks were captured.
    pub fn breakdown(&self) -> Option<String> {
        if self.marks.len() < 2 {
            return None;
        }
        let mut out = String::new();
        for pair in self.marks.windows(2) {
            let (t0, l0) = pair[0];
            let (t1, l1) = pair[1];
            let delta_ms = t1.duration_since(t0).as_secs_f64() * 1e3;
            out.push_str(&format!("({l0},{l1},{delta_ms:.3}ms)"));
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rolling_mean_window() {
        let mut m = RollingMean::new(3);
        assert_eq!(m.mean(), 0.0);

        m.push(1.0);
        m.push(2.0);
        m.push(3.0);
        assert!((m.mean() - 2.0).abs() < 1e-9);

        // Oldest sample (1.0) falls out of the window.
        m.push(4.0);
        assert!((m.mean() - 3.0).abs() < 1e-9);
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn test_disabled_trace_captures_nothing() {
        let mut trace = ProfileTrace::new(false);
        trace.checkpoint("start");
        trace.checkpoint("end");
        assert!(trace.breakdown().is_none());
    }

    #[test]
    fn test_breakdown_renders_pairs() {
        let mut trace = ProfileTrace::new(true);
        trace.checkpoint("start");
        trace.checkpoint("filter");
        trace.checkpoint("end");
        let s = trace.breakdown().unwrap();
        assert!(s.contains("(start,filter,"));
        assert!(s.contains("(filter,end,"));
    }
}
