use serde::Serialize;
use std::sync::Mutex;

/// Counters for the recoverable events of an acquisition run.
pub struct AcquisitionMetrics {
    inner: Mutex<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub frames: u64,
    pub timeouts: u64,
    pub discarded_bytes: u64,
    pub decode_errors: u64,
    pub sink_drops: u64,
}

impl AcquisitionMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsSnapshot)) {
        if let Ok(mut metrics) = self.inner.lock() {
            apply(&mut metrics);
        }
    }

    pub fn record_frame(&self) {
        self.update(|m| m.frames += 1);
    }

    pub fn record_timeout(&self) {
        self.update(|m| m.timeouts += 1);
    }

    pub fn record_discarded(&self, bytes: usize) {
        if bytes > 0 {
            self.update(|m| m.discarded_bytes += bytes as u64);
        }
    }

    pub fn record_decode_error(&self) {
        self.update(|m| m.decode_errors += 1);
    }

    pub fn record_sink_drop(&self) {
        self.update(|m| m.sink_drops += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for AcquisitionMetrics {
    fn default() -> Self {
        Self::new()
    }
}
