pub mod metrics;

pub use metrics::{AcquisitionMetrics, MetricsSnapshot};
