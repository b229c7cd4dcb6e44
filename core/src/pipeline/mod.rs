pub mod acquisition;
pub mod logger;
pub mod queue;
pub mod stop;

pub use acquisition::AcquisitionPipeline;
pub use logger::{run_logger, FrameLogger, LogFormat};
pub use queue::{BackpressurePolicy, HandoffQueue, PushOutcome, QueueConfig};
pub use stop::StopSignal;
