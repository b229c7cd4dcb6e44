//! Capture core for FMCW radar sensors streaming over a serial link.
//!
//! The modules cover the configuration compiler, the magic-word frame
//! synchronizer and header decoder, and the producer/consumer pipeline that
//! hands frames from the port reader to the logger and display consumers.

pub mod analysis;
pub mod config;
pub mod frame;
pub mod math;
pub mod pipeline;
pub mod port;
pub mod prelude;
pub mod protocol;
pub mod telemetry;

pub use frame::FrameData;
pub use prelude::FrameBodyDecoder;
