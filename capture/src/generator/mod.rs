pub mod profile;
pub mod sensor;

pub use profile::{SensorProfile, DEMO_CONFIG};
pub use sensor::SimulatedSensor;
