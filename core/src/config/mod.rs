pub mod command;
pub mod compiler;
pub mod params;

pub use command::{parse_config_text, read_config_file, RawConfigCommand};
pub use compiler::compile;
pub use params::{
    ChannelCfg, ChirpComnCfg, ChirpTimingCfg, DataPath, FrameCfg, GuiMonitor, ProfileCfg,
    RadarParams, SensorPosition,
};
