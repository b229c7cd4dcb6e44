use crate::math::geometry::rotate_point;
use serde::Serialize;

/// Chirp profile assembled from `chirpComnCfg` and `chirpTimingCfg`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileCfg {
    pub start_freq_ghz: f64,
    pub idle_time_us: [f64; 2],
    pub ramp_end_time_us: f64,
    pub freq_slope_mhz_per_us: f64,
    pub num_adc_samples: u32,
    pub dig_out_sample_rate_ksps: f64,
}

/// Quantities derived from the profile, frame and channel configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataPath {
    pub num_tx_ant: u32,
    pub num_rx_ant: u32,
    pub num_chirps_per_frame: u32,
    pub num_doppler_chirps: u32,
    pub num_doppler_bins: u32,
    pub num_range_bins: u32,
    pub num_valid_range_bins: u32,
    pub range_resolution_m: f64,
    pub range_idx_to_m: f64,
    pub doppler_resolution_mps: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameCfg {
    pub num_loops: u32,
    pub chirp_start_idx: u32,
    pub chirp_end_idx: u32,
    pub frame_periodicity_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelCfg {
    pub rx_channel_en: u32,
    pub tx_channel_en: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChirpComnCfg {
    pub dig_output_samp_rate_mhz: f64,
    pub num_adc_samples: u32,
    pub chirp_ramp_end_time_us: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChirpTimingCfg {
    pub idle_time_us: f64,
    pub chirp_slope_mhz_per_us: f64,
    pub start_freq_ghz: f64,
}

/// Output selection flags sent with `guiMonitor`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GuiMonitor {
    pub point_cloud: u32,
    pub range_profile_mask: u32,
    pub heat_map_mask: u32,
    pub stats_info: u32,
}

/// Mounting offsets (m) and tilts (degrees) of the sensor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorPosition {
    pub x_offset: f64,
    pub y_offset: f64,
    pub z_offset: f64,
    pub azimuth_tilt_deg: f64,
    pub elevation_tilt_deg: f64,
}

impl SensorPosition {
    /// Maps a point from sensor coordinates into the mounting frame.
    pub fn to_world(&self, point: [f64; 3]) -> [f64; 3] {
        let rotated = rotate_point(
            point,
            self.azimuth_tilt_deg.to_radians(),
            self.elevation_tilt_deg.to_radians(),
        );
        [
            rotated[0] + self.x_offset,
            rotated[1] + self.y_offset,
            rotated[2] + self.z_offset,
        ]
    }
}

/// Compiled, read-only parameter set for one capture session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RadarParams {
    pub profile: ProfileCfg,
    pub data_path: DataPath,
    pub frame: FrameCfg,
    pub channel: ChannelCfg,
    pub chirp_comn: ChirpComnCfg,
    pub chirp_timing: ChirpTimingCfg,
    pub gui_monitor: Option<GuiMonitor>,
    pub tracking_cfg: Vec<f64>,
    pub boundary_box: Vec<f64>,
    pub sensor_position: Option<SensorPosition>,
    pub baud_rate: Option<u32>,
}
