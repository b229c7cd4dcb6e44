use crate::config::command::RawConfigCommand;
use crate::config::params::{
    ChannelCfg, ChirpComnCfg, ChirpTimingCfg, DataPath, FrameCfg, GuiMonitor, ProfileCfg,
    RadarParams, SensorPosition,
};
use crate::math::pow2::next_pow2;
use crate::prelude::{ConfigError, ConfigResult};
use log::{debug, warn};

pub const SPEED_OF_LIGHT_MPS: f64 = 3e8;

/// Raw sections collected by the first pass. Each compile starts from a fresh
/// instance, so nothing leaks between calls.
#[derive(Default)]
struct Sections {
    channel: Option<ChannelCfg>,
    chirp_comn: Option<ChirpComnCfg>,
    chirp_timing: Option<ChirpTimingCfg>,
    frame: Option<FrameCfg>,
    gui_monitor: Option<GuiMonitor>,
    tracking_cfg: Vec<f64>,
    boundary_box: Vec<f64>,
    sensor_position: Option<SensorPosition>,
    baud_rate: Option<u32>,
}

impl Sections {
    fn absorb(&mut self, command: &RawConfigCommand) -> ConfigResult<()> {
        match command.name.as_str() {
            "channelCfg" => {
                self.channel = Some(ChannelCfg {
                    rx_channel_en: command.parse_arg(1)?,
                    tx_channel_en: command.parse_arg(2)?,
                });
            }
            "chirpComnCfg" => {
                let decimation: f64 = command.parse_arg(1)?;
                if decimation == 0.0 {
                    return Err(ConfigError::DivisionByZero("digital output sample rate"));
                }
                self.chirp_comn = Some(ChirpComnCfg {
                    dig_output_samp_rate_mhz: 100.0 / decimation,
                    num_adc_samples: command.parse_arg(4)?,
                    chirp_ramp_end_time_us: command.parse_arg(6)?,
                });
            }
            "chirpTimingCfg" => {
                self.chirp_timing = Some(ChirpTimingCfg {
                    idle_time_us: command.parse_arg(1)?,
                    chirp_slope_mhz_per_us: command.parse_arg(4)?,
                    start_freq_ghz: command.parse_arg(5)?,
                });
            }
            "frameCfg" => {
                self.frame = Some(FrameCfg {
                    chirp_start_idx: command.parse_arg(1)?,
                    chirp_end_idx: command.parse_arg(2)?,
                    num_loops: command.parse_arg(3)?,
                    // Not used by any derived quantity, so a bad value is tolerated.
                    frame_periodicity_ms: command.parse_arg(5).unwrap_or_else(|err| {
                        warn!("{}; frame periodicity left at 0", err);
                        0.0
                    }),
                });
            }
            "guiMonitor" => {
                self.gui_monitor = Some(GuiMonitor {
                    point_cloud: command.parse_arg(1)?,
                    range_profile_mask: command.parse_arg(2)?,
                    heat_map_mask: command.parse_arg(4)?,
                    stats_info: command.parse_arg(6)?,
                });
            }
            "trackingCfg" => self.tracking_cfg = command.float_args()?,
            "boundaryBox" => self.boundary_box = command.float_args()?,
            "sensorPosition" => {
                self.sensor_position = Some(SensorPosition {
                    x_offset: command.parse_arg(1)?,
                    y_offset: command.parse_arg(2)?,
                    z_offset: command.parse_arg(3)?,
                    azimuth_tilt_deg: command.parse_arg(4)?,
                    elevation_tilt_deg: command.parse_arg(5)?,
                });
            }
            "baudRate" => {
                if self.baud_rate.is_none() {
                    self.baud_rate = Some(command.parse_arg(1)?);
                }
            }
            other => debug!("ignoring unrecognized command {}", other),
        }
        Ok(())
    }
}

/// Compiles an ordered command list into the derived parameter set.
pub fn compile(commands: &[RawConfigCommand]) -> ConfigResult<RadarParams> {
    let mut sections = Sections::default();
    for command in commands {
        sections.absorb(command)?;
    }

    let channel = sections
        .channel
        .ok_or(ConfigError::MissingCommand("channelCfg"))?;
    let chirp_comn = sections
        .chirp_comn
        .ok_or(ConfigError::MissingCommand("chirpComnCfg"))?;
    let chirp_timing = sections
        .chirp_timing
        .ok_or(ConfigError::MissingCommand("chirpTimingCfg"))?;
    let frame = sections
        .frame
        .ok_or(ConfigError::MissingCommand("frameCfg"))?;

    let profile = ProfileCfg {
        start_freq_ghz: chirp_timing.start_freq_ghz,
        idle_time_us: [chirp_timing.idle_time_us, chirp_timing.idle_time_us],
        ramp_end_time_us: chirp_comn.chirp_ramp_end_time_us,
        freq_slope_mhz_per_us: chirp_timing.chirp_slope_mhz_per_us,
        num_adc_samples: chirp_comn.num_adc_samples,
        dig_out_sample_rate_ksps: 1000.0 * chirp_comn.dig_output_samp_rate_mhz,
    };
    let data_path = derive_data_path(&channel, &profile, &frame)?;

    Ok(RadarParams {
        profile,
        data_path,
        frame,
        channel,
        chirp_comn,
        chirp_timing,
        gui_monitor: sections.gui_monitor,
        tracking_cfg: sections.tracking_cfg,
        boundary_box: sections.boundary_box,
        sensor_position: sections.sensor_position,
        baud_rate: sections.baud_rate,
    })
}

fn derive_data_path(
    channel: &ChannelCfg,
    profile: &ProfileCfg,
    frame: &FrameCfg,
) -> ConfigResult<DataPath> {
    let num_rx_ant = channel.rx_channel_en.count_ones();
    let num_tx_ant = channel.tx_channel_en.count_ones();

    let chirps_per_loop = (i64::from(frame.chirp_end_idx) - i64::from(frame.chirp_start_idx) + 1)
        .max(0) as u32;
    let num_chirps_per_frame = chirps_per_loop.saturating_mul(frame.num_loops);
    if num_tx_ant == 0 {
        return Err(ConfigError::DivisionByZero("doppler chirps (numTxAnt is 0)"));
    }
    let num_doppler_chirps = num_chirps_per_frame / num_tx_ant;

    let num_doppler_bins = next_pow2(num_doppler_chirps);
    let num_range_bins = next_pow2(profile.num_adc_samples);
    let num_valid_range_bins = num_range_bins / 2;

    let range_denominator = 2.0
        * profile.freq_slope_mhz_per_us.abs()
        * 1e12
        * f64::from(profile.num_adc_samples);
    if range_denominator == 0.0 {
        return Err(ConfigError::DivisionByZero("range resolution"));
    }
    let range_resolution_m =
        (SPEED_OF_LIGHT_MPS * profile.dig_out_sample_rate_ksps * 1e3) / range_denominator;
    let range_idx_to_m =
        range_resolution_m * f64::from(profile.num_adc_samples) / f64::from(num_range_bins);

    if profile.start_freq_ghz == 0.0 {
        return Err(ConfigError::DivisionByZero("wavelength (startFreq is 0)"));
    }
    let wavelength_m = SPEED_OF_LIGHT_MPS / (profile.start_freq_ghz * 1e9);
    let chirp_time_s = (profile.idle_time_us[0] + profile.ramp_end_time_us) * 1e-6;
    let doppler_denominator =
        2.0 * f64::from(num_doppler_chirps) * chirp_time_s * f64::from(num_tx_ant);
    if doppler_denominator == 0.0 {
        return Err(ConfigError::DivisionByZero("doppler resolution"));
    }
    let doppler_resolution_mps = wavelength_m / doppler_denominator;

    Ok(DataPath {
        num_tx_ant,
        num_rx_ant,
        num_chirps_per_frame,
        num_doppler_chirps,
        num_doppler_bins,
        num_range_bins,
        num_valid_range_bins,
        range_resolution_m,
        range_idx_to_m,
        doppler_resolution_mps,
    })
}
