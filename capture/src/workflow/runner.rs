use crate::generator::DEMO_CONFIG;
use crate::gui_bridge::GuiBridge;
use crate::workflow::config::WorkflowConfig;
use anyhow::{anyhow, Context};
use chrono::Local;
use fmcwcore::config::{compile, parse_config_text, read_config_file, RadarParams, RawConfigCommand};
use fmcwcore::pipeline::{AcquisitionPipeline, FrameLogger, StopSignal};
use fmcwcore::port::{CommandPort, PortController};
use fmcwcore::protocol::SkipBodyDecoder;
use fmcwcore::telemetry::MetricsSnapshot;
use log::info;
use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub acquisition: MetricsSnapshot,
    pub frames_logged: usize,
    pub log_path: PathBuf,
}

/// One capture session: configure the sensor, then stream into the logger
/// and the optional display consumer.
#[derive(Clone)]
pub struct Session {
    config: WorkflowConfig,
}

impl Session {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    /// Reads the sensor command file, or the built-in demo list when
    /// simulating without one.
    pub fn load_commands(&self) -> anyhow::Result<Vec<RawConfigCommand>> {
        match (&self.config.radar_config, self.config.simulate) {
            (Some(path), _) => read_config_file(path)
                .with_context(|| format!("loading sensor config {}", path.display())),
            (None, true) => Ok(parse_config_text(DEMO_CONFIG)),
            (None, false) => Err(anyhow!("no sensor config given (use --config)")),
        }
    }

    pub fn compile(&self, commands: &[RawConfigCommand]) -> anyhow::Result<RadarParams> {
        let params = compile(commands).context("compiling sensor config")?;
        info!(
            "Compiled config: {} tx / {} rx, {} range bins ({:.3} m), {} doppler bins ({:.3} m/s)",
            params.data_path.num_tx_ant,
            params.data_path.num_rx_ant,
            params.data_path.num_range_bins,
            params.data_path.range_resolution_m,
            params.data_path.num_doppler_bins,
            params.data_path.doppler_resolution_mps
        );
        Ok(params)
    }

    /// Uploads `commands`, clears the port, and starts the acquisition,
    /// logger and display threads.
    pub fn start<P>(
        &self,
        mut port: P,
        commands: &[RawConfigCommand],
        params: RadarParams,
    ) -> anyhow::Result<RunningSession>
    where
        P: Read + CommandPort + Send + 'static,
    {
        let settings = self.config.to_port_settings();
        PortController::send_commands(&mut port, commands, &settings)
            .context("uploading sensor configuration")?;
        PortController::prepare_for_streaming(&mut port).context("clearing port buffers")?;

        let queue_config = self.config.to_queue_config();
        let log_path = self.config.log_path(Local::now());
        let logger = FrameLogger::start(&log_path, self.config.log_format, queue_config)
            .with_context(|| format!("creating frame log {}", log_path.display()))?;

        let mut pipeline = AcquisitionPipeline::new(SkipBodyDecoder::new(), self.config.resync);
        let gui = match self.config.gui_bind {
            Some(addr) => {
                let mut bridge = GuiBridge::new(
                    queue_config,
                    params.sensor_position.clone(),
                    pipeline.metrics(),
                )?;
                bridge.serve(addr)?;
                pipeline.attach(bridge.queue());
                Some(bridge)
            }
            None => None,
        };
        pipeline.attach(logger.queue());

        let stop = StopSignal::new();
        let acquisition_stop = stop.clone();
        let acquisition = thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || {
                let summary = pipeline.run(&mut port, &params, &acquisition_stop);
                PortController::close(&mut port);
                summary
            })
            .context("spawning acquisition thread")?;

        Ok(RunningSession {
            stop,
            acquisition: Some(acquisition),
            logger: Some(logger),
            gui,
            log_path,
        })
    }
}

pub struct RunningSession {
    stop: StopSignal,
    acquisition: Option<JoinHandle<MetricsSnapshot>>,
    logger: Option<FrameLogger>,
    gui: Option<GuiBridge>,
    log_path: PathBuf,
}

impl RunningSession {
    pub fn log_path(&self) -> &PathBuf {
        &self.log_path
    }

    #[cfg(test)]
    pub fn gui(&self) -> Option<&GuiBridge> {
        self.gui.as_ref()
    }

    pub fn gui_addr(&self) -> Option<SocketAddr> {
        self.gui.as_ref().and_then(GuiBridge::bound_addr)
    }

    /// Stops acquisition, waits for it, drains the logger, then stops the
    /// display consumer.
    pub fn finish(mut self) -> anyhow::Result<SessionSummary> {
        self.stop.stop();
        let acquisition = match self.acquisition.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("acquisition thread panicked"))?,
            None => MetricsSnapshot::default(),
        };
        let frames_logged = match self.logger.take() {
            Some(logger) => logger.finish().context("finalizing frame log")?,
            None => 0,
        };
        if let Some(gui) = self.gui.take() {
            gui.shutdown();
        }
        info!(
            "Session finished: {} frames captured, {} logged to {}",
            acquisition.frames,
            frames_logged,
            self.log_path.display()
        );

        Ok(SessionSummary {
            acquisition,
            frames_logged,
            log_path: self.log_path.clone(),
        })
    }
}

impl Drop for RunningSession {
    fn drop(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.acquisition.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{SensorProfile, SimulatedSensor};
    use fmcwcore::analysis::{analyze, load_log};
    use fmcwcore::pipeline::LogFormat;
    use std::time::Duration;
    use tempfile::tempdir;

    const FAST_CONFIG: &str = "\
sensorStop
channelCfg 15 5 0
chirpComnCfg 8 0 0 64 4 28 0
chirpTimingCfg 6 63 0 20 60
frameCfg 0 1 8 0 5 1 0
baudRate 921600
sensorStart
";

    fn test_config(dir: &std::path::Path) -> WorkflowConfig {
        WorkflowConfig {
            output_dir: dir.to_path_buf(),
            read_timeout_ms: 20,
            inter_command_delay_ms: 0,
            baud_switch_delay_ms: 0,
            simulate: true,
            ..Default::default()
        }
    }

    fn sensor(seed: u64) -> SimulatedSensor {
        SimulatedSensor::new(SensorProfile {
            seed,
            read_timeout_ms: 20,
            skip_probability: 0.0,
            ..Default::default()
        })
    }

    #[test]
    fn session_logs_every_captured_frame() {
        let dir = tempdir().unwrap();
        let session = Session::new(test_config(dir.path()));
        let commands = parse_config_text(FAST_CONFIG);
        let params = session.compile(&commands).unwrap();

        let running = session.start(sensor(11), &commands, params).unwrap();
        thread::sleep(Duration::from_millis(200));
        let summary = running.finish().unwrap();

        assert!(summary.acquisition.frames > 5);
        assert_eq!(summary.frames_logged as u64, summary.acquisition.frames);
        assert_eq!(summary.acquisition.decode_errors, 0);

        let frames = load_log(&summary.log_path).unwrap();
        assert_eq!(frames.len(), summary.frames_logged);
        let report = analyze(&frames).unwrap();
        assert_eq!(report.first_frame, 1);
        assert_eq!(report.missed_frames, 0);
    }

    #[test]
    fn json_lines_sessions_are_analysable() {
        let dir = tempdir().unwrap();
        let session = Session::new(WorkflowConfig {
            log_format: LogFormat::JsonLines,
            ..test_config(dir.path())
        });
        let commands = parse_config_text(FAST_CONFIG);
        let params = session.compile(&commands).unwrap();

        let running = session.start(sensor(4), &commands, params).unwrap();
        assert!(running.log_path().to_string_lossy().ends_with(".jsonl"));
        thread::sleep(Duration::from_millis(100));
        let summary = running.finish().unwrap();

        let frames = load_log(&summary.log_path).unwrap();
        assert_eq!(frames.len(), summary.frames_logged);
    }

    #[test]
    fn display_consumer_sees_frames() {
        let dir = tempdir().unwrap();
        let session = Session::new(WorkflowConfig {
            gui_bind: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
            ..test_config(dir.path())
        });
        let commands = parse_config_text(FAST_CONFIG);
        let params = session.compile(&commands).unwrap();

        let running = session.start(sensor(8), &commands, params).unwrap();
        assert!(running.gui_addr().is_some());
        thread::sleep(Duration::from_millis(200));
        let seen = running.gui().map(|gui| gui.snapshot().frames_seen).unwrap_or(0);
        let summary = running.finish().unwrap();
        assert!(seen > 0);
        assert!(seen <= summary.acquisition.frames);
    }

    #[test]
    fn simulation_falls_back_to_demo_commands() {
        let dir = tempdir().unwrap();
        let session = Session::new(test_config(dir.path()));
        let commands = session.load_commands().unwrap();
        assert!(commands.iter().any(|c| c.name == "sensorStart"));

        let hardware = Session::new(WorkflowConfig::default());
        assert!(hardware.load_commands().is_err());
    }

    #[test]
    fn invalid_config_is_reported() {
        let session = Session::new(WorkflowConfig::default());
        let commands = parse_config_text("channelCfg 15 7 0\n");
        let err = session.compile(&commands).unwrap_err();
        assert!(format!("{err:#}").contains("compiling sensor config"));
    }
}
