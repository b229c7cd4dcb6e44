use anyhow::Context;
use chrono::{DateTime, Local};
use fmcwcore::pipeline::{BackpressurePolicy, LogFormat, QueueConfig};
use fmcwcore::port::PortSettings;
use fmcwcore::protocol::ResyncPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Serial device, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: Option<String>,
    /// Sensor command file uploaded before streaming.
    pub radar_config: Option<PathBuf>,
    pub initial_baud: u32,
    pub read_timeout_ms: u64,
    pub inter_command_delay_ms: u64,
    pub baud_switch_delay_ms: u64,
    pub output_dir: PathBuf,
    pub log_format: LogFormat,
    /// `null` makes the consumer queues unbounded.
    pub queue_capacity: Option<usize>,
    pub backpressure: BackpressurePolicy,
    pub resync: ResyncPolicy,
    /// HTTP snapshot endpoint; disabled when unset.
    pub gui_bind: Option<SocketAddr>,
    pub simulate: bool,
    pub seed: u64,
    /// Stop on its own after this many seconds.
    pub duration_secs: Option<f64>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        let port = PortSettings::default();
        let queue = QueueConfig::default();
        Self {
            port: None,
            radar_config: None,
            initial_baud: port.initial_baud,
            read_timeout_ms: port.read_timeout.as_millis() as u64,
            inter_command_delay_ms: port.inter_command_delay.as_millis() as u64,
            baud_switch_delay_ms: port.baud_switch_delay.as_millis() as u64,
            output_dir: PathBuf::from("output"),
            log_format: LogFormat::default(),
            queue_capacity: queue.capacity,
            backpressure: queue.policy,
            resync: ResyncPolicy::default(),
            gui_bind: None,
            simulate: false,
            seed: 0,
            duration_secs: None,
        }
    }
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(port: Option<String>, radar_config: Option<PathBuf>) -> Self {
        Self {
            port,
            radar_config,
            ..Default::default()
        }
    }

    pub fn to_port_settings(&self) -> PortSettings {
        PortSettings {
            initial_baud: self.initial_baud,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            inter_command_delay: Duration::from_millis(self.inter_command_delay_ms),
            baud_switch_delay: Duration::from_millis(self.baud_switch_delay_ms),
        }
    }

    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            capacity: self.queue_capacity,
            policy: self.backpressure,
        }
    }

    /// `<output_dir>/fHist_YYYYMMDD_HHMMSS.json` for a session started at `started`.
    pub fn log_path(&self, started: DateTime<Local>) -> PathBuf {
        let extension = match self.log_format {
            LogFormat::JsonArray => "json",
            LogFormat::JsonLines => "jsonl",
        };
        self.output_dir.join(format!(
            "fHist_{}.{}",
            started.format("%Y%m%d_%H%M%S"),
            extension
        ))
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_secs
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_produces_port_settings() {
        let cfg = WorkflowConfig::from_args(Some("/dev/ttyUSB0".into()), None);
        let settings = cfg.to_port_settings();
        assert_eq!(settings, PortSettings::default());
        assert_eq!(cfg.to_queue_config(), QueueConfig::default());
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"port: COM4\nradar_config: cfg/people.cfg\nread_timeout_ms: 250\n\
              log_format: json-lines\nqueue_capacity: null\nbackpressure: block\n\
              resync: rescan\ngui_bind: 127.0.0.1:9000\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.port.as_deref(), Some("COM4"));
        assert_eq!(cfg.radar_config, Some(PathBuf::from("cfg/people.cfg")));
        assert_eq!(cfg.to_port_settings().read_timeout, Duration::from_millis(250));
        assert_eq!(cfg.log_format, LogFormat::JsonLines);
        assert_eq!(cfg.to_queue_config().capacity, None);
        assert_eq!(cfg.backpressure, BackpressurePolicy::Block);
        assert_eq!(cfg.resync, ResyncPolicy::Rescan);
        assert_eq!(cfg.gui_bind, Some(SocketAddr::from(([127, 0, 0, 1], 9000))));
        assert_eq!(cfg.initial_baud, 115_200);
    }

    #[test]
    fn log_path_is_timestamped() {
        let cfg = WorkflowConfig::default();
        let started = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            cfg.log_path(started),
            PathBuf::from("output").join("fHist_20240309_140507.json")
        );
    }

    #[test]
    fn non_positive_duration_means_run_until_interrupted() {
        let mut cfg = WorkflowConfig::default();
        assert_eq!(cfg.duration(), None);
        cfg.duration_secs = Some(0.0);
        assert_eq!(cfg.duration(), None);
        cfg.duration_secs = Some(1.5);
        assert_eq!(cfg.duration(), Some(Duration::from_millis(1500)));
    }
}
