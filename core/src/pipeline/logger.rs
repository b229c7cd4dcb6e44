use crate::frame::FrameData;
use crate::pipeline::queue::{HandoffQueue, PushOutcome, QueueConfig};
use crate::pipeline::stop::StopSignal;
use crate::prelude::{LoggerError, LoggerResult};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Bounded wait between stop-flag checks while the queue is idle.
pub const POP_TIMEOUT: Duration = Duration::from_millis(100);

/// On-disk layout of the frame log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// A single JSON array, brackets and commas emitted incrementally.
    #[default]
    JsonArray,
    /// One JSON object per line; a crash loses at most the last line.
    JsonLines,
}

/// Drains `queue` into `writer` until `stop` is raised and the queue is empty.
///
/// Returns the number of frames written. A frame that fails to serialize is
/// skipped. After a failed write the queue is still drained, with every
/// further frame discarded, so producers never stall on a dead logger; the
/// write error is returned once `stop` is raised.
pub fn run_logger<W: Write>(
    queue: &HandoffQueue<FrameData>,
    writer: &mut W,
    format: LogFormat,
    stop: &StopSignal,
) -> LoggerResult<usize> {
    let mut failure = match format {
        LogFormat::JsonArray => writer.write_all(b"[").err(),
        LogFormat::JsonLines => None,
    };
    if let Some(err) = &failure {
        warn!("Frame log write failed, discarding frames: {}", err);
    }

    let mut written = 0usize;
    let mut discarded = 0usize;
    while !stop.is_stopped() || !queue.is_empty() {
        let Some(frame) = queue.pop_timeout(POP_TIMEOUT) else {
            continue;
        };
        if failure.is_some() {
            discarded += 1;
            continue;
        }
        let encoded = match serde_json::to_vec(&frame) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!("Skipping frame that failed to serialize: {}", err);
                continue;
            }
        };

        let result = write_record(writer, format, &encoded, written == 0).and_then(|()| {
            if queue.is_empty() {
                writer.flush()
            } else {
                Ok(())
            }
        });
        match result {
            Ok(()) => written += 1,
            Err(err) => {
                warn!("Frame log write failed, discarding frames: {}", err);
                discarded += 1;
                failure = Some(err);
            }
        }
    }

    if let Some(err) = failure {
        warn!("{} frames discarded after the log write failure", discarded);
        return Err(err.into());
    }
    if format == LogFormat::JsonArray {
        writer.write_all(b"\n]\n")?;
    }
    writer.flush()?;
    Ok(written)
}

fn write_record<W: Write>(
    writer: &mut W,
    format: LogFormat,
    encoded: &[u8],
    first: bool,
) -> io::Result<()> {
    match format {
        LogFormat::JsonArray => {
            let separator: &[u8] = if first { b"\n" } else { b",\n" };
            writer.write_all(separator)?;
            writer.write_all(encoded)
        }
        LogFormat::JsonLines => {
            writer.write_all(encoded)?;
            writer.write_all(b"\n")
        }
    }
}

/// Persists frames on a dedicated thread that owns the log file.
pub struct FrameLogger {
    queue: HandoffQueue<FrameData>,
    stop: StopSignal,
    path: PathBuf,
    worker: Option<JoinHandle<LoggerResult<usize>>>,
}

impl FrameLogger {
    pub fn start<P: AsRef<Path>>(
        path: P,
        format: LogFormat,
        queue_config: QueueConfig,
    ) -> LoggerResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(&path)?;

        let queue = HandoffQueue::new(queue_config);
        let stop = StopSignal::new();
        let worker_queue = queue.clone();
        let worker_stop = stop.clone();
        let worker_path = path.clone();
        let worker = thread::Builder::new()
            .name("frame-logger".into())
            .spawn(move || {
                let mut writer = BufWriter::new(file);
                let result = run_logger(&worker_queue, &mut writer, format, &worker_stop);
                match &result {
                    Ok(count) => info!("Logged {} frames to {}", count, worker_path.display()),
                    Err(err) => warn!("Frame logger stopped early: {}", err),
                }
                result
            })?;
        info!("Logging frames to {}", path.display());

        Ok(Self {
            queue,
            stop,
            path,
            worker: Some(worker),
        })
    }

    /// Queues a frame for writing. Safe to call from any thread.
    pub fn add_frame(&self, frame: FrameData) -> PushOutcome {
        self.queue.push(frame)
    }

    /// Producer handle for attaching the logger to an acquisition pipeline.
    pub fn queue(&self) -> HandoffQueue<FrameData> {
        self.queue.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drains everything already queued, closes the array and the file.
    pub fn finish(mut self) -> LoggerResult<usize> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> LoggerResult<usize> {
        self.stop.stop();
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| LoggerError::Panicked)?,
            None => Ok(0),
        }
    }
}

impl Drop for FrameLogger {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue::BackpressurePolicy;
    use crate::protocol::template::{DecodedStruct, FieldValue};
    use serde_json::Value;
    use std::sync::mpsc;
    use tempfile::tempdir;

    fn frame(number: u64) -> FrameData {
        let mut header = DecodedStruct::new();
        header.insert("frameNumber".into(), FieldValue::Unsigned(number));
        FrameData::from_header(header)
    }

    fn frame_numbers(values: &[Value]) -> Vec<u64> {
        values
            .iter()
            .map(|v| v["header"]["frameNumber"].as_u64().unwrap())
            .collect()
    }

    /// Sleeps a pseudo-random few hundred microseconds on every write.
    struct SlowWriter {
        inner: Vec<u8>,
        state: u32,
    }

    impl Write for SlowWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.state = self.state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            thread::sleep(Duration::from_micros(u64::from(self.state >> 23)));
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_writes_do_not_stall_a_blocking_producer() {
        let queue = HandoffQueue::new(QueueConfig {
            capacity: Some(2),
            policy: BackpressurePolicy::Block,
        });
        let stop = StopSignal::new();

        let logger_queue = queue.clone();
        let logger_stop = stop.clone();
        let logger = thread::spawn(move || {
            run_logger(&logger_queue, &mut FullDisk, LogFormat::JsonArray, &logger_stop)
        });

        let (done_tx, done_rx) = mpsc::channel();
        let producer = queue.clone();
        let pusher = thread::spawn(move || {
            for i in 0..20 {
                producer.push(frame(i));
            }
            let _ = done_tx.send(());
        });

        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        pusher.join().unwrap();
        stop.stop();
        let result = logger.join().unwrap();
        assert!(matches!(result, Err(LoggerError::Io(_))));
        assert!(queue.is_empty());
    }

    #[test]
    fn write_failure_mid_run_keeps_draining() {
        struct FailAfter {
            inner: Vec<u8>,
            budget: usize,
        }

        impl Write for FailAfter {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                if self.budget == 0 {
                    return Err(io::Error::new(io::ErrorKind::Other, "device gone"));
                }
                self.budget -= 1;
                self.inner.write(buf)
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let queue = HandoffQueue::unbounded();
        for i in 0..6 {
            queue.push(frame(i));
        }
        let stop = StopSignal::new();
        stop.stop();

        // "[" plus separator and body for two frames.
        let mut writer = FailAfter {
            inner: Vec::new(),
            budget: 5,
        };
        let result = run_logger(&queue, &mut writer, LogFormat::JsonArray, &stop);
        assert!(matches!(result, Err(LoggerError::Io(_))));
        assert!(queue.is_empty());
    }

    #[test]
    fn stopped_logger_still_drains_the_queue() {
        let queue = HandoffQueue::unbounded();
        for i in 0..5 {
            queue.push(frame(i));
        }
        let stop = StopSignal::new();
        stop.stop();

        let mut out = Vec::new();
        let count = run_logger(&queue, &mut out, LogFormat::JsonArray, &stop).unwrap();
        assert_eq!(count, 5);
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        assert_eq!(frame_numbers(&parsed), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn empty_run_writes_an_empty_array() {
        let queue = HandoffQueue::unbounded();
        let stop = StopSignal::new();
        stop.stop();
        let mut out = Vec::new();
        run_logger(&queue, &mut out, LogFormat::JsonArray, &stop).unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn json_lines_writes_one_object_per_line() {
        let queue = HandoffQueue::unbounded();
        queue.push(frame(10));
        queue.push(frame(11));
        let stop = StopSignal::new();
        stop.stop();

        let mut out = Vec::new();
        run_logger(&queue, &mut out, LogFormat::JsonLines, &stop).unwrap();
        let text = String::from_utf8(out).unwrap();
        let parsed: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(frame_numbers(&parsed), vec![10, 11]);
    }

    #[test]
    fn slow_consumer_logs_every_frame_in_order() {
        const FRAMES: u64 = 300;
        let queue = HandoffQueue::new(QueueConfig {
            capacity: Some(16),
            policy: BackpressurePolicy::Block,
        });
        let stop = StopSignal::new();

        let consumer_queue = queue.clone();
        let consumer_stop = stop.clone();
        let consumer = thread::spawn(move || {
            let mut writer = SlowWriter {
                inner: Vec::new(),
                state: 7,
            };
            let count =
                run_logger(&consumer_queue, &mut writer, LogFormat::JsonArray, &consumer_stop)
                    .unwrap();
            (count, writer.inner)
        });

        for i in 0..FRAMES {
            queue.push(frame(i));
            if i % 37 == 0 {
                thread::sleep(Duration::from_millis(1));
            }
        }
        stop.stop();

        let (count, bytes) = consumer.join().unwrap();
        assert_eq!(count, FRAMES as usize);
        let parsed: Vec<Value> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(frame_numbers(&parsed), (0..FRAMES).collect::<Vec<_>>());
    }

    #[test]
    fn frame_logger_finalizes_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("fHist_test.json");
        let logger = FrameLogger::start(&path, LogFormat::JsonArray, QueueConfig::default())
            .unwrap();

        let producer = logger.queue();
        let handle = thread::spawn(move || {
            for i in 0..50 {
                producer.push(frame(i));
            }
        });
        handle.join().unwrap();
        logger.add_frame(frame(50));

        assert_eq!(logger.finish().unwrap(), 51);
        let parsed: Vec<Value> = serde_json::from_str(&fs::read_to_string(&path).unwrap())
            .unwrap();
        assert_eq!(frame_numbers(&parsed), (0..=50).collect::<Vec<_>>());
    }

    #[test]
    fn dropping_the_logger_closes_the_array() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dropped.json");
        {
            let logger =
                FrameLogger::start(&path, LogFormat::JsonArray, QueueConfig::default()).unwrap();
            logger.add_frame(frame(1));
        }
        let parsed: Vec<Value> = serde_json::from_str(&fs::read_to_string(&path).unwrap())
            .unwrap();
        assert_eq!(parsed.len(), 1);
    }
}
