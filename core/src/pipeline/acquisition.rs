use crate::config::RadarParams;
use crate::frame::FrameData;
use crate::pipeline::queue::{HandoffQueue, PushOutcome};
use crate::pipeline::stop::StopSignal;
use crate::prelude::{DecodeResult, FrameBodyDecoder};
use crate::protocol::{
    frame_header_template, ByteSource, FrameHeader, FrameSynchronizer, ResyncPolicy,
    StructTemplate,
};
use crate::telemetry::{AcquisitionMetrics, MetricsSnapshot};
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DEFAULT_TIMEOUT_BACKOFF: Duration = Duration::from_millis(10);

/// Producer side of the capture: the only reader of the serial port.
pub struct AcquisitionPipeline<D> {
    synchronizer: FrameSynchronizer,
    template: StructTemplate,
    decoder: D,
    sinks: Vec<HandoffQueue<FrameData>>,
    metrics: Arc<AcquisitionMetrics>,
    timeout_backoff: Duration,
}

impl<D: FrameBodyDecoder> AcquisitionPipeline<D> {
    pub fn new(decoder: D, policy: ResyncPolicy) -> Self {
        let template = frame_header_template();
        Self {
            synchronizer: FrameSynchronizer::new(template.byte_length(), policy),
            template,
            decoder,
            sinks: Vec::new(),
            metrics: Arc::new(AcquisitionMetrics::new()),
            timeout_backoff: DEFAULT_TIMEOUT_BACKOFF,
        }
    }

    pub fn with_timeout_backoff(mut self, backoff: Duration) -> Self {
        self.timeout_backoff = backoff;
        self
    }

    /// Adds a consumer queue; every frame is delivered to every sink.
    pub fn attach(&mut self, sink: HandoffQueue<FrameData>) {
        self.sinks.push(sink);
    }

    pub fn metrics(&self) -> Arc<AcquisitionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Captures frames until `stop` is observed at the top of the loop.
    pub fn run<S: ByteSource>(
        &mut self,
        port: &mut S,
        params: &RadarParams,
        stop: &StopSignal,
    ) -> MetricsSnapshot {
        info!(
            "Acquisition started ({} byte headers, {} sinks)",
            self.synchronizer.header_length(),
            self.sinks.len()
        );

        while !stop.is_stopped() {
            let result = self.synchronizer.find_header(port);
            let arrival = unix_seconds();
            self.metrics.record_discarded(result.discarded_bytes);
            if result.discarded_bytes > 0 {
                debug!("Out of sync: {} bytes discarded", result.discarded_bytes);
            }

            let Some(raw) = result.header else {
                self.metrics.record_timeout();
                debug!("No header before read timeout");
                if !stop.is_stopped() {
                    thread::sleep(self.timeout_backoff);
                }
                continue;
            };

            match self.decode_frame(raw, port, params) {
                Ok(mut frame) => {
                    frame.timestamp = arrival;
                    self.metrics.record_frame();
                    self.dispatch(frame);
                }
                Err(err) => {
                    self.metrics.record_decode_error();
                    warn!("Dropping frame: {}", err);
                }
            }
        }

        let summary = self.metrics.snapshot();
        info!(
            "Acquisition stopped: {} frames, {} timeouts, {} bytes discarded, {} decode errors, {} sink drops",
            summary.frames,
            summary.timeouts,
            summary.discarded_bytes,
            summary.decode_errors,
            summary.sink_drops
        );
        summary
    }

    fn decode_frame<S: ByteSource>(
        &mut self,
        raw: Vec<u8>,
        port: &mut S,
        params: &RadarParams,
    ) -> DecodeResult<FrameData> {
        let header = FrameHeader::parse(raw, &self.template)?;
        self.decoder.decode(&header, port, params)
    }

    fn dispatch(&self, frame: FrameData) {
        let Some((last, rest)) = self.sinks.split_last() else {
            return;
        };
        for sink in rest {
            self.push(sink, frame.clone());
        }
        self.push(last, frame);
    }

    fn push(&self, sink: &HandoffQueue<FrameData>, frame: FrameData) {
        match sink.push(frame) {
            PushOutcome::Enqueued => {}
            PushOutcome::DroppedOldest => {
                self.metrics.record_sink_drop();
                debug!("Consumer queue full, oldest frame evicted");
            }
            PushOutcome::Closed => {
                self.metrics.record_sink_drop();
                warn!("Consumer queue closed, frame discarded");
            }
        }
    }
}

fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue::{BackpressurePolicy, QueueConfig};
    use crate::prelude::DecodeError;
    use crate::protocol::header::encode_header;
    use crate::protocol::SkipBodyDecoder;
    use std::io::{self, Cursor, Read};

    /// Raises the stop signal once the scripted stream runs dry.
    struct StopAtEnd {
        inner: Cursor<Vec<u8>>,
        stop: StopSignal,
    }

    impl Read for StopAtEnd {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.inner.read(buf)?;
            if n == 0 {
                self.stop.stop();
            }
            Ok(n)
        }
    }

    fn stream_of(frames: &[(u32, usize)], gap: usize) -> Vec<u8> {
        let mut stream = Vec::new();
        for &(number, payload) in frames {
            stream.extend((0..gap).map(|i| 0x20 + i as u8));
            stream.extend(encode_header(number, (40 + payload) as u32, 0));
            stream.extend(std::iter::repeat(0x99).take(payload));
        }
        stream
    }

    fn run_over(
        stream: Vec<u8>,
        pipeline: &mut AcquisitionPipeline<impl FrameBodyDecoder>,
    ) -> MetricsSnapshot {
        let stop = StopSignal::new();
        let mut port = StopAtEnd {
            inner: Cursor::new(stream),
            stop: stop.clone(),
        };
        pipeline.run(&mut port, &RadarParams::default(), &stop)
    }

    fn drain(queue: &HandoffQueue<FrameData>) -> Vec<u64> {
        std::iter::from_fn(|| queue.try_pop())
            .filter_map(|frame| frame.frame_number())
            .collect()
    }

    #[test]
    fn frames_reach_every_sink_in_order() {
        let display = HandoffQueue::new(QueueConfig::default());
        let logger = HandoffQueue::new(QueueConfig::default());
        let mut pipeline = AcquisitionPipeline::new(SkipBodyDecoder::new(), ResyncPolicy::Reference)
            .with_timeout_backoff(Duration::ZERO);
        pipeline.attach(display.clone());
        pipeline.attach(logger.clone());

        let summary = run_over(stream_of(&[(1, 16), (2, 0), (3, 64)], 3), &mut pipeline);
        assert_eq!(summary.frames, 3);
        assert_eq!(summary.discarded_bytes, 9);
        assert_eq!(drain(&display), vec![1, 2, 3]);
        assert_eq!(drain(&logger), vec![1, 2, 3]);
    }

    struct RejectFrame(u64);

    impl FrameBodyDecoder for RejectFrame {
        fn decode(
            &mut self,
            header: &FrameHeader,
            port: &mut dyn ByteSource,
            params: &RadarParams,
        ) -> DecodeResult<FrameData> {
            let frame = SkipBodyDecoder::new().decode(header, port, params)?;
            if header.frame_number()? == self.0 {
                return Err(DecodeError::MissingField("pointCloud"));
            }
            Ok(frame)
        }
    }

    #[test]
    fn decode_failure_skips_only_that_frame() {
        let sink = HandoffQueue::new(QueueConfig::default());
        let mut pipeline = AcquisitionPipeline::new(RejectFrame(2), ResyncPolicy::Reference)
            .with_timeout_backoff(Duration::ZERO);
        pipeline.attach(sink.clone());

        let summary = run_over(stream_of(&[(1, 8), (2, 8), (3, 8)], 0), &mut pipeline);
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.decode_errors, 1);
        assert_eq!(drain(&sink), vec![1, 3]);
    }

    #[test]
    fn impossible_packet_length_is_dropped() {
        let mut stream = encode_header(7, 8, 0);
        stream.extend(stream_of(&[(8, 4)], 0));
        let sink = HandoffQueue::new(QueueConfig::default());
        let mut pipeline = AcquisitionPipeline::new(SkipBodyDecoder::new(), ResyncPolicy::Reference)
            .with_timeout_backoff(Duration::ZERO);
        pipeline.attach(sink.clone());

        let summary = run_over(stream, &mut pipeline);
        assert_eq!(summary.decode_errors, 1);
        assert_eq!(drain(&sink), vec![8]);
    }

    #[test]
    fn frames_are_stamped_on_arrival() {
        let sink = HandoffQueue::new(QueueConfig::default());
        let mut pipeline = AcquisitionPipeline::new(SkipBodyDecoder::new(), ResyncPolicy::Reference)
            .with_timeout_backoff(Duration::ZERO);
        pipeline.attach(sink.clone());
        run_over(stream_of(&[(1, 0)], 0), &mut pipeline);
        let frame = sink.try_pop().unwrap();
        assert!(frame.timestamp > 1_600_000_000.0);
    }

    #[test]
    fn full_sink_counts_drops() {
        let sink = HandoffQueue::new(QueueConfig {
            capacity: Some(2),
            policy: BackpressurePolicy::DropOldest,
        });
        let mut pipeline = AcquisitionPipeline::new(SkipBodyDecoder::new(), ResyncPolicy::Reference)
            .with_timeout_backoff(Duration::ZERO);
        pipeline.attach(sink.clone());

        let summary = run_over(stream_of(&[(1, 0), (2, 0), (3, 0), (4, 0)], 0), &mut pipeline);
        assert_eq!(summary.sink_drops, 2);
        assert_eq!(drain(&sink), vec![3, 4]);
    }

    #[test]
    fn stop_before_start_reads_nothing() {
        let stop = StopSignal::new();
        stop.stop();
        let mut port = Cursor::new(stream_of(&[(1, 0)], 0));
        let mut pipeline = AcquisitionPipeline::new(SkipBodyDecoder::new(), ResyncPolicy::Reference);
        let summary = pipeline.run(&mut port, &RadarParams::default(), &stop);
        assert_eq!(summary, MetricsSnapshot::default());
        assert_eq!(port.position(), 0);
    }

    #[test]
    fn timeouts_retry_until_stopped() {
        let stop = StopSignal::new();
        let trigger = stop.clone();
        let mut pipeline = AcquisitionPipeline::new(SkipBodyDecoder::new(), ResyncPolicy::Reference)
            .with_timeout_backoff(Duration::from_millis(1));
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            trigger.stop();
        });
        let mut port = io::empty();
        let summary = pipeline.run(&mut port, &RadarParams::default(), &stop);
        stopper.join().unwrap();
        assert!(summary.timeouts >= 2);
        assert_eq!(summary.frames, 0);
    }
}
