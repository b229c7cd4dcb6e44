use crate::gui_bridge::model::{StatsReport, VisualizationModel};
use anyhow::{Context, Result};
use fmcwcore::config::SensorPosition;
use fmcwcore::frame::FrameData;
use fmcwcore::pipeline::{HandoffQueue, QueueConfig, StopSignal};
use fmcwcore::telemetry::AcquisitionMetrics;
use log::{info, warn};
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
    thread::{self, JoinHandle},
    time::Duration,
};
use tokio::runtime::Builder;
use warp::{http::StatusCode, Filter, Rejection, Reply};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

type SharedModel = Arc<RwLock<VisualizationModel>>;

#[derive(Clone)]
struct StatsSource {
    metrics: Arc<AcquisitionMetrics>,
    queue: HandoffQueue<FrameData>,
}

impl StatsSource {
    fn report(&self) -> StatsReport {
        StatsReport {
            acquisition: self.metrics.snapshot(),
            display_queue_len: self.queue.len(),
            display_queue_dropped: self.queue.dropped(),
        }
    }
}

fn routes(
    state: SharedModel,
    stats: StatsSource,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let state_filter = warp::any().map(move || state.clone());
    let stats_filter = warp::any().map(move || stats.clone());

    let frame_route = warp::path("frame")
        .and(warp::path::end())
        .and(warp::get())
        .and(state_filter)
        .map(|state: SharedModel| match state.read() {
            Ok(guard) => warp::reply::with_status(warp::reply::json(&*guard), StatusCode::OK),
            Err(_) => warp::reply::with_status(
                warp::reply::json(&json!({"error": "display state unavailable"})),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        });

    let stats_route = warp::path("stats")
        .and(warp::path::end())
        .and(warp::get())
        .and(stats_filter)
        .map(|stats: StatsSource| warp::reply::json(&stats.report()));

    frame_route.or(stats_route)
}

/// Display consumer: keeps the newest frame for the HTTP snapshot endpoint.
///
/// Frames arrive on a queue of their own, so a slow or absent client never
/// holds up acquisition.
pub struct GuiBridge {
    state: SharedModel,
    queue: HandoffQueue<FrameData>,
    metrics: Arc<AcquisitionMetrics>,
    stop: StopSignal,
    consumer: Option<JoinHandle<()>>,
    server: Option<JoinHandle<()>>,
    bound: Option<SocketAddr>,
}

impl GuiBridge {
    pub fn new(
        queue_config: QueueConfig,
        sensor_position: Option<SensorPosition>,
        metrics: Arc<AcquisitionMetrics>,
    ) -> Result<Self> {
        let state = Arc::new(RwLock::new(VisualizationModel::default()));
        let queue = HandoffQueue::new(queue_config);
        let stop = StopSignal::new();

        let consumer_state = state.clone();
        let consumer_queue = queue.clone();
        let consumer_stop = stop.clone();
        let consumer = thread::Builder::new()
            .name("gui-consumer".into())
            .spawn(move || {
                consume(&consumer_queue, &consumer_state, sensor_position.as_ref(), &consumer_stop)
            })
            .context("spawning GUI consumer thread")?;

        Ok(Self {
            state,
            queue,
            metrics,
            stop,
            consumer: Some(consumer),
            server: None,
            bound: None,
        })
    }

    /// Starts the HTTP endpoint and returns the address it is bound to.
    pub fn serve(&mut self, addr: SocketAddr) -> Result<SocketAddr> {
        let filter = routes(
            self.state.clone(),
            StatsSource {
                metrics: self.metrics.clone(),
                queue: self.queue.clone(),
            },
        );
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for GUI bridge")?;

        let shutdown_stop = self.stop.clone();
        let shutdown = async move {
            while !shutdown_stop.is_stopped() {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        let (bound, server) = {
            let _guard = runtime.enter();
            warp::serve(filter)
                .try_bind_with_graceful_shutdown(addr, shutdown)
                .with_context(|| format!("binding GUI bridge to {addr}"))?
        };

        let handle = thread::Builder::new()
            .name("gui-http".into())
            .spawn(move || runtime.block_on(server))
            .context("spawning GUI HTTP thread")?;
        self.server = Some(handle);
        self.bound = Some(bound);
        self.publish_status(&format!("HTTP bridge listening on http://{bound}"));
        Ok(bound)
    }

    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound
    }

    /// Producer handle to attach to the acquisition pipeline.
    pub fn queue(&self) -> HandoffQueue<FrameData> {
        self.queue.clone()
    }

    pub fn publish_status(&self, message: &str) {
        info!("[GUI] {}", message);
        if let Ok(mut guard) = self.state.write() {
            guard.status = message.to_string();
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> VisualizationModel {
        match self.state.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Stops the consumer and the HTTP endpoint; queued frames are not drained.
    pub fn shutdown(mut self) {
        self.stop_threads();
    }

    fn stop_threads(&mut self) {
        self.stop.stop();
        for handle in [self.consumer.take(), self.server.take()].into_iter().flatten() {
            if handle.join().is_err() {
                warn!("GUI bridge thread panicked");
            }
        }
    }
}

impl Drop for GuiBridge {
    fn drop(&mut self) {
        self.stop_threads();
    }
}

fn consume(
    queue: &HandoffQueue<FrameData>,
    state: &SharedModel,
    position: Option<&SensorPosition>,
    stop: &StopSignal,
) {
    while !stop.is_stopped() {
        let Some(mut frame) = queue.pop_timeout(POLL_INTERVAL) else {
            continue;
        };
        // Only the newest frame is displayed.
        let mut skipped = 0;
        while let Some(newer) = queue.try_pop() {
            frame = newer;
            skipped += 1;
        }
        match state.write() {
            Ok(mut guard) => guard.update(&frame, skipped, position),
            Err(_) => {
                warn!("GUI state lock poisoned, consumer exiting");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmcwcore::protocol::{DecodedStruct, FieldValue};
    use serde_json::Value;

    fn frame(number: u64) -> FrameData {
        let mut header = DecodedStruct::new();
        header.insert("frameNumber".into(), FieldValue::Unsigned(number));
        FrameData::from_header(header)
    }

    fn wait_for(bridge: &GuiBridge, frames: u64) -> VisualizationModel {
        for _ in 0..100 {
            let model = bridge.snapshot();
            if model.frames_seen >= frames {
                return model;
            }
            thread::sleep(Duration::from_millis(10));
        }
        bridge.snapshot()
    }

    #[test]
    fn gui_bridge_updates_state() {
        let metrics = Arc::new(AcquisitionMetrics::new());
        let gui = GuiBridge::new(QueueConfig::default(), None, metrics).unwrap();
        let producer = gui.queue();
        for i in 1..=4 {
            producer.push(frame(i));
        }
        let model = wait_for(&gui, 4);
        assert_eq!(model.frames_seen, 4);
        assert_eq!(model.latest.unwrap().frame_number, Some(4));
        gui.shutdown();
    }

    #[tokio::test]
    async fn frame_and_stats_endpoints_serve_json() {
        let metrics = Arc::new(AcquisitionMetrics::new());
        metrics.record_frame();
        metrics.record_discarded(12);
        let state: SharedModel = Arc::new(RwLock::new(VisualizationModel::default()));
        if let Ok(mut guard) = state.write() {
            guard.update(&frame(33), 0, None);
        }
        let queue = HandoffQueue::new(QueueConfig::default());
        let filter = routes(state, StatsSource { metrics, queue });

        let response = warp::test::request().path("/frame").reply(&filter).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["frames_seen"], 1);
        assert_eq!(body["latest"]["frame_number"], 33);

        let response = warp::test::request().path("/stats").reply(&filter).await;
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["acquisition"]["frames"], 1);
        assert_eq!(body["acquisition"]["discarded_bytes"], 12);
        assert_eq!(body["display_queue_len"], 0);

        let response = warp::test::request().path("/nothing").reply(&filter).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn serve_binds_an_ephemeral_port() {
        let metrics = Arc::new(AcquisitionMetrics::new());
        let mut gui = GuiBridge::new(QueueConfig::default(), None, metrics).unwrap();
        let bound = gui.serve(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        assert_ne!(bound.port(), 0);
        assert_eq!(gui.bound_addr(), Some(bound));
        assert!(gui.snapshot().status.contains(&bound.to_string()));
        gui.shutdown();
    }
}
