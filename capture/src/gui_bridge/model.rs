use fmcwcore::config::SensorPosition;
use fmcwcore::frame::{FrameData, PointRow};
use fmcwcore::protocol::DecodedStruct;
use fmcwcore::telemetry::MetricsSnapshot;
use serde::Serialize;

/// Display-ready view of one frame; points are in the mounting frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameSnapshot {
    pub frame_number: Option<u64>,
    pub timestamp: f64,
    pub header: DecodedStruct,
    pub num_points: usize,
    pub num_targets: usize,
    pub points: Vec<[f64; 3]>,
    pub doppler: Vec<f32>,
    pub snr: Vec<f32>,
}

impl FrameSnapshot {
    pub fn from_frame(frame: &FrameData, position: Option<&SensorPosition>) -> Self {
        let xs = frame.point_row(PointRow::X);
        let ys = frame.point_row(PointRow::Y);
        let points = xs
            .iter()
            .zip(ys.iter())
            .map(|(&x, &y)| {
                let local = [f64::from(x), f64::from(y), 0.0];
                match position {
                    Some(position) => position.to_world(local),
                    None => local,
                }
            })
            .collect();

        Self {
            frame_number: frame.frame_number(),
            timestamp: frame.timestamp,
            header: frame.header.clone(),
            num_points: frame.num_points,
            num_targets: frame.num_targets,
            points,
            doppler: frame.point_row(PointRow::Doppler).to_vec(),
            snr: frame.point_row(PointRow::Snr).to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct VisualizationModel {
    pub frames_seen: u64,
    /// Frames the display consumer skipped to stay on the newest one.
    pub frames_skipped: u64,
    pub latest: Option<FrameSnapshot>,
    pub status: String,
}

impl VisualizationModel {
    pub fn update(&mut self, frame: &FrameData, skipped: u64, position: Option<&SensorPosition>) {
        self.frames_seen += 1 + skipped;
        self.frames_skipped += skipped;
        self.latest = Some(FrameSnapshot::from_frame(frame, position));
    }
}

/// Body of `GET /stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub acquisition: MetricsSnapshot,
    pub display_queue_len: usize,
    pub display_queue_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use fmcwcore::protocol::FieldValue;
    use ndarray::arr2;

    fn frame_with_points() -> FrameData {
        let mut header = DecodedStruct::new();
        header.insert("frameNumber".into(), FieldValue::Unsigned(12));
        FrameData::from_header(header).with_point_cloud(arr2(&[
            [1.0, 2.0],
            [1.0, 0.0],
            [0.0, 2.0],
            [0.5, -0.5],
            [10.0, 20.0],
        ]))
    }

    #[test]
    fn snapshot_without_mounting_keeps_sensor_coordinates() {
        let snapshot = FrameSnapshot::from_frame(&frame_with_points(), None);
        assert_eq!(snapshot.frame_number, Some(12));
        assert_eq!(snapshot.points, vec![[1.0, 0.0, 0.0], [0.0, 2.0, 0.0]]);
        assert_eq!(snapshot.doppler, vec![0.5, -0.5]);
        assert_eq!(snapshot.snr, vec![10.0, 20.0]);
    }

    #[test]
    fn snapshot_applies_mounting_offsets() {
        let position = SensorPosition {
            x_offset: 1.0,
            y_offset: 0.0,
            z_offset: 2.5,
            azimuth_tilt_deg: 0.0,
            elevation_tilt_deg: 0.0,
        };
        let snapshot = FrameSnapshot::from_frame(&frame_with_points(), Some(&position));
        assert_eq!(snapshot.points, vec![[2.0, 0.0, 2.5], [1.0, 2.0, 2.5]]);
    }

    #[test]
    fn model_counts_skipped_frames() {
        let mut model = VisualizationModel::default();
        model.update(&frame_with_points(), 0, None);
        model.update(&frame_with_points(), 3, None);
        assert_eq!(model.frames_seen, 5);
        assert_eq!(model.frames_skipped, 3);
        assert!(model.latest.is_some());
    }
}
