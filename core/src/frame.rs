use crate::protocol::template::{DecodedStruct, FieldValue};
use ndarray::{Array2, ArrayView1};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::collections::BTreeMap;

/// Rows of the point-cloud matrix; each detected point is one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointRow {
    Range = 0,
    X = 1,
    Y = 2,
    Doppler = 3,
    Snr = 4,
}

pub const POINT_CLOUD_ROWS: usize = 5;

/// One decoded radar frame, owned by whichever stage currently holds it.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameData {
    /// Arrival time, seconds since the Unix epoch.
    pub timestamp: f64,
    pub header: DecodedStruct,
    pub point_cloud: Array2<f32>,
    pub num_points: usize,
    pub target_list: BTreeMap<String, Vec<f64>>,
    pub num_targets: usize,
    pub stats_info: BTreeMap<String, DecodedStruct>,
}

impl FrameData {
    pub fn from_header(header: DecodedStruct) -> Self {
        Self {
            timestamp: 0.0,
            header,
            point_cloud: Array2::zeros((POINT_CLOUD_ROWS, 0)),
            num_points: 0,
            target_list: BTreeMap::new(),
            num_targets: 0,
            stats_info: BTreeMap::new(),
        }
    }

    /// Replaces the point cloud. Matrices without five rows are ignored.
    pub fn with_point_cloud(mut self, point_cloud: Array2<f32>) -> Self {
        if point_cloud.nrows() == POINT_CLOUD_ROWS {
            self.num_points = point_cloud.ncols();
            self.point_cloud = point_cloud;
        }
        self
    }

    pub fn frame_number(&self) -> Option<u64> {
        self.header.get("frameNumber").and_then(|v| v.as_u64())
    }

    pub fn header_value(&self, name: &str) -> Option<FieldValue> {
        self.header.get(name).copied()
    }

    pub fn point_row(&self, row: PointRow) -> ArrayView1<'_, f32> {
        self.point_cloud.row(row as usize)
    }
}

struct Rows<'a>(&'a Array2<f32>);

impl Serialize for Rows<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.outer_iter().map(Row))
    }
}

struct Row<'a>(ArrayView1<'a, f32>);

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

/// Persisted shape of a frame; the point cloud is written as nested rows.
impl Serialize for FrameData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FrameData", 7)?;
        state.serialize_field("timestamp", &self.timestamp)?;
        state.serialize_field("header", &self.header)?;
        state.serialize_field("num_points", &self.num_points)?;
        state.serialize_field("num_targets", &self.num_targets)?;
        state.serialize_field("stats_info", &self.stats_info)?;
        state.serialize_field("point_cloud", &Rows(&self.point_cloud))?;
        state.serialize_field("target_list", &self.target_list)?;
        state.end()
    }
}
