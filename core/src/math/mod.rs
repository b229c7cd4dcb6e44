pub mod geometry;
pub mod pow2;
pub mod stats;

pub use geometry::rotate_point;
pub use pow2::next_pow2;
pub use stats::StatsHelper;
