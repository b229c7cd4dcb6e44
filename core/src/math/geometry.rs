use ndarray::{arr1, arr2, Array1, Array2};

fn azimuth_rotation(azimuth: f64) -> Array2<f64> {
    let (sin, cos) = azimuth.sin_cos();
    arr2(&[[cos, sin, 0.0], [-sin, cos, 0.0], [0.0, 0.0, 1.0]])
}

fn elevation_rotation(elevation: f64) -> Array2<f64> {
    let (sin, cos) = elevation.sin_cos();
    arr2(&[[1.0, 0.0, 0.0], [0.0, cos, -sin], [0.0, sin, cos]])
}

/// Rotates `pos` by the elevation tilt (about x) and then the azimuth tilt
/// (about z). Angles are in radians.
pub fn rotate_point(pos: [f64; 3], azimuth: f64, elevation: f64) -> [f64; 3] {
    let rotation = azimuth_rotation(azimuth).dot(&elevation_rotation(elevation));
    let rotated: Array1<f64> = rotation.dot(&arr1(&pos));
    [rotated[0], rotated[1], rotated[2]]
}
