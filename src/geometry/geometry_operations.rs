use nalgebra::base::*;

/// 5-point Gauss-Legendre rule on [0, 1]: (point, weight), weights summing to 1
pub const GAUSS_LEGENDRE_5: [(f64, f64); 5] = [
    (0.046910077030668004, 0.11846344252809454),
    (0.23076534494715845, 0.23931433524968324),
    (0.5, 0.28444444444444444),
    (0.7692346550528415, 0.23931433524968324),
    (0.9530899229693319, 0.11846344252809454),
];

/// Builds the orthonormal cross-section frame at a point of the tube.
///
/// Returns the normalized tangent, the reference direction projected to the
/// normal plane of the tangent, and their cross product.
pub fn orthogonal_frame(
    tangent: &Vector3<f64>,
    ref_dir: &Vector3<f64>,
) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
    let vel = tangent.normalize();
    let fac = ref_dir.dot(&vel);
    let proj_ref_dir = (ref_dir - fac * vel).normalize();
    let third_dir = vel.cross(&proj_ref_dir);
    (vel, proj_ref_dir, third_dir)
}

/// Recovers the angle of an offset vector in the cross-section plane
/// spanned by `e1` and `e2`, with `tangent` normal to that plane.
///
/// The result lies in [0, 2*pi).
pub fn ring_plane_angle(
    offset: &Vector3<f64>,
    tangent: &Vector3<f64>,
    e1: &Vector3<f64>,
    e2: &Vector3<f64>,
) -> f64 {
    let mut in_plane = offset - offset.dot(tangent) * tangent;
    let rel0 = in_plane.dot(e1);
    in_plane -= rel0 * e1;
    let rel1 = in_plane.dot(e2);
    let norm = (rel0 * rel0 + rel1 * rel1).sqrt();
    let (rel0, rel1) = (rel0 / norm, rel1 / norm);

    let mut angle = if rel0.abs() < 1e-8 {
        if rel1 < 0.0 {
            1.5 * std::f64::consts::PI
        } else {
            0.5 * std::f64::consts::PI
        }
    } else if rel0 < 0.0 {
        std::f64::consts::PI - (-rel1 / rel0).atan()
    } else {
        (rel1 / rel0).atan()
    };
    if angle < 0.0 {
        angle += 2.0 * std::f64::consts::PI;
    }
    angle
}

/// Picks the coordinate axis least aligned with `dir` (used as a stable
/// reference direction for the angular frame of a tube).
pub fn least_aligned_axis(dir: &Vector3<f64>) -> Vector3<f64> {
    if dir[0].abs() < dir[1].abs() {
        if dir[0].abs() < dir[2].abs() {
            Vector3::new(1.0, 0.0, 0.0)
        } else {
            Vector3::new(0.0, 0.0, 1.0)
        }
    } else if dir[1].abs() < dir[2].abs() {
        Vector3::new(0.0, 1.0, 0.0)
    } else {
        Vector3::new(0.0, 0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn gauss_legendre_integrates_cubics_exactly() {
        // integral of t^3 over [0,1] is 1/4
        let int: f64 = GAUSS_LEGENDRE_5
            .iter()
            .map(|&(p, w)| w * p * p * p)
            .sum();
        assert_relative_eq!(int, 0.25, max_relative = 1e-14);
    }

    #[test]
    fn frame_is_orthonormal() {
        let tangent = Vector3::new(1.0, 2.0, -0.5);
        let ref_dir = Vector3::new(0.0, 0.0, 1.0);
        let (vel, e1, e2) = orthogonal_frame(&tangent, &ref_dir);
        assert_relative_eq!(vel.norm(), 1.0, max_relative = 1e-12);
        assert_relative_eq!(e1.norm(), 1.0, max_relative = 1e-12);
        assert_relative_eq!(e2.norm(), 1.0, max_relative = 1e-12);
        assert_relative_eq!(vel.dot(&e1), 0.0, epsilon = 1e-12);
        assert_relative_eq!(vel.dot(&e2), 0.0, epsilon = 1e-12);
        assert_relative_eq!(e1.dot(&e2), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn ring_plane_angle_recovers_known_angles() {
        let tangent = Vector3::new(0.0, 0.0, 1.0);
        let e1 = Vector3::new(1.0, 0.0, 0.0);
        let e2 = Vector3::new(0.0, 1.0, 0.0);
        for &ang in &[0.0f64, 0.4, 1.5707963267948966, 3.0, 4.5, 6.0] {
            let offset = ang.cos() * e1 + ang.sin() * e2;
            assert_relative_eq!(
                ring_plane_angle(&offset, &tangent, &e1, &e2),
                ang,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn least_aligned_axis_picks_smallest_component() {
        let dir = Vector3::new(0.9, 0.1, 0.4);
        assert_eq!(least_aligned_axis(&dir), Vector3::new(0.0, 1.0, 0.0));
        let dir = Vector3::new(0.05, 0.9, 0.4);
        assert_eq!(least_aligned_axis(&dir), Vector3::new(1.0, 0.0, 0.0));
        let dir = Vector3::new(0.9, 0.8, 0.1);
        assert_eq!(least_aligned_axis(&dir), Vector3::new(0.0, 0.0, 1.0));
    }
}
