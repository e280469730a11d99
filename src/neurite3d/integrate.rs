use anyhow::Result;

use crate::geometry::geometry_operations::GAUSS_LEGENDRE_5;

use super::Neurite;
use super::Section;

fn check_start_section(neurite: &Neurite, t_start: f64, start_sec: usize) -> Result<()> {
    let sec_tstart = if start_sec > 0 {
        neurite.sections[start_sec - 1].end_param
    } else {
        0.0
    };
    let sec_tend = neurite.sections[start_sec].end_param;
    if sec_tend < t_start || sec_tstart > t_start {
        return Err(anyhow::anyhow!(
            "length_over_radius(): wrong start section given, section spans [{}, {}] \
             but t_start is {}",
            sec_tstart,
            sec_tend,
            t_start
        ));
    }
    Ok(())
}

// quadrature of ||v||/r over one section piece [sec_tstart, sec_tend]
fn section_integral(sec: &Section, sec_tstart: f64, dt: f64) -> Result<f64> {
    let mut sum = 0.0;
    for &(p, w) in GAUSS_LEGENDRE_5.iter() {
        let t = sec_tstart + dt * p;
        let vel = sec.velocity_at(t);
        let r = sec.radius_at(t);
        if r * r <= vel.norm_squared() * 1e-12 {
            return Err(anyhow::anyhow!(
                "length_over_radius(): degenerate radius {} at t = {}",
                r,
                t
            ));
        }
        sum += w * vel.norm() / r;
    }
    Ok(sum)
}

/// Integral of `||v(t)|| / r(t)` from `t_start` to `t_end`, the tube length
/// in units of the local radius.
///
/// `start_sec` must be the section containing `t_start` (checked). Fails on
/// a degenerate radius at any evaluation point.
pub fn length_over_radius(
    neurite: &Neurite,
    t_start: f64,
    t_end: f64,
    start_sec: usize,
) -> Result<f64> {
    check_start_section(neurite, t_start, start_sec)?;

    let n_sec = neurite.sections.len();
    let mut t_start = t_start;
    let mut integral = 0.0;
    for cur in start_sec..n_sec {
        let sec = &neurite.sections[cur];
        let sec_tstart = if cur > 0 {
            t_start.max(neurite.sections[cur - 1].end_param)
        } else {
            t_start
        };
        let sec_tend = t_end.min(sec.end_param);
        let dt = sec_tend - sec_tstart;
        integral += dt * section_integral(sec, sec_tstart, dt)?;

        t_start = sec_tend;
        if t_start >= t_end {
            break;
        }
    }

    Ok(integral)
}

/// Exact parameter values of the segment boundaries dividing
/// `[t_start, t_end]` into `n_seg` pieces of equal length over radius.
///
/// Accumulates the quadrature section by section and linearly interpolates
/// within the section where each threshold `k * seg_length` is crossed. The
/// final boundary is snapped to `t_end` when the residual is below 1e-6
/// relative.
pub fn segment_axial_positions(
    neurite: &Neurite,
    t_start: f64,
    t_end: f64,
    start_sec: usize,
    n_seg: usize,
    seg_length: f64,
) -> Result<Vec<f64>> {
    check_start_section(neurite, t_start, start_sec)?;

    let n_sec = neurite.sections.len();
    let mut seg_ax_pos = vec![0.0; n_seg];
    let mut t_start = t_start;
    let mut integral = 0.0;
    let mut seg = 0;
    for cur in start_sec..n_sec {
        let sec = &neurite.sections[cur];
        let sec_tstart = if cur > 0 {
            t_start.max(neurite.sections[cur - 1].end_param)
        } else {
            t_start
        };
        let sec_tend = t_end.min(sec.end_param);
        let dt = sec_tend - sec_tstart;
        let sec_integral = section_integral(sec, sec_tstart, dt)?;
        integral += dt * sec_integral;

        // whenever the integral has surpassed the next threshold,
        // interpolate the exact boundary within this section
        while seg < n_seg && integral >= (seg + 1) as f64 * seg_length {
            let last_integral = integral - dt * sec_integral;
            seg_ax_pos[seg] = t_start + ((seg + 1) as f64 * seg_length - last_integral) / sec_integral;
            seg += 1;
        }

        t_start = sec_tend;
        if t_start >= t_end {
            break;
        }
    }

    // rounding errors may leave the last boundary unassigned
    if seg + 1 == n_seg && (n_seg as f64 * seg_length - integral) / integral < 1e-6 {
        seg_ax_pos[n_seg - 1] = t_end;
        seg += 1;
    }

    if seg != n_seg {
        return Err(anyhow::anyhow!(
            "segment_axial_positions(): only {} of {} segment boundaries found",
            seg,
            n_seg
        ));
    }

    Ok(seg_ax_pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neurite3d::decompose::RawNeurites;
    use crate::neurite3d::spline::create_spline_data;
    use approx::assert_relative_eq;
    use nalgebra::base::*;

    fn straight_tube(radius: f64) -> Neurite {
        let raw = RawNeurites {
            pos: vec![vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(2.0, 0.0, 0.0),
            ]],
            rad: vec![vec![radius; 3]],
            branch_info: vec![Vec::new()],
            root_inds: vec![0],
            soma_points: Vec::new(),
        };
        create_spline_data(&raw).unwrap().neurites.remove(0)
    }

    #[test]
    fn straight_tube_integral_is_length_over_radius() {
        let neurite = straight_tube(0.5);
        let lor = length_over_radius(&neurite, 0.0, 1.0, 0).unwrap();
        assert_relative_eq!(lor, 4.0, max_relative = 1e-9);
    }

    #[test]
    fn partial_interval_spanning_two_sections() {
        let neurite = straight_tube(0.5);
        let lor = length_over_radius(&neurite, 0.25, 0.75, 0).unwrap();
        assert_relative_eq!(lor, 2.0, max_relative = 1e-9);
    }

    #[test]
    fn inconsistent_start_section_is_rejected() {
        let neurite = straight_tube(0.5);
        assert!(length_over_radius(&neurite, 0.75, 1.0, 0).is_err());
        assert!(length_over_radius(&neurite, 0.25, 1.0, 1).is_err());
    }

    #[test]
    fn boundaries_are_increasing_and_equally_spaced() {
        let neurite = straight_tube(0.5);
        let total = length_over_radius(&neurite, 0.0, 1.0, 0).unwrap();
        let n_seg = 4;
        let seg_len = total / n_seg as f64;
        let pos = segment_axial_positions(&neurite, 0.0, 1.0, 0, n_seg, seg_len).unwrap();
        assert_eq!(pos.len(), n_seg);
        let mut last = 0.0;
        for (k, &p) in pos.iter().enumerate() {
            assert!(p > last);
            last = p;
            // on a straight constant-radius tube boundaries are uniform in t
            assert_relative_eq!(p, (k + 1) as f64 * 0.25, epsilon = 1e-9);
            // and their partial integrals are equally spaced
            let partial = length_over_radius(&neurite, 0.0, p, 0).unwrap();
            assert_relative_eq!(partial, (k + 1) as f64 * seg_len, max_relative = 1e-9);
        }
        assert_relative_eq!(pos[n_seg - 1], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn degenerate_radius_is_reported() {
        let neurite = straight_tube(1e-9);
        assert!(length_over_radius(&neurite, 0.0, 1.0, 0).is_err());
    }
}
