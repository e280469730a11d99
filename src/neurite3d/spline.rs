use anyhow::Result;

use crate::geometry::geometry_operations::least_aligned_axis;
use crate::geometry::tridiagonal::TridiagonalSystem;

use super::decompose::RawNeurites;
use super::BranchingPoint;
use super::BranchingRegion;
use super::Neurite;
use super::NeuriteTree;
use super::Section;

/// Fits a natural cubic spline to every neurite polyline and wires the
/// branching points.
///
/// The spline parameter is cumulative chord length normalized to [0, 1].
/// One moment system per neurite is factorized once and solved for all four
/// channels (x, y, z, radius). At every branch record a branching point is
/// created in the arena; the parent region sits at the knot parameter, the
/// child regions at t = 0 of their neurites. Children always carry a larger
/// neurite id than their parent, so their regions can be pushed before the
/// children themselves are processed.
pub fn create_spline_data(raw: &RawNeurites) -> Result<NeuriteTree> {
    let n_neurites = raw.pos.len();
    let mut neurites: Vec<Neurite> = (0..n_neurites).map(|_| Neurite::empty()).collect();
    let mut branching_points: Vec<BranchingPoint> = Vec::new();

    for n in 0..n_neurites {
        let pos = &raw.pos[n];
        let r = &raw.rad[n];
        let bp_info = &raw.branch_info[n];

        let n_vrt = pos.len();
        if n_vrt < 2 {
            return Err(anyhow::anyhow!(
                "create_spline_data(): neurite {} has fewer than 2 points",
                n
            ));
        }

        // parameterize to achieve constant velocity on the piecewise
        // linear geometry
        let mut t_supp = vec![0.0; n_vrt];
        let mut dt = vec![0.0; n_vrt];
        let mut total_length = 0.0;
        for i in 0..n_vrt - 1 {
            t_supp[i] = total_length;
            total_length += (pos[i + 1] - pos[i]).norm();
        }
        for t in t_supp.iter_mut().take(n_vrt - 1) {
            *t /= total_length;
        }
        t_supp[n_vrt - 1] = 1.0;
        for i in 0..n_vrt - 1 {
            dt[i + 1] = t_supp[i + 1] - t_supp[i];
        }

        // moment system of the natural spline: diagonal 2, neighbor
        // couplings scaled by the local knot spacing
        let mut lower = vec![0.0; n_vrt - 1];
        let mut upper = vec![0.0; n_vrt - 1];
        for i in 1..n_vrt - 1 {
            let h2 = t_supp[i + 1] - t_supp[i - 1];
            upper[i] = dt[i + 1] / h2;
            lower[i - 1] = dt[i] / h2;
        }
        let mat = TridiagonalSystem::new(lower, vec![2.0; n_vrt], upper)?;

        let solve_channel = |vals: &dyn Fn(usize) -> f64| -> Result<Vec<f64>> {
            let mut rhs = vec![0.0; n_vrt];
            for i in 1..n_vrt - 1 {
                rhs[i] = 6.0 / (t_supp[i + 1] - t_supp[i - 1])
                    * ((vals(i + 1) - vals(i)) / dt[i + 1] - (vals(i) - vals(i - 1)) / dt[i]);
            }
            mat.solve(&mut rhs)?;
            Ok(rhs)
        };

        let x0 = solve_channel(&|i| pos[i][0])?;
        let x1 = solve_channel(&|i| pos[i][1])?;
        let x2 = solve_channel(&|i| pos[i][2])?;
        let xr = solve_channel(&|i| r[i])?;

        let neurite_dir = (pos[n_vrt - 1] - pos[0]).normalize();
        neurites[n].ref_dir = least_aligned_axis(&neurite_dir);
        neurites[n].knot_pos = pos.clone();
        neurites[n].knot_rad = r.clone();
        neurites[n].sections.reserve(n_vrt - 1);

        let mut br_it = bp_info.iter().peekable();

        for i in 0..n_vrt - 1 {
            let mut sec = Section::new(t_supp[i + 1]);

            let fill = |mom_i: f64, mom_ip1: f64, y_i: f64, y_ip1: f64| -> [f64; 4] {
                [
                    (mom_i - mom_ip1) / (6.0 * dt[i + 1]),
                    0.5 * mom_ip1,
                    -(dt[i + 1] / 6.0 * (mom_i + 2.0 * mom_ip1) + (y_ip1 - y_i) / dt[i + 1]),
                    y_ip1,
                ]
            };
            sec.params_x = fill(x0[i], x0[i + 1], pos[i][0], pos[i + 1][0]);
            sec.params_y = fill(x1[i], x1[i + 1], pos[i][1], pos[i + 1][1]);
            sec.params_z = fill(x2[i], x2[i + 1], pos[i][2], pos[i + 1][2]);
            sec.params_r = fill(xr[i], xr[i + 1], r[i], r[i + 1]);

            // branching point at the end knot of this section?
            if let Some(&bi) = br_it.peek() {
                if bi.local_ind == i + 1 {
                    let bp_id = branching_points.len();
                    let parent_region_ind = neurites[n].branching_regions.len();
                    neurites[n].branching_regions.push(BranchingRegion {
                        t: t_supp[i + 1],
                        bp: bp_id,
                    });
                    let mut bp = BranchingPoint {
                        neurite_ids: vec![n],
                        region_inds: vec![parent_region_ind],
                    };
                    for &child_id in bi.child_ids.iter() {
                        let child_region_ind = neurites[child_id].branching_regions.len();
                        neurites[child_id]
                            .branching_regions
                            .push(BranchingRegion { t: 0.0, bp: bp_id });
                        bp.neurite_ids.push(child_id);
                        bp.region_inds.push(child_region_ind);
                    }
                    branching_points.push(bp);
                    br_it.next();
                }
            }

            neurites[n].sections.push(sec);
        }
    }

    Ok(NeuriteTree {
        neurites,
        branching_points,
        root_inds: raw.root_inds.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neurite3d::decompose::convert_pointlist_to_neuritelist;
    use crate::swc3d::{SwcPoint, SwcType};
    use approx::assert_relative_eq;
    use nalgebra::base::*;

    fn raw_from_polyline(pos: Vec<Vector3<f64>>, rad: Vec<f64>) -> RawNeurites {
        RawNeurites {
            pos: vec![pos],
            rad: vec![rad],
            branch_info: vec![Vec::new()],
            root_inds: vec![0],
            soma_points: Vec::new(),
        }
    }

    fn sample_polyline() -> RawNeurites {
        raw_from_polyline(
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(3.0, 1.0, 0.0),
                Vector3::new(5.0, 1.0, 1.0),
                Vector3::new(7.0, 0.0, 0.0),
            ],
            vec![0.05, 0.1, 0.2, 0.15, 0.05],
        )
    }

    #[test]
    fn five_point_polyline_gives_four_sections_matching_knots() {
        let tree = create_spline_data(&sample_polyline()).unwrap();
        assert_eq!(tree.neurites.len(), 1);
        let neurite = &tree.neurites[0];
        assert_eq!(neurite.sections.len(), 4);
        assert!(tree.branching_points.is_empty());

        // sections stored in increasing end parameter order, ending at 1
        for w in neurite.sections.windows(2) {
            assert!(w[0].end_param < w[1].end_param);
        }
        assert_relative_eq!(neurite.sections[3].end_param, 1.0, epsilon = 1e-12);

        // each section reproduces its end knot exactly
        let raw = sample_polyline();
        for (i, sec) in neurite.sections.iter().enumerate() {
            let p = sec.position_at(sec.end_param);
            let knot = raw.pos[0][i + 1];
            assert_relative_eq!((p - knot).norm(), 0.0, epsilon = 1e-9);
            assert_relative_eq!(sec.radius_at(sec.end_param), raw.rad[0][i + 1], epsilon = 1e-9);
        }

        // the first section also reproduces the first knot at t = 0
        let p0 = neurite.sections[0].position_at(0.0);
        assert_relative_eq!((p0 - raw.pos[0][0]).norm(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(neurite.sections[0].radius_at(0.0), 0.05, epsilon = 1e-9);
    }

    #[test]
    fn spline_is_continuous_across_section_boundaries() {
        let tree = create_spline_data(&sample_polyline()).unwrap();
        let neurite = &tree.neurites[0];
        for i in 0..neurite.sections.len() - 1 {
            let t = neurite.sections[i].end_param;
            let a = neurite.sections[i].position_at(t);
            let b = neurite.sections[i + 1].position_at(t);
            assert_relative_eq!((a - b).norm(), 0.0, epsilon = 1e-9);
            let va = neurite.sections[i].velocity_at(t);
            let vb = neurite.sections[i + 1].velocity_at(t);
            assert_relative_eq!((va - vb).norm(), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn reference_direction_is_least_aligned_axis() {
        let tree = create_spline_data(&sample_polyline()).unwrap();
        // overall direction is dominantly x, weakly z
        assert_eq!(tree.neurites[0].ref_dir, Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn single_point_neurite_is_rejected() {
        let raw = raw_from_polyline(vec![Vector3::new(0.0, 0.0, 0.0)], vec![0.1]);
        assert!(create_spline_data(&raw).is_err());
    }

    #[test]
    fn branching_point_links_parent_and_child_regions() {
        let mut pts = vec![
            SwcPoint::new(SwcType::Soma, Vector3::new(0.0, 0.0, 0.0), 0.2),
            SwcPoint::new(SwcType::Dendrite, Vector3::new(1.0, 0.0, 0.0), 0.1),
            SwcPoint::new(SwcType::Dendrite, Vector3::new(2.0, 0.0, 0.0), 0.1),
            SwcPoint::new(SwcType::Dendrite, Vector3::new(3.0, 0.0, 0.0), 0.1),
            SwcPoint::new(SwcType::Dendrite, Vector3::new(4.0, 0.0, 0.0), 0.1),
            SwcPoint::new(SwcType::Dendrite, Vector3::new(3.0, 1.0, 0.0), 0.08),
        ];
        let conns = [(0, 1), (1, 2), (2, 3), (3, 4), (3, 5)];
        for &(a, b) in conns.iter() {
            pts[a].conns.push(b);
            pts[b].conns.push(a);
        }
        let raw = convert_pointlist_to_neuritelist(&pts).unwrap();
        let tree = create_spline_data(&raw).unwrap();

        assert_eq!(tree.neurites.len(), 2);
        assert_eq!(tree.branching_points.len(), 1);

        let bp = &tree.branching_points[0];
        assert_eq!(bp.neurite_ids, vec![0, 1]);
        assert_eq!(bp.region_inds, vec![0, 0]);

        // parent region sits at the knot parameter of the branch point
        let parent = &tree.neurites[0];
        assert_eq!(parent.branching_regions.len(), 1);
        let br = &parent.branching_regions[0];
        assert_eq!(br.bp, 0);
        assert_relative_eq!(br.t, 2.0 / 3.0, epsilon = 1e-12);

        // child region sits at t = 0
        let child = &tree.neurites[1];
        assert_eq!(child.branching_regions.len(), 1);
        assert_relative_eq!(child.branching_regions[0].t, 0.0, epsilon = 1e-12);
        assert_eq!(child.branching_regions[0].bp, 0);
    }
}
