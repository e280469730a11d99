use anyhow::Result;

use crate::neurite3d::BranchingRegion;
use crate::neurite3d::NeuriteTree;

/// Axial extent of a branching junction on the parent neurite.
///
/// `bp_start`/`bp_end` bound the junction window in the parent's axial
/// parameter; the extruder meshes up to `bp_start`, appends one segment to
/// `bp_end` and attaches the children there. Offsets are in world units.
#[derive(Debug, Clone)]
pub struct BranchWindow {
    pub bp_start: f64,
    pub bp_end: f64,
    /// axial shift of the junction center along the parent tangent
    pub surf_offset: f64,
    /// per child slot, the initial axial offset handed into the child
    pub child_offsets: Vec<f64>,
}

/// Computes the junction window of the branching region from the angle
/// between the parent tangent and the child's initial tangent.
///
/// The child spline meets the parent surface at an angle alpha; along the
/// parent axis the junction is displaced by r*cot(alpha) and stretched by
/// r_child/sin(alpha). `dual_layer` selects the window convention of the
/// two-layer mesh (centered on the branching point, no diagonal factor).
/// Fails when the branching point lies past the last section or the child
/// starts parallel to the parent.
pub fn branch_window(
    tree: &NeuriteTree,
    nid: usize,
    region: &BranchingRegion,
    cur_sec: usize,
    dual_layer: bool,
) -> Result<BranchWindow> {
    let neurite = &tree.neurites[nid];
    let bp = &tree.branching_points[region.bp];
    let n_sec = neurite.sections.len();
    let neurite_length = neurite.length();

    let mut window = BranchWindow {
        bp_start: 1.0,
        bp_end: 0.0,
        surf_offset: 0.0,
        child_offsets: vec![0.0; bp.neurite_ids.len()],
    };

    for br in 1..bp.neurite_ids.len() {
        let child_nid = bp.neurite_ids[br];
        let child_rad = tree.neurites[child_nid].knot_rad[0];
        let bp_t = region.t;

        // section whose end lies at the branching point
        let mut br_sec = cur_sec;
        while br_sec < n_sec && bp_t - neurite.sections[br_sec].end_param >= 1e-6 * bp_t {
            br_sec += 1;
        }
        if br_sec == n_sec {
            return Err(anyhow::anyhow!(
                "branch_window(): Could not find section containing branching point at t = {}",
                bp_t
            ));
        }
        let bp_rad = neurite.knot_rad[br_sec + 1];

        let child_sec = &tree.neurites[child_nid].sections[0];
        let branch_dir = child_sec.velocity_at(0.0).normalize();
        let sec = &neurite.sections[br_sec];
        let neurite_dir = sec.velocity_at(sec.end_param).normalize();

        let sc_prod = neurite_dir.dot(&branch_dir);
        let sin_alpha_sq = 1.0 - sc_prod * sc_prod;
        if sin_alpha_sq < 1e-12 {
            return Err(anyhow::anyhow!(
                "branch_window(): Child neurite {} starts parallel to its parent at t = {}",
                child_nid,
                bp_t
            ));
        }
        let sin_alpha_inv = 1.0 / sin_alpha_sq.sqrt();

        let diag = 0.5 * 2.0_f64.sqrt();
        window.surf_offset = diag * bp_rad * sc_prod * sin_alpha_inv;
        window.child_offsets[br] = diag * bp_rad * sin_alpha_inv;

        if dual_layer {
            let half_length = child_rad * sin_alpha_inv;
            window.bp_start = window.bp_start.min(bp_t - half_length / neurite_length);
            window.bp_end = window.bp_end.max(bp_t + half_length / neurite_length);
        } else {
            let half_length = diag * child_rad * sin_alpha_inv;
            window.bp_start = window
                .bp_start
                .min(bp_t + (window.surf_offset - half_length) / neurite_length);
            window.bp_end = window
                .bp_end
                .max(bp_t + (window.surf_offset + half_length) / neurite_length);
        }
    }

    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neurite3d::decompose::RawNeurites;
    use crate::neurite3d::spline::create_spline_data;
    use approx::assert_relative_eq;
    use nalgebra::base::*;

    // straight parent along x with one orthogonal child branching midway
    fn branched_tree() -> NeuriteTree {
        let parent: Vec<Vector3<f64>> = (0..5)
            .map(|i| Vector3::new(i as f64, 0.0, 0.0))
            .collect();
        let child = vec![
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(2.0, 1.0, 0.0),
            Vector3::new(2.0, 2.0, 0.0),
        ];
        let raw = RawNeurites {
            pos: vec![parent, child],
            rad: vec![vec![0.4; 5], vec![0.3; 3]],
            branch_info: vec![
                vec![crate::neurite3d::decompose::BranchInfo {
                    local_ind: 2,
                    child_ids: vec![1],
                }],
                Vec::new(),
            ],
            root_inds: vec![0],
            soma_points: Vec::new(),
        };
        create_spline_data(&raw).unwrap()
    }

    #[test]
    fn orthogonal_branch_window_is_symmetric_for_dual_layer() {
        let tree = branched_tree();
        let region = tree.neurites[0].branching_regions[0].clone();
        let w = branch_window(&tree, 0, &region, 0, true).unwrap();
        // alpha = pi/2: no axial displacement, half length r_child / L
        assert_relative_eq!(w.surf_offset, 0.0, epsilon = 1e-9);
        assert_relative_eq!(w.bp_start, 0.5 - 0.3 / 4.0, epsilon = 1e-9);
        assert_relative_eq!(w.bp_end, 0.5 + 0.3 / 4.0, epsilon = 1e-9);
        assert_relative_eq!(
            w.child_offsets[1],
            0.5 * 2.0_f64.sqrt() * 0.4,
            epsilon = 1e-9
        );
    }

    #[test]
    fn surface_window_carries_the_diagonal_factor() {
        let tree = branched_tree();
        let region = tree.neurites[0].branching_regions[0].clone();
        let w = branch_window(&tree, 0, &region, 0, false).unwrap();
        let half = 0.5 * 2.0_f64.sqrt() * 0.3;
        assert_relative_eq!(w.bp_start, 0.5 - half / 4.0, epsilon = 1e-9);
        assert_relative_eq!(w.bp_end, 0.5 + half / 4.0, epsilon = 1e-9);
    }

    #[test]
    fn parallel_child_is_rejected() {
        // child continuing straight along the parent direction
        let parent: Vec<Vector3<f64>> = (0..5)
            .map(|i| Vector3::new(i as f64, 0.0, 0.0))
            .collect();
        let child = vec![
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(3.0, 0.0, 0.0),
            Vector3::new(4.0, 0.0, 0.0),
        ];
        let raw = RawNeurites {
            pos: vec![parent, child],
            rad: vec![vec![0.4; 5], vec![0.3; 3]],
            branch_info: vec![
                vec![crate::neurite3d::decompose::BranchInfo {
                    local_ind: 2,
                    child_ids: vec![1],
                }],
                Vec::new(),
            ],
            root_inds: vec![0],
            soma_points: Vec::new(),
        };
        let tree = create_spline_data(&raw).unwrap();
        let region = tree.neurites[0].branching_regions[0].clone();
        assert!(branch_window(&tree, 0, &region, 0, true).is_err());
    }
}
