use nalgebra::base::*;

/// One cubic polynomial piece of a neurite spline.
///
/// Valid on the parameter interval ending at `end_param`; all four channels
/// are evaluated in the monomial `m = end_param - t`.
#[derive(Debug, Clone)]
pub struct Section {
    pub end_param: f64,
    pub params_x: [f64; 4],
    pub params_y: [f64; 4],
    pub params_z: [f64; 4],
    pub params_r: [f64; 4],
}

fn eval_cubic(p: &[f64; 4], m: f64) -> f64 {
    ((p[0] * m + p[1]) * m + p[2]) * m + p[3]
}

fn eval_cubic_deriv(p: &[f64; 4], m: f64) -> f64 {
    // derivative w.r.t. t, not m
    (-3.0 * p[0] * m - 2.0 * p[1]) * m - p[2]
}

impl Section {
    pub fn new(end_param: f64) -> Section {
        Section {
            end_param,
            params_x: [0.0; 4],
            params_y: [0.0; 4],
            params_z: [0.0; 4],
            params_r: [0.0; 4],
        }
    }

    pub fn position_at(&self, t: f64) -> Vector3<f64> {
        let m = self.end_param - t;
        Vector3::new(
            eval_cubic(&self.params_x, m),
            eval_cubic(&self.params_y, m),
            eval_cubic(&self.params_z, m),
        )
    }

    pub fn velocity_at(&self, t: f64) -> Vector3<f64> {
        let m = self.end_param - t;
        Vector3::new(
            eval_cubic_deriv(&self.params_x, m),
            eval_cubic_deriv(&self.params_y, m),
            eval_cubic_deriv(&self.params_z, m),
        )
    }

    pub fn radius_at(&self, t: f64) -> f64 {
        eval_cubic(&self.params_r, self.end_param - t)
    }
}

/// Parameter location where a neurite meets a branching point.
///
/// `t = 0` on the child side, the junction parameter on the parent side.
#[derive(Debug, Clone)]
pub struct BranchingRegion {
    pub t: f64,
    /// arena index into [`NeuriteTree::branching_points`]
    pub bp: usize,
}

/// Shared junction linking a parent region to its child regions.
///
/// `neurite_ids` and `region_inds` run in parallel; entry 0 is the parent.
#[derive(Debug, Clone)]
pub struct BranchingPoint {
    pub neurite_ids: Vec<usize>,
    pub region_inds: Vec<usize>,
}

/// One branch-free tube: its fitted spline sections, branching metadata and
/// the polyline it was fitted to.
#[derive(Debug, Clone)]
pub struct Neurite {
    pub ref_dir: Vector3<f64>,
    pub sections: Vec<Section>,
    pub branching_regions: Vec<BranchingRegion>,
    pub knot_pos: Vec<Vector3<f64>>,
    pub knot_rad: Vec<f64>,
}

impl Neurite {
    pub(crate) fn empty() -> Neurite {
        Neurite {
            ref_dir: Vector3::zeros(),
            sections: Vec::new(),
            branching_regions: Vec::new(),
            knot_pos: Vec::new(),
            knot_rad: Vec::new(),
        }
    }

    /// Chord length of the underlying polyline
    pub fn length(&self) -> f64 {
        let mut len = 0.0;
        for i in 1..self.knot_pos.len() {
            len += (self.knot_pos[i] - self.knot_pos[i - 1]).norm();
        }
        len
    }

    /// Index of the first section at or after `start` whose span contains `t`
    pub fn section_index_from(&self, t: f64, start: usize) -> usize {
        let n_sec = self.sections.len();
        let mut cur = start;
        while cur < n_sec && self.sections[cur].end_param < t {
            cur += 1;
        }
        cur.min(n_sec - 1)
    }
}

/// All neurites of one or more cells, with the branching point arena and
/// the indices of the root neurites
#[derive(Debug, Clone)]
pub struct NeuriteTree {
    pub neurites: Vec<Neurite>,
    pub branching_points: Vec<BranchingPoint>,
    pub root_inds: Vec<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn section_end_evaluates_to_constant_coefficient() {
        let mut sec = Section::new(0.5);
        sec.params_x = [1.0, 2.0, 3.0, 4.0];
        sec.params_r = [0.0, 0.0, -1.0, 0.25];
        // monomial is zero at the end parameter
        assert_relative_eq!(sec.position_at(0.5)[0], 4.0, epsilon = 1e-12);
        assert_relative_eq!(sec.radius_at(0.5), 0.25, epsilon = 1e-12);
        // velocity at the end parameter is -c
        assert_relative_eq!(sec.velocity_at(0.5)[0], -3.0, epsilon = 1e-12);
    }

    #[test]
    fn section_lookup_scans_forward() {
        let mut neurite = Neurite::empty();
        neurite.sections.push(Section::new(0.25));
        neurite.sections.push(Section::new(0.5));
        neurite.sections.push(Section::new(1.0));
        assert_eq!(neurite.section_index_from(0.1, 0), 0);
        assert_eq!(neurite.section_index_from(0.25, 0), 0);
        assert_eq!(neurite.section_index_from(0.3, 0), 1);
        assert_eq!(neurite.section_index_from(0.3, 2), 2);
        assert_eq!(neurite.section_index_from(1.0, 0), 2);
    }
}
