use anyhow::Result;

use crate::grid3d::Grid3D;
use crate::neurite3d::decompose::convert_pointlist_to_neuritelist;
use crate::neurite3d::spline::create_spline_data;
use crate::swc3d::io::load_swc;
use crate::swc3d::smoothing::collapse_short_edges;
use crate::swc3d::smoothing::smooth_positions;
use crate::swc3d::SwcPoint;

use super::ring_topology::RingTopology;
use super::tube_extrude::create_neurite;

/// Parameters of the curvature-flow smoothing pass applied to the raw
/// morphology before spline fitting
#[derive(Debug, Clone, Copy)]
pub struct SmoothingParams {
    pub n_iterations: usize,
    pub h: f64,
    pub gamma: f64,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        SmoothingParams {
            n_iterations: 5,
            h: 1.0,
            gamma: 1.0,
        }
    }
}

fn build_grid(points: &[SwcPoint], topology: &RingTopology, anisotropy: f64) -> Result<Grid3D> {
    let raw = convert_pointlist_to_neuritelist(points)?;
    let tree = create_spline_data(&raw)?;

    log::debug!(
        "build_grid(): {} neurites, {} branching points, {} roots",
        tree.neurites.len(),
        tree.branching_points.len(),
        tree.root_inds.len()
    );

    let mut grid = Grid3D::new();
    for &root in tree.root_inds.iter() {
        create_neurite(&tree, root, topology, anisotropy, &mut grid, None, 0.0)?;
    }
    Ok(grid)
}

/// Surface mesh of the plasma membrane, quadrilateral tubes capped at the tips
pub fn surface_grid(points: &[SwcPoint], anisotropy: f64) -> Result<Grid3D> {
    build_grid(points, &RingTopology::surface(), anisotropy)
}

/// Hexahedral volume mesh with an inner ER layer scaled by `er_scale`
pub fn volume_grid(points: &[SwcPoint], anisotropy: f64, er_scale: f64) -> Result<Grid3D> {
    build_grid(points, &RingTopology::dual_layer(er_scale), anisotropy)
}

/// 1d centerline mesh carrying the local diameter as a vertex attachment
pub fn centerline_grid(points: &[SwcPoint], anisotropy: f64) -> Result<Grid3D> {
    build_grid(points, &RingTopology::centerline(), anisotropy)
}

fn load_points(
    filename: &str,
    scale: f64,
    smoothing: Option<SmoothingParams>,
) -> Result<Vec<SwcPoint>> {
    let mut points = load_swc(filename, scale)?;
    if let Some(sp) = smoothing {
        smooth_positions(&mut points, sp.n_iterations, sp.h, sp.gamma)?;
        collapse_short_edges(&mut points);
    }
    Ok(points)
}

pub fn surface_grid_from_swc(
    filename: &str,
    scale: f64,
    anisotropy: f64,
    smoothing: Option<SmoothingParams>,
) -> Result<Grid3D> {
    surface_grid(&load_points(filename, scale, smoothing)?, anisotropy)
}

pub fn volume_grid_from_swc(
    filename: &str,
    scale: f64,
    anisotropy: f64,
    er_scale: f64,
    smoothing: Option<SmoothingParams>,
) -> Result<Grid3D> {
    volume_grid(&load_points(filename, scale, smoothing)?, anisotropy, er_scale)
}

pub fn centerline_grid_from_swc(
    filename: &str,
    scale: f64,
    anisotropy: f64,
    smoothing: Option<SmoothingParams>,
) -> Result<Grid3D> {
    centerline_grid(&load_points(filename, scale, smoothing)?, anisotropy)
}
