use anyhow::Result;
use nalgebra::base::*;
use std::f64::consts::PI;

use crate::geometry::geometry_operations::orthogonal_frame;
use crate::geometry::geometry_operations::ring_plane_angle;
use crate::grid3d::extrude;
use crate::grid3d::ExtrusionOutput;
use crate::grid3d::Face;
use crate::grid3d::Grid3D;
use crate::grid3d::SurfaceParams;
use crate::neurite3d::integrate::length_over_radius;
use crate::neurite3d::integrate::segment_axial_positions;
use crate::neurite3d::NeuriteTree;

use super::branch_geometry::branch_window;
use super::ring_topology::RingKind;
use super::ring_topology::RingTopology;
use super::ring_topology::{SUBSET_CYT, SUBSET_ER, SUBSET_ERM, SUBSET_PM};

/// Ring elements handed from a parent neurite into one of its children.
///
/// For the centerline variant only the first vertex is meaningful.
#[derive(Debug, Clone, Default)]
pub struct ConnectingRing {
    pub vertices: Vec<usize>,
    pub edges: Vec<usize>,
    pub faces: Vec<usize>,
}

/// Meshes one neurite and, recursively, all neurites branching off it.
///
/// The ring layout is instantiated at the neurite start (or taken over from
/// `connecting` when growing out of a parent) and extruded segment by
/// segment along the spline; segment lengths are equalized in units of the
/// local radius so that `anisotropy` bounds the aspect ratio of the surface
/// elements. `initial_offset` shifts the first segment end so it is not
/// shorter than the following ones.
pub fn create_neurite(
    tree: &NeuriteTree,
    nid: usize,
    topology: &RingTopology,
    anisotropy: f64,
    grid: &mut Grid3D,
    connecting: Option<ConnectingRing>,
    initial_offset: f64,
) -> Result<()> {
    match topology.kind {
        RingKind::Centerline => chain_neurite(
            tree,
            nid,
            anisotropy,
            grid,
            connecting.and_then(|c| c.vertices.first().copied()),
        ),
        _ => tube_neurite(tree, nid, topology, anisotropy, grid, connecting, initial_offset),
    }
}

// re-places one ring at a cross section of the spline
fn place_ring(
    grid: &mut Grid3D,
    topology: &RingTopology,
    vrts: &[usize],
    nid: usize,
    center: &Vector3<f64>,
    radius: f64,
    angle_offset: f64,
    ax_pos: f64,
    e1: &Vector3<f64>,
    e2: &Vector3<f64>,
) -> Result<()> {
    for (rv, &v) in topology.vertices.iter().zip(vrts.iter()) {
        let mut angle = rv.angle + angle_offset;
        if angle > 2.0 * PI {
            angle -= 2.0 * PI;
        }
        let radial_vec = radius * rv.radial * (angle.cos() * e1 + angle.sin() * e2);
        grid.set_vertex(v, &(center + radial_vec))?;
        grid.set_params(
            v,
            SurfaceParams {
                neurite_id: nid as u32,
                axial: ax_pos,
                angular: angle,
                radial: rv.radial,
            },
        );
    }
    Ok(())
}

// extruded elements inherit the subset of the ring element they grew from
fn propagate_subsets(
    grid: &mut Grid3D,
    vrts: &[usize],
    redges: &[usize],
    rfaces: &[usize],
    out: &ExtrusionOutput,
) {
    for (i, &v) in vrts.iter().enumerate() {
        if let Some(sub) = grid.vertex_subset(v) {
            grid.set_vertex_subset(out.vertices[i], sub);
            grid.set_edge_subset(out.vertical_edges[i], sub);
        }
    }
    for (i, &e) in redges.iter().enumerate() {
        if let Some(sub) = grid.edge_subset(e) {
            grid.set_edge_subset(out.edges[i], sub);
            grid.set_face_subset(out.side_faces[i], sub);
        }
    }
    for (i, &f) in rfaces.iter().enumerate() {
        if let Some(sub) = grid.face_subset(f) {
            grid.set_face_subset(out.faces[i], sub);
            if let Some(&vl) = out.volumes.get(i) {
                grid.set_volume_subset(vl, sub);
            }
        }
    }
}

fn tube_neurite(
    tree: &NeuriteTree,
    nid: usize,
    topology: &RingTopology,
    anisotropy: f64,
    grid: &mut Grid3D,
    connecting: Option<ConnectingRing>,
    initial_offset: f64,
) -> Result<()> {
    let neurite = &tree.neurites[nid];
    if neurite.sections.is_empty() {
        return Err(anyhow::anyhow!(
            "create_neurite(): Neurite {} has no spline sections",
            nid
        ));
    }
    let pos = &neurite.knot_pos;
    let r = &neurite.knot_rad;
    let neurite_length = neurite.length();
    let n_sec = neurite.sections.len();
    let n_regions = neurite.branching_regions.len();
    let dual = topology.kind == RingKind::DualLayer;

    log::debug!(
        "create_neurite(): neurite {} with {} sections and {} branching regions",
        nid,
        n_sec,
        n_regions
    );

    let sec = &neurite.sections[0];
    let (mut vel_dir, mut proj_ref_dir, mut third_dir) =
        orthogonal_frame(&sec.velocity_at(0.0), &neurite.ref_dir);

    let mut angle_offset = 0.0;
    let mut t_end = 0.0;
    let mut brit = 0usize;

    let mut vrts: Vec<usize>;
    let mut redges: Vec<usize>;
    let mut rfaces: Vec<usize>;
    let mut last_pos: Vector3<f64>;

    if let Some(conn) = connecting {
        vrts = conn.vertices;
        redges = conn.edges;
        rfaces = conn.faces;

        // recover the start angle from the connecting ring and extrude the
        // first segment from the ring center on the parent wall
        let center = grid.barycenter(&vrts[0..4])?;
        let center_to_first = grid.get_vertex(vrts[0])? - center;
        angle_offset = ring_plane_angle(&center_to_first, &vel_dir, &proj_ref_dir, &third_dir);
        last_pos = center;

        // the first branching region is the one connecting to the parent
        brit = 1;

        // initial offset keeps the first segment from being shorter than the rest
        t_end = initial_offset / neurite_length;
        if dual {
            for i in 0..4 {
                let mut angle = 0.5 * PI * i as f64 + angle_offset;
                if angle >= 2.0 * PI {
                    angle -= 2.0 * PI;
                }
                grid.set_params(
                    vrts[i],
                    SurfaceParams {
                        neurite_id: nid as u32,
                        axial: t_end,
                        angular: angle,
                        radial: topology.vertices[i].radial,
                    },
                );
            }
        }
    } else {
        // seed the ring at the first morphology point
        vrts = Vec::with_capacity(topology.vertices.len());
        redges = Vec::with_capacity(topology.edges.len());
        rfaces = Vec::with_capacity(topology.faces.len());
        for rv in topology.vertices.iter() {
            let p = pos[0]
                + r[0] * rv.radial * (rv.angle.cos() * proj_ref_dir + rv.angle.sin() * third_dir);
            let v = grid.add_vertex(&p);
            grid.set_params(
                v,
                SurfaceParams {
                    neurite_id: nid as u32,
                    axial: 0.0,
                    angular: rv.angle,
                    radial: rv.radial,
                },
            );
            if let Some(sub) = rv.subset {
                grid.set_vertex_subset(v, sub);
            }
            vrts.push(v);
        }
        for re in topology.edges.iter() {
            let e = grid.add_edge(vrts[re.ends[0]], vrts[re.ends[1]]);
            if let Some(sub) = re.subset {
                grid.set_edge_subset(e, sub);
            }
            redges.push(e);
        }
        for rf in topology.faces.iter() {
            let f = grid.add_face(Face::Quad([
                vrts[rf.corners[0]],
                vrts[rf.corners[1]],
                vrts[rf.corners[2]],
                vrts[rf.corners[3]],
            ]));
            if let Some(sub) = rf.subset {
                grid.set_face_subset(f, sub);
            }
            rfaces.push(f);
        }
        last_pos = pos[0];
    }

    let mut cur_sec = 0usize;

    loop {
        let t_start = t_end;

        // the next stretch runs up to the next branching window, or the tip
        let window = if brit < n_regions {
            Some(branch_window(
                tree,
                nid,
                &neurite.branching_regions[brit],
                cur_sec,
                dual,
            )?)
        } else {
            None
        };
        t_end = match window.as_ref() {
            Some(w) => w.bp_start,
            None => 1.0,
        };

        let lor = length_over_radius(neurite, t_start, t_end, cur_sec)?;
        let mut n_seg = (lor / (anisotropy * 0.5 * PI)).floor() as usize;
        if n_seg == 0 {
            n_seg = 1;
        }
        let seg_length = lor / n_seg as f64;
        let mut seg_ax_pos =
            segment_axial_positions(neurite, t_start, t_end, cur_sec, n_seg, seg_length)?;
        if let Some(w) = window.as_ref() {
            // the far end of the branching window is one more segment boundary
            seg_ax_pos.push(w.bp_end);
            n_seg += 1;
        }

        // find the branching child and, for the dual layer, the angular
        // drift needed to arrive wall-aligned with it
        let mut child_nid = 0usize;
        let mut add_offset = 0.0;
        let mut conn_face_ind = 0usize;
        if window.is_some() {
            let bp = &tree.branching_points[neurite.branching_regions[brit].bp];
            if bp.neurite_ids.len() > 2 {
                return Err(anyhow::Error::msg(
                    "create_neurite(): Branching points with more than one branching child are not supported",
                ));
            }
            child_nid = if bp.neurite_ids[0] != nid {
                bp.neurite_ids[0]
            } else {
                bp.neurite_ids[1]
            };

            if dual {
                let child_dir = tree.neurites[child_nid].sections[0].velocity_at(0.0);
                let bp_ax_pos = seg_ax_pos[n_seg - 1];
                let tmp_sec = neurite.section_index_from(bp_ax_pos, cur_sec);
                let sec = &neurite.sections[tmp_sec];
                let (vel_n, e1, e2) =
                    orthogonal_frame(&sec.velocity_at(bp_ax_pos), &neurite.ref_dir);
                let branch_angle = ring_plane_angle(&child_dir, &vel_n, &e1, &e2);
                add_offset = branch_angle - angle_offset;
                conn_face_ind =
                    (((add_offset + 4.0 * PI) % (2.0 * PI)) / (0.5 * PI)).floor() as usize;
                add_offset = (add_offset - (conn_face_ind as f64 * 0.5 * PI + 0.25 * PI)
                    + 4.0 * PI)
                    % (2.0 * PI);
                if add_offset > PI {
                    add_offset -= 2.0 * PI;
                }
                add_offset /= (n_seg - 1) as f64;
            }
        }

        let mut last_side_faces: Vec<usize> = Vec::new();
        for s in 0..n_seg {
            let seg_ax = seg_ax_pos[s];
            cur_sec = neurite.section_index_from(seg_ax, cur_sec);
            let sec = &neurite.sections[cur_sec];
            let cur_pos = sec.position_at(seg_ax);
            let radius = sec.radius_at(seg_ax);
            let (v, e1, e2) = orthogonal_frame(&sec.velocity_at(seg_ax), &neurite.ref_dir);
            vel_dir = v;
            proj_ref_dir = e1;
            third_dir = e2;

            let junction_window = if dual && s == n_seg - 1 {
                window.as_ref()
            } else {
                None
            };
            if let Some(w) = junction_window {
                let junction = JunctionSegment {
                    neurite_length,
                    ax_prev: seg_ax_pos[s - 1],
                    ax_cur: seg_ax,
                    last_pos,
                    cur_pos,
                    radius,
                    vel_dir,
                    proj_ref_dir,
                    third_dir,
                    angle_offset,
                    surf_offset: w.surf_offset,
                    child_offset: w.child_offsets[1],
                    child_nid,
                    conn_face_ind,
                    region_ind: brit,
                };
                dual_branch_junction(
                    tree,
                    nid,
                    topology,
                    anisotropy,
                    grid,
                    &mut vrts,
                    &mut redges,
                    &mut rfaces,
                    &junction,
                )?;
            } else {
                if dual {
                    angle_offset = (angle_offset + add_offset + 2.0 * PI) % (2.0 * PI);
                }
                let dir = cur_pos - last_pos;
                let out = extrude(grid, &vrts, &redges, &rfaces, &dir, topology.create_volumes)?;
                propagate_subsets(grid, &vrts, &redges, &rfaces, &out);
                vrts = out.vertices.clone();
                place_ring(
                    grid,
                    topology,
                    &vrts,
                    nid,
                    &cur_pos,
                    radius,
                    angle_offset,
                    seg_ax,
                    &proj_ref_dir,
                    &third_dir,
                )?;
                match topology.kind {
                    RingKind::Surface => {
                        // reorient side faces so their normals point outwards
                        for (j, rv) in topology.vertices.iter().enumerate() {
                            let mut angle = rv.angle + angle_offset;
                            if angle > 2.0 * PI {
                                angle -= 2.0 * PI;
                            }
                            let radial_vec =
                                radius * (angle.cos() * proj_ref_dir + angle.sin() * third_dir);
                            let faces = grid.edge_faces(out.edges[j])?;
                            if let Some(&f) = faces.first() {
                                if grid.face_normal(f)?.dot(&radial_vec) < 0.0 {
                                    grid.flip_face(f)?;
                                }
                            }
                        }
                    }
                    RingKind::DualLayer => {
                        for &vl in out.volumes.iter() {
                            grid.fix_volume_orientation(vl)?;
                        }
                    }
                    RingKind::Centerline => unreachable!(),
                }
                redges = out.edges;
                rfaces = out.faces;
                if window.is_some() && s == n_seg - 1 {
                    last_side_faces = out.side_faces;
                }
            }

            last_pos = cur_pos;
        }

        if let Some(w) = window.as_ref() {
            if topology.kind == RingKind::Surface {
                // pick the side face of the last segment most aligned with
                // the child's initial direction and grow the child out of it
                let child_dir = tree.neurites[child_nid].sections[0].velocity_at(0.0);
                let mut best: Option<usize> = None;
                let mut best_prod = 0.0;
                for &f in last_side_faces.iter() {
                    let prod = grid.face_normal(f)?.dot(&child_dir);
                    if prod > best_prod {
                        best = Some(f);
                        best_prod = prod;
                    }
                }
                let best = best.ok_or_else(|| {
                    anyhow::Error::msg(
                        "create_neurite(): None of the branching point faces pointed in a suitable direction",
                    )
                })?;
                let Face::Quad(bverts) = grid.get_face(best)? else {
                    return Err(anyhow::Error::msg(
                        "create_neurite(): Connecting face is not a quadrilateral",
                    ));
                };

                for &bv in bverts.iter() {
                    let params = grid.params_mut(bv)?;
                    params.neurite_id += ((brit as u32) << 20) + (1 << 28);
                }

                let mut bedges = Vec::with_capacity(4);
                for j in 0..4 {
                    let e = grid.find_edge(bverts[j], bverts[(j + 1) % 4]).ok_or_else(|| {
                        anyhow::Error::msg(
                            "create_neurite(): Connecting edges for child neurite could not be determined",
                        )
                    })?;
                    bedges.push(e);
                }
                grid.remove_face(best)?;

                tube_neurite(
                    tree,
                    child_nid,
                    topology,
                    anisotropy,
                    grid,
                    Some(ConnectingRing {
                        vertices: bverts.to_vec(),
                        edges: bedges,
                        faces: Vec::new(),
                    }),
                    w.child_offsets[1],
                )?;
            }
            t_end = w.bp_end;
        }

        cur_sec = neurite.section_index_from(t_end, cur_sec);

        if window.is_none() {
            break;
        }
        brit += 1;
    }

    // close the tip: one extrusion of length radius, collapsed to its
    // center; no cap volumes, the last cross-section faces seal the inside
    if topology.capped_tip {
        let last_sec = &neurite.sections[n_sec - 1];
        let mut tip_vel = last_sec.velocity_at(last_sec.end_param);
        let tip_radius = last_sec.radius_at(last_sec.end_param);
        tip_vel *= tip_radius / tip_vel.norm();
        let out = extrude(grid, &vrts, &redges, &rfaces, &tip_vel, false)?;
        propagate_subsets(grid, &vrts, &redges, &rfaces, &out);
        let center = grid.barycenter(&out.vertices)?;
        let tip = grid.merge_vertices(&out.vertices)?;
        grid.set_vertex(tip, &center)?;
        grid.set_params(
            tip,
            SurfaceParams {
                neurite_id: nid as u32,
                axial: 2.0,
                angular: 0.0,
                radial: 1.0,
            },
        );
        if topology.kind == RingKind::DualLayer {
            grid.set_vertex_subset(tip, SUBSET_PM);
        }
    }

    Ok(())
}

/// Geometric state of the junction segment of a dual-layer tube
struct JunctionSegment {
    neurite_length: f64,
    ax_prev: f64,
    ax_cur: f64,
    last_pos: Vector3<f64>,
    cur_pos: Vector3<f64>,
    radius: f64,
    vel_dir: Vector3<f64>,
    proj_ref_dir: Vector3<f64>,
    third_dir: Vector3<f64>,
    angle_offset: f64,
    surf_offset: f64,
    child_offset: f64,
    child_nid: usize,
    conn_face_ind: usize,
    region_ind: usize,
}

fn shift_wall(
    grid: &mut Grid3D,
    v: usize,
    amount: f64,
    vel_dir: &Vector3<f64>,
    neurite_length: f64,
) -> Result<()> {
    let p = grid.get_vertex(v)? + amount * vel_dir;
    grid.set_vertex(v, &p)?;
    grid.params_mut(v)?.axial += amount / neurite_length;
    Ok(())
}

// shears one ring so the wall facing the child leans into the junction:
// full offset on the cardinal vertices of the connecting quadrant and its
// opposite, 1.366/0.366 times the offset on the flanking outer vertices,
// ER-scaled offset on the inner ring
fn junction_wall_shifts(
    grid: &mut Grid3D,
    vrts: &[usize],
    cf: usize,
    vel_dir: &Vector3<f64>,
    surf_offset: f64,
    er_scale: f64,
    neurite_length: f64,
) -> Result<()> {
    for k in 0..4 {
        let sign = if k < 2 { 1.0 } else { -1.0 };
        shift_wall(
            grid,
            vrts[(cf + k) % 4],
            sign * er_scale * surf_offset,
            vel_dir,
            neurite_length,
        )?;
        shift_wall(
            grid,
            vrts[4 + 3 * ((cf + k) % 4)],
            sign * surf_offset,
            vel_dir,
            neurite_length,
        )?;
    }
    for &(quadrant, factor) in [(0usize, 1.366), (2, -1.366)].iter() {
        shift_wall(
            grid,
            vrts[5 + 3 * ((cf + quadrant) % 4)],
            factor * surf_offset,
            vel_dir,
            neurite_length,
        )?;
        shift_wall(
            grid,
            vrts[6 + 3 * ((cf + quadrant) % 4)],
            factor * surf_offset,
            vel_dir,
            neurite_length,
        )?;
    }
    for &(quadrant, factor) in [(1usize, 0.366), (3, -0.366)].iter() {
        shift_wall(
            grid,
            vrts[5 + 3 * ((cf + quadrant) % 4)],
            factor * surf_offset,
            vel_dir,
            neurite_length,
        )?;
        shift_wall(
            grid,
            vrts[6 + 3 * ((cf + quadrant) % 4)],
            -factor * surf_offset,
            vel_dir,
            neurite_length,
        )?;
    }
    Ok(())
}

fn tag_branch_vertex(grid: &mut Grid3D, v: usize, region_ind: usize) -> Result<()> {
    let params = grid.params_mut(v)?;
    params.neurite_id += ((region_ind as u32) << 20) + (1 << 28);
    Ok(())
}

// Builds the junction segment of a dual-layer tube in three slices and
// grows the child neurite out of the freed wall. The child's 16-vertex
// connecting ring is assembled from one wall vertex of each of the four
// generated layers, so its cross section reproduces the seed layout.
#[allow(clippy::too_many_arguments)]
fn dual_branch_junction(
    tree: &NeuriteTree,
    nid: usize,
    topology: &RingTopology,
    anisotropy: f64,
    grid: &mut Grid3D,
    vrts: &mut Vec<usize>,
    redges: &mut Vec<usize>,
    rfaces: &mut Vec<usize>,
    seg: &JunctionSegment,
) -> Result<()> {
    let er = topology.vertices[0].radial;
    let cf = seg.conn_face_ind;
    let mut bp_vols: Vec<usize> = Vec::with_capacity(27);

    // shear the approach ring and mark the wall vertices facing the child
    junction_wall_shifts(
        grid,
        vrts,
        cf,
        &seg.vel_dir,
        seg.surf_offset,
        er,
        seg.neurite_length,
    )?;
    for &slot in [
        4 + 3 * (cf % 4),
        4 + 3 * ((cf + 1) % 4),
        5 + 3 * (cf % 4),
        6 + 3 * (cf % 4),
    ]
    .iter()
    {
        tag_branch_vertex(grid, vrts[slot], seg.region_ind)?;
    }

    let mut branch_vrts = [0usize; 16];
    branch_vrts[4] = vrts[4 + 3 * ((cf + 1) % 4)];
    branch_vrts[13] = vrts[4 + 3 * (cf % 4)];
    branch_vrts[14] = vrts[5 + 3 * (cf % 4)];
    branch_vrts[15] = vrts[6 + 3 * (cf % 4)];

    let layer_ax = [
        0.5 * (1.0 + er) * seg.ax_prev + 0.5 * (1.0 - er) * seg.ax_cur,
        0.5 * (1.0 - er) * seg.ax_prev + 0.5 * (1.0 + er) * seg.ax_cur,
        seg.ax_cur,
    ];
    let layer_pos = [
        0.5 * (1.0 + er) * seg.last_pos + 0.5 * (1.0 - er) * seg.cur_pos,
        0.5 * (1.0 - er) * seg.last_pos + 0.5 * (1.0 + er) * seg.cur_pos,
        seg.cur_pos,
    ];

    let mut from_pos = seg.last_pos;
    for step in 0..3 {
        let dir = layer_pos[step] - from_pos;
        let out = extrude(grid, vrts, redges, rfaces, &dir, true)?;
        propagate_subsets(grid, vrts, redges, rfaces, &out);
        bp_vols.extend_from_slice(&out.volumes);
        *vrts = out.vertices;
        *redges = out.edges;
        *rfaces = out.faces;

        place_ring(
            grid,
            topology,
            vrts,
            nid,
            &layer_pos[step],
            seg.radius,
            seg.angle_offset,
            layer_ax[step],
            &seg.proj_ref_dir,
            &seg.third_dir,
        )?;
        junction_wall_shifts(
            grid,
            vrts,
            cf,
            &seg.vel_dir,
            seg.surf_offset,
            er,
            seg.neurite_length,
        )?;
        for &vl in bp_vols[bp_vols.len() - 9..].iter() {
            grid.fix_volume_orientation(vl)?;
        }

        if step < 2 {
            for &slot in [
                cf % 4,
                (cf + 1) % 4,
                4 + 3 * (cf % 4),
                4 + 3 * ((cf + 1) % 4),
            ]
            .iter()
            {
                tag_branch_vertex(grid, vrts[slot], seg.region_ind)?;
            }
            // the wall vertices between the cardinals become the child's ER ring
            grid.params_mut(vrts[5 + 3 * (cf % 4)])?.neurite_id = seg.child_nid as u32;
            grid.params_mut(vrts[6 + 3 * (cf % 4)])?.neurite_id = seg.child_nid as u32;
        } else {
            for &slot in [
                4 + 3 * (cf % 4),
                4 + 3 * ((cf + 1) % 4),
                5 + 3 * (cf % 4),
                6 + 3 * (cf % 4),
            ]
            .iter()
            {
                tag_branch_vertex(grid, vrts[slot], seg.region_ind)?;
            }
        }

        match step {
            0 => {
                branch_vrts[0] = vrts[6 + 3 * (cf % 4)];
                branch_vrts[3] = vrts[5 + 3 * (cf % 4)];
                branch_vrts[5] = vrts[4 + 3 * ((cf + 1) % 4)];
                branch_vrts[12] = vrts[4 + 3 * (cf % 4)];
            }
            1 => {
                branch_vrts[1] = vrts[6 + 3 * (cf % 4)];
                branch_vrts[2] = vrts[5 + 3 * (cf % 4)];
                branch_vrts[6] = vrts[4 + 3 * ((cf + 1) % 4)];
                branch_vrts[11] = vrts[4 + 3 * (cf % 4)];
            }
            _ => {
                branch_vrts[7] = vrts[4 + 3 * ((cf + 1) % 4)];
                branch_vrts[8] = vrts[6 + 3 * (cf % 4)];
                branch_vrts[9] = vrts[5 + 3 * (cf % 4)];
                branch_vrts[10] = vrts[4 + 3 * (cf % 4)];
            }
        }

        from_pos = layer_pos[step];
    }

    // the child's connecting ring reproduces the seed layout, so its edges
    // and faces can be located by the seed slot patterns
    let mut branch_edges = Vec::with_capacity(24);
    for (j, re) in topology.edges.iter().enumerate() {
        let e = grid
            .find_edge(branch_vrts[re.ends[0]], branch_vrts[re.ends[1]])
            .ok_or_else(|| anyhow::anyhow!("create_neurite(): Connecting edge {} not found", j))?;
        branch_edges.push(e);
    }
    let mut branch_faces = Vec::with_capacity(9);
    for (j, rf) in topology.faces.iter().enumerate() {
        let corners = [
            branch_vrts[rf.corners[0]],
            branch_vrts[rf.corners[1]],
            branch_vrts[rf.corners[2]],
            branch_vrts[rf.corners[3]],
        ];
        let f = grid
            .find_face(&corners)
            .ok_or_else(|| anyhow::anyhow!("create_neurite(): Connecting face {} not found", j))?;
        branch_faces.push(f);
    }

    // the cytosol volume the child grows out of becomes ER; its sides
    // towards remaining cytosol become ER membrane
    let conn_vol = bp_vols[cf + 14];
    grid.set_volume_subset(conn_vol, SUBSET_ER);
    let hex = grid.get_volume(conn_vol)?;
    for side in Grid3D::volume_sides(&hex).iter() {
        let Some(side_face) = grid.find_face(side) else {
            continue;
        };
        let er_neighbor = match grid.find_volume_with_side(side, conn_vol) {
            Some(vl) => grid.volume_subset(vl) == Some(SUBSET_ER),
            None => true,
        };
        if er_neighbor {
            grid.set_face_subset(side_face, SUBSET_ER);
        } else {
            grid.set_face_subset(side_face, SUBSET_ERM);
            let corners = grid.get_face(side_face)?.vertices().to_vec();
            for j in 0..corners.len() {
                if let Some(e) = grid.find_edge(corners[j], corners[(j + 1) % corners.len()]) {
                    grid.set_edge_subset(e, SUBSET_ERM);
                }
                grid.set_vertex_subset(corners[j], SUBSET_ERM);
            }
        }
    }
    for &f in branch_faces.iter().skip(1) {
        grid.set_face_subset(f, SUBSET_CYT);
    }
    for &e in branch_edges[4..12].iter() {
        grid.set_edge_subset(e, SUBSET_CYT);
    }

    tube_neurite(
        tree,
        seg.child_nid,
        topology,
        anisotropy,
        grid,
        Some(ConnectingRing {
            vertices: branch_vrts.to_vec(),
            edges: branch_edges,
            faces: branch_faces,
        }),
        seg.child_offset,
    )
}

// centerline variant: a vertex chain with a diameter attachment
fn chain_neurite(
    tree: &NeuriteTree,
    nid: usize,
    anisotropy: f64,
    grid: &mut Grid3D,
    connecting_vrt: Option<usize>,
) -> Result<()> {
    let neurite = &tree.neurites[nid];
    if neurite.sections.is_empty() {
        return Err(anyhow::anyhow!(
            "create_neurite(): Neurite {} has no spline sections",
            nid
        ));
    }
    let n_regions = neurite.branching_regions.len();
    let mut brit = 0usize;

    let mut conn_vrt = match connecting_vrt {
        Some(v) => {
            // the first branching region is the one connecting to the parent
            brit = 1;
            v
        }
        None => {
            let v = grid.add_vertex(&neurite.knot_pos[0]);
            grid.set_diameter(v, neurite.knot_rad[0]);
            grid.set_params(
                v,
                SurfaceParams {
                    neurite_id: nid as u32,
                    axial: 0.0,
                    angular: 0.0,
                    radial: 0.0,
                },
            );
            v
        }
    };

    let mut t_end = 0.0;
    let mut cur_sec = 0usize;

    loop {
        let t_start = t_end;
        t_end = if brit < n_regions {
            neurite.branching_regions[brit].t
        } else {
            1.0
        };

        let lor = length_over_radius(neurite, t_start, t_end, cur_sec)?;
        let mut n_seg = (lor / (anisotropy * 0.5 * PI)).floor() as usize;
        if n_seg < 1 || lor < 0.0 {
            n_seg = 1;
        }
        let seg_length = lor / n_seg as f64;
        let seg_ax_pos =
            segment_axial_positions(neurite, t_start, t_end, cur_sec, n_seg, seg_length)?;

        for &seg_ax in seg_ax_pos.iter() {
            cur_sec = neurite.section_index_from(seg_ax, cur_sec);
            let sec = &neurite.sections[cur_sec];
            let cur_pos = sec.position_at(seg_ax);
            let cur_rad = sec.radius_at(seg_ax);

            let nv = grid.add_vertex(&cur_pos);
            grid.add_edge(conn_vrt, nv);
            grid.set_diameter(nv, 2.0 * cur_rad);
            grid.set_params(
                nv,
                SurfaceParams {
                    neurite_id: nid as u32,
                    axial: seg_ax,
                    angular: 0.0,
                    radial: 0.0,
                },
            );
            conn_vrt = nv;
        }

        if brit < n_regions {
            let bp = &tree.branching_points[neurite.branching_regions[brit].bp];
            if bp.neurite_ids.len() > 2 {
                return Err(anyhow::Error::msg(
                    "create_neurite(): Branching points with more than one branching child are not supported",
                ));
            }
            let child_nid = if bp.neurite_ids[0] != nid {
                bp.neurite_ids[0]
            } else {
                bp.neurite_ids[1]
            };

            let params = grid.params_mut(conn_vrt)?;
            params.neurite_id += ((brit as u32) << 20) + (1 << 28);

            chain_neurite(tree, child_nid, anisotropy, grid, Some(conn_vrt))?;
        }

        cur_sec = neurite.section_index_from(t_end, cur_sec);

        if brit >= n_regions {
            break;
        }
        brit += 1;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neurite3d::decompose::BranchInfo;
    use crate::neurite3d::decompose::RawNeurites;
    use crate::neurite3d::spline::create_spline_data;
    use approx::assert_relative_eq;

    fn straight_tree(radius: f64) -> NeuriteTree {
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
        create_spline_data(&raw).unwrap()
    }

    fn branched_tree() -> NeuriteTree {
        let parent: Vec<Vector3<f64>> =
            (0..5).map(|i| Vector3::new(i as f64, 0.0, 0.0)).collect();
        let child = vec![
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(2.0, 1.0, 0.0),
            Vector3::new(2.0, 2.0, 0.0),
        ];
        let raw = RawNeurites {
            pos: vec![parent, child],
            rad: vec![vec![0.4; 5], vec![0.3; 3]],
            branch_info: vec![
                vec![BranchInfo {
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

    fn tip_vertices(grid: &Grid3D) -> Vec<usize> {
        grid.vertex_indices()
            .into_iter()
            .filter(|&v| grid.get_params(v).map(|p| p.axial == 2.0).unwrap_or(false))
            .collect()
    }

    #[test]
    fn straight_surface_tube_has_rings_and_a_capped_tip() {
        let tree = straight_tree(0.5);
        let topo = RingTopology::surface();
        let mut grid = Grid3D::new();
        // length over radius 4 and anisotropy 2 give exactly one segment
        create_neurite(&tree, 0, &topo, 2.0, &mut grid, None, 0.0).unwrap();

        assert_eq!(grid.get_nb_vertices(), 9);
        assert_eq!(grid.get_nb_edges(), 16);
        assert_eq!(grid.get_nb_faces(), 8);
        let tris = grid
            .face_indices()
            .iter()
            .filter(|&&f| matches!(grid.get_face(f).unwrap(), Face::Tri(_)))
            .count();
        assert_eq!(tris, 4);

        let tips = tip_vertices(&grid);
        assert_eq!(tips.len(), 1);
        let tip_pos = grid.get_vertex(tips[0]).unwrap();
        assert_relative_eq!(tip_pos[0], 2.5, epsilon = 1e-9);
        assert_relative_eq!(tip_pos[1], 0.0, epsilon = 1e-9);
        assert_relative_eq!(tip_pos[2], 0.0, epsilon = 1e-9);

        // all ring vertices sit on the tube surface
        for v in grid.vertex_indices() {
            if v == tips[0] {
                continue;
            }
            let p = grid.get_vertex(v).unwrap();
            let dist = (p[1] * p[1] + p[2] * p[2]).sqrt();
            assert_relative_eq!(dist, 0.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn side_faces_point_outwards_after_orientation_fixing() {
        let tree = straight_tree(0.5);
        let topo = RingTopology::surface();
        let mut grid = Grid3D::new();
        create_neurite(&tree, 0, &topo, 2.0, &mut grid, None, 0.0).unwrap();

        for f in grid.face_indices() {
            if let Face::Quad(corners) = grid.get_face(f).unwrap() {
                let c = grid.barycenter(&corners).unwrap();
                let radial = Vector3::new(0.0, c[1], c[2]);
                assert!(grid.face_normal(f).unwrap().dot(&radial) >= 0.0);
            }
        }
    }

    #[test]
    fn tip_sits_one_radius_past_the_last_knot_along_the_tangent() {
        let raw = RawNeurites {
            pos: vec![vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(3.0, 1.0, 0.0),
                Vector3::new(5.0, 1.0, 1.0),
                Vector3::new(7.0, 0.0, 0.0),
            ]],
            rad: vec![vec![0.05, 0.1, 0.2, 0.15, 0.05]],
            branch_info: vec![Vec::new()],
            root_inds: vec![0],
            soma_points: Vec::new(),
        };
        let tree = create_spline_data(&raw).unwrap();
        let topo = RingTopology::surface();
        let mut grid = Grid3D::new();
        create_neurite(&tree, 0, &topo, 2.0, &mut grid, None, 0.0).unwrap();

        let tips = tip_vertices(&grid);
        assert_eq!(tips.len(), 1);
        // the spline interpolates the last knot, so the sealed tip lies at
        // exactly one terminal radius from it
        let tip_pos = grid.get_vertex(tips[0]).unwrap();
        let dist = (tip_pos - Vector3::new(7.0, 0.0, 0.0)).norm();
        assert_relative_eq!(dist, 0.05, epsilon = 1e-9);
    }

    #[test]
    fn branched_surface_tube_tags_the_junction_and_grows_two_tips() {
        let tree = branched_tree();
        let topo = RingTopology::surface();
        let mut grid = Grid3D::new();
        create_neurite(&tree, 0, &topo, 2.0, &mut grid, None, 0.0).unwrap();

        assert_eq!(tip_vertices(&grid).len(), 2);

        let mut tagged = 0;
        let mut child_owned = 0;
        for v in grid.vertex_indices() {
            let id = grid.get_params(v).unwrap().neurite_id;
            if id >= (1 << 28) {
                tagged += 1;
            }
            if (id & 0xFFFFF) == 1 {
                child_owned += 1;
            }
        }
        // the four connecting vertices carry the child marker
        assert_eq!(tagged, 4);
        assert!(child_owned > 0);
    }

    #[test]
    fn straight_dual_layer_tube_builds_volumes_with_subsets() {
        let tree = straight_tree(0.5);
        let topo = RingTopology::dual_layer(0.5);
        let mut grid = Grid3D::new();
        create_neurite(&tree, 0, &topo, 2.0, &mut grid, None, 0.0).unwrap();

        // one segment: two 16-vertex rings with 9 hexahedra between them,
        // plus the tip cone merged to a single vertex
        assert_eq!(grid.get_nb_vertices(), 33);
        assert_eq!(grid.get_nb_volumes(), 9);
        assert_eq!(grid.get_nb_edges(), 80);
        assert_eq!(grid.get_nb_faces(), 66);
        assert_eq!(tip_vertices(&grid).len(), 1);

        let er_verts = grid
            .vertex_indices()
            .iter()
            .filter(|&&v| grid.vertex_subset(v) == Some(SUBSET_ERM))
            .count();
        let pm_verts = grid
            .vertex_indices()
            .iter()
            .filter(|&&v| grid.vertex_subset(v) == Some(SUBSET_PM))
            .count();
        assert_eq!(er_verts, 8);
        assert_eq!(pm_verts, 25);

        let er_vols = grid
            .volume_indices()
            .iter()
            .filter(|&&vl| grid.volume_subset(vl) == Some(SUBSET_ER))
            .count();
        assert_eq!(er_vols, 1);
    }

    #[test]
    fn branched_dual_layer_tube_connects_the_child() {
        let tree = branched_tree();
        let topo = RingTopology::dual_layer(0.5);
        let mut grid = Grid3D::new();
        create_neurite(&tree, 0, &topo, 2.0, &mut grid, None, 0.0).unwrap();

        // junction volume reassigned to the ER subset besides the inner column
        let er_vols = grid
            .volume_indices()
            .iter()
            .filter(|&&vl| grid.volume_subset(vl) == Some(SUBSET_ER))
            .count();
        assert!(er_vols >= 2);

        let child_owned = grid
            .vertex_indices()
            .iter()
            .filter(|&&v| (grid.get_params(v).unwrap().neurite_id & 0xFFFFF) == 1)
            .count();
        assert!(child_owned >= 16);
    }

    #[test]
    fn centerline_chain_carries_diameters() {
        let tree = straight_tree(0.5);
        let topo = RingTopology::centerline();
        let mut grid = Grid3D::new();
        create_neurite(&tree, 0, &topo, 2.0, &mut grid, None, 0.0).unwrap();

        assert_eq!(grid.get_nb_vertices(), 2);
        assert_eq!(grid.get_nb_edges(), 1);
        assert_eq!(grid.get_nb_faces(), 0);
        let inds = grid.vertex_indices();
        // seed stores the radius, later vertices the diameter
        assert_relative_eq!(grid.get_diameter(inds[0]).unwrap(), 0.5, epsilon = 1e-9);
        assert_relative_eq!(grid.get_diameter(inds[1]).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn branched_centerline_chain_reaches_both_tips() {
        let tree = branched_tree();
        let topo = RingTopology::centerline();
        let mut grid = Grid3D::new();
        create_neurite(&tree, 0, &topo, 2.0, &mut grid, None, 0.0).unwrap();

        // a tree stays a tree: one more vertex than edges
        assert_eq!(grid.get_nb_vertices(), grid.get_nb_edges() + 1);
        // both terminal morphology points are met exactly
        let positions: Vec<Vector3<f64>> = grid
            .vertex_indices()
            .iter()
            .map(|&v| grid.get_vertex(v).unwrap())
            .collect();
        assert!(positions
            .iter()
            .any(|p| (p - Vector3::new(4.0, 0.0, 0.0)).norm() < 1e-9));
        assert!(positions
            .iter()
            .any(|p| (p - Vector3::new(2.0, 2.0, 0.0)).norm() < 1e-9));
    }
}
