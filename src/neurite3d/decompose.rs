use anyhow::Result;
use nalgebra::base::*;
use std::collections::HashMap;
use std::collections::VecDeque;

use crate::swc3d::SwcPoint;
use crate::swc3d::SwcType;

/// One branching record of a neurite: the local point index where the
/// branch sits and the ids of the child neurites starting there
#[derive(Debug, Clone)]
pub struct BranchInfo {
    pub local_ind: usize,
    pub child_ids: Vec<usize>,
}

/// Result of decomposing a point tree: per-neurite polylines, branching
/// linkage, root neurite indices and the soma points encountered
#[derive(Debug, Clone)]
pub struct RawNeurites {
    pub pos: Vec<Vec<Vector3<f64>>>,
    pub rad: Vec<Vec<f64>>,
    pub branch_info: Vec<Vec<BranchInfo>>,
    pub root_inds: Vec<usize>,
    pub soma_points: Vec<SwcPoint>,
}

/// Partitions a soma-rooted point tree into branch-free neurites.
///
/// For every unprocessed soma, a breadth-first walk over the soma points
/// collects their immediate non-soma neighbors as neurite root points. Each
/// root is then followed depth first, accumulating positions and radii into
/// the current neurite. At a branching point (degree above 2) the neighbor
/// whose direction makes the smallest angle with the incoming direction
/// continues the current neurite; all other neighbors are queued as new
/// neurites and a branch record is stored. Equal angles resolve in
/// connection iteration order. When a leaf ends the current neurite, the
/// next queued point either continues from a recorded branch (the branch
/// point is prepended to the child polyline and the child id registered at
/// the parent record) or starts a new root neurite.
///
/// Fails if unprocessed points remain but no unprocessed soma exists, or if
/// a second soma is reachable without passing the first.
pub fn convert_pointlist_to_neuritelist(points: &[SwcPoint]) -> Result<RawNeurites> {
    let n_pts = points.len();
    let mut out = RawNeurites {
        pos: Vec::new(),
        rad: Vec::new(),
        branch_info: Vec::new(),
        root_inds: Vec::new(),
        soma_points: Vec::new(),
    };

    let mut pt_processed = vec![false; n_pts];
    let mut n_processed = 0;
    let mut cur_neurite_ind = 0;

    while n_processed != n_pts {
        // find the first unprocessed soma point
        let soma_ind = (0..n_pts)
            .find(|&i| points[i].swc_type == SwcType::Soma && !pt_processed[i])
            .ok_or_else(|| {
                anyhow::Error::msg(
                    "convert_pointlist_to_neuritelist(): no soma contained in non-empty \
                     list of unprocessed points, i.e. at least one point is not \
                     connected to any soma",
                )
            })?;
        out.soma_points.push(points[soma_ind].clone());

        // collect neurite root points: (parent point, root point) pairs
        let mut root_pts: Vec<(usize, usize)> = Vec::new();
        let mut soma_queue: VecDeque<(usize, usize)> = VecDeque::new();
        soma_queue.push_back((usize::MAX, soma_ind));
        while let Some((pind, ind)) = soma_queue.pop_front() {
            let pt = &points[ind];
            if pt.swc_type == SwcType::Soma {
                pt_processed[ind] = true;
                n_processed += 1;
                for &c in pt.conns.iter() {
                    if c != pind {
                        soma_queue.push_back((ind, c));
                    }
                }
            } else {
                root_pts.push((pind, ind));
            }
        }

        let new_size = out.pos.len() + root_pts.len();
        out.pos.resize(new_size, Vec::new());
        out.rad.resize(new_size, Vec::new());
        out.branch_info.resize(new_size, Vec::new());

        let mut processing_stack: Vec<(usize, usize)> = root_pts;

        out.root_inds.push(cur_neurite_ind);

        // maps a branch point's point index to (neurite id, branch record id)
        // so later-dequeued children can link back to the right record
        let mut helper_map: HashMap<usize, (usize, usize)> = HashMap::new();

        while let Some((pind, ind)) = processing_stack.pop() {
            pt_processed[ind] = true;
            n_processed += 1;

            let pt = &points[ind];
            if pt.swc_type == SwcType::Soma {
                return Err(anyhow::Error::msg(
                    "convert_pointlist_to_neuritelist(): detected neuron with more than one soma",
                ));
            }

            out.pos[cur_neurite_ind].push(pt.position);
            out.rad[cur_neurite_ind].push(pt.radius);

            let n_conn = pt.conns.len();

            if n_conn > 2 {
                // branching point: the branch with minimal angle to the
                // incoming direction continues the current neurite
                let parent_dir = (pt.position - points[pind].position).normalize();

                let mut parent_to_be_discarded = 0;
                let mut min_angle_ind = 0;
                let mut min_angle = f64::INFINITY;

                for (i, &c) in pt.conns.iter().enumerate() {
                    if c == pind {
                        parent_to_be_discarded = i;
                        continue;
                    }
                    let dir = (points[c].position - pt.position).normalize();
                    let angle = dir.dot(&parent_dir).acos();
                    if angle < min_angle {
                        min_angle = angle;
                        min_angle_ind = i;
                    }
                }

                let bp_local_ind = out.pos[cur_neurite_ind].len() - 1;

                let new_size = out.pos.len() + n_conn - 2;
                out.pos.resize(new_size, Vec::new());
                out.rad.resize(new_size, Vec::new());
                out.branch_info.resize(new_size, Vec::new());

                for (i, &c) in pt.conns.iter().enumerate() {
                    if i == parent_to_be_discarded || i == min_angle_ind {
                        continue;
                    }
                    processing_stack.push((ind, c));
                    helper_map.insert(
                        ind,
                        (cur_neurite_ind, out.branch_info[cur_neurite_ind].len()),
                    );
                }

                // the continuing branch is processed next
                processing_stack.push((ind, pt.conns[min_angle_ind]));

                out.branch_info[cur_neurite_ind].push(BranchInfo {
                    local_ind: bp_local_ind,
                    child_ids: Vec::new(),
                });
            } else if n_conn == 1 {
                // leaf: if anything remains queued, the next entry starts a
                // new neurite
                if let Some(&(next_parent, _)) = processing_stack.last() {
                    cur_neurite_ind += 1;

                    if let Some(&(par_neurite, par_bp)) = helper_map.get(&next_parent) {
                        // continue from a branch: prepend the branch point
                        // and register the child at the parent's record
                        out.pos[cur_neurite_ind].push(points[next_parent].position);
                        out.rad[cur_neurite_ind].push(points[next_parent].radius);
                        out.branch_info[par_neurite][par_bp]
                            .child_ids
                            .push(cur_neurite_ind);
                    } else {
                        // the next point roots a new root neurite
                        out.root_inds.push(cur_neurite_ind);
                    }
                }
            } else {
                for &c in pt.conns.iter() {
                    if c != pind {
                        processing_stack.push((ind, c));
                    }
                }
            }
        }

        // the last neurite of each neuron has not increased the counter yet
        cur_neurite_ind += 1;
    }

    Ok(out)
}
