use anyhow::Result;
use nalgebra::base::*;
use std::collections::BinaryHeap;

use super::{SwcPoint, SwcType};

/// Iterative tree-respecting position smoothing.
///
/// Runs `n` iterations. Each iteration walks every tree depth first from its
/// neurite roots (the first non-soma points reached from each soma). Interior
/// points of degree 2 move by `gamma` times an edge-length-weighted Laplacian
/// correction, with the component parallel to the neighbor chord removed so a
/// point is not shifted towards its nearer neighbor. Weights are
/// `exp(-d^2/h^2)`, taking the minimum of both sides so only points with two
/// short edges move notably. Soma points are skipped entirely, branching
/// points and terminal points are traversed but not moved.
pub fn smooth_positions(points: &mut [SwcPoint], n: usize, h: f64, gamma: f64) -> Result<()> {
    let n_pts = points.len();

    // collect neurite root points: first non-soma point in every direction
    // away from each soma
    let mut root_vrts = Vec::new();
    let mut treated = vec![false; n_pts];
    for i in 0..n_pts {
        if treated[i] {
            continue;
        }
        treated[i] = true;
        if points[i].swc_type != SwcType::Soma {
            continue;
        }

        let mut queue = std::collections::VecDeque::new();
        queue.push_back(i);
        while let Some(ind) = queue.pop_front() {
            let pt = &points[ind];
            if pt.swc_type == SwcType::Soma {
                for &c in pt.conns.iter() {
                    if !treated[c] {
                        queue.push_back(c);
                    }
                }
            } else {
                root_vrts.push(ind);
            }
            treated[ind] = true;
        }
    }

    let mut new_pos = vec![Vector3::zeros(); n_pts];
    for _ in 0..n {
        let mut treated = vec![false; n_pts];
        let mut stack: Vec<usize> = root_vrts.clone();

        while let Some(ind) = stack.pop() {
            if treated[ind] {
                return Err(anyhow::anyhow!(
                    "smooth_positions(): cycle detected in supposedly tree-shaped morphology at {:?}",
                    points[ind].position
                ));
            }
            treated[ind] = true;

            let pt = &points[ind];
            let x = pt.position;

            // somata are not smoothed and not iterated over
            if pt.swc_type == SwcType::Soma {
                new_pos[ind] = x;
                continue;
            }

            // branching and terminal points are not smoothed, but iterated over
            for &c in pt.conns.iter() {
                if !treated[c] {
                    stack.push(c);
                }
            }
            if pt.conns.len() != 2 {
                new_pos[ind] = x;
                continue;
            }

            let x1 = points[pt.conns[0]].position;
            let x2 = points[pt.conns[1]].position;

            let d1 = (x1 - x).norm_squared();
            let d2 = (x2 - x).norm_squared();
            let w1 = (-d1 / (h * h)).exp();
            let w2 = (-d2 / (h * h)).exp();

            // only really smooth if both adjacent edges are short
            let w = w1.min(w2);

            let mut corr = (w * x1 - 2.0 * w * x + w * x2) / (1.0 + 2.0 * w);

            // take only the part orthogonal to x1 - x2,
            // we do not want to shift x towards the nearer neighbor
            let chord = x1 - x2;
            corr -= (corr.dot(&chord) / chord.norm_squared()) * chord;
            new_pos[ind] = x + gamma * corr;
        }

        // soma points may not have been treated
        for p in 0..n_pts {
            if treated[p] {
                points[p].position = new_pos[p];
            }
        }
    }

    Ok(())
}

struct HeapEdge {
    len_sq: f64,
    v1: usize,
    v2: usize,
}

impl PartialEq for HeapEdge {
    fn eq(&self, other: &Self) -> bool {
        self.len_sq == other.len_sq
    }
}
impl Eq for HeapEdge {}
impl PartialOrd for HeapEdge {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEdge {
    // reversed so the binary heap pops the shortest edge first
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.len_sq.total_cmp(&self.len_sq)
    }
}

/// Collapses edges that are shorter than the larger of their endpoint
/// diameters, shortest first.
///
/// Edges joining two branching points are left alone. A branching or
/// terminal endpoint keeps its position and radius through the collapse;
/// between two interior points the merged point is placed by weights
/// `1 - |cos|` against the adjacent edge directions, at the midpoint if all
/// three directions are nearly collinear. Point indices are compacted
/// afterwards.
pub fn collapse_short_edges(points: &mut Vec<SwcPoint>) {
    let n_pts = points.len();
    let mut alive = vec![true; n_pts];

    let mut pq = BinaryHeap::new();
    for v1 in 0..n_pts {
        for &v2 in points[v1].conns.iter() {
            if v2 > v1 {
                if let Some(len_sq) = short_edge_len_sq(points, v1, v2) {
                    pq.push(HeapEdge { len_sq, v1, v2 });
                }
            }
        }
    }

    while let Some(edge) = pq.pop() {
        let (v1, v2) = (edge.v1, edge.v2);

        // entries may be stale after earlier collapses
        if !alive[v1] || !alive[v2] || !points[v1].conns.contains(&v2) {
            continue;
        }

        // length might not be up to date; re-insert with correct length
        let cur_len = (points[v2].position - points[v1].position).norm_squared();
        if cur_len != edge.len_sq {
            if let Some(len_sq) = short_edge_len_sq(points, v1, v2) {
                pq.push(HeapEdge { len_sq, v1, v2 });
            }
            continue;
        }

        let deg1 = points[v1].conns.len();
        let deg2 = points[v2].conns.len();

        // do not collapse edges connecting two branching points
        if deg1 > 2 && deg2 > 2 {
            continue;
        }

        let x1 = points[v1].position;
        let x2 = points[v2].position;
        let d0 = (x2 - x1).normalize();

        // never move branching points; terminal edges keep their terminal end
        let (new_pos, new_rad, keep_v2) = if deg1 > 2 || (deg2 <= 2 && deg1 == 1) {
            (x1, points[v1].radius, false)
        } else if deg2 > 2 || deg2 == 1 {
            (x2, points[v2].radius, true)
        } else {
            let o1 = *points[v1].conns.iter().find(|&&c| c != v2).unwrap();
            let o2 = *points[v2].conns.iter().find(|&&c| c != v1).unwrap();
            let d1 = (x1 - points[o1].position).normalize();
            let d2 = (points[o2].position - x2).normalize();
            let w1 = 1.0 - d0.dot(&d1).abs();
            let w2 = 1.0 - d0.dot(&d2).abs();

            // w below 0.05 corresponds to a deviation of about 18 degrees;
            // if all three directions are practically collinear, choose the middle
            if w1 < 0.05 && w2 < 0.05 {
                (
                    0.5 * (x1 + x2),
                    0.5 * (points[v1].radius + points[v2].radius),
                    false,
                )
            } else {
                (
                    (w1 * x1 + w2 * x2) / (w1 + w2),
                    (w1 * points[v1].radius + w2 * points[v2].radius) / (w1 + w2),
                    false,
                )
            }
        };

        // merge v2 into v1
        let v2_conns: Vec<usize> = points[v2].conns.drain(..).collect();
        alive[v2] = false;
        points[v1].conns.retain(|&c| c != v2);
        if keep_v2 {
            points[v1].swc_type = points[v2].swc_type;
        }
        for &nb in v2_conns.iter() {
            if nb == v1 {
                continue;
            }
            for c in points[nb].conns.iter_mut() {
                if *c == v2 {
                    *c = v1;
                }
            }
            if !points[v1].conns.contains(&nb) {
                points[v1].conns.push(nb);
            }
        }
        points[v1].position = new_pos;
        points[v1].radius = new_rad;

        // adjacent edges changed length; re-queue the ones now short
        for &nb in points[v1].conns.clone().iter() {
            if let Some(len_sq) = short_edge_len_sq(points, v1, nb) {
                let (a, b) = if v1 < nb { (v1, nb) } else { (nb, v1) };
                pq.push(HeapEdge { len_sq, v1: a, v2: b });
            }
        }
    }

    // compact indices
    let mut remap = vec![usize::MAX; n_pts];
    let mut next = 0;
    for i in 0..n_pts {
        if alive[i] {
            remap[i] = next;
            next += 1;
        }
    }
    let mut compacted = Vec::with_capacity(next);
    for (i, mut pt) in points.drain(..).enumerate() {
        if !alive[i] {
            continue;
        }
        for c in pt.conns.iter_mut() {
            *c = remap[*c];
        }
        compacted.push(pt);
    }
    *points = compacted;
}

fn short_edge_len_sq(points: &[SwcPoint], v1: usize, v2: usize) -> Option<f64> {
    let len_sq = (points[v2].position - points[v1].position).norm_squared();
    let diam = 2.0 * points[v1].radius.max(points[v2].radius);
    if len_sq < diam * diam {
        Some(len_sq)
    } else {
        None
    }
}
