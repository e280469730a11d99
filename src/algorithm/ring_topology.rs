use std::f64::consts::PI;

/// Cytosol subset index
pub const SUBSET_CYT: i32 = 0;
/// ER lumen subset index
pub const SUBSET_ER: i32 = 1;
/// Plasma membrane subset index
pub const SUBSET_PM: i32 = 2;
/// ER membrane subset index
pub const SUBSET_ERM: i32 = 3;

/// Meshing variant selected by a ring layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingKind {
    /// plasma membrane surface only
    Surface,
    /// outer membrane plus inner ER layer, volume elements between
    DualLayer,
    /// 1d chain of centerline vertices
    Centerline,
}

/// One cross-section vertex of the ring
#[derive(Debug, Clone)]
pub struct RingVertex {
    /// angle in the cross-section plane at zero angle offset
    pub angle: f64,
    /// radial coordinate as a fraction of the local tube radius
    pub radial: f64,
    pub subset: Option<i32>,
}

/// One ring edge, endpoints as slots into the vertex list
#[derive(Debug, Clone)]
pub struct RingEdge {
    pub ends: [usize; 2],
    pub subset: Option<i32>,
}

/// One cross-section quad, corners as slots into the vertex list
#[derive(Debug, Clone)]
pub struct RingFace {
    pub corners: [usize; 4],
    pub subset: Option<i32>,
}

/// Cross-section layout driving the tube extruder.
///
/// The layout fixes the combinatorics of one ring; the extruder instantiates
/// it at the neurite start and keeps it through every extrusion step, so the
/// slot patterns below also describe every later ring.
#[derive(Debug, Clone)]
pub struct RingTopology {
    pub kind: RingKind,
    pub vertices: Vec<RingVertex>,
    pub edges: Vec<RingEdge>,
    pub faces: Vec<RingFace>,
    pub create_volumes: bool,
    pub capped_tip: bool,
}

impl RingTopology {
    /// Quadrilateral surface tube: 4 vertices at k*pi/2 on the membrane
    pub fn surface() -> RingTopology {
        let mut vertices = Vec::with_capacity(4);
        let mut edges = Vec::with_capacity(4);
        for i in 0..4 {
            vertices.push(RingVertex {
                angle: 0.5 * PI * i as f64,
                radial: 1.0,
                subset: None,
            });
            edges.push(RingEdge {
                ends: [i, (i + 1) % 4],
                subset: None,
            });
        }
        RingTopology {
            kind: RingKind::Surface,
            vertices,
            edges,
            faces: Vec::new(),
            create_volumes: false,
            capped_tip: true,
        }
    }

    /// Dual-layer ring: 4 ER vertices at k*pi/2 scaled by `er_scale` inside
    /// 12 membrane vertices at k*pi/6.
    ///
    /// Slots 0..4 are the ER ring, slots 4..16 the outer ring with the
    /// cardinal vertex of quadrant i at slot 4+3i. Edge slots: 0..4 ER ring,
    /// 4..8 and 8..12 the spokes, 12..24 the outer ring. Face slots: 0 the
    /// ER quad, 1..9 the eight cytosol quads between the layers.
    pub fn dual_layer(er_scale: f64) -> RingTopology {
        let mut vertices = Vec::with_capacity(16);
        for i in 0..4 {
            vertices.push(RingVertex {
                angle: 0.5 * PI * i as f64,
                radial: er_scale,
                subset: Some(SUBSET_ERM),
            });
        }
        for i in 0..12 {
            vertices.push(RingVertex {
                angle: PI * i as f64 / 6.0,
                radial: 1.0,
                subset: Some(SUBSET_PM),
            });
        }

        let mut edges = vec![
            RingEdge {
                ends: [0, 0],
                subset: None
            };
            24
        ];
        for i in 0..4 {
            edges[i] = RingEdge {
                ends: [i, (i + 1) % 4],
                subset: Some(SUBSET_ERM),
            };
            edges[i + 4] = RingEdge {
                ends: [i, 5 + 3 * i],
                subset: Some(SUBSET_CYT),
            };
            edges[i + 8] = RingEdge {
                ends: [(i + 1) % 4, 6 + 3 * i],
                subset: None,
            };
        }
        for i in 0..12 {
            edges[i + 12] = RingEdge {
                ends: [i + 4, (i + 1) % 12 + 4],
                subset: Some(SUBSET_PM),
            };
        }

        let mut faces = Vec::with_capacity(9);
        faces.push(RingFace {
            corners: [0, 1, 2, 3],
            subset: Some(SUBSET_ER),
        });
        for i in 0..4 {
            faces.push(RingFace {
                corners: [i, (3 * i + 11) % 12 + 4, 3 * i + 4, 3 * i + 5],
                subset: Some(SUBSET_CYT),
            });
        }
        for i in 0..4 {
            faces.push(RingFace {
                corners: [i, 3 * i + 5, 3 * i + 6, (i + 1) % 4],
                subset: Some(SUBSET_CYT),
            });
        }

        RingTopology {
            kind: RingKind::DualLayer,
            vertices,
            edges,
            faces,
            create_volumes: true,
            capped_tip: true,
        }
    }

    /// Degenerate ring of a single centerline vertex
    pub fn centerline() -> RingTopology {
        RingTopology {
            kind: RingKind::Centerline,
            vertices: vec![RingVertex {
                angle: 0.0,
                radial: 0.0,
                subset: None,
            }],
            edges: Vec::new(),
            faces: Vec::new(),
            create_volumes: false,
            capped_tip: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_ring_is_a_quad_loop() {
        let topo = RingTopology::surface();
        assert_eq!(topo.vertices.len(), 4);
        assert_eq!(topo.edges.len(), 4);
        assert!(topo.faces.is_empty());
        assert!(!topo.create_volumes);
        for (i, e) in topo.edges.iter().enumerate() {
            assert_eq!(e.ends, [i, (i + 1) % 4]);
        }
    }

    #[test]
    fn dual_layer_ring_counts_and_slots() {
        let topo = RingTopology::dual_layer(0.5);
        assert_eq!(topo.vertices.len(), 16);
        assert_eq!(topo.edges.len(), 24);
        assert_eq!(topo.faces.len(), 9);
        assert!(topo.create_volumes);

        for e in topo.edges.iter() {
            assert!(e.ends[0] < 16 && e.ends[1] < 16);
            assert_ne!(e.ends[0], e.ends[1]);
        }
        // every outer vertex appears in some cytosol face
        for slot in 4..16 {
            assert!(topo
                .faces
                .iter()
                .skip(1)
                .any(|f| f.corners.contains(&slot)));
        }
        // inner quad lies on the ER subset, inner vertices on the ER membrane
        assert_eq!(topo.faces[0].subset, Some(SUBSET_ER));
        for v in topo.vertices.iter().take(4) {
            assert_eq!(v.subset, Some(SUBSET_ERM));
            assert_eq!(v.radial, 0.5);
        }
        for v in topo.vertices.iter().skip(4) {
            assert_eq!(v.subset, Some(SUBSET_PM));
            assert_eq!(v.radial, 1.0);
        }
    }

    #[test]
    fn centerline_ring_is_one_vertex() {
        let topo = RingTopology::centerline();
        assert_eq!(topo.vertices.len(), 1);
        assert_eq!(topo.vertices[0].radial, 0.0);
        assert!(topo.edges.is_empty() && topo.faces.is_empty());
        assert!(!topo.capped_tip);
    }
}
