use anyhow::Result;
use nalgebra::base::*;

use super::Face;
use super::Grid3D;

/// Elements created by one extrusion step
#[derive(Debug, Clone, Default)]
pub struct ExtrusionOutput {
    /// new vertices, parallel to the input vertices
    pub vertices: Vec<usize>,
    /// new top edges, parallel to the input edges
    pub edges: Vec<usize>,
    /// new top faces, parallel to the input faces
    pub faces: Vec<usize>,
    /// one vertical edge per input vertex
    pub vertical_edges: Vec<usize>,
    /// one side quad per input edge
    pub side_faces: Vec<usize>,
    /// one hexahedron per input face
    pub volumes: Vec<usize>,
}

/// Extrudes a ring of vertices, edges and quad faces along `dir`.
///
/// Every input vertex spawns a translated copy plus the vertical edge to it,
/// every input edge a translated edge plus the connecting side quad, every
/// input quad a translated quad plus, if `create_volumes` is set, the
/// hexahedron between the two. All created elements are returned; the input
/// ring itself is left in place.
pub fn extrude(
    grid: &mut Grid3D,
    vrts: &[usize],
    edges: &[usize],
    faces: &[usize],
    dir: &Vector3<f64>,
    create_volumes: bool,
) -> Result<ExtrusionOutput> {
    let mut out = ExtrusionOutput::default();

    let pos_of = |grid: &Grid3D, v: usize| grid.get_vertex(v);

    // translated vertex per input vertex
    for &v in vrts.iter() {
        let p = pos_of(grid, v)? + dir;
        let nv = grid.add_vertex(&p);
        out.vertices.push(nv);
        out.vertical_edges.push(grid.add_edge(v, nv));
    }

    let top_of = |vrts: &[usize], out: &ExtrusionOutput, v: usize| -> Result<usize> {
        vrts.iter()
            .position(|&x| x == v)
            .map(|i| out.vertices[i])
            .ok_or_else(|| anyhow::Error::msg("extrude(): Edge vertex not part of extruded ring"))
    };

    // translated edge and side quad per input edge
    for &e in edges.iter() {
        let [a, b] = grid.get_edge(e)?;
        let a1 = top_of(vrts, &out, a)?;
        let b1 = top_of(vrts, &out, b)?;
        out.edges.push(grid.add_edge(a1, b1));
        out.side_faces.push(grid.add_face(Face::Quad([a, b, b1, a1])));
    }

    // translated face and hexahedron per input face
    for &f in faces.iter() {
        let face = grid.get_face(f)?;
        let Face::Quad([a, b, c, d]) = face else {
            return Err(anyhow::Error::msg(
                "extrude(): Only quadrilaterals can be extruded to volumes",
            ));
        };
        let a1 = top_of(vrts, &out, a)?;
        let b1 = top_of(vrts, &out, b)?;
        let c1 = top_of(vrts, &out, c)?;
        let d1 = top_of(vrts, &out, d)?;
        out.faces.push(grid.add_face(Face::Quad([a1, b1, c1, d1])));
        if create_volumes {
            out.volumes.push(grid.add_volume([a, b, c, d, a1, b1, c1, d1]));
        }
    }

    Ok(out)
}
