use anyhow::Result;
use nalgebra::base::*;
use std::collections::HashMap;

/// Grid edge (pair of vertex indices)
pub type Edge = [usize; 2];
/// Grid hexahedron (bottom quad then top quad, matching winding)
pub type Hexahedron = [usize; 8];

/// Grid face, either triangular or quadrilateral
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Face {
    Tri([usize; 3]),
    Quad([usize; 4]),
}

impl Face {
    pub fn vertices(&self) -> &[usize] {
        match self {
            Face::Tri(v) => v,
            Face::Quad(v) => v,
        }
    }

    pub fn contains(&self, ind_vertex: usize) -> bool {
        self.vertices().contains(&ind_vertex)
    }

    /// Same vertex set, winding and starting vertex ignored
    pub fn same_vertices(&self, verts: &[usize]) -> bool {
        let own = self.vertices();
        own.len() == verts.len() && verts.iter().all(|v| own.contains(v))
    }
}

/// Spline surface coordinates attached to a vertex.
///
/// `neurite_id` packs the branching region index into bits 20.. and the
/// child slot into bits 28.. of the owning neurite id.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurfaceParams {
    pub neurite_id: u32,
    pub axial: f64,
    pub angular: f64,
    pub radial: f64,
}

/// Grid of vertices, edges, faces and hexahedral volumes.
///
/// Elements are keyed by monotonically increasing indices so erasing is
/// cheap; adjacency is kept per vertex.
#[derive(Clone)]
pub struct Grid3D {
    pub(super) vertices: HashMap<usize, Vector3<f64>>,
    pub(super) params: HashMap<usize, SurfaceParams>,
    pub(super) diameters: HashMap<usize, f64>,
    pub(super) edges: HashMap<usize, Edge>,
    pub(super) faces: HashMap<usize, Face>,
    pub(super) volumes: HashMap<usize, Hexahedron>,
    pub(super) last_ind_vert: usize,
    pub(super) last_ind_edge: usize,
    pub(super) last_ind_face: usize,
    pub(super) last_ind_vol: usize,

    pub(super) map_vert_edg: HashMap<usize, Vec<usize>>,
    pub(super) map_vert_fac: HashMap<usize, Vec<usize>>,
    pub(super) map_vert_vol: HashMap<usize, Vec<usize>>,

    pub(super) sub_vert: HashMap<usize, i32>,
    pub(super) sub_edg: HashMap<usize, i32>,
    pub(super) sub_fac: HashMap<usize, i32>,
    pub(super) sub_vol: HashMap<usize, i32>,
}

impl Grid3D {
    /// Grid constructor
    pub fn new() -> Grid3D {
        Grid3D {
            vertices: HashMap::new(),
            params: HashMap::new(),
            diameters: HashMap::new(),
            edges: HashMap::new(),
            faces: HashMap::new(),
            volumes: HashMap::new(),
            last_ind_vert: 0,
            last_ind_edge: 0,
            last_ind_face: 0,
            last_ind_vol: 0,
            map_vert_edg: HashMap::new(),
            map_vert_fac: HashMap::new(),
            map_vert_vol: HashMap::new(),
            sub_vert: HashMap::new(),
            sub_edg: HashMap::new(),
            sub_fac: HashMap::new(),
            sub_vol: HashMap::new(),
        }
    }

    /// Adds a vertex to the grid
    pub fn add_vertex(&mut self, point: &Vector3<f64>) -> usize {
        self.vertices.insert(self.last_ind_vert, *point);
        self.map_vert_edg.insert(self.last_ind_vert, Vec::new());
        self.map_vert_fac.insert(self.last_ind_vert, Vec::new());
        self.map_vert_vol.insert(self.last_ind_vert, Vec::new());
        self.last_ind_vert += 1;
        self.last_ind_vert - 1
    }

    /// Vertex position getter
    pub fn get_vertex(&self, ind_vertex: usize) -> Result<Vector3<f64>> {
        self.vertices
            .get(&ind_vertex)
            .copied()
            .ok_or_else(|| anyhow::Error::msg("get_vertex(): Index out of bounds"))
    }

    pub fn set_vertex(&mut self, ind_vertex: usize, point: &Vector3<f64>) -> Result<()> {
        let v = self
            .vertices
            .get_mut(&ind_vertex)
            .ok_or_else(|| anyhow::Error::msg("set_vertex(): Index out of bounds"))?;
        *v = *point;
        Ok(())
    }

    pub fn get_nb_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn vertex_indices(&self) -> Vec<usize> {
        let mut inds: Vec<usize> = self.vertices.keys().copied().collect();
        inds.sort();
        inds
    }

    pub fn set_params(&mut self, ind_vertex: usize, params: SurfaceParams) {
        self.params.insert(ind_vertex, params);
    }

    pub fn get_params(&self, ind_vertex: usize) -> Result<SurfaceParams> {
        self.params
            .get(&ind_vertex)
            .copied()
            .ok_or_else(|| anyhow::Error::msg("get_params(): Index out of bounds"))
    }

    pub fn params_mut(&mut self, ind_vertex: usize) -> Result<&mut SurfaceParams> {
        self.params
            .get_mut(&ind_vertex)
            .ok_or_else(|| anyhow::Error::msg("params_mut(): Index out of bounds"))
    }

    pub fn set_diameter(&mut self, ind_vertex: usize, diameter: f64) {
        self.diameters.insert(ind_vertex, diameter);
    }

    pub fn get_diameter(&self, ind_vertex: usize) -> Option<f64> {
        self.diameters.get(&ind_vertex).copied()
    }

    pub fn has_diameters(&self) -> bool {
        !self.diameters.is_empty()
    }

    /// Adds an edge to the grid
    pub fn add_edge(&mut self, ind_vertex1: usize, ind_vertex2: usize) -> usize {
        self.edges
            .insert(self.last_ind_edge, [ind_vertex1, ind_vertex2]);
        for &v in [ind_vertex1, ind_vertex2].iter() {
            self.map_vert_edg.entry(v).or_default().push(self.last_ind_edge);
        }
        self.last_ind_edge += 1;
        self.last_ind_edge - 1
    }

    pub fn get_edge(&self, ind_edge: usize) -> Result<Edge> {
        self.edges
            .get(&ind_edge)
            .copied()
            .ok_or_else(|| anyhow::Error::msg("get_edge(): Index out of bounds"))
    }

    pub fn get_nb_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_indices(&self) -> Vec<usize> {
        let mut inds: Vec<usize> = self.edges.keys().copied().collect();
        inds.sort();
        inds
    }

    /// Finds the edge between two vertices, if any
    pub fn find_edge(&self, ind_vertex1: usize, ind_vertex2: usize) -> Option<usize> {
        let edgs = self.map_vert_edg.get(&ind_vertex1)?;
        edgs.iter()
            .find(|&&e| {
                let edge = self.edges[&e];
                edge.contains(&ind_vertex2)
            })
            .copied()
    }

    /// Adds a face to the grid
    pub fn add_face(&mut self, face: Face) -> usize {
        for &v in face.vertices() {
            self.map_vert_fac.entry(v).or_default().push(self.last_ind_face);
        }
        self.faces.insert(self.last_ind_face, face);
        self.last_ind_face += 1;
        self.last_ind_face - 1
    }

    pub fn get_face(&self, ind_face: usize) -> Result<Face> {
        self.faces
            .get(&ind_face)
            .copied()
            .ok_or_else(|| anyhow::Error::msg("get_face(): Index out of bounds"))
    }

    pub fn get_nb_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn face_indices(&self) -> Vec<usize> {
        let mut inds: Vec<usize> = self.faces.keys().copied().collect();
        inds.sort();
        inds
    }

    /// Finds the face with exactly the given vertex set, if any
    pub fn find_face(&self, verts: &[usize]) -> Option<usize> {
        let facs = self.map_vert_fac.get(&verts[0])?;
        facs.iter()
            .find(|&&f| self.faces[&f].same_vertices(verts))
            .copied()
    }

    /// Faces incident to both endpoints of an edge
    pub fn edge_faces(&self, ind_edge: usize) -> Result<Vec<usize>> {
        let edge = self.get_edge(ind_edge)?;
        let facs = self
            .map_vert_fac
            .get(&edge[0])
            .ok_or_else(|| anyhow::Error::msg("edge_faces(): Index out of bounds"))?;
        Ok(facs
            .iter()
            .filter(|&&f| self.faces[&f].contains(edge[1]))
            .copied()
            .collect())
    }

    /// Adds a hexahedron to the grid
    pub fn add_volume(&mut self, hex: Hexahedron) -> usize {
        for &v in hex.iter() {
            self.map_vert_vol.entry(v).or_default().push(self.last_ind_vol);
        }
        self.volumes.insert(self.last_ind_vol, hex);
        self.last_ind_vol += 1;
        self.last_ind_vol - 1
    }

    pub fn get_volume(&self, ind_volume: usize) -> Result<Hexahedron> {
        self.volumes
            .get(&ind_volume)
            .copied()
            .ok_or_else(|| anyhow::Error::msg("get_volume(): Index out of bounds"))
    }

    pub fn get_nb_volumes(&self) -> usize {
        self.volumes.len()
    }

    pub fn volume_indices(&self) -> Vec<usize> {
        let mut inds: Vec<usize> = self.volumes.keys().copied().collect();
        inds.sort();
        inds
    }

    /// The six quadrilateral sides of a hexahedron
    pub fn volume_sides(hex: &Hexahedron) -> [[usize; 4]; 6] {
        [
            [hex[0], hex[1], hex[2], hex[3]],
            [hex[4], hex[5], hex[6], hex[7]],
            [hex[0], hex[1], hex[5], hex[4]],
            [hex[1], hex[2], hex[6], hex[5]],
            [hex[2], hex[3], hex[7], hex[6]],
            [hex[3], hex[0], hex[4], hex[7]],
        ]
    }

    /// Finds a volume containing the given side, skipping `ind_exclude`
    pub fn find_volume_with_side(&self, side: &[usize], ind_exclude: usize) -> Option<usize> {
        let vols = self.map_vert_vol.get(&side[0])?;
        vols.iter()
            .find(|&&vl| {
                vl != ind_exclude && {
                    let hex = &self.volumes[&vl];
                    side.iter().all(|v| hex.contains(v))
                }
            })
            .copied()
    }

    pub fn remove_edge(&mut self, ind_edge: usize) -> Result<()> {
        let edge = self
            .edges
            .remove(&ind_edge)
            .ok_or_else(|| anyhow::Error::msg("remove_edge(): Index out of bounds"))?;
        for v in edge.iter() {
            if let Some(edgs) = self.map_vert_edg.get_mut(v) {
                edgs.retain(|&e| e != ind_edge);
            }
        }
        self.sub_edg.remove(&ind_edge);
        Ok(())
    }

    pub fn remove_face(&mut self, ind_face: usize) -> Result<()> {
        let face = self
            .faces
            .remove(&ind_face)
            .ok_or_else(|| anyhow::Error::msg("remove_face(): Index out of bounds"))?;
        for v in face.vertices() {
            if let Some(facs) = self.map_vert_fac.get_mut(v) {
                facs.retain(|&f| f != ind_face);
            }
        }
        self.sub_fac.remove(&ind_face);
        Ok(())
    }

    pub fn remove_volume(&mut self, ind_volume: usize) -> Result<()> {
        let hex = self
            .volumes
            .remove(&ind_volume)
            .ok_or_else(|| anyhow::Error::msg("remove_volume(): Index out of bounds"))?;
        for v in hex.iter() {
            if let Some(vols) = self.map_vert_vol.get_mut(v) {
                vols.retain(|&vl| vl != ind_volume);
            }
        }
        self.sub_vol.remove(&ind_volume);
        Ok(())
    }

    pub fn remove_vertex(&mut self, ind_vertex: usize) -> Result<()> {
        self.vertices
            .remove(&ind_vertex)
            .ok_or_else(|| anyhow::Error::msg("remove_vertex(): Index out of bounds"))?;
        self.params.remove(&ind_vertex);
        self.diameters.remove(&ind_vertex);
        self.sub_vert.remove(&ind_vertex);
        self.map_vert_edg.remove(&ind_vertex);
        self.map_vert_fac.remove(&ind_vertex);
        self.map_vert_vol.remove(&ind_vertex);
        Ok(())
    }

    /// Outward normal of a face (diagonal cross product for quads)
    pub fn face_normal(&self, ind_face: usize) -> Result<Vector3<f64>> {
        let face = self.get_face(ind_face)?;
        let n = match face {
            Face::Tri([a, b, c]) => {
                let pa = self.get_vertex(a)?;
                (self.get_vertex(b)? - pa).cross(&(self.get_vertex(c)? - pa))
            }
            Face::Quad([a, b, c, d]) => {
                let diag1 = self.get_vertex(c)? - self.get_vertex(a)?;
                let diag2 = self.get_vertex(d)? - self.get_vertex(b)?;
                diag1.cross(&diag2)
            }
        };
        Ok(n.normalize())
    }

    /// Barycenter of a set of vertices
    pub fn barycenter(&self, verts: &[usize]) -> Result<Vector3<f64>> {
        let mut center = Vector3::zeros();
        for &v in verts.iter() {
            center += self.get_vertex(v)?;
        }
        Ok(center / verts.len() as f64)
    }

    /// Reverses the winding of a face
    pub fn flip_face(&mut self, ind_face: usize) -> Result<()> {
        let face = self
            .faces
            .get_mut(&ind_face)
            .ok_or_else(|| anyhow::Error::msg("flip_face(): Index out of bounds"))?;
        match face {
            Face::Tri(v) => v.reverse(),
            Face::Quad(v) => v.reverse(),
        }
        Ok(())
    }

    /// Merges a set of vertices into the first one.
    ///
    /// Elements referencing a merged vertex are rewritten; edges and faces
    /// degenerating in the process are reduced (quad to triangle) or erased.
    /// Returns the surviving vertex index.
    pub fn merge_vertices(&mut self, verts: &[usize]) -> Result<usize> {
        let target = *verts
            .first()
            .ok_or_else(|| anyhow::Error::msg("merge_vertices(): Empty vertex list"))?;
        self.get_vertex(target)?;

        for &v in verts.iter().skip(1) {
            if v == target {
                continue;
            }
            let edgs = self.map_vert_edg.get(&v).cloned().unwrap_or_default();
            for e in edgs {
                let edge = self.edges.get_mut(&e).unwrap();
                for ev in edge.iter_mut() {
                    if *ev == v {
                        *ev = target;
                    }
                }
                self.map_vert_edg.entry(target).or_default().push(e);
            }
            let facs = self.map_vert_fac.get(&v).cloned().unwrap_or_default();
            for f in facs {
                let face = self.faces.get_mut(&f).unwrap();
                match face {
                    Face::Tri(fv) => {
                        for x in fv.iter_mut() {
                            if *x == v {
                                *x = target;
                            }
                        }
                    }
                    Face::Quad(fv) => {
                        for x in fv.iter_mut() {
                            if *x == v {
                                *x = target;
                            }
                        }
                    }
                }
                self.map_vert_fac.entry(target).or_default().push(f);
            }
            let vols = self.map_vert_vol.get(&v).cloned().unwrap_or_default();
            for vl in vols {
                let hex = self.volumes.get_mut(&vl).unwrap();
                for x in hex.iter_mut() {
                    if *x == v {
                        *x = target;
                    }
                }
                self.map_vert_vol.entry(target).or_default().push(vl);
            }
            self.remove_vertex(v)?;
        }

        // clean up degenerated and duplicated elements around the target
        let edgs = self.map_vert_edg.get(&target).cloned().unwrap_or_default();
        let mut seen_edges: Vec<(usize, Edge)> = Vec::new();
        for e in edgs {
            let Some(&edge) = self.edges.get(&e) else { continue };
            if edge[0] == edge[1] {
                self.remove_edge(e)?;
                continue;
            }
            if seen_edges
                .iter()
                .any(|(_, s)| s.contains(&edge[0]) && s.contains(&edge[1]))
            {
                self.remove_edge(e)?;
            } else {
                seen_edges.push((e, edge));
            }
        }

        let facs = self.map_vert_fac.get(&target).cloned().unwrap_or_default();
        let mut seen_faces: Vec<Face> = Vec::new();
        for f in facs {
            let Some(&face) = self.faces.get(&f) else { continue };
            let mut unique: Vec<usize> = Vec::new();
            for &v in face.vertices() {
                if !unique.contains(&v) {
                    unique.push(v);
                }
            }
            let reduced = match unique.len() {
                4 => Face::Quad([unique[0], unique[1], unique[2], unique[3]]),
                3 => Face::Tri([unique[0], unique[1], unique[2]]),
                _ => {
                    self.remove_face(f)?;
                    continue;
                }
            };
            if seen_faces.iter().any(|s| s.same_vertices(unique.as_slice())) {
                self.remove_face(f)?;
                continue;
            }
            seen_faces.push(reduced);
            if reduced != face {
                let subset = self.sub_fac.get(&f).copied();
                self.remove_face(f)?;
                let nf = self.add_face(reduced);
                if let Some(s) = subset {
                    self.sub_fac.insert(nf, s);
                }
            }
        }

        Ok(target)
    }

    /// Signed corner volume of a hexahedron at vertex 0
    fn hex_orientation(&self, hex: &Hexahedron) -> Result<f64> {
        let p0 = self.get_vertex(hex[0])?;
        let e1 = self.get_vertex(hex[1])? - p0;
        let e3 = self.get_vertex(hex[3])? - p0;
        let e4 = self.get_vertex(hex[4])? - p0;
        Ok(e1.dot(&e3.cross(&e4)))
    }

    /// Reflects inverted hexahedra so all volumes are positively oriented
    pub fn fix_volume_orientation(&mut self, ind_volume: usize) -> Result<()> {
        let hex = self.get_volume(ind_volume)?;
        if self.hex_orientation(&hex)? < 0.0 {
            let fixed = [
                hex[3], hex[2], hex[1], hex[0], hex[7], hex[6], hex[5], hex[4],
            ];
            self.volumes.insert(ind_volume, fixed);
        }
        Ok(())
    }

    pub fn set_vertex_subset(&mut self, ind_vertex: usize, subset: i32) {
        self.sub_vert.insert(ind_vertex, subset);
    }

    pub fn set_edge_subset(&mut self, ind_edge: usize, subset: i32) {
        self.sub_edg.insert(ind_edge, subset);
    }

    pub fn set_face_subset(&mut self, ind_face: usize, subset: i32) {
        self.sub_fac.insert(ind_face, subset);
    }

    pub fn set_volume_subset(&mut self, ind_volume: usize, subset: i32) {
        self.sub_vol.insert(ind_volume, subset);
    }

    pub fn vertex_subset(&self, ind_vertex: usize) -> Option<i32> {
        self.sub_vert.get(&ind_vertex).copied()
    }

    pub fn edge_subset(&self, ind_edge: usize) -> Option<i32> {
        self.sub_edg.get(&ind_edge).copied()
    }

    pub fn face_subset(&self, ind_face: usize) -> Option<i32> {
        self.sub_fac.get(&ind_face).copied()
    }

    pub fn volume_subset(&self, ind_volume: usize) -> Option<i32> {
        self.sub_vol.get(&ind_volume).copied()
    }
}

impl Default for Grid3D {
    fn default() -> Self {
        Grid3D::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_quad(grid: &mut Grid3D) -> (Vec<usize>, usize) {
        let v0 = grid.add_vertex(&Vector3::new(0.0, 0.0, 0.0));
        let v1 = grid.add_vertex(&Vector3::new(1.0, 0.0, 0.0));
        let v2 = grid.add_vertex(&Vector3::new(1.0, 1.0, 0.0));
        let v3 = grid.add_vertex(&Vector3::new(0.0, 1.0, 0.0));
        let f = grid.add_face(Face::Quad([v0, v1, v2, v3]));
        (vec![v0, v1, v2, v3], f)
    }

    #[test]
    fn quad_normal_and_flip() {
        let mut grid = Grid3D::new();
        let (_, f) = unit_quad(&mut grid);
        let n = grid.face_normal(f).unwrap();
        assert_relative_eq!(n[2], 1.0, epsilon = 1e-12);
        grid.flip_face(f).unwrap();
        let n = grid.face_normal(f).unwrap();
        assert_relative_eq!(n[2], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn find_edge_and_face_by_vertices() {
        let mut grid = Grid3D::new();
        let (v, f) = unit_quad(&mut grid);
        let e = grid.add_edge(v[0], v[1]);
        assert_eq!(grid.find_edge(v[0], v[1]), Some(e));
        assert_eq!(grid.find_edge(v[1], v[0]), Some(e));
        assert_eq!(grid.find_edge(v[0], v[2]), None);
        assert_eq!(grid.find_face(&[v[3], v[1], v[0], v[2]]), Some(f));
        assert_eq!(grid.edge_faces(e).unwrap(), vec![f]);
    }

    #[test]
    fn merge_reduces_degenerate_quads_to_triangles() {
        let mut grid = Grid3D::new();
        let (v, f) = unit_quad(&mut grid);
        grid.add_edge(v[2], v[3]);
        let m = grid.merge_vertices(&[v[2], v[3]]).unwrap();
        assert_eq!(m, v[2]);
        assert_eq!(grid.get_nb_vertices(), 3);
        // top edge degenerated away
        assert_eq!(grid.get_nb_edges(), 0);
        // quad became a triangle
        match grid.get_face(f) {
            Ok(Face::Tri(_)) => {}
            // or was replaced by a new triangle index
            _ => {
                assert_eq!(grid.get_nb_faces(), 1);
                let inds = grid.face_indices();
                assert!(matches!(grid.get_face(inds[0]).unwrap(), Face::Tri(_)));
            }
        }
    }

    #[test]
    fn inverted_hexahedron_is_reoriented() {
        let mut grid = Grid3D::new();
        let mut v = Vec::new();
        for &(x, y, z) in &[
            (0.0, 0.0, 0.0),
            (1.0, 0.0, 0.0),
            (1.0, 1.0, 0.0),
            (0.0, 1.0, 0.0),
            (0.0, 0.0, 1.0),
            (1.0, 0.0, 1.0),
            (1.0, 1.0, 1.0),
            (0.0, 1.0, 1.0),
        ] {
            v.push(grid.add_vertex(&Vector3::new(x, y, z)));
        }
        // well oriented hex stays as is
        let vol = grid.add_volume([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]]);
        grid.fix_volume_orientation(vol).unwrap();
        assert_eq!(grid.get_volume(vol).unwrap()[0], v[0]);
        // inverted hex (top and bottom swapped) gets reflected
        let vol2 = grid.add_volume([v[4], v[5], v[6], v[7], v[0], v[1], v[2], v[3]]);
        grid.fix_volume_orientation(vol2).unwrap();
        let hex = grid.get_volume(vol2).unwrap();
        assert!(grid.hex_orientation(&hex).unwrap() > 0.0);
    }

    #[test]
    fn volume_side_lookup_finds_neighbor() {
        let mut grid = Grid3D::new();
        let mut v = Vec::new();
        for z in 0..3 {
            for &(x, y) in &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                v.push(grid.add_vertex(&Vector3::new(x, y, z as f64)));
            }
        }
        let lower = grid.add_volume([v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]]);
        let upper = grid.add_volume([v[4], v[5], v[6], v[7], v[8], v[9], v[10], v[11]]);
        let shared = [v[4], v[5], v[6], v[7]];
        assert_eq!(grid.find_volume_with_side(&shared, lower), Some(upper));
        assert_eq!(grid.find_volume_with_side(&shared, upper), Some(lower));
        let top = [v[8], v[9], v[10], v[11]];
        assert_eq!(grid.find_volume_with_side(&top, upper), None);
    }
}
