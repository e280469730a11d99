use anyhow::Result;
use std::fs::File;
use std::io::{BufWriter, Write};

use super::Face;
use super::Grid3D;

const SUBSET_NAMES: [&str; 4] = ["cyt", "er", "pm", "erm"];
const SUBSET_COLORS: [&str; 4] = [
    "0.588 0.588 1 1",
    "1 0.588 0.588 1",
    "0.588 1 0.588 1",
    "1 1 0.588 1",
];

fn subset_name(i: i32) -> String {
    SUBSET_NAMES
        .get(i as usize)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("subset_{}", i))
}

fn write_index_list<W: Write>(file: &mut W, inds: &[usize]) -> Result<()> {
    let strs: Vec<String> = inds.iter().map(|i| i.to_string()).collect();
    write!(file, "{}", strs.join(" "))?;
    Ok(())
}

/// Writes the grid in the UGX XML format: vertices, edges, triangles,
/// quadrilaterals, hexahedrons, a subset handler and, when present, the
/// vertex diameter attachment.
pub fn save_ugx(grid: &Grid3D, filename: &str) -> Result<()> {
    let file = File::create(filename)
        .map_err(|_| anyhow::anyhow!("save_ugx(): could not open file {}", filename))?;
    let mut file = BufWriter::new(file);

    let vert_inds = grid.vertex_indices();
    let edge_inds = grid.edge_indices();
    let face_inds = grid.face_indices();
    let vol_inds = grid.volume_indices();

    // file positions per element, vertices and edges in index order,
    // faces with triangles preceding quadrilaterals
    let vert_pos = |v: usize| vert_inds.binary_search(&v).unwrap();
    let mut face_file_ind = vec![0usize; face_inds.len()];
    let mut tris = Vec::new();
    let mut quads = Vec::new();
    for (i, &f) in face_inds.iter().enumerate() {
        match grid.get_face(f)? {
            Face::Tri(_) => {
                face_file_ind[i] = tris.len();
                tris.push(f);
            }
            Face::Quad(_) => {
                quads.push((i, f));
            }
        }
    }
    for (k, &(i, _)) in quads.iter().enumerate() {
        face_file_ind[i] = tris.len() + k;
    }

    writeln!(file, "<?xml version=\"1.0\" encoding=\"utf-8\"?>")?;
    writeln!(file, "<grid name=\"defGrid\">")?;

    let coords: Vec<String> = vert_inds
        .iter()
        .map(|&v| {
            let p = grid.get_vertex(v).unwrap();
            format!("{} {} {}", p[0], p[1], p[2])
        })
        .collect();
    writeln!(file, "<vertices coords=\"3\">{}</vertices>", coords.join(" "))?;

    if !edge_inds.is_empty() {
        let strs: Vec<String> = edge_inds
            .iter()
            .map(|&e| {
                let [a, b] = grid.get_edge(e).unwrap();
                format!("{} {}", vert_pos(a), vert_pos(b))
            })
            .collect();
        writeln!(file, "<edges>{}</edges>", strs.join(" "))?;
    }

    if !tris.is_empty() {
        let strs: Vec<String> = tris
            .iter()
            .map(|&f| {
                let Face::Tri([a, b, c]) = grid.get_face(f).unwrap() else {
                    unreachable!()
                };
                format!("{} {} {}", vert_pos(a), vert_pos(b), vert_pos(c))
            })
            .collect();
        writeln!(file, "<triangles>{}</triangles>", strs.join(" "))?;
    }

    if !quads.is_empty() {
        let strs: Vec<String> = quads
            .iter()
            .map(|&(_, f)| {
                let Face::Quad([a, b, c, d]) = grid.get_face(f).unwrap() else {
                    unreachable!()
                };
                format!(
                    "{} {} {} {}",
                    vert_pos(a),
                    vert_pos(b),
                    vert_pos(c),
                    vert_pos(d)
                )
            })
            .collect();
        writeln!(file, "<quadrilaterals>{}</quadrilaterals>", strs.join(" "))?;
    }

    if !vol_inds.is_empty() {
        let strs: Vec<String> = vol_inds
            .iter()
            .map(|&vl| {
                let hex = grid.get_volume(vl).unwrap();
                let vs: Vec<String> = hex.iter().map(|&v| vert_pos(v).to_string()).collect();
                vs.join(" ")
            })
            .collect();
        writeln!(file, "<hexahedrons>{}</hexahedrons>", strs.join(" "))?;
    }

    // subset handler; untagged elements land in subset 0
    let n_subsets = {
        let mut max_sub = 0;
        for &v in vert_inds.iter() {
            max_sub = max_sub.max(grid.vertex_subset(v).unwrap_or(0));
        }
        for &e in edge_inds.iter() {
            max_sub = max_sub.max(grid.edge_subset(e).unwrap_or(0));
        }
        for &f in face_inds.iter() {
            max_sub = max_sub.max(grid.face_subset(f).unwrap_or(0));
        }
        for &vl in vol_inds.iter() {
            max_sub = max_sub.max(grid.volume_subset(vl).unwrap_or(0));
        }
        max_sub + 1
    };

    writeln!(file, "<subset_handler name=\"defSH\">")?;
    for s in 0..n_subsets {
        writeln!(
            file,
            "<subset name=\"{}\" color=\"{}\">",
            subset_name(s),
            SUBSET_COLORS.get(s as usize).copied().unwrap_or("1 1 1 1")
        )?;
        let vs: Vec<usize> = vert_inds
            .iter()
            .filter(|&&v| grid.vertex_subset(v).unwrap_or(0) == s)
            .map(|&v| vert_pos(v))
            .collect();
        if !vs.is_empty() {
            write!(file, "<vertices>")?;
            write_index_list(&mut file, &vs)?;
            writeln!(file, "</vertices>")?;
        }
        let es: Vec<usize> = edge_inds
            .iter()
            .enumerate()
            .filter(|(_, &e)| grid.edge_subset(e).unwrap_or(0) == s)
            .map(|(i, _)| i)
            .collect();
        if !es.is_empty() {
            write!(file, "<edges>")?;
            write_index_list(&mut file, &es)?;
            writeln!(file, "</edges>")?;
        }
        let fs: Vec<usize> = face_inds
            .iter()
            .enumerate()
            .filter(|(_, &f)| grid.face_subset(f).unwrap_or(0) == s)
            .map(|(i, _)| face_file_ind[i])
            .collect();
        if !fs.is_empty() {
            write!(file, "<faces>")?;
            write_index_list(&mut file, &fs)?;
            writeln!(file, "</faces>")?;
        }
        let vls: Vec<usize> = vol_inds
            .iter()
            .enumerate()
            .filter(|(_, &vl)| grid.volume_subset(vl).unwrap_or(0) == s)
            .map(|(i, _)| i)
            .collect();
        if !vls.is_empty() {
            write!(file, "<volumes>")?;
            write_index_list(&mut file, &vls)?;
            writeln!(file, "</volumes>")?;
        }
        writeln!(file, "</subset>")?;
    }
    writeln!(file, "</subset_handler>")?;

    if grid.has_diameters() {
        let strs: Vec<String> = vert_inds
            .iter()
            .map(|&v| grid.get_diameter(v).unwrap_or(0.0).to_string())
            .collect();
        writeln!(
            file,
            "<vertex_attachment name=\"diameter\" type=\"double\" passOn=\"0\" \
             global=\"1\">{}</vertex_attachment>",
            strs.join(" ")
        )?;
    }

    writeln!(file, "</grid>")?;
    Ok(())
}

/// Writes the surface elements of the grid as a Wavefront OBJ file
pub fn save_obj(grid: &Grid3D, filename: &str) -> Result<()> {
    let file = File::create(filename)
        .map_err(|_| anyhow::anyhow!("save_obj(): could not open file {}", filename))?;
    let mut file = BufWriter::new(file);

    let vert_inds = grid.vertex_indices();
    let vert_pos = |v: usize| vert_inds.binary_search(&v).unwrap() + 1;

    for &v in vert_inds.iter() {
        let p = grid.get_vertex(v)?;
        writeln!(file, "v {} {} {}", p[0], p[1], p[2])?;
    }

    for &f in grid.face_indices().iter() {
        match grid.get_face(f)? {
            Face::Tri([a, b, c]) => {
                writeln!(file, "f {} {} {}", vert_pos(a), vert_pos(b), vert_pos(c))?;
            }
            Face::Quad([a, b, c, d]) => {
                writeln!(
                    file,
                    "f {} {} {} {}",
                    vert_pos(a),
                    vert_pos(b),
                    vert_pos(c),
                    vert_pos(d)
                )?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::base::*;

    fn sample_grid() -> Grid3D {
        let mut grid = Grid3D::new();
        let v0 = grid.add_vertex(&Vector3::new(0.0, 0.0, 0.0));
        let v1 = grid.add_vertex(&Vector3::new(1.0, 0.0, 0.0));
        let v2 = grid.add_vertex(&Vector3::new(1.0, 1.0, 0.0));
        let v3 = grid.add_vertex(&Vector3::new(0.0, 1.0, 0.0));
        grid.add_edge(v0, v1);
        let f = grid.add_face(Face::Quad([v0, v1, v2, v3]));
        grid.set_face_subset(f, 2);
        grid
    }

    #[test]
    fn ugx_contains_elements_and_subsets() {
        let path = std::env::temp_dir().join("grid3d_io_test.ugx");
        let path = path.to_str().unwrap();
        save_ugx(&sample_grid(), path).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("<vertices coords=\"3\">"));
        assert!(content.contains("<edges>0 1</edges>"));
        assert!(content.contains("<quadrilaterals>0 1 2 3</quadrilaterals>"));
        assert!(content.contains("subset name=\"pm\""));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn obj_lists_vertices_and_faces() {
        let path = std::env::temp_dir().join("grid3d_io_test.obj");
        let path = path.to_str().unwrap();
        save_obj(&sample_grid(), path).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.matches("\nv ").count() + 1, 4);
        assert!(content.contains("f 1 2 3 4"));
        std::fs::remove_file(path).ok();
    }
}
