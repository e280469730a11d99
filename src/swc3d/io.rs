use anyhow::Result;
use nalgebra::base::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};

use super::{SwcPoint, SwcType};

/// Loads a point list from an SWC file.
///
/// Each non-comment line holds 7 whitespace separated fields:
/// `<id> <type> <x> <y> <z> <radius> <parent|-1>`.
/// Coordinates and radii are multiplied by `scale`.
/// A parent id must refer to an already read record.
pub fn load_swc(filename: &str, scale: f64) -> Result<Vec<SwcPoint>> {
    let file = File::open(filename)
        .map_err(|_| anyhow::anyhow!("load_swc(): could not open file {}", filename))?;
    read_points(BufReader::new(file), scale)
}

fn read_points<R: BufRead>(reader: R, scale: f64) -> Result<Vec<SwcPoint>> {
    let mut points = Vec::new();
    let mut index_map: HashMap<i64, usize> = HashMap::new();
    let mut cur_ind = 0;

    for (line_cnt, line) in reader.lines().enumerate() {
        let line = line?;
        let line_cnt = line_cnt + 1;

        // strip comments
        let line = match line.find('#') {
            Some(pos) => &line[..pos],
            None => &line[..],
        };
        let strs: Vec<&str> = line.split_whitespace().collect();
        if strs.is_empty() {
            continue;
        }
        if strs.len() != 7 {
            return Err(anyhow::anyhow!(
                "load_swc(): line {} does not contain exactly 7 values",
                line_cnt
            ));
        }

        let parse_err =
            |field: &str| anyhow::anyhow!("load_swc(): line {}: unreadable {}", line_cnt, field);

        let id: i64 = strs[0].parse().map_err(|_| parse_err("id"))?;
        index_map.insert(id, cur_ind);

        let type_code: i64 = strs[1].parse().map_err(|_| parse_err("type"))?;
        let x: f64 = strs[2].parse().map_err(|_| parse_err("x coordinate"))?;
        let y: f64 = strs[3].parse().map_err(|_| parse_err("y coordinate"))?;
        let z: f64 = strs[4].parse().map_err(|_| parse_err("z coordinate"))?;
        let radius: f64 = strs[5].parse().map_err(|_| parse_err("radius"))?;
        let conn: i64 = strs[6].parse().map_err(|_| parse_err("parent id"))?;

        points.push(SwcPoint::new(
            SwcType::from_code(type_code),
            Vector3::new(x * scale, y * scale, z * scale),
            radius * scale,
        ));

        if conn >= 0 {
            let &parent_ind = index_map.get(&conn).ok_or_else(|| {
                anyhow::anyhow!(
                    "load_swc(): line {} refers to unknown parent index {}",
                    line_cnt,
                    conn
                )
            })?;
            points[cur_ind].conns.push(parent_ind);
            points[parent_ind].conns.push(cur_ind);
        }

        cur_ind += 1;
    }

    Ok(points)
}

/// Writes a point list as an SWC file.
///
/// Points are written depth first from a soma point of each connected
/// component, so parent references always point to an earlier line.
pub fn save_swc(points: &[SwcPoint], filename: &str) -> Result<()> {
    let mut file = File::create(filename)
        .map_err(|_| anyhow::anyhow!("save_swc(): could not open file {}", filename))?;

    let n_pts = points.len();
    let mut visited = vec![false; n_pts];
    let mut ind: i64 = 0;

    for start in 0..n_pts {
        if visited[start] {
            continue;
        }
        // prefer a soma point as the root of each component
        let mut root = start;
        if points[start].swc_type != SwcType::Soma {
            if let Some(soma) = component_soma(points, start, &visited) {
                root = soma;
            }
        }

        let mut stack: Vec<(usize, i64)> = vec![(root, -1)];
        while let Some((cur, conn)) = stack.pop() {
            if visited[cur] {
                continue;
            }
            visited[cur] = true;
            let pt = &points[cur];
            ind += 1;
            writeln!(
                file,
                "{} {} {} {} {} {} {}",
                ind,
                pt.swc_type.code(),
                pt.position[0],
                pt.position[1],
                pt.position[2],
                pt.radius,
                conn
            )?;
            for &next in pt.conns.iter() {
                if !visited[next] {
                    stack.push((next, ind));
                }
            }
        }
    }

    Ok(())
}

fn component_soma(points: &[SwcPoint], start: usize, visited: &[bool]) -> Option<usize> {
    let mut seen = vec![false; points.len()];
    let mut stack = vec![start];
    seen[start] = true;
    while let Some(cur) = stack.pop() {
        if points[cur].swc_type == SwcType::Soma {
            return Some(cur);
        }
        for &next in points[cur].conns.iter() {
            if !seen[next] && !visited[next] {
                seen[next] = true;
                stack.push(next);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\
# comment line
1 1 0.0 0.0 0.0 0.5 -1
2 3 1.0 0.0 0.0 0.1 1   # trailing comment
3 3 2.0 0.5 0.0 0.1 2
";

    #[test]
    fn reads_points_and_adjacency() {
        let pts = read_points(Cursor::new(SAMPLE), 1.0).unwrap();
        assert_eq!(pts.len(), 3);
        assert_eq!(pts[0].swc_type, SwcType::Soma);
        assert_eq!(pts[1].swc_type, SwcType::Dendrite);
        assert_eq!(pts[0].conns, vec![1]);
        assert_eq!(pts[1].conns, vec![0, 2]);
        assert_eq!(pts[2].conns, vec![1]);
        assert_eq!(pts[2].position, Vector3::new(2.0, 0.5, 0.0));
    }

    #[test]
    fn applies_scale_to_coordinates_and_radius() {
        let pts = read_points(Cursor::new(SAMPLE), 2.0).unwrap();
        assert_eq!(pts[1].position, Vector3::new(2.0, 0.0, 0.0));
        assert_eq!(pts[1].radius, 0.2);
    }

    #[test]
    fn rejects_wrong_field_count() {
        let res = read_points(Cursor::new("1 1 0.0 0.0 0.0 0.5\n"), 1.0);
        let msg = format!("{}", res.unwrap_err());
        assert!(msg.contains("line 1"), "{}", msg);
    }

    #[test]
    fn rejects_forward_parent_reference() {
        let res = read_points(Cursor::new("1 1 0.0 0.0 0.0 0.5 2\n"), 1.0);
        let msg = format!("{}", res.unwrap_err());
        assert!(msg.contains("unknown parent index 2"), "{}", msg);
    }

    #[test]
    fn nonstandard_type_maps_to_undefined() {
        let pts = read_points(Cursor::new("1 7 0.0 0.0 0.0 0.5 -1\n"), 1.0).unwrap();
        assert_eq!(pts[0].swc_type, SwcType::Undefined);
    }
}
