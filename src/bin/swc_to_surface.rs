use anyhow::Result;
use clap::Parser;
use env_logger;
use std::fs;
use std::time::Instant;

use neurite_mesh_3d::algorithm::grid_generation::{self, SmoothingParams};
use neurite_mesh_3d::grid3d;

#[derive(Parser)]
struct Cli {
    #[arg(long = "swcinfile")]
    swc_in_path: std::path::PathBuf,
    #[arg(default_value = "1.0", long = "scale")]
    scale: f64,
    #[arg(default_value = "2.0", long = "anisotropy")]
    anisotropy: f64,
    #[arg(long = "smooth")]
    smooth: bool,
    #[arg(default_value = "5", long = "smoothiter")]
    smooth_iter: usize,
    #[arg(default_value = "1.0", long = "smoothh")]
    smooth_h: f64,
    #[arg(default_value = "1.0", long = "smoothgamma")]
    smooth_gamma: f64,
    #[arg(default_value = "./output/", long = "pathout")]
    out_path: std::path::PathBuf,
    #[arg(default_value = "surface.ugx", long = "gridoutfile")]
    grid_out_name: std::path::PathBuf,
    #[arg(long = "objoutfile")]
    obj_out_name: Option<std::path::PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Cli::parse();

    let swc_in_path_str = args.swc_in_path.to_str().unwrap_or("");
    let out_path_str = args.out_path.to_str().unwrap();
    let grid_out_name_str = args.grid_out_name.to_str().unwrap();

    let smoothing = if args.smooth {
        Some(SmoothingParams {
            n_iterations: args.smooth_iter,
            h: args.smooth_h,
            gamma: args.smooth_gamma,
        })
    } else {
        None
    };

    println!("Surface meshing of {}", swc_in_path_str);
    let now = Instant::now();
    let grid = grid_generation::surface_grid_from_swc(
        swc_in_path_str,
        args.scale,
        args.anisotropy,
        smoothing,
    )?;
    let duration = now.elapsed();
    let sec = duration.as_secs();
    let min = sec / 60;
    let sec = sec - min * 60;
    println!("Surface computed in {}m{}s", min, sec);
    println!(
        "{} vertices, {} edges, {} faces",
        grid.get_nb_vertices(),
        grid.get_nb_edges(),
        grid.get_nb_faces()
    );
    println!("");

    println!("Saving grid");
    fs::create_dir_all(out_path_str)?;
    grid3d::io::save_ugx(&grid, &format!("{}{}", out_path_str, grid_out_name_str))?;
    if let Some(obj_out_name) = args.obj_out_name {
        let obj_out_name_str = obj_out_name.to_str().unwrap();
        grid3d::io::save_obj(&grid, &format!("{}{}", out_path_str, obj_out_name_str))?;
    }

    Ok(())
}
