use anyhow::Result;
use clap::Parser;
use env_logger;
use std::fs;
use std::time::Instant;

use neurite_mesh_3d::swc3d::io;
use neurite_mesh_3d::swc3d::smoothing;

#[derive(Parser)]
struct Cli {
    #[arg(long = "swcinfile")]
    swc_in_path: std::path::PathBuf,
    #[arg(default_value = "1.0", long = "scale")]
    scale: f64,
    #[arg(default_value = "5", long = "smoothiter")]
    smooth_iter: usize,
    #[arg(default_value = "1.0", long = "smoothh")]
    smooth_h: f64,
    #[arg(default_value = "1.0", long = "smoothgamma")]
    smooth_gamma: f64,
    #[arg(default_value = "./output/", long = "pathout")]
    out_path: std::path::PathBuf,
    #[arg(default_value = "smoothed.swc", long = "swcoutfile")]
    swc_out_name: std::path::PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Cli::parse();

    let swc_in_path_str = args.swc_in_path.to_str().unwrap_or("");
    let out_path_str = args.out_path.to_str().unwrap();
    let swc_out_name_str = args.swc_out_name.to_str().unwrap();

    println!("Smoothing {}", swc_in_path_str);
    let mut points = io::load_swc(swc_in_path_str, args.scale)?;
    println!("{} points loaded", points.len());

    let now = Instant::now();
    smoothing::smooth_positions(&mut points, args.smooth_iter, args.smooth_h, args.smooth_gamma)?;
    smoothing::collapse_short_edges(&mut points);
    let duration = now.elapsed();
    let sec = duration.as_secs();
    let min = sec / 60;
    let sec = sec - min * 60;
    println!("Smoothing computed in {}m{}s", min, sec);
    println!("{} points after edge collapse", points.len());
    println!("");

    println!("Saving point list");
    fs::create_dir_all(out_path_str)?;
    io::save_swc(&points, &format!("{}{}", out_path_str, swc_out_name_str))?;

    Ok(())
}
