/// Tube mesh and pipeline algorithms
pub mod algorithm;
/// Geometric and numeric operations
pub mod geometry;
/// Grid object and operations
pub mod grid3d;
/// Neurite object (splines, branching) and operations
pub mod neurite3d;
/// SWC point tree object and operations
pub mod swc3d;
