/// Branching junction geometry
pub mod branch_geometry;
/// Morphology to mesh pipelines
pub mod grid_generation;
/// Cross-section ring layouts
pub mod ring_topology;
/// Spline tube extrusion
pub mod tube_extrude;
