/// Tree decomposition into branch-free polylines
pub mod decompose;
/// Radius-normalized arc length quadrature
pub mod integrate;
/// Neurite objects (splines and branching metadata)
mod neurite;
/// Cubic spline fitting
pub mod spline;

pub use neurite::BranchingPoint;
pub use neurite::BranchingRegion;
pub use neurite::Neurite;
pub use neurite::NeuriteTree;
pub use neurite::Section;
