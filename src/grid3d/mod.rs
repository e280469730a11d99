/// Ring extrusion
pub mod extrude;
/// Grid object
mod grid3d;
/// Grid input and output
pub mod io;

pub use extrude::extrude;
pub use extrude::ExtrusionOutput;
pub use grid3d::Edge;
pub use grid3d::Face;
pub use grid3d::Grid3D;
pub use grid3d::Hexahedron;
pub use grid3d::SurfaceParams;
