/// Point list input and output
pub mod io;
/// Position smoothing and short edge collapse
pub mod smoothing;
/// Point object
mod swc_point;

pub use swc_point::SwcPoint;
pub use swc_point::SwcType;
