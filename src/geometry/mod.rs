/// Geometric operations
pub mod geometry_operations;
/// Tridiagonal linear systems
pub mod tridiagonal;
