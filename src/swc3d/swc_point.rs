use nalgebra::base::*;

/// Structural type tag of a morphology point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwcType {
    Undefined,
    Soma,
    Axon,
    Dendrite,
    Apical,
}

impl SwcType {
    /// Numeric code of the standard format (1 soma, 2 axon, 3 dendrite, 4 apical)
    pub fn from_code(code: i64) -> SwcType {
        match code {
            1 => SwcType::Soma,
            2 => SwcType::Axon,
            3 => SwcType::Dendrite,
            4 => SwcType::Apical,
            _ => SwcType::Undefined,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            SwcType::Undefined => 0,
            SwcType::Soma => 1,
            SwcType::Axon => 2,
            SwcType::Dendrite => 3,
            SwcType::Apical => 4,
        }
    }
}

/// One morphology point
///
/// Connectivity is a free-form adjacency list, not a parent/child slot,
/// so arbitrary tree topologies can be represented.
#[derive(Debug, Clone)]
pub struct SwcPoint {
    pub swc_type: SwcType,
    pub position: Vector3<f64>,
    pub radius: f64,
    pub conns: Vec<usize>,
}

impl SwcPoint {
    pub fn new(swc_type: SwcType, position: Vector3<f64>, radius: f64) -> SwcPoint {
        SwcPoint {
            swc_type,
            position,
            radius,
            conns: Vec::new(),
        }
    }

    /// Connection count, 1 for a terminal point, above 2 for a branching point
    pub fn degree(&self) -> usize {
        self.conns.len()
    }
}
