use anyhow::Result;

/// Tridiagonal system solver (Thomas algorithm).
///
/// Stores the forward-elimination state so several right hand sides can be
/// solved against the same matrix.
pub struct TridiagonalSystem {
    diag: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl TridiagonalSystem {
    /// Builds a system of size n from its three bands.
    ///
    /// `lower` and `upper` have length n-1, `diag` has length n.
    pub fn new(lower: Vec<f64>, diag: Vec<f64>, upper: Vec<f64>) -> Result<TridiagonalSystem> {
        if diag.is_empty() {
            return Err(anyhow::Error::msg("TridiagonalSystem::new(): empty system"));
        }
        if lower.len() + 1 != diag.len() || upper.len() + 1 != diag.len() {
            return Err(anyhow::Error::msg(
                "TridiagonalSystem::new(): band lengths do not match",
            ));
        }
        Ok(TridiagonalSystem { diag, lower, upper })
    }

    pub fn len(&self) -> usize {
        self.diag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diag.is_empty()
    }

    /// Solves the system for one right hand side, in place.
    pub fn solve(&self, rhs: &mut [f64]) -> Result<()> {
        let n = self.diag.len();
        if rhs.len() != n {
            return Err(anyhow::Error::msg(
                "TridiagonalSystem::solve(): rhs length does not match",
            ));
        }
        let mut diag = self.diag.clone();
        for i in 1..n {
            if diag[i - 1].abs() < 1e-300 {
                return Err(anyhow::Error::msg(
                    "TridiagonalSystem::solve(): zero pivot",
                ));
            }
            let w = self.lower[i - 1] / diag[i - 1];
            diag[i] -= w * self.upper[i - 1];
            rhs[i] -= w * rhs[i - 1];
        }
        if diag[n - 1].abs() < 1e-300 {
            return Err(anyhow::Error::msg(
                "TridiagonalSystem::solve(): zero pivot",
            ));
        }
        rhs[n - 1] /= diag[n - 1];
        for i in (0..n - 1).rev() {
            rhs[i] = (rhs[i] - self.upper[i] * rhs[i + 1]) / diag[i];
        }
        Ok(())
    }
}
