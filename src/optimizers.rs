/// Limited-memory BFGS with Armijo backtracking.
pub mod lbfgs;

use std::error::Error;
use std::fmt;

/// Raised by an objective that can no longer make progress.
///
/// The optimizer stops and keeps the best parameters found so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurpriseConvergence(pub String);

impl fmt::Display for SurpriseConvergence {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SurpriseConvergence: {}", self.0)
    }
}

impl Error for SurpriseConvergence {}
