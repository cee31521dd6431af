//! Error type for the Benders engine and its preprocessing stages.

use dcfl_core::DcflError;
use thiserror::Error;

/// Errors raised while bounding, preprocessing, clustering or solving.
#[derive(Debug, Error)]
pub enum BendersError {
    /// Price coefficient with a sign the active convention forbids.
    #[error("Invalid price coefficient {value} for {facility} at ({customer}, {scenario})")]
    InvalidCoefficient {
        facility: usize,
        customer: usize,
        scenario: usize,
        value: f64,
    },

    /// Non-finite price or utility bounds.
    #[error("Degenerate bounds: {0}")]
    DegenerateBounds(String),

    /// Invalid configuration.
    #[error("Invalid Benders configuration: {0}")]
    InvalidConfig(String),

    /// Instance data error.
    #[error("Instance error: {0}")]
    Instance(#[from] DcflError),

    /// The master problem has no feasible configuration.
    #[error("Master problem is infeasible: {0}")]
    MasterInfeasible(String),

    /// A limit was reached before any feasible configuration was found.
    #[error("No incumbent found before the {0} limit was reached")]
    NoIncumbent(String),

    /// LP relaxation failed inside the master backend.
    #[error("Master solver failed: {0}")]
    Solver(String),

    /// Worker pool construction failed.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// Convenience alias for engine results.
pub type BendersResult<T> = Result<T, BendersError>;
