use thiserror::Error;

/// Unified error type for `transolve` operations.
///
/// Only upfront input validation produces errors. Conditions that arise during
/// a solve (degeneracy dead ends, missing pivot loops, iteration caps) are
/// reported through the solution's step trace and flags instead.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Raised when the cost matrix row count disagrees with the supply vector.
    #[error("cost matrix has {cost_rows} rows but supply has {supply_len} entries")]
    SupplyDimensionMismatch { cost_rows: usize, supply_len: usize },

    /// Raised when the cost matrix column count disagrees with the demand vector.
    #[error("cost matrix has {cost_cols} columns but demand has {demand_len} entries")]
    DemandDimensionMismatch { cost_cols: usize, demand_len: usize },

    /// Raised when any cost entry is negative.
    #[error("cost at ({row}, {col}) must be non-negative, found {value}")]
    NegativeCost { row: usize, col: usize, value: f64 },

    /// Raised when any supply entry is negative.
    #[error("supply at index {index} must be non-negative, found {value}")]
    NegativeSupply { index: usize, value: f64 },

    /// Raised when any demand entry is negative.
    #[error("demand at index {index} must be non-negative, found {value}")]
    NegativeDemand { index: usize, value: f64 },

    /// Raised when nested cost rows have inconsistent lengths.
    #[error("cost row {row} has {len} entries but row 0 has {expected}")]
    RaggedRow { row: usize, len: usize, expected: usize },

    /// Raised when a cost matrix has no rows or no columns.
    #[error("{context} requires a non-empty cost matrix")]
    EmptyProblem { context: &'static str },
}

impl TransportError {
    /// Helper for the empty-matrix validation shared by both problem kinds.
    pub fn empty(context: &'static str) -> Self {
        Self::EmptyProblem { context }
    }
}

/// Type alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, TransportError>;
