//! Step trace records shared by every solver in the crate.
//!
//! Each algorithmic decision point appends one [`StepRecord`] holding a
//! human-readable description and an owned snapshot of whatever state is
//! relevant at that instant. Snapshots are plain nested `f64` arrays so a
//! serialized trace can be replayed by any caller without linking against a
//! numerics library.

use nalgebra::{DMatrix, DVector};
use serde::{Serialize, Serializer};

/// A single append-only log entry describing one algorithmic decision.
#[derive(Clone, Debug, Serialize)]
pub struct StepRecord {
    /// Sequential step number assigned by the owning [`StepTrace`].
    pub step: usize,
    /// Human-readable description of the decision taken.
    pub description: String,
    /// Snapshot of the allocation matrix, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation: Option<Vec<Vec<f64>>>,
    /// Snapshot of the cost matrix, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub costs: Option<Vec<Vec<f64>>>,
    /// Snapshot of the remaining supply vector, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_supply: Option<Vec<f64>>,
    /// Snapshot of the remaining demand vector, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_demand: Option<Vec<f64>>,
}

impl StepRecord {
    /// Starts a record with a description only; the step number is assigned
    /// when the record is pushed onto a trace.
    pub fn describe(description: impl Into<String>) -> Self {
        Self {
            step: 0,
            description: description.into(),
            allocation: None,
            costs: None,
            remaining_supply: None,
            remaining_demand: None,
        }
    }

    /// Attaches a copy of the current allocation matrix.
    pub fn with_allocation(mut self, allocation: &DMatrix<f64>) -> Self {
        self.allocation = Some(matrix_rows(allocation));
        self
    }

    /// Attaches a copy of the cost matrix.
    pub fn with_costs(mut self, costs: &DMatrix<f64>) -> Self {
        self.costs = Some(matrix_rows(costs));
        self
    }

    /// Attaches a copy of the remaining supply vector.
    pub fn with_remaining_supply(mut self, supply: &DVector<f64>) -> Self {
        self.remaining_supply = Some(vector_values(supply));
        self
    }

    /// Attaches a copy of the remaining demand vector.
    pub fn with_remaining_demand(mut self, demand: &DVector<f64>) -> Self {
        self.remaining_demand = Some(vector_values(demand));
        self
    }
}

/// Ordered, append-only sequence of step records for a whole solve.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct StepTrace {
    records: Vec<StepRecord>,
}

impl StepTrace {
    /// Creates an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record, assigning it the next sequential step number.
    pub fn push(&mut self, mut record: StepRecord) {
        record.step = self.records.len();
        self.records.push(record);
    }

    /// Splices another trace onto the end of this one, renumbering its steps.
    pub fn append(&mut self, other: StepTrace) {
        for record in other.records {
            self.push(record);
        }
    }

    /// Number of records accumulated so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records have been accumulated.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over the records in step order.
    pub fn iter(&self) -> impl Iterator<Item = &StepRecord> {
        self.records.iter()
    }

    /// Read-only view of the underlying records.
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }
}

/// Copies a matrix into row-major nested arrays for snapshots and serialization.
pub fn matrix_rows(matrix: &DMatrix<f64>) -> Vec<Vec<f64>> {
    (0..matrix.nrows())
        .map(|i| (0..matrix.ncols()).map(|j| matrix[(i, j)]).collect())
        .collect()
}

/// Copies a vector into a plain array.
pub fn vector_values(vector: &DVector<f64>) -> Vec<f64> {
    vector.iter().copied().collect()
}

/// Serde adapter serializing a matrix as nested arrays of rows.
pub(crate) fn serialize_matrix<S>(matrix: &DMatrix<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    matrix_rows(matrix).serialize(serializer)
}

/// Serde adapter serializing a vector as a plain array.
pub(crate) fn serialize_vector<S>(vector: &DVector<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    vector_values(vector).serialize(serializer)
}
