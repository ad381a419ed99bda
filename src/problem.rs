//! Transportation problem containers, validation, and supply/demand balancing.

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::error::{Result, TransportError};
use crate::initial::{self, InitialMethod, TransportSolution};
use crate::modi::{self, ModiOptions};

/// Tolerance within which total supply and total demand count as balanced.
pub const BALANCE_TOLERANCE: f64 = 1e-6;

/// A validated transportation problem: an m x n cost matrix with per-source
/// supply and per-destination demand.
///
/// Construction validates dimensions and non-negativity; solving always works
/// on copies, so the instance can be reused across calls.
#[derive(Clone, Debug)]
pub struct TransportProblem {
    costs: DMatrix<f64>,
    supply: DVector<f64>,
    demand: DVector<f64>,
}

impl TransportProblem {
    /// Creates a problem after validating dimensional consistency and
    /// non-negativity of every cost, supply, and demand entry.
    pub fn new(costs: DMatrix<f64>, supply: DVector<f64>, demand: DVector<f64>) -> Result<Self> {
        if costs.nrows() == 0 || costs.ncols() == 0 {
            return Err(TransportError::empty("transportation problem"));
        }
        if costs.nrows() != supply.len() {
            return Err(TransportError::SupplyDimensionMismatch {
                cost_rows: costs.nrows(),
                supply_len: supply.len(),
            });
        }
        if costs.ncols() != demand.len() {
            return Err(TransportError::DemandDimensionMismatch {
                cost_cols: costs.ncols(),
                demand_len: demand.len(),
            });
        }
        for i in 0..costs.nrows() {
            for j in 0..costs.ncols() {
                if costs[(i, j)] < 0.0 {
                    return Err(TransportError::NegativeCost {
                        row: i,
                        col: j,
                        value: costs[(i, j)],
                    });
                }
            }
        }
        for (index, value) in supply.iter().enumerate() {
            if *value < 0.0 {
                return Err(TransportError::NegativeSupply {
                    index,
                    value: *value,
                });
            }
        }
        for (index, value) in demand.iter().enumerate() {
            if *value < 0.0 {
                return Err(TransportError::NegativeDemand {
                    index,
                    value: *value,
                });
            }
        }

        Ok(Self {
            costs,
            supply,
            demand,
        })
    }

    /// Convenience constructor from plain nested slices, the shape in which
    /// boundary callers (CLIs, web forms) usually hold the numbers. Ragged
    /// rows are rejected rather than padded or truncated.
    pub fn from_rows(costs: &[Vec<f64>], supply: &[f64], demand: &[f64]) -> Result<Self> {
        let matrix = matrix_from_rows(costs)?;
        Self::new(
            matrix,
            DVector::from_column_slice(supply),
            DVector::from_column_slice(demand),
        )
    }

    /// Number of sources (cost matrix rows).
    pub fn source_count(&self) -> usize {
        self.costs.nrows()
    }

    /// Number of destinations (cost matrix columns).
    pub fn destination_count(&self) -> usize {
        self.costs.ncols()
    }

    /// Read-only view of the cost matrix.
    pub fn costs(&self) -> &DMatrix<f64> {
        &self.costs
    }

    /// Read-only view of the supply vector.
    pub fn supply(&self) -> &DVector<f64> {
        &self.supply
    }

    /// Read-only view of the demand vector.
    pub fn demand(&self) -> &DVector<f64> {
        &self.demand
    }

    /// Sum of all supply entries.
    pub fn total_supply(&self) -> f64 {
        self.supply.iter().sum()
    }

    /// Sum of all demand entries.
    pub fn total_demand(&self) -> f64 {
        self.demand.iter().sum()
    }

    /// Whether total supply and total demand agree within [`BALANCE_TOLERANCE`].
    pub fn is_balanced(&self) -> bool {
        (self.total_supply() - self.total_demand()).abs() <= BALANCE_TOLERANCE
    }

    /// Returns a balanced copy of the problem together with a marker for any
    /// synthesized dummy row or column.
    ///
    /// A supply surplus gains a zero-cost dummy destination absorbing the
    /// excess; a demand surplus gains a zero-cost dummy source. An already
    /// balanced problem is returned unchanged with no marker.
    pub fn balanced(&self) -> (TransportProblem, Option<DummyEntry>) {
        let total_supply = self.total_supply();
        let total_demand = self.total_demand();
        let gap = total_supply - total_demand;

        if gap > BALANCE_TOLERANCE {
            let (m, n) = (self.source_count(), self.destination_count());
            debug!("balancing: adding dummy destination absorbing {gap}");
            let costs = DMatrix::from_fn(m, n + 1, |i, j| {
                if j < n {
                    self.costs[(i, j)]
                } else {
                    0.0
                }
            });
            let demand =
                DVector::from_fn(n + 1, |j, _| if j < n { self.demand[j] } else { gap });
            let balanced = TransportProblem {
                costs,
                supply: self.supply.clone(),
                demand,
            };
            (balanced, Some(DummyEntry::Destination(gap)))
        } else if gap < -BALANCE_TOLERANCE {
            let shortfall = -gap;
            let (m, n) = (self.source_count(), self.destination_count());
            debug!("balancing: adding dummy source providing {shortfall}");
            let costs = DMatrix::from_fn(m + 1, n, |i, j| {
                if i < m {
                    self.costs[(i, j)]
                } else {
                    0.0
                }
            });
            let supply = DVector::from_fn(m + 1, |i, _| {
                if i < m {
                    self.supply[i]
                } else {
                    shortfall
                }
            });
            let balanced = TransportProblem {
                costs,
                supply,
                demand: self.demand.clone(),
            };
            (balanced, Some(DummyEntry::Source(shortfall)))
        } else {
            (self.clone(), None)
        }
    }

    /// Solves the problem with the selected heuristic, optionally refining the
    /// result with MODI.
    ///
    /// When refinement runs, its step trace is renumbered onto the heuristic's
    /// trace and the refined allocation, convergence flag, and iteration count
    /// replace the heuristic's output.
    pub fn solve(&self, method: InitialMethod, options: &SolveOptions) -> TransportSolution {
        let mut solution = match method {
            InitialMethod::Nwcr => initial::north_west_corner(self),
            InitialMethod::LeastCost => initial::least_cost(self),
            InitialMethod::Vam => initial::vogel_approximation(self),
            InitialMethod::RowMinima => initial::row_minima(self),
        };

        if let Some(modi_options) = &options.refinement {
            let refinement = modi::refine(&solution.allocation, &solution.costs, modi_options);
            solution.allocation = refinement.allocation;
            solution.total_cost = refinement.total_cost;
            solution.converged = Some(refinement.converged);
            solution.iterations = Some(refinement.iterations);
            solution.steps.append(refinement.steps);
            solution.method.push_str(" + MODI (Modified Distribution)");
        }

        solution
    }
}

/// Marker recording a synthesized zero-cost row or column used to balance an
/// unbalanced problem. Reported for display only; the dummy line participates
/// in every algorithm exactly like a real one.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "amount")]
pub enum DummyEntry {
    /// A dummy source row supplying the recorded shortfall.
    Source(f64),
    /// A dummy destination column absorbing the recorded surplus.
    Destination(f64),
}

impl DummyEntry {
    /// Magnitude routed through the dummy line.
    pub fn amount(&self) -> f64 {
        match self {
            Self::Source(amount) | Self::Destination(amount) => *amount,
        }
    }
}

/// Options controlling a full transportation solve.
#[derive(Clone, Debug, Default)]
pub struct SolveOptions {
    /// MODI refinement settings; `None` returns the raw heuristic solution.
    pub refinement: Option<ModiOptions>,
}

impl SolveOptions {
    /// Enables MODI refinement with the supplied settings.
    pub fn with_refinement(mut self, options: ModiOptions) -> Self {
        self.refinement = Some(options);
        self
    }
}

/// Total shipment cost of an allocation: the element-wise product of the
/// allocation and cost matrices, summed.
pub fn total_cost(allocation: &DMatrix<f64>, costs: &DMatrix<f64>) -> f64 {
    allocation.component_mul(costs).sum()
}

/// Builds a matrix from nested rows, rejecting ragged input so no cell is
/// silently fabricated or dropped before validation runs.
pub(crate) fn matrix_from_rows(rows: &[Vec<f64>]) -> Result<DMatrix<f64>> {
    let expected = rows.first().map_or(0, Vec::len);
    for (row, values) in rows.iter().enumerate() {
        if values.len() != expected {
            return Err(TransportError::RaggedRow {
                row,
                len: values.len(),
                expected,
            });
        }
    }
    Ok(DMatrix::from_fn(rows.len(), expected, |i, j| rows[i][j]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_costs() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[8.0, 6.0, 10.0, 9.0, 12.0, 13.0, 14.0, 7.0, 16.0])
    }

    #[test]
    fn validation_rejects_dimension_mismatches() {
        let costs = sample_costs();
        let supply = DVector::from_vec(vec![100.0, 150.0]);
        let demand = DVector::from_vec(vec![130.0, 120.0, 125.0]);
        let result = TransportProblem::new(costs, supply, demand);
        assert!(matches!(
            result,
            Err(TransportError::SupplyDimensionMismatch {
                cost_rows: 3,
                supply_len: 2,
            })
        ));
    }

    #[test]
    fn validation_rejects_negative_entries() {
        let mut costs = sample_costs();
        costs[(1, 2)] = -1.0;
        let supply = DVector::from_vec(vec![100.0, 150.0, 125.0]);
        let demand = DVector::from_vec(vec![130.0, 120.0, 125.0]);
        let result = TransportProblem::new(costs, supply, demand);
        assert!(matches!(
            result,
            Err(TransportError::NegativeCost { row: 1, col: 2, .. })
        ));
    }

    #[test]
    fn balancing_adds_dummy_destination_for_supply_surplus() {
        let problem = TransportProblem::new(
            sample_costs(),
            DVector::from_vec(vec![100.0, 150.0, 125.0]),
            DVector::from_vec(vec![130.0, 120.0, 100.0]),
        )
        .expect("valid problem");

        let (balanced, dummy) = problem.balanced();
        assert_eq!(dummy, Some(DummyEntry::Destination(25.0)));
        assert_eq!(balanced.destination_count(), 4);
        assert_eq!(balanced.demand()[3], 25.0);
        for i in 0..3 {
            assert_eq!(balanced.costs()[(i, 3)], 0.0);
        }
        assert!(balanced.is_balanced());
    }

    #[test]
    fn balancing_adds_dummy_source_for_demand_surplus() {
        let problem = TransportProblem::new(
            sample_costs(),
            DVector::from_vec(vec![100.0, 150.0, 100.0]),
            DVector::from_vec(vec![130.0, 120.0, 125.0]),
        )
        .expect("valid problem");

        let (balanced, dummy) = problem.balanced();
        assert_eq!(dummy, Some(DummyEntry::Source(25.0)));
        assert_eq!(balanced.source_count(), 4);
        assert_eq!(balanced.supply()[3], 25.0);
        for j in 0..3 {
            assert_eq!(balanced.costs()[(3, j)], 0.0);
        }
    }

    #[test]
    fn balancing_is_idempotent_on_balanced_input() {
        let problem = TransportProblem::new(
            sample_costs(),
            DVector::from_vec(vec![100.0, 150.0, 125.0]),
            DVector::from_vec(vec![130.0, 120.0, 125.0]),
        )
        .expect("valid problem");

        let (balanced, dummy) = problem.balanced();
        assert!(dummy.is_none());
        assert_eq!(balanced.source_count(), problem.source_count());
        assert_eq!(balanced.destination_count(), problem.destination_count());
        assert_eq!(balanced.costs(), problem.costs());
    }

    #[test]
    fn from_rows_rejects_ragged_input() {
        // A short row must not turn into a fabricated zero-cost route.
        let result = TransportProblem::from_rows(
            &[vec![8.0, 6.0], vec![9.0]],
            &[10.0, 10.0],
            &[10.0, 10.0],
        );
        assert!(matches!(
            result,
            Err(TransportError::RaggedRow {
                row: 1,
                len: 1,
                expected: 2,
            })
        ));

        let result = TransportProblem::from_rows(
            &[vec![8.0, 6.0], vec![9.0, 7.0, 5.0]],
            &[10.0, 10.0],
            &[10.0, 10.0],
        );
        assert!(matches!(result, Err(TransportError::RaggedRow { row: 1, .. })));
    }

    #[test]
    fn total_cost_is_elementwise_dot_product() {
        let costs = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let allocation = DMatrix::from_row_slice(2, 2, &[5.0, 0.0, 0.0, 6.0]);
        assert_relative_eq!(total_cost(&allocation, &costs), 29.0);
    }
}
