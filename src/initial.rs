//! Initial basic feasible solution heuristics for the transportation problem.
//!
//! All four heuristics share the same contract: balance the problem, allocate
//! until supply and demand are exhausted, and record one trace entry per
//! allocation decision. They differ only in how the next cell is chosen.
//! Vogel's approximation is the only one with genuine look-ahead and usually
//! lands much closer to the optimum than the other three.

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::problem::{total_cost, DummyEntry, TransportProblem};
use crate::trace::{serialize_matrix, serialize_vector, StepRecord, StepTrace};

/// Threshold below which a remaining quantity counts as exhausted.
const DUST: f64 = 1e-10;

/// Selector for the initial-solution heuristic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialMethod {
    /// North-West Corner Rule: top-left sweep, ignores cost.
    Nwcr,
    /// Least Cost Method: global cheapest available cell first.
    LeastCost,
    /// Vogel's Approximation Method: penalty-driven look-ahead.
    Vam,
    /// Row Minima: cheapest cell per row, rows processed in order.
    RowMinima,
}

impl InitialMethod {
    /// Human-readable method name carried on the solution.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Nwcr => "North-West Corner Rule (NWCR)",
            Self::LeastCost => "Least Cost Method",
            Self::Vam => "Vogel's Approximation Method (VAM)",
            Self::RowMinima => "Row Minima (Special Case)",
        }
    }
}

/// Terminal artifact of a transportation solve.
///
/// The allocation, costs, and vectors refer to the balanced (possibly
/// dummy-augmented) problem. `converged` and `iterations` are filled only when
/// MODI refinement ran.
#[derive(Clone, Debug, Serialize)]
pub struct TransportSolution {
    /// Name of the method (or method chain) that produced the solution.
    pub method: String,
    /// Final allocation over the balanced tableau.
    #[serde(serialize_with = "serialize_matrix")]
    pub allocation: DMatrix<f64>,
    /// Total shipment cost of the final allocation.
    pub total_cost: f64,
    /// Ordered trace of every algorithmic decision.
    pub steps: StepTrace,
    /// Balanced cost matrix the solve ran against.
    #[serde(serialize_with = "serialize_matrix")]
    pub costs: DMatrix<f64>,
    /// Balanced supply vector.
    #[serde(serialize_with = "serialize_vector")]
    pub supply: DVector<f64>,
    /// Balanced demand vector.
    #[serde(serialize_with = "serialize_vector")]
    pub demand: DVector<f64>,
    /// Marker for a synthesized dummy source or destination, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dummy_added: Option<DummyEntry>,
    /// Whether MODI reached optimality (present only after refinement).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converged: Option<bool>,
    /// MODI iterations performed (present only after refinement).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<usize>,
}

/// Working state shared by the heuristics: the balanced tableau plus the
/// running allocation, remainders, and step trace.
struct Tableau {
    costs: DMatrix<f64>,
    allocation: DMatrix<f64>,
    remaining_supply: DVector<f64>,
    remaining_demand: DVector<f64>,
    supply: DVector<f64>,
    demand: DVector<f64>,
    dummy: Option<DummyEntry>,
    trace: StepTrace,
}

impl Tableau {
    fn new(problem: &TransportProblem) -> Self {
        let (balanced, dummy) = problem.balanced();
        let (m, n) = (balanced.source_count(), balanced.destination_count());
        let mut tableau = Self {
            allocation: DMatrix::zeros(m, n),
            remaining_supply: balanced.supply().clone(),
            remaining_demand: balanced.demand().clone(),
            costs: balanced.costs().clone(),
            supply: balanced.supply().clone(),
            demand: balanced.demand().clone(),
            dummy,
            trace: StepTrace::new(),
        };
        tableau.log("Initial problem setup");
        tableau
    }

    fn shape(&self) -> (usize, usize) {
        (self.costs.nrows(), self.costs.ncols())
    }

    /// Allocates `min(remaining_supply[i], remaining_demand[j])` to cell
    /// (i, j) and returns the amount.
    fn allocate(&mut self, i: usize, j: usize) -> f64 {
        let amount = self.remaining_supply[i].min(self.remaining_demand[j]);
        self.allocation[(i, j)] += amount;
        self.remaining_supply[i] -= amount;
        self.remaining_demand[j] -= amount;
        amount
    }

    fn log(&mut self, description: impl Into<String>) {
        let record = StepRecord::describe(description)
            .with_allocation(&self.allocation)
            .with_costs(&self.costs)
            .with_remaining_supply(&self.remaining_supply)
            .with_remaining_demand(&self.remaining_demand);
        self.trace.push(record);
    }

    fn into_solution(self, method: InitialMethod) -> TransportSolution {
        let total_cost = total_cost(&self.allocation, &self.costs);
        debug!("{} finished with total cost {total_cost}", method.label());
        TransportSolution {
            method: method.label().to_string(),
            total_cost,
            allocation: self.allocation,
            steps: self.trace,
            costs: self.costs,
            supply: self.supply,
            demand: self.demand,
            dummy_added: self.dummy,
            converged: None,
            iterations: None,
        }
    }
}

/// North-West Corner Rule: starting at the top-left cell, allocate as much as
/// possible, then advance down when the row's supply is exhausted and right
/// when the column's demand is. Both indices may advance at once, which yields
/// a degenerate solution; the MODI refiner tolerates that. Costs play no role.
pub fn north_west_corner(problem: &TransportProblem) -> TransportSolution {
    let mut tableau = Tableau::new(problem);
    let (m, n) = tableau.shape();

    let (mut i, mut j) = (0, 0);
    while i < m && j < n {
        let amount = tableau.allocate(i, j);
        tableau.log(format!("Allocate {amount} to cell ({}, {})", i + 1, j + 1));

        if tableau.remaining_supply[i] <= DUST {
            i += 1;
        }
        if tableau.remaining_demand[j] <= DUST {
            j += 1;
        }
    }

    tableau.into_solution(InitialMethod::Nwcr)
}

/// Least Cost Method: repeatedly allocate to the globally cheapest cell whose
/// row still has supply and whose column still has demand. Ties are broken by
/// row-major scan order.
pub fn least_cost(problem: &TransportProblem) -> TransportSolution {
    let mut tableau = Tableau::new(problem);
    let (m, n) = tableau.shape();

    let mut row_active = vec![true; m];
    let mut col_active = vec![true; n];

    while tableau.remaining_supply.iter().sum::<f64>() > DUST
        && tableau.remaining_demand.iter().sum::<f64>() > DUST
    {
        let mut best: Option<(usize, usize)> = None;
        let mut best_cost = f64::INFINITY;
        for i in 0..m {
            if !row_active[i] {
                continue;
            }
            for j in 0..n {
                if col_active[j] && tableau.costs[(i, j)] < best_cost {
                    best_cost = tableau.costs[(i, j)];
                    best = Some((i, j));
                }
            }
        }
        let Some((i, j)) = best else {
            break;
        };

        let amount = tableau.allocate(i, j);
        tableau.log(format!(
            "Allocate {amount} to cell ({}, {}) with cost {best_cost}",
            i + 1,
            j + 1
        ));

        if tableau.remaining_supply[i] <= DUST {
            row_active[i] = false;
        }
        if tableau.remaining_demand[j] <= DUST {
            col_active[j] = false;
        }
    }

    tableau.into_solution(InitialMethod::LeastCost)
}

/// Penalty of a line: second-smallest active cost minus smallest, or 0 when
/// fewer than two active cells remain in the line.
fn line_penalty(costs: impl Iterator<Item = f64>) -> f64 {
    let mut smallest = f64::INFINITY;
    let mut second = f64::INFINITY;
    for cost in costs {
        if cost < smallest {
            second = smallest;
            smallest = cost;
        } else if cost < second {
            second = cost;
        }
    }
    if second.is_finite() {
        second - smallest
    } else {
        0.0
    }
}

/// Vogel's Approximation Method: each round computes row and column penalties
/// over the active tableau, picks the line with the strictly largest penalty
/// (the best row wins a tie against the best column), and allocates to that
/// line's cheapest active cell.
pub fn vogel_approximation(problem: &TransportProblem) -> TransportSolution {
    let mut tableau = Tableau::new(problem);
    let (m, n) = tableau.shape();

    let mut active_rows: Vec<usize> = (0..m).collect();
    let mut active_cols: Vec<usize> = (0..n).collect();

    while !active_rows.is_empty() && !active_cols.is_empty() {
        let row_penalties: Vec<f64> = active_rows
            .iter()
            .map(|&i| {
                if active_cols.len() >= 2 {
                    line_penalty(active_cols.iter().map(|&j| tableau.costs[(i, j)]))
                } else {
                    0.0
                }
            })
            .collect();
        let col_penalties: Vec<f64> = active_cols
            .iter()
            .map(|&j| {
                if active_rows.len() >= 2 {
                    line_penalty(active_rows.iter().map(|&i| tableau.costs[(i, j)]))
                } else {
                    0.0
                }
            })
            .collect();

        let penalty_summary = active_rows
            .iter()
            .zip(&row_penalties)
            .map(|(&i, penalty)| format!("Row {}: {penalty}", i + 1))
            .chain(
                active_cols
                    .iter()
                    .zip(&col_penalties)
                    .map(|(&j, penalty)| format!("Col {}: {penalty}", j + 1)),
            )
            .collect::<Vec<_>>()
            .join(", ");

        let best_row = index_of_max(&row_penalties);
        let best_col = index_of_max(&col_penalties);
        let best_row_penalty = best_row.map_or(f64::NEG_INFINITY, |idx| row_penalties[idx]);
        let best_col_penalty = best_col.map_or(f64::NEG_INFINITY, |idx| col_penalties[idx]);

        // Row preference on ties is part of the method's contract.
        let (i, j, selection) = if best_row_penalty >= best_col_penalty {
            let i = active_rows[best_row.unwrap_or(0)];
            let j = argmin_in_line(&active_cols, |j| tableau.costs[(i, j)]);
            let selection = format!(
                "Selected row {} (penalty {best_row_penalty}), min cost cell ({}, {})",
                i + 1,
                i + 1,
                j + 1
            );
            (i, j, selection)
        } else {
            let j = active_cols[best_col.unwrap_or(0)];
            let i = argmin_in_line(&active_rows, |i| tableau.costs[(i, j)]);
            let selection = format!(
                "Selected col {} (penalty {best_col_penalty}), min cost cell ({}, {})",
                j + 1,
                i + 1,
                j + 1
            );
            (i, j, selection)
        };

        let amount = tableau.allocate(i, j);
        tableau.log(format!(
            "Penalties - {penalty_summary}. {selection}. Allocate {amount}"
        ));

        if tableau.remaining_supply[i] <= DUST {
            active_rows.retain(|&row| row != i);
        }
        if tableau.remaining_demand[j] <= DUST {
            active_cols.retain(|&col| col != j);
        }
    }

    tableau.into_solution(InitialMethod::Vam)
}

/// First index holding the maximum value, or `None` for an empty slice.
fn index_of_max(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, value) in values.iter().enumerate() {
        if best.map_or(true, |idx| *value > values[idx]) {
            best = Some(index);
        }
    }
    best
}

/// First member of `line` minimizing `cost_of`, in the line's own order.
fn argmin_in_line(line: &[usize], cost_of: impl Fn(usize) -> f64) -> usize {
    let mut best = line[0];
    let mut best_cost = cost_of(best);
    for &index in &line[1..] {
        if cost_of(index) < best_cost {
            best_cost = cost_of(index);
            best = index;
        }
    }
    best
}

/// Row Minima: for each row in order, repeatedly allocate to the cheapest
/// column that still has demand until the row's supply is exhausted.
pub fn row_minima(problem: &TransportProblem) -> TransportSolution {
    let mut tableau = Tableau::new(problem);
    let (m, n) = tableau.shape();

    for i in 0..m {
        while tableau.remaining_supply[i] > DUST {
            let mut best: Option<usize> = None;
            let mut best_cost = f64::INFINITY;
            for j in 0..n {
                if tableau.remaining_demand[j] > DUST && tableau.costs[(i, j)] < best_cost {
                    best_cost = tableau.costs[(i, j)];
                    best = Some(j);
                }
            }
            let Some(j) = best else {
                break;
            };

            let amount = tableau.allocate(i, j);
            tableau.log(format!(
                "Row {}: Allocate {amount} to min cost cell ({}, {}) with cost {best_cost}",
                i + 1,
                i + 1,
                j + 1
            ));
        }
    }

    tableau.into_solution(InitialMethod::RowMinima)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    fn scenario() -> TransportProblem {
        TransportProblem::new(
            DMatrix::from_row_slice(3, 3, &[8.0, 6.0, 10.0, 9.0, 12.0, 13.0, 14.0, 7.0, 16.0]),
            DVector::from_vec(vec![100.0, 150.0, 125.0]),
            DVector::from_vec(vec![130.0, 120.0, 125.0]),
        )
        .expect("valid scenario")
    }

    fn assert_feasible(solution: &TransportSolution) {
        for i in 0..solution.allocation.nrows() {
            let row_sum: f64 = solution.allocation.row(i).iter().sum();
            assert_relative_eq!(row_sum, solution.supply[i], epsilon = 1e-6);
        }
        for j in 0..solution.allocation.ncols() {
            let col_sum: f64 = solution.allocation.column(j).iter().sum();
            assert_relative_eq!(col_sum, solution.demand[j], epsilon = 1e-6);
        }
    }

    #[test]
    fn north_west_corner_follows_the_corner_path() {
        let solution = north_west_corner(&scenario());
        assert_feasible(&solution);
        assert_eq!(solution.method, "North-West Corner Rule (NWCR)");
        assert_relative_eq!(solution.allocation[(0, 0)], 100.0);
        assert_relative_eq!(solution.allocation[(1, 0)], 30.0);
        assert_relative_eq!(solution.allocation[(1, 1)], 120.0);
        assert_relative_eq!(solution.allocation[(2, 2)], 125.0);
        assert_relative_eq!(solution.total_cost, 4510.0, epsilon = 1e-6);
    }

    #[test]
    fn least_cost_prefers_cheap_cells() {
        let solution = least_cost(&scenario());
        assert_feasible(&solution);
        // Cheapest cell (0, 1) at cost 6 is served first and absorbs row 0.
        assert_relative_eq!(solution.allocation[(0, 1)], 100.0);
        assert_relative_eq!(solution.total_cost, 3850.0, epsilon = 1e-6);
    }

    #[test]
    fn vogel_approximation_reaches_the_optimum_here() {
        let solution = vogel_approximation(&scenario());
        assert_feasible(&solution);
        assert_relative_eq!(solution.total_cost, 3350.0, epsilon = 1e-6);
    }

    #[test]
    fn row_minima_sweeps_rows_in_order() {
        let solution = row_minima(&scenario());
        assert_feasible(&solution);
        assert_relative_eq!(solution.allocation[(0, 1)], 100.0);
        assert_relative_eq!(solution.allocation[(1, 0)], 130.0);
        assert_relative_eq!(solution.total_cost, 4010.0, epsilon = 1e-6);
    }

    #[test]
    fn vam_tie_breaks_in_favor_of_rows() {
        let problem = TransportProblem::new(
            DMatrix::from_row_slice(2, 2, &[5.0, 9.0, 1.0, 5.0]),
            DVector::from_vec(vec![10.0, 20.0]),
            DVector::from_vec(vec![15.0, 15.0]),
        )
        .expect("valid problem");

        // Best row penalty and best column penalty are both 4; the row must
        // win, which puts the first allocation at (0, 0) rather than (1, 0).
        let solution = vogel_approximation(&problem);
        assert_relative_eq!(solution.allocation[(0, 0)], 10.0);
        assert_relative_eq!(solution.allocation[(1, 0)], 5.0);
        assert_relative_eq!(solution.allocation[(1, 1)], 15.0);
    }

    #[test]
    fn heuristics_balance_unbalanced_input_first() {
        let problem = TransportProblem::new(
            DMatrix::from_row_slice(3, 3, &[8.0, 6.0, 10.0, 9.0, 12.0, 13.0, 14.0, 7.0, 16.0]),
            DVector::from_vec(vec![100.0, 150.0, 125.0]),
            DVector::from_vec(vec![130.0, 120.0, 100.0]),
        )
        .expect("valid problem");

        let solution = north_west_corner(&problem);
        assert_eq!(solution.allocation.ncols(), 4);
        assert_eq!(solution.dummy_added, Some(DummyEntry::Destination(25.0)));
        assert_feasible(&solution);
    }

    #[test]
    fn total_cost_matches_elementwise_product() {
        let solution = least_cost(&scenario());
        let recomputed = solution.allocation.component_mul(&solution.costs).sum();
        assert_relative_eq!(solution.total_cost, recomputed, epsilon = 1e-9);
    }

    #[test]
    fn every_step_carries_a_snapshot() {
        let solution = north_west_corner(&scenario());
        assert!(solution.steps.len() >= 2);
        for record in solution.steps.iter() {
            assert!(record.allocation.is_some());
            assert!(record.remaining_supply.is_some());
            assert!(record.remaining_demand.is_some());
        }
    }

    #[test]
    fn method_selector_parses_snake_case_tags() {
        let method: InitialMethod = serde_json::from_str("\"least_cost\"").expect("known tag");
        assert_eq!(method, InitialMethod::LeastCost);
        let method: InitialMethod = serde_json::from_str("\"nwcr\"").expect("known tag");
        assert_eq!(method, InitialMethod::Nwcr);
    }
}
