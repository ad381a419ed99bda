//! MODI (Modified Distribution) refinement of a basic feasible allocation.
//!
//! Each iteration solves the dual potentials over the basic cells, looks for a
//! negative opportunity cost, and pivots allocation around a closed loop in
//! the transportation tableau. Degenerate bases get a minimal epsilon
//! allocation first so the potential system stays solvable. All stopping
//! conditions short of upfront validation are reported through the step trace
//! and the `converged` flag rather than as errors.

use std::collections::HashSet;

use log::debug;
use nalgebra::DMatrix;
use serde::Serialize;

use crate::problem::total_cost;
use crate::trace::{serialize_matrix, StepRecord, StepTrace};

/// Threshold below which an allocation is snapped to zero after a pivot.
const DUST: f64 = 1e-10;

/// Magnitude of the allocation injected to break degeneracy. Equal to the
/// dust threshold so the strict `<` cleanup never removes it.
const EPSILON: f64 = 1e-10;

/// Minimum opportunity cost at or above which the solution counts as optimal.
const OPTIMALITY_TOLERANCE: f64 = -1e-10;

type Cell = (usize, usize);

/// Configuration for the MODI refiner.
#[derive(Clone, Copy, Debug)]
pub struct ModiOptions {
    /// Maximum number of improvement iterations before giving up.
    pub max_iterations: usize,
}

impl Default for ModiOptions {
    fn default() -> Self {
        Self { max_iterations: 10 }
    }
}

impl ModiOptions {
    /// Overrides the iteration cap while keeping other defaults.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Outcome of a MODI refinement run.
#[derive(Clone, Debug, Serialize)]
pub struct ModiRefinement {
    /// Refined allocation (best found when `converged` is false).
    #[serde(serialize_with = "serialize_matrix")]
    pub allocation: DMatrix<f64>,
    /// Total cost of the refined allocation.
    pub total_cost: f64,
    /// Trace of every refinement decision, numbered from zero.
    pub steps: StepTrace,
    /// Whether the optimality criterion was met.
    pub converged: bool,
    /// Number of iterations performed.
    pub iterations: usize,
}

/// Iteratively improves a basic feasible allocation toward optimality.
///
/// The caller's matrices are never mutated; the refiner works on copies.
/// Supply and demand are implied by the allocation's row and column sums.
pub fn refine(
    allocation: &DMatrix<f64>,
    costs: &DMatrix<f64>,
    options: &ModiOptions,
) -> ModiRefinement {
    let mut allocation = allocation.clone_owned();
    let costs = costs.clone_owned();
    let (m, n) = (costs.nrows(), costs.ncols());

    let mut trace = StepTrace::new();
    let initial_cost = total_cost(&allocation, &costs);
    trace.push(
        StepRecord::describe(format!("Initial solution with cost {initial_cost}"))
            .with_allocation(&allocation)
            .with_costs(&costs),
    );

    let mut converged = false;
    let mut dead_end = false;
    let mut iteration = 0;

    while iteration < options.max_iterations {
        iteration += 1;

        if is_degenerate(&allocation) {
            if let Some((i, j)) = cheapest_zero_cell(&allocation, &costs) {
                allocation[(i, j)] = EPSILON;
                debug!("iteration {iteration}: epsilon injected at ({i}, {j})");
                trace.push(
                    StepRecord::describe("Added epsilon allocation to handle degeneracy")
                        .with_allocation(&allocation)
                        .with_costs(&costs),
                );
            }
        }

        let basic = basic_cells(&allocation);

        let Some((u, v)) = solve_potentials(&basic, &costs, m, n) else {
            trace.push(
                StepRecord::describe(
                    "Could not compute all u and v potentials - basic cells are disconnected; stopping",
                )
                .with_allocation(&allocation)
                .with_costs(&costs),
            );
            dead_end = true;
            break;
        };

        let u_summary = u
            .iter()
            .enumerate()
            .map(|(i, value)| format!("u{}={value:.2}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let v_summary = v
            .iter()
            .enumerate()
            .map(|(j, value)| format!("v{}={value:.2}", j + 1))
            .collect::<Vec<_>>()
            .join(", ");
        trace.push(
            StepRecord::describe(format!("Computed potentials: {u_summary}, {v_summary}"))
                .with_allocation(&allocation)
                .with_costs(&costs),
        );

        // Opportunity costs d_ij = c_ij - u_i - v_j, scanned row-major so ties
        // resolve to the first cell encountered.
        let mut min_opportunity = f64::INFINITY;
        let mut entering = (0, 0);
        for i in 0..m {
            for j in 0..n {
                let d = costs[(i, j)] - u[i] - v[j];
                if d < min_opportunity {
                    min_opportunity = d;
                    entering = (i, j);
                }
            }
        }

        if min_opportunity >= OPTIMALITY_TOLERANCE {
            converged = true;
            trace.push(
                StepRecord::describe(format!(
                    "Optimal solution found. All opportunity costs >= 0. Min = {min_opportunity:.6}"
                ))
                .with_allocation(&allocation)
                .with_costs(&costs),
            );
            break;
        }

        trace.push(
            StepRecord::describe(format!(
                "Most negative opportunity cost: d_{}{} = {min_opportunity:.3}",
                entering.0 + 1,
                entering.1 + 1
            ))
            .with_allocation(&allocation)
            .with_costs(&costs),
        );

        let Some(loop_path) = find_loop(&basic, entering, m, n) else {
            trace.push(
                StepRecord::describe("Could not find closed loop - stopping")
                    .with_allocation(&allocation)
                    .with_costs(&costs),
            );
            dead_end = true;
            break;
        };

        // Theta is bounded by the smallest allocation among the cells that
        // will shrink (odd positions around the loop).
        let theta = loop_path
            .iter()
            .skip(1)
            .step_by(2)
            .map(|&(i, j)| allocation[(i, j)])
            .fold(f64::INFINITY, f64::min);

        let loop_summary = loop_path
            .iter()
            .map(|&(i, j)| format!("({}, {})", i + 1, j + 1))
            .collect::<Vec<_>>()
            .join(" -> ");
        trace.push(
            StepRecord::describe(format!("Found loop: {loop_summary}, theta = {theta}"))
                .with_allocation(&allocation)
                .with_costs(&costs),
        );

        for (position, &(i, j)) in loop_path.iter().enumerate() {
            if position % 2 == 0 {
                allocation[(i, j)] += theta;
            } else {
                allocation[(i, j)] -= theta;
            }
        }

        let new_cost = total_cost(&allocation, &costs);
        debug!("iteration {iteration}: pivot theta {theta}, cost {new_cost}");
        trace.push(
            StepRecord::describe(format!(
                "Updated allocation. New cost: {new_cost}, Improvement: {:.3}",
                initial_cost - new_cost
            ))
            .with_allocation(&allocation)
            .with_costs(&costs),
        );

        // Numerical dust from the pivot leaves the basis entirely.
        allocation.apply(|value| {
            if *value < DUST {
                *value = 0.0;
            }
        });
    }

    if !converged && !dead_end {
        trace.push(
            StepRecord::describe(format!(
                "Iteration limit of {} reached without convergence",
                options.max_iterations
            ))
            .with_allocation(&allocation)
            .with_costs(&costs),
        );
    }

    let total_cost = total_cost(&allocation, &costs);
    ModiRefinement {
        allocation,
        total_cost,
        steps: trace,
        converged,
        iterations: iteration,
    }
}

/// Occupied (non-zero) cells in row-major order.
fn basic_cells(allocation: &DMatrix<f64>) -> Vec<Cell> {
    let mut cells = Vec::new();
    for i in 0..allocation.nrows() {
        for j in 0..allocation.ncols() {
            if allocation[(i, j)] > 0.0 {
                cells.push((i, j));
            }
        }
    }
    cells
}

/// A basic feasible solution needs m + n - 1 occupied cells; fewer leaves the
/// potential system underdetermined.
fn is_degenerate(allocation: &DMatrix<f64>) -> bool {
    let expected = allocation.nrows() + allocation.ncols() - 1;
    basic_cells(allocation).len() < expected
}

/// First zero cell of smallest cost in row-major order.
fn cheapest_zero_cell(allocation: &DMatrix<f64>, costs: &DMatrix<f64>) -> Option<Cell> {
    let mut best: Option<Cell> = None;
    let mut best_cost = f64::INFINITY;
    for i in 0..allocation.nrows() {
        for j in 0..allocation.ncols() {
            if allocation[(i, j)] == 0.0 && costs[(i, j)] < best_cost {
                best_cost = costs[(i, j)];
                best = Some((i, j));
            }
        }
    }
    best
}

/// Solves `u_i + v_j = c_ij` over the basic cells by fixed-point propagation
/// anchored at `u_0 = 0`. Returns `None` when the basic-cell graph is
/// disconnected and some potential stays unknown.
fn solve_potentials(basic: &[Cell], costs: &DMatrix<f64>, m: usize, n: usize) -> Option<(Vec<f64>, Vec<f64>)> {
    let mut u: Vec<Option<f64>> = vec![None; m];
    let mut v: Vec<Option<f64>> = vec![None; n];
    u[0] = Some(0.0);

    loop {
        let mut changed = false;
        for &(i, j) in basic {
            match (u[i], v[j]) {
                (Some(ui), None) => {
                    v[j] = Some(costs[(i, j)] - ui);
                    changed = true;
                }
                (None, Some(vj)) => {
                    u[i] = Some(costs[(i, j)] - vj);
                    changed = true;
                }
                _ => {}
            }
        }
        if !changed {
            break;
        }
    }

    let u: Option<Vec<f64>> = u.into_iter().collect();
    let v: Option<Vec<f64>> = v.into_iter().collect();
    Some((u?, v?))
}

/// Searches for a closed loop through the basic cells starting at the
/// entering cell: moves alternate strictly between horizontal and vertical,
/// and the cycle closes back onto the start's row or column with even length
/// of at least four. The first cycle found wins; a horizontal-first branch is
/// tried before a vertical-first one.
fn find_loop(basic: &[Cell], entering: Cell, m: usize, n: usize) -> Option<Vec<Cell>> {
    let mut row_cols: Vec<Vec<usize>> = vec![Vec::new(); m];
    let mut col_rows: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(i, j) in basic {
        row_cols[i].push(j);
        col_rows[j].push(i);
    }

    let mut path = vec![entering];
    let mut visited = HashSet::from([entering]);

    if extend_loop(&mut path, &mut visited, true, &row_cols, &col_rows) {
        return Some(path);
    }
    if extend_loop(&mut path, &mut visited, false, &row_cols, &col_rows) {
        return Some(path);
    }
    None
}

/// Depth-first extension of the loop path. `horizontal` is the orientation the
/// next move must take; backtracking restores `path` and `visited`.
fn extend_loop(
    path: &mut Vec<Cell>,
    visited: &mut HashSet<Cell>,
    horizontal: bool,
    row_cols: &[Vec<usize>],
    col_rows: &[Vec<usize>],
) -> bool {
    let (current_i, current_j) = path[path.len() - 1];
    let (start_i, start_j) = path[0];

    if path.len() >= 4 && path.len() % 2 == 0 {
        let closes = if horizontal {
            current_i == start_i && current_j != start_j
        } else {
            current_j == start_j && current_i != start_i
        };
        if closes {
            return true;
        }
    }

    if horizontal {
        for &j in &row_cols[current_i] {
            let next = (current_i, j);
            if visited.contains(&next) {
                continue;
            }
            path.push(next);
            visited.insert(next);
            if extend_loop(path, visited, false, row_cols, col_rows) {
                return true;
            }
            path.pop();
            visited.remove(&next);
        }
    } else {
        for &i in &col_rows[current_j] {
            let next = (i, current_j);
            if visited.contains(&next) {
                continue;
            }
            path.push(next);
            visited.insert(next);
            if extend_loop(path, visited, true, row_cols, col_rows) {
                return true;
            }
            path.pop();
            visited.remove(&next);
        }
    }

    false
}
