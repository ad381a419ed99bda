//! Classical transportation and assignment problem solvers with narrated,
//! replayable step traces.
//!
//! This crate implements the hand-worked algorithms taught in operations
//! research courses and records every intermediate tableau, so callers get
//! both the optimal numbers and a pedagogically faithful walkthrough. It
//! offers tools to
//!
//! - validate and balance raw cost/supply/demand input (`problem` module),
//! - build initial basic feasible solutions with the North-West Corner Rule,
//!   Least Cost, Vogel's Approximation, and Row Minima heuristics (`initial`
//!   module),
//! - refine any feasible allocation toward optimality with the MODI method
//!   and its closed-loop pivot (`modi` module), and
//! - solve one-to-one assignment problems with the Hungarian algorithm
//!   (`assignment` module).
//!
//! Every solver works on owned copies of its input, and every solution
//! serializes to plain nested arrays, so results can cross any boundary (CLI,
//! web form, network service) without dragging numeric-library types along.
//!
//! # Quick start
//!
//! ```no_run
//! use nalgebra::{DMatrix, DVector};
//! use transolve::{InitialMethod, ModiOptions, SolveOptions, TransportProblem};
//!
//! let problem = TransportProblem::new(
//!     DMatrix::from_row_slice(3, 3, &[8.0, 6.0, 10.0, 9.0, 12.0, 13.0, 14.0, 7.0, 16.0]),
//!     DVector::from_vec(vec![100.0, 150.0, 125.0]),
//!     DVector::from_vec(vec![130.0, 120.0, 125.0]),
//! )
//! .expect("validated problem");
//!
//! let options = SolveOptions::default().with_refinement(ModiOptions::default());
//! let solution = problem.solve(InitialMethod::Vam, &options);
//!
//! println!("{}: total cost {}", solution.method, solution.total_cost);
//! for record in solution.steps.iter() {
//!     println!("step {}: {}", record.step, record.description);
//! }
//! ```
//!
//! The interactive surfaces that usually sit on top of these algorithms (web
//! forms, REST endpoints, CSV export) are out of scope; this crate is the
//! engine they call into.

pub mod assignment;
pub mod error;
pub mod initial;
pub mod modi;
pub mod problem;
pub mod trace;

pub use assignment::{AssignmentProblem, AssignmentSolution};
pub use error::{Result, TransportError};
pub use initial::{
    least_cost, north_west_corner, row_minima, vogel_approximation, InitialMethod,
    TransportSolution,
};
pub use modi::{refine, ModiOptions, ModiRefinement};
pub use problem::{total_cost, DummyEntry, SolveOptions, TransportProblem};
pub use trace::{StepRecord, StepTrace};
