//! wf-well: the per-well nonlinear model.
//!
//! One well at a time: perforation flow rates on dual numbers, assembly of
//! the well residual and Jacobian blocks, Schur elimination of the well
//! block against the reservoir cells, control and operability logic, and
//! the reporting quantities (productivity index, potentials, tubing-head
//! pressure). Perforations of one well may be spread over a process group;
//! every well-wide quantity passes through the `wf-comm` seam exactly once.
//!
//! Module map:
//! - config / state: the driver-owned description and the durable snapshot
//! - primary: local unknowns, damping and the simplex chop
//! - perf_flow: the per-perforation rate kernel
//! - assembly + linsys: residual/Jacobian build and the local elimination
//! - control: the closing control equation and the THP refresh
//! - densities: connection pressure properties and hydrostatic offsets
//! - operability / rates / productivity: between-iteration diagnostics
//! - convergence + iterate: the residual verdict and the local Newton loop
//! - tracers + injectivity: optional transport units and the polymer
//!   injectivity sub-model
//! - tables: piecewise-linear closures shared by the sub-models

pub mod assembly;
pub mod config;
pub mod control;
pub mod convergence;
pub mod densities;
pub mod error;
pub mod injectivity;
pub mod iterate;
pub mod linsys;
pub mod operability;
pub mod perf_flow;
pub mod primary;
pub mod productivity;
pub mod rates;
pub mod state;
pub mod tables;
pub mod tracers;

pub use assembly::{PerfSourceTerms, assemble_well_equations};
pub use config::{
    ControlMode, PerfConfig, TracerConfig, WellConfig, WellControls, WellKind,
};
pub use convergence::{
    ConvergenceReport, ConvergenceTolerances, EquationFailure, FailureKind, WellEquation,
    well_convergence,
};
pub use error::{WellError, WellResult};
pub use iterate::{IterationConfig, iterate_to_convergence, prepare_timestep, well_potentials};
pub use linsys::{LocalLinearSystem, SchurBlock};
pub use operability::{
    IprCoefficients, OperabilityConfig, OperabilityState, OperabilityStatus,
    update_well_operability,
};
pub use primary::{PrimaryVariables, UpdateConfig};
pub use productivity::update_productivity_index;
pub use rates::{current_well_rates, well_rates_with_bhp};
pub use state::{PerfData, WellState};
