//! # Ohmic Core
//!
//! A lightweight, real-time companion-model circuit simulation core.
//!
//! This library solves a modified nodal formulation augmented with
//! implicit-integration companion models for reactive elements, controlled
//! sources, and switches. A circuit is assembled branch by branch
//! ([`circuit::UnstampedCircuit`]), stamped once into a pair of dense
//! runtime operators, and then advanced with a fixed-step update loop
//! ([`circuit::StampedCircuit`]) intended to run at millions of steps per
//! second for small networks.
//!
//! ## Architecture
//!
//! - [`linalg`] - dense matrix-inverse, matrix-multiply, and vector
//!   primitives the stamping pipeline is built on
//! - [`circuit`] - the two-phase (Unstamped/Stamped) circuit lifecycle,
//!   element stampers, the stamping pipeline, and the runtime update loop
//! - [`error`] - the error type for circuit construction
//! - [`ffi`] - the `extern "C"` ABI external callers link against
//!
//! ## Usage
//!
//! ```
//! use ohmic_core::circuit::{BranchLevel, IntegrationMethod, UnstampedCircuit};
//!
//! // A single resistor branch (X1) driven by an ideal voltage source,
//! // with a voltmeter across it.
//! let mut circuit = UnstampedCircuit::new(1, 1, 1, 1e-6).unwrap();
//! circuit.bran(0, Some(0), None, BranchLevel::X1, IntegrationMethod::Trapezoidal);
//! circuit.add_v(0, -10.0);
//! circuit.add_x(0, 100.0);
//! circuit.met_v(0, Some(0), None);
//!
//! let mut stamped = circuit.stamp();
//! stamped.upd_cr();
//! stamped.upd_mt();
//! assert!((stamped.get_mt(0) - 10.0).abs() < 1e-9);
//! ```
//!
//! Lifecycle is enforced at compile time: [`circuit::UnstampedCircuit::stamp`]
//! consumes `self`, so a second stamp attempt on the same circuit does not
//! compile. There is no file format, netlist language, or UI in this crate;
//! those are the host program's concern. See [`ffi`] for the boundary a
//! host attaches to.

pub mod circuit;
pub mod error;
pub mod ffi;
pub mod linalg;

pub use circuit::{StampedCircuit, UnstampedCircuit};
pub use error::{CircuitError, Result};
