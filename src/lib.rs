//! Krets is a small textual hardware description language and gate-level
//! simulator.
//!
//! A `.circuit` file declares circuits out of named gates, lookup tables and
//! hierarchical instances of other circuits, wired together with explicit
//! connections. [`load_circuits_from_file`] and [`parse_circuits_from_string`]
//! turn source text into [`Circuit`] values; [`Circuit::tick`] advances a
//! circuit by one simulated step, with a rising-edge hold discipline on the
//! `clk` input. [`describe`] serializes a circuit's structure for tooling.

mod circuit;
mod describe;
mod error;
mod gate;
mod lex;
mod loc;
mod parse;
mod table;
mod token;

pub use circuit::*;
pub use describe::*;
pub use error::*;
pub use gate::*;
pub use lex::*;
pub use loc::*;
pub use parse::*;
pub use table::*;
pub use token::*;

#[cfg(test)]
mod tests;
