//! The calculator tool server, run as `nexus calculator` over stdio.

pub mod ops;
mod server;

pub use ops::CalcError;
pub use server::{serve_stdio, CalculatorServer};
