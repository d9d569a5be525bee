//! About the input parameters and the output files.

pub mod input;
pub mod output;
