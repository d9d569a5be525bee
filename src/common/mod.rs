//! Constants and error information shared by the whole crate.

pub mod constants;
pub mod error;
