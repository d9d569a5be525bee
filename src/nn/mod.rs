//! A module about the element-wise neural network potential: one sub-network per element, whose atomic outputs add
//! up to the energy of each structure.

pub mod activation;
pub mod dense;
pub mod mlp;
pub mod batch;
pub mod global_nn;
pub mod loss;
