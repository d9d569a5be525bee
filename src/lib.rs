//! BPNN
//!
//! Element-specific neural network potentials following Behler and Parrinello: the energy of a structure is the sum
//! of atomic contributions, each predicted from the fingerprint of the atom by the neural network of its element.
//! Forces are obtained by differentiating the energy with respect to the fingerprints, and contracting with the
//! sparse derivatives of the fingerprints with respect to the atomic positions.
//!
//! The fingerprints, their derivatives, the batching, and the optimizer are provided by the caller.
//!
//! Predictions and losses live on the tape of the forward pass: '.backward()' on a loss gives the gradients of every
//! trainable tensor, including the contribution of the forces, for the optimizer of the caller.
//!
//! ```
//! use bpnn::{Batch, GlobalNN, HiddenSize, Device, Loss, LossTargets, MseLoss};
//! use dfdx::tensor_ops::Backward;
//! use ndarray::{array, Array2};
//!
//! let mut global_nn = GlobalNN::new(&["H", "O"], (4, 3, HiddenSize::Uniform(8)), Device::default(), false, true).unwrap();
//! let batch = Batch::new(1)
//!     .with_group("H", Array2::from_elem((2, 4), 0.1), vec![0, 0]).unwrap()
//!     .with_group("O", Array2::from_elem((1, 4), 0.3), vec![0]).unwrap();
//! let prediction = global_nn.forward(&batch, None).unwrap();
//! assert_eq!(prediction.energy_values().dim(), (1, 1));
//!
//! let energy = array![[-14.2]];
//! let num_atoms = batch.atom_counts();
//! let targets = LossTargets::new(energy.view(), num_atoms.view());
//! let loss = MseLoss::new(0.0).forward(prediction, &targets, &global_nn).unwrap();
//! let grads = loss.backward();
//! global_nn.update(&grads, |w, g| w.iter_mut().zip(g).for_each(|(w, g)| *w -= 1.0e-3 * g)).unwrap();
//! ```

pub mod common;
pub mod io;
pub mod matrix;
pub mod nn;

pub use crate::common::constants::{Device, GradTape};
pub use crate::common::error::NnError;
pub use crate::io::input::{Para, NnPara, LossPara, LossKind};
pub use crate::matrix::{SegmentSum, SparseForceMap};
pub use crate::nn::activation::Activation;
pub use crate::nn::batch::{Batch, ElementGroup};
pub use crate::nn::global_nn::{GlobalNN, Prediction};
pub use crate::nn::loss::{Loss, LossTargets, MseLoss, MsleLoss, TanhLoss};
pub use crate::nn::mlp::{HiddenSize, Mlp};
