//! About the input parameters.
use crate::common::constants::{Device, DEFAULT_SEED, DEFAULT_INPUT_LENGTH, DEFAULT_N_LAYERS, DEFAULT_HIDDEN_SIZE};
use crate::nn::activation::Activation;
use crate::nn::loss::{Loss, MseLoss, MsleLoss, TanhLoss};
use crate::nn::mlp::HiddenSize;





/// The structure containing the parameters of the element-wise neural networks.
///
/// # Fields
/// ```text
/// unique_atoms: the element symbols present in the data set, one sub-network per symbol
/// input_length: length of the fingerprint of each atom (P)
/// n_layers: total number of layers of each sub-network (at least 2)
/// hidden_size: widths of the hidden layers
/// activation: activation function of the hidden layers
/// device: where the tensors are placed
/// forcetraining: if true, forces are predicted besides energies
/// require_grad: if false, the parameters are frozen and the optimizer should not update them
/// seed: seed of the random number generator for the weight initialization
/// ```
#[derive(Clone, Debug)]
pub struct NnPara
{
    pub unique_atoms: Vec<String>,
    pub input_length: usize,
    pub n_layers: usize,
    pub hidden_size: HiddenSize,
    pub activation: Activation,
    pub device: Device,
    pub forcetraining: bool,
    pub require_grad: bool,
    pub seed: u64,
}





/// The variants of the loss function
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LossKind
{
    /// Squared error of the per-atom energies (and forces)
    Mse,
    /// Squared error of the logarithm of the per-atom energies (and forces)
    Msle,
    /// Squared error of the per-atom energies, saturating tanh error of the forces
    Tanh,
}

impl Default for LossKind
{
    fn default() -> Self
    {
        LossKind::Mse
    }
}





/// The structure containing the parameters of the loss function.
///
/// # Fields
/// ```text
/// kind: which loss function
/// force_coefficient: weight of the force error with respect to the energy error (0 disables the force term)
/// reg_lambda: coefficient of the L2 regularization (ignored by LossKind::Tanh)
/// ```
#[derive(Clone, Debug)]
pub struct LossPara
{
    pub kind: LossKind,
    pub force_coefficient: f64,
    pub reg_lambda: f64,
}





#[derive(Clone, Debug)]
pub struct Para
{
    // Neural network parameters
    pub nn_para: NnPara,

    // Loss function parameters
    pub loss_para: LossPara,
}










impl Para
{
    pub fn new() -> Self
    {
        Para
        {
            // Neural network parameters
            nn_para: NnPara
            {
                unique_atoms: Vec::new(),
                input_length: DEFAULT_INPUT_LENGTH,
                n_layers: DEFAULT_N_LAYERS,
                hidden_size: HiddenSize::Uniform(DEFAULT_HIDDEN_SIZE),
                activation: Activation::Tanh,
                device: Device::default(),
                forcetraining: false,
                require_grad: true,
                seed: DEFAULT_SEED,
            },

            // Loss function parameters
            loss_para: LossPara
            {
                kind: LossKind::Mse,
                force_coefficient: 0.0,
                reg_lambda: 0.0,      // the regularization is inert unless this is set to non-zero
            },
        }
    }
}

impl Default for Para
{
    fn default() -> Self
    {
        Para::new()
    }
}





impl LossPara
{
    /// Build the loss function described by the parameters
    pub fn build(&self) -> Box<dyn Loss>
    {
        match self.kind
        {
            LossKind::Mse => Box::new(MseLoss::new(self.force_coefficient).with_reg_lambda(self.reg_lambda)),
            LossKind::Msle => Box::new(MsleLoss::new(self.force_coefficient).with_reg_lambda(self.reg_lambda)),
            LossKind::Tanh => Box::new(TanhLoss::new(self.force_coefficient)),
        }
    }
}





#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn defaults_follow_a_three_layer_tanh_network()
    {
        let para: Para = Para::new();
        assert_eq!(para.nn_para.input_length, 20);
        assert_eq!(para.nn_para.n_layers, 3);
        assert_eq!(para.nn_para.hidden_size, HiddenSize::Uniform(10));
        assert_eq!(para.nn_para.activation, Activation::Tanh);
        assert!(!para.nn_para.forcetraining);
        assert_eq!(para.loss_para.kind, LossKind::Mse);
        assert_eq!(para.loss_para.force_coefficient, 0.0);
        assert_eq!(para.loss_para.reg_lambda, 0.0);
    }

    #[test]
    fn enums_default_to_the_first_variant()
    {
        assert_eq!(LossKind::default(), LossKind::Mse);
        assert_eq!(Activation::default(), Activation::Tanh);
    }
}
