//! Activation functions of the hidden layers
use crate::common::constants::{Device, GradTape, LEAKY_RELU_SLOPE};
use dfdx::prelude::*;
use savefile_derive::Savefile;





/// Non-linearity applied after the affine transform of a hidden layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Savefile)]
pub enum Activation
{
    Tanh,
    Softplus,
    LeakyRelu,
}

impl Default for Activation
{
    fn default() -> Self
    {
        Activation::Tanh
    }
}





impl Activation
{
    /// Apply the activation to a single pre-activation value
    pub fn value(&self, z: f64) -> f64
    {
        match self
        {
            Activation::Tanh => z.tanh(),
            // ln(1 + e^z), written to stay finite for large z
            Activation::Softplus => z.max(0.0) + (-z.abs()).exp().ln_1p(),
            Activation::LeakyRelu => if z > 0.0 { z } else { LEAKY_RELU_SLOPE * z },
        }
    }

    /// First derivative of the activation with respect to the pre-activation value
    pub fn derivative(&self, z: f64) -> f64
    {
        match self
        {
            Activation::Tanh => 1.0 - z.tanh().powi(2),
            // The logistic function, written to stay finite for large |z|
            Activation::Softplus =>
            {
                if z >= 0.0
                {
                    1.0 / (1.0 + (-z).exp())
                }
                else
                {
                    let e: f64 = z.exp();
                    e / (1.0 + e)
                }
            },
            Activation::LeakyRelu => if z > 0.0 { 1.0 } else { LEAKY_RELU_SLOPE },
        }
    }

    /// Element-wise activation of a batch of pre-activations, recorded on the tape of 'z'
    pub fn apply(&self, z: Tensor<(usize, usize), f64, Device, GradTape>) -> Tensor<(usize, usize), f64, Device, GradTape>
    {
        match self
        {
            Activation::Tanh => z.tanh(),
            Activation::Softplus =>
            {
                let positive_part = z.retaped::<GradTape>().relu();
                positive_part + (z.abs().negate().exp() + 1.0).ln()
            },
            Activation::LeakyRelu =>
            {
                let linear_part = z.retaped::<GradTape>() * LEAKY_RELU_SLOPE;
                linear_part + z.relu() * (1.0 - LEAKY_RELU_SLOPE)
            },
        }
    }

    /// Element-wise derivative as a tensor on a fresh tape, given the pre-activation 'z' and the activated output 'a'.
    ///
    /// The derivative stays differentiable with respect to the weights that produced 'z',
    /// so that the forces built from it can be trained.
    pub fn derivative_tensor(&self,
        z: &Tensor<(usize, usize), f64, Device, GradTape>,
        a: &Tensor<(usize, usize), f64, Device, GradTape>,
        dev: &Device) -> Tensor<(usize, usize), f64, Device, GradTape>
    {
        match self
        {
            Activation::Tanh => a.retaped::<GradTape>().square().negate() + 1.0,
            Activation::Softplus => z.retaped::<GradTape>().sigmoid(),
            Activation::LeakyRelu =>
            {
                // Piecewise constant: no second-order contribution
                let slopes: Vec<f64> = z.as_vec().into_iter().map(|x| self.derivative(x)).collect();
                let slopes: Tensor<(usize, usize), f64, Device> = dev.tensor_from_vec(slopes, *z.shape());
                slopes.retaped::<GradTape>()
            },
        }
    }
}
