//! The dense layer, i.e. the building block of the element-wise neural networks
use crate::common::constants::{Device, GradTape, TANH_GAIN};
use crate::common::error::*;
use crate::nn::activation::Activation;
use dfdx::prelude::*;
use ndarray::Array2;
use ndarray_rand::RandomExt;
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::Uniform;





/// A dense layer y = activation(x W^T + b), or y = x W^T + b when there is no activation
///
/// # Fields
/// ```text
/// weight: the weight matrix (output_size * input_size)
/// bias: the bias vector (output_size), always present
/// activation: the non-linearity after the affine transform (None for the output layer)
/// ```
#[derive(Clone)]
pub struct Dense
{
    weight: Tensor<(usize, usize), f64, Device>,
    bias: Tensor<(usize,), f64, Device>,
    activation: Option<Activation>,
}





/// Intermediate values of a forward pass, kept for the input gradient
///
/// Both tensors sit on fresh tapes; their history stays on the tape of the layer output.
///
/// # Fields
/// ```text
/// pre_activation: x W^T + b (n * output_size)
/// output: the activated output (n * output_size)
/// ```
pub struct DenseTrace
{
    pub pre_activation: Tensor<(usize, usize), f64, Device, GradTape>,
    pub output: Tensor<(usize, usize), f64, Device, GradTape>,
}










impl Dense
{
    /// Construct a dense layer with initialized parameters
    ///
    /// # Parameters
    /// ```text
    /// input_size: number of input features
    /// output_size: number of output features
    /// activation: the activation function (None for a purely affine layer)
    /// rng: the random number generator for weight initialization
    /// dev: the device holding the parameters
    /// ```
    pub fn new<R: Rng + ?Sized>(input_size: usize,
        output_size: usize,
        activation: Option<Activation>,
        rng: &mut R,
        dev: &Device) -> Result<Self, NnError>
    {
        if (input_size == 0) || (output_size == 0)
        {
            return Err(NnError::Configuration(format!("a dense layer needs non-zero sizes, but it is {} -> {}", input_size, output_size)))
        }
        let mut dense: Dense = Dense
        {
            weight: dev.zeros_like(&(output_size, input_size)),
            bias: dev.zeros_like(&(output_size,)),
            activation,
        };
        dense.reset_parameters(rng, dev);
        Ok(dense)
    }

    /// Construct a dense layer from given parameter values, the weight in row-major order
    pub fn from_values(input_size: usize,
        output_size: usize,
        activation: Option<Activation>,
        weight: Vec<f64>,
        bias: Vec<f64>,
        dev: &Device) -> Result<Self, NnError>
    {
        if (input_size == 0) || (output_size == 0)
        {
            return Err(NnError::Configuration(format!("a dense layer needs non-zero sizes, but it is {} -> {}", input_size, output_size)))
        }
        let mut dense: Dense = Dense
        {
            weight: dev.zeros_like(&(output_size, input_size)),
            bias: dev.zeros_like(&(output_size,)),
            activation,
        };
        dense.set_values(weight, bias, dev)?;
        Ok(dense)
    }

    /// Weight initialization scheme: zero bias, Kaiming-uniform weight with the tanh gain
    pub fn reset_parameters<R: Rng + ?Sized>(&mut self, rng: &mut R, dev: &Device)
    {
        let (output_size, input_size): (usize, usize) = *self.weight.shape();
        let bound: f64 = TANH_GAIN * (3.0 / input_size as f64).sqrt();
        let weight: Array2<f64> = Array2::random_using((output_size, input_size), Uniform::new(-bound, bound), rng);
        self.weight = dev.tensor_from_vec(weight.iter().cloned().collect(), (output_size, input_size));
        self.bias = dev.zeros_like(&(output_size,));
    }

    /// Overwrite the parameters, keeping the architecture
    pub fn set_values(&mut self, weight: Vec<f64>, bias: Vec<f64>, dev: &Device) -> Result<(), NnError>
    {
        let (output_size, input_size): (usize, usize) = *self.weight.shape();
        if weight.len() != output_size * input_size
        {
            return Err(error_shape("weight", &format!("{} * {}", output_size, input_size), &weight.len().to_string()))
        }
        if bias.len() != output_size
        {
            return Err(error_shape("bias", &output_size.to_string(), &bias.len().to_string()))
        }
        self.weight = dev.tensor_from_vec(weight, (output_size, input_size));
        self.bias = dev.tensor_from_vec(bias, (output_size,));
        Ok(())
    }

    pub fn input_size(&self) -> usize
    {
        self.weight.shape().1
    }

    pub fn output_size(&self) -> usize
    {
        self.weight.shape().0
    }

    pub fn activation(&self) -> Option<Activation>
    {
        self.activation
    }

    pub fn weight(&self) -> &Tensor<(usize, usize), f64, Device>
    {
        &self.weight
    }

    pub fn bias(&self) -> &Tensor<(usize,), f64, Device>
    {
        &self.bias
    }

    /// Feed a batch of inputs (n * input_size) forward through the layer
    pub fn forward(&self, inputs: Tensor<(usize, usize), f64, Device, GradTape>) -> Result<Tensor<(usize, usize), f64, Device, GradTape>, NnError>
    {
        let pre_activation = self.affine(inputs)?;
        Ok(match &self.activation
        {
            Some(activation) => activation.apply(pre_activation),
            None => pre_activation,
        })
    }

    /// Feed a batch forward, keeping the pre-activation and the output for the input gradient
    pub fn forward_trace(&self, inputs: Tensor<(usize, usize), f64, Device, GradTape>)
        -> Result<(Tensor<(usize, usize), f64, Device, GradTape>, DenseTrace), NnError>
    {
        let pre_activation = self.affine(inputs)?;
        let pre_activation_copy = pre_activation.retaped::<GradTape>();
        let output = match &self.activation
        {
            Some(activation) => activation.apply(pre_activation),
            None => pre_activation,
        };
        let trace: DenseTrace = DenseTrace
        {
            pre_activation: pre_activation_copy,
            output: output.retaped::<GradTape>(),
        };
        Ok((output, trace))
    }

    /// Gradient with respect to the layer input, given the gradient with respect to the layer output
    ///
    /// The result is recorded on the tape, so it can be differentiated again with respect to the parameters.
    ///
    /// # Parameters
    /// ```text
    /// upstream: d(objective)/d(output) (n * output_size)
    /// trace: the intermediate values recorded by the forward pass
    /// downstream: d(objective)/d(input) (n * input_size)
    /// ```
    pub fn backward_input(&self,
        upstream: Tensor<(usize, usize), f64, Device, GradTape>,
        trace: &DenseTrace,
        dev: &Device) -> Tensor<(usize, usize), f64, Device, GradTape>
    {
        let d_pre = match &self.activation
        {
            Some(activation) => upstream * activation.derivative_tensor(&trace.pre_activation, &trace.output, dev),
            None => upstream,
        };
        d_pre.matmul(self.weight.retaped::<GradTape>())
    }

    fn affine(&self, inputs: Tensor<(usize, usize), f64, Device, GradTape>) -> Result<Tensor<(usize, usize), f64, Device, GradTape>, NnError>
    {
        let (n, width): (usize, usize) = *inputs.shape();
        if width != self.input_size()
        {
            return Err(error_shape("layer input", &format!("n * {}", self.input_size()), &format!("{} * {}", n, width)))
        }
        let bias = self.bias.retaped::<GradTape>().broadcast_like::<_, Axis<0>>(&(n, self.output_size()));
        Ok(inputs.matmul(self.weight.retaped::<GradTape>().permute::<_, Axes2<1, 0>>()) + bias)
    }
}
