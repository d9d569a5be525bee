//! The fully connected neural network utilized for each element type
use crate::common::constants::{Device, GradTape, DEFAULT_OUTPUT_SIZE};
use crate::common::error::*;
use crate::nn::activation::Activation;
use crate::nn::dense::{Dense, DenseTrace};
use dfdx::prelude::*;
use ndarray::ArrayView2;
use ndarray_rand::rand::Rng;





/// Widths of the hidden layers: the same width for every hidden layer, or one width per hidden layer
#[derive(Clone, Debug, PartialEq)]
pub enum HiddenSize
{
    Uniform(usize),
    PerLayer(Vec<usize>),
}

impl HiddenSize
{
    /// Expand into one width per hidden layer, for a network of 'n_layers' layers
    pub fn expand(&self, n_layers: usize) -> Result<Vec<usize>, NnError>
    {
        if n_layers < 2
        {
            return Err(NnError::Configuration(format!("an element-wise network needs at least 2 layers, but {} is given", n_layers)))
        }
        match self
        {
            HiddenSize::Uniform(width) => Ok(vec![*width; n_layers - 1]),
            HiddenSize::PerLayer(widths) =>
            {
                if widths.len() != (n_layers - 1)
                {
                    return Err(error_hidden_size(n_layers, widths.len()))
                }
                Ok(widths.clone())
            },
        }
    }
}

impl From<usize> for HiddenSize
{
    fn from(width: usize) -> Self
    {
        HiddenSize::Uniform(width)
    }
}

impl From<Vec<usize>> for HiddenSize
{
    fn from(widths: Vec<usize>) -> Self
    {
        HiddenSize::PerLayer(widths)
    }
}





/// The element-wise network mapping a fingerprint to an atomic energy contribution.
///
/// Layers 1..L-1 are activated, the last one is purely affine so that the energy contribution is unbounded.
/// A network always holds at least one layer.
#[derive(Clone)]
pub struct Mlp
{
    layers: Vec<Dense>,
    activation: Activation,
}










impl Mlp
{
    /// Construct a fully connected network with a scalar output
    ///
    /// # Parameters
    /// ```text
    /// n_input_nodes: length of the fingerprint
    /// n_layers: total number of layers (at least 2)
    /// n_hidden_size: widths of the hidden layers
    /// activation: activation function of the hidden layers
    /// rng: the random number generator for weight initialization
    /// dev: the device holding the parameters
    /// ```
    pub fn new<R: Rng + ?Sized>(n_input_nodes: usize,
        n_layers: usize,
        n_hidden_size: &HiddenSize,
        activation: Activation,
        rng: &mut R,
        dev: &Device) -> Result<Self, NnError>
    {
        Mlp::with_output_size(n_input_nodes, DEFAULT_OUTPUT_SIZE, n_layers, n_hidden_size, activation, rng, dev)
    }

    pub fn with_output_size<R: Rng + ?Sized>(n_input_nodes: usize,
        n_output_nodes: usize,
        n_layers: usize,
        n_hidden_size: &HiddenSize,
        activation: Activation,
        rng: &mut R,
        dev: &Device) -> Result<Self, NnError>
    {
        let hidden: Vec<usize> = n_hidden_size.expand(n_layers)?;
        let mut n_neurons: Vec<usize> = Vec::with_capacity(n_layers + 1);
        n_neurons.push(n_input_nodes);
        n_neurons.extend(hidden);
        n_neurons.push(n_output_nodes);

        let mut layers: Vec<Dense> = Vec::with_capacity(n_layers);
        for i in 0..(n_layers - 1)
        {
            layers.push(Dense::new(n_neurons[i], n_neurons[i+1], Some(activation), rng, dev)?);
        }
        layers.push(Dense::new(n_neurons[n_layers-1], n_neurons[n_layers], None, rng, dev)?);

        Ok(Mlp { layers, activation })
    }

    /// Assemble a network from existing layers, checking that they chain
    pub fn from_layers(layers: Vec<Dense>, activation: Activation) -> Result<Self, NnError>
    {
        if layers.is_empty()
        {
            return Err(NnError::Configuration(String::from("an element-wise network needs at least one layer")))
        }
        for (i, pair) in layers.windows(2).enumerate()
        {
            if pair[0].output_size() != pair[1].input_size()
            {
                return Err(error_shape(&format!("input of layer {}", i + 1), &pair[0].output_size().to_string(), &pair[1].input_size().to_string()))
            }
        }
        Ok(Mlp { layers, activation })
    }

    pub fn input_size(&self) -> usize
    {
        self.layers[0].input_size()
    }

    pub fn output_size(&self) -> usize
    {
        self.layers[self.layers.len() - 1].output_size()
    }

    pub fn activation(&self) -> Activation
    {
        self.activation
    }

    pub fn layers(&self) -> &[Dense]
    {
        &self.layers
    }

    /// Number of neurons of each layer boundary, input first
    pub fn n_neurons(&self) -> Vec<usize>
    {
        let mut n_neurons: Vec<usize> = vec![self.input_size()];
        n_neurons.extend(self.layers.iter().map(|layer| layer.output_size()));
        n_neurons
    }

    /// Feed the fingerprints (n * n_input_nodes) forward, returning n * n_output_nodes on a tape
    pub fn forward(&self, inputs: ArrayView2<f64>, dev: &Device) -> Result<Tensor<(usize, usize), f64, Device, GradTape>, NnError>
    {
        let mut outputs = self.input_tensor(inputs, dev)?;
        for layer in &self.layers
        {
            outputs = layer.forward(outputs)?;
        }
        Ok(outputs)
    }

    /// Feed the fingerprints forward and differentiate the summed outputs with respect to the inputs
    ///
    /// The gradients are built from tensor operations on the tape,
    /// so the reverse pass of a loss on them reaches the weights (second order).
    ///
    /// # Parameters
    /// ```text
    /// inputs: the fingerprints (n * n_input_nodes)
    /// outputs: the network outputs (n * n_output_nodes)
    /// gradients: d(sum of outputs)/d(inputs) (n * n_input_nodes), one row per atom
    /// ```
    pub fn forward_with_input_gradient(&self, inputs: ArrayView2<f64>, dev: &Device)
        -> Result<(Tensor<(usize, usize), f64, Device, GradTape>, Tensor<(usize, usize), f64, Device, GradTape>), NnError>
    {
        // Forward pass, recording the intermediate values of every layer
        let mut outputs = self.input_tensor(inputs, dev)?;
        let mut traces: Vec<DenseTrace> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers
        {
            let (layer_outputs, trace) = layer.forward_trace(outputs)?;
            outputs = layer_outputs;
            traces.push(trace);
        }

        // Chain rule from the last layer, seeded with ones since each output enters the objective with coefficient 1
        let seed: Tensor<(usize, usize), f64, Device> = dev.ones_like(outputs.shape());
        let mut gradients = seed.retaped::<GradTape>();
        for (layer, trace) in self.layers.iter().zip(traces.iter()).rev()
        {
            gradients = layer.backward_input(gradients, trace, dev);
        }
        Ok((outputs, gradients))
    }

    /// Values of the trainable tensors in row-major order, two per layer (weight, then bias)
    pub fn parameter_values(&self) -> Vec<Vec<f64>>
    {
        self.layers.iter().flat_map(|layer| [layer.weight().as_vec(), layer.bias().as_vec()]).collect()
    }

    /// Overwrite the trainable tensors, given in the order of 'parameter_values'
    pub fn set_parameter_values(&mut self, values: &[Vec<f64>], dev: &Device) -> Result<(), NnError>
    {
        if values.len() != 2 * self.layers.len()
        {
            return Err(error_shape("parameter list", &(2 * self.layers.len()).to_string(), &values.len().to_string()))
        }
        for (layer, pair) in self.layers.iter_mut().zip(values.chunks(2))
        {
            layer.set_values(pair[0].clone(), pair[1].clone(), dev)?;
        }
        Ok(())
    }

    fn input_tensor(&self, inputs: ArrayView2<f64>, dev: &Device) -> Result<Tensor<(usize, usize), f64, Device, GradTape>, NnError>
    {
        if inputs.ncols() != self.input_size()
        {
            return Err(error_shape("fingerprints", &format!("n * {}", self.input_size()), &format!("{} * {}", inputs.nrows(), inputs.ncols())))
        }
        let inputs: Tensor<(usize, usize), f64, Device> = dev.tensor_from_vec(inputs.iter().cloned().collect(), (inputs.nrows(), inputs.ncols()));
        Ok(inputs.retaped::<GradTape>())
    }
}
