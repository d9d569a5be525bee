//! Initialization, forward pass, saving, and loading of the global neural network, which combines the element-wise
//! neural networks into a model predicting the energy (and forces) of a batch of structures
use crate::common::constants::{Device, GradTape, DEFAULT_SEED, N_FORCE_COMPONENT, SAVEFILE_VERSION};
use crate::common::error::*;
use crate::io::input::NnPara;
use crate::io::output::{create_output_dir, element_nn_file};
use crate::matrix::{SegmentSum, SparseForceMap};
use crate::nn::activation::Activation;
use crate::nn::batch::{Batch, ElementGroup};
use crate::nn::dense::Dense;
use crate::nn::mlp::{HiddenSize, Mlp};
use std::collections::BTreeMap;
use dfdx::prelude::*;
use ndarray::Array2;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand::rngs::StdRng;
use savefile::{load_file, save_file};
use savefile_derive::Savefile;
use log::{debug, info, trace};





/// The predictions of the global NN for a batch, on the tape of the forward pass
///
/// A loss built from them can be differentiated with respect to every trainable tensor of the model.
///
/// # Fields
/// ```text
/// energy: the energy of each structure (batch_size * 1)
/// force: the force on each atom (Q * 3), only with force training; atoms sorted by structure, then by element
/// ```
pub struct Prediction
{
    pub energy: Tensor<(usize, Const<1>), f64, Device, GradTape>,
    pub force: Option<Tensor<(usize, Const<3>), f64, Device, GradTape>>,
}

impl Prediction
{
    /// The predicted energies as an array (batch_size * 1)
    pub fn energy_values(&self) -> Array2<f64>
    {
        let values: Vec<f64> = self.energy.as_vec();
        Array2::from_shape_fn((values.len(), 1), |(i, _)| values[i])
    }

    /// The predicted forces as an array (Q * 3)
    pub fn force_values(&self) -> Option<Array2<f64>>
    {
        self.force.as_ref().map(|force|
        {
            let values: Vec<f64> = force.as_vec();
            Array2::from_shape_fn((values.len() / N_FORCE_COMPONENT, N_FORCE_COMPONENT), |(i, x)| values[i * N_FORCE_COMPONENT + x])
        })
    }
}





/// The global neural network, containing one sub-nn per element.
///
/// The sub-nns are kept in a BTreeMap, so they are always visited in the sorted order of the element symbols,
/// whatever the order of the symbols given at construction.
///
/// # Fields
/// ```text
/// elementwise_models: the sub-nn of each element
/// input_length: length of the fingerprint (P)
/// n_layers: number of layers of each sub-nn
/// hidden_size: widths of the hidden layers of each sub-nn
/// dev: where the tensors are placed
/// forcetraining: if true, the forces are predicted by differentiating the energy
/// require_grad: if false, the parameters are frozen
/// ```
#[derive(Clone)]
pub struct GlobalNN
{
    elementwise_models: BTreeMap<String, Mlp>,
    input_length: usize,
    n_layers: usize,
    hidden_size: HiddenSize,
    dev: Device,
    forcetraining: bool,
    require_grad: bool,
}





// The sub-nn of an element as saved on disk
#[derive(Debug, Savefile)]
struct ElementNNSaved
{
    element: String,
    activation: Activation,
    layers: Vec<DenseSaved>,
}

#[derive(Debug, Savefile)]
struct DenseSaved
{
    input_size: usize,
    output_size: usize,
    activated: bool,
    weight: Vec<f64>,
    bias: Vec<f64>,
}










impl GlobalNN
{
    /// Construct a new global NN with tanh sub-nns
    ///
    /// # Parameters
    /// ```text
    /// unique_atoms: the element symbols, one sub-nn per symbol
    /// architecture: (input_length, n_layers, hidden_size) of each sub-nn
    /// dev: where the tensors are placed
    /// forcetraining: if true, the forward pass also predicts the forces
    /// require_grad: if false, the parameters are frozen
    /// ```
    ///
    /// # Examples
    /// ```
    /// use bpnn::common::constants::Device;
    /// use bpnn::nn::global_nn::GlobalNN;
    /// use bpnn::nn::mlp::HiddenSize;
    ///
    /// let global_nn = GlobalNN::new(&["H", "O"], (20, 3, HiddenSize::Uniform(10)), Device::default(), true, true).unwrap();
    /// assert_eq!(global_nn.unique_atoms(), vec!["H", "O"]);
    /// ```
    pub fn new<S: AsRef<str>>(unique_atoms: &[S], architecture: (usize, usize, HiddenSize), dev: Device, forcetraining: bool, require_grad: bool) -> Result<Self, NnError>
    {
        let (input_length, n_layers, hidden_size) = architecture;
        GlobalNN::build(unique_atoms, input_length, n_layers, hidden_size, Activation::Tanh, dev, forcetraining, require_grad, DEFAULT_SEED)
    }

    /// Construct a new global NN from the input parameters
    pub fn from_para(para: &NnPara) -> Result<Self, NnError>
    {
        GlobalNN::build(&para.unique_atoms, para.input_length, para.n_layers, para.hidden_size.clone(), para.activation, para.device.clone(), para.forcetraining, para.require_grad, para.seed)
    }

    #[allow(clippy::too_many_arguments)]
    fn build<S: AsRef<str>>(unique_atoms: &[S], input_length: usize, n_layers: usize, hidden_size: HiddenSize, activation: Activation, dev: Device, forcetraining: bool, require_grad: bool, seed: u64) -> Result<Self, NnError>
    {
        if unique_atoms.is_empty()
        {
            return Err(NnError::Configuration(String::from("the global NN needs at least one element")))
        }

        // Build the sub-nns in the sorted order of the symbols, so that the same seed gives the same weights
        let mut elements: Vec<&str> = unique_atoms.iter().map(|element| element.as_ref()).collect();
        elements.sort_unstable();
        elements.dedup();
        let mut rng: StdRng = StdRng::seed_from_u64(seed);
        let mut elementwise_models: BTreeMap<String, Mlp> = BTreeMap::new();
        for element in elements
        {
            let mlp: Mlp = Mlp::new(input_length, n_layers, &hidden_size, activation, &mut rng, &dev)?;
            elementwise_models.insert(element.to_string(), mlp);
        }
        debug!("Built sub-networks for {} elements, architecture ({}, {}, {:?})", elementwise_models.len(), input_length, n_layers, hidden_size);

        Ok(GlobalNN
        {
            elementwise_models,
            input_length,
            n_layers,
            hidden_size,
            dev,
            forcetraining,
            require_grad,
        })
    }

    /// The element symbols, in the order the sub-nns are visited
    pub fn unique_atoms(&self) -> Vec<&str>
    {
        self.elementwise_models.keys().map(|element| element.as_str()).collect()
    }

    pub fn elementwise_model(&self, element: &str) -> Option<&Mlp>
    {
        self.elementwise_models.get(element)
    }

    pub fn input_length(&self) -> usize
    {
        self.input_length
    }

    pub fn n_layers(&self) -> usize
    {
        self.n_layers
    }

    pub fn hidden_size(&self) -> &HiddenSize
    {
        &self.hidden_size
    }

    /// The activation function shared by the sub-nns
    pub fn activation_fn(&self) -> Activation
    {
        self.elementwise_models.values().next().map(|mlp| mlp.activation()).unwrap_or_default()
    }

    pub fn device(&self) -> &Device
    {
        &self.dev
    }

    pub fn forcetraining(&self) -> bool
    {
        self.forcetraining
    }

    pub fn requires_grad(&self) -> bool
    {
        self.require_grad
    }

    /// All the layers, element by element in sorted order
    pub fn layers(&self) -> impl Iterator<Item = &Dense>
    {
        self.elementwise_models.values().flat_map(|mlp| mlp.layers().iter())
    }

    /// Total number of trainable scalars
    pub fn n_parameters(&self) -> usize
    {
        self.layers().map(|layer| (layer.input_size() + 1) * layer.output_size()).sum()
    }

    /// Values of all the trainable tensors in row-major order, element by element in sorted order, weight before bias
    pub fn parameter_values(&self) -> Vec<Vec<f64>>
    {
        self.elementwise_models.values().flat_map(|mlp| mlp.parameter_values()).collect()
    }

    /// Gradients of all the trainable tensors, in the order of 'parameter_values'
    ///
    /// # Parameters
    /// ```text
    /// grads: the result of the reverse pass of a loss on a prediction of this model
    /// ```
    pub fn gradient_values(&self, grads: &Gradients<f64, Device>) -> Vec<Vec<f64>>
    {
        self.layers().flat_map(|layer| [grads.get(layer.weight()).as_vec(), grads.get(layer.bias()).as_vec()]).collect()
    }

    /// Overwrite all the trainable tensors, given in the order of 'parameter_values'
    pub fn set_parameter_values(&mut self, values: &[Vec<f64>]) -> Result<(), NnError>
    {
        let n_tensor: usize = self.elementwise_models.values().map(|mlp| 2 * mlp.layers().len()).sum();
        if values.len() != n_tensor
        {
            return Err(error_shape("parameter list", &n_tensor.to_string(), &values.len().to_string()))
        }
        let mut start: usize = 0;
        for mlp in self.elementwise_models.values_mut()
        {
            let end: usize = start + 2 * mlp.layers().len();
            mlp.set_parameter_values(&values[start..end], &self.dev)?;
            start = end;
        }
        Ok(())
    }

    /// Apply an optimizer step to every trainable tensor: 'step' receives the values and the gradients of each tensor
    ///
    /// A model with require_grad = false is left untouched.
    pub fn update<F>(&mut self, grads: &Gradients<f64, Device>, mut step: F) -> Result<(), NnError>
    where
        F: FnMut(&mut [f64], &[f64]),
    {
        if !self.require_grad
        {
            debug!("The parameters are frozen, skip the update");
            return Ok(())
        }
        let mut values: Vec<Vec<f64>> = self.parameter_values();
        let gradients: Vec<Vec<f64>> = self.gradient_values(grads);
        for (value, gradient) in values.iter_mut().zip(gradients.iter())
        {
            step(value, gradient);
        }
        self.set_parameter_values(&values)
    }

    /// Gradients of every trainable tensor, allocated and set to zero
    ///
    /// The forward pass starts its tape from them, so that the reverse pass of a loss holds a gradient for every tensor,
    /// including the sub-nns of the elements absent from the batch.
    pub fn alloc_grads(&self) -> Gradients<f64, Device>
    {
        // Pass every trainable tensor into a temporary tensor with a zero coefficient
        let mut temporary: Tensor<Rank0, f64, Device, GradTape> = self.dev.zeros().retaped::<GradTape>();
        for layer in self.layers()
        {
            temporary = temporary
                + layer.weight().retaped::<GradTape>().sum::<Rank0, _>() * 0.0
                + layer.bias().retaped::<GradTape>().sum::<Rank0, _>() * 0.0;
        }
        temporary.backward()
    }





    /// Forward pass through the model, predicting the energies and, with force training, the forces
    ///
    /// N: number of structures in the batch, Q: number of atoms in the batch, P: length of the fingerprint
    ///
    /// # Parameters
    /// ```text
    /// batch: the fingerprints grouped by element, and the number of structures
    /// fprimes: the sparse derivatives of the fingerprints (PQ * 3Q), required with force training
    /// prediction: the energies (N * 1) and the forces (Q * 3, only with force training)
    /// ```
    pub fn forward(&self, batch: &Batch, fprimes: Option<&SparseForceMap>) -> Result<Prediction, NnError>
    {
        // Every element in the batch needs a sub-nn
        for element in batch.elements()
        {
            if !self.elementwise_models.contains_key(element)
            {
                return Err(error_missing_network(element))
            }
        }
        let fprimes: Option<&SparseForceMap> = match (self.forcetraining, fprimes)
        {
            (true, Some(fprimes)) => Some(fprimes),
            (true, None) => return Err(error_missing_input("fprimes", "when force training is enabled")),
            (false, _) => None,
        };

        let batch_size: usize = batch.batch_size();
        let n_atom: usize = batch.n_atom();
        let p: usize = self.input_length;
        debug!("Forward pass: {} structures, {} atoms, force training {}", batch_size, n_atom, self.forcetraining);

        // The sub-nns to run, in sorted element order
        let mut visited: Vec<(&str, &Mlp, &ElementGroup)> = Vec::with_capacity(self.elementwise_models.len());
        for (element, mlp) in &self.elementwise_models
        {
            if let Some(group) = batch.get(element)
            {
                let model_inputs = group.descriptors();
                if model_inputs.ncols() != p
                {
                    return Err(error_shape(&format!("fingerprints of element '{}'", element), &format!("n * {}", p), &format!("{} * {}", model_inputs.nrows(), model_inputs.ncols())))
                }
                if group.n_atom() > 0
                {
                    visited.push((element.as_str(), mlp, group));
                }
            }
        }

        // Row position of each fingerprint block in fprimes, for the atoms in the order they are visited
        let slots: Vec<usize> = match fprimes
        {
            Some(fprimes) =>
            {
                if fprimes.shape() != (p * n_atom, N_FORCE_COMPONENT * n_atom)
                {
                    return Err(error_shape("fprimes", &format!("{} * {}", p * n_atom, N_FORCE_COMPONENT * n_atom), &format!("{} * {}", fprimes.shape().0, fprimes.shape().1)))
                }
                structure_slots(visited.iter().flat_map(|(_, _, group)| group.owners().iter().cloned()).collect())
            },
            None => Vec::new(),
        };

        // Constructs an N zero vector to accumulate the element energy contributions, starting the tape
        let zeros: Tensor<(usize,), f64, Device> = self.dev.zeros_like(&(batch_size,));
        let mut energy_pred: Tensor<(usize,), f64, Device, GradTape> = zeros.traced(self.alloc_grads());
        let mut force_pred: Option<Tensor<(usize,), f64, Device, GradTape>> = None;
        let mut offset: usize = 0;
        for (element, mlp, group) in visited
        {
            let n: usize = group.n_atom();
            trace!("Element '{}': {} atoms", element, n);

            // Each atom enters a single structure with coefficient 1, so differentiating the accumulated energy with
            // respect to the fingerprints of this element is the same as differentiating each atomic output
            let atomwise_outputs = match fprimes
            {
                Some(fprimes) =>
                {
                    let (atomwise_outputs, gradients) = mlp.forward_with_input_gradient(group.descriptors(), &self.dev)?;
                    let contribution: Tensor<(usize,), f64, Device, GradTape> = self.reconstruct_force(gradients, &slots[offset..(offset + n)], fprimes)?;
                    force_pred = Some(match force_pred
                    {
                        Some(force_pred) => force_pred + contribution,
                        None => contribution,
                    });
                    atomwise_outputs
                },
                None => mlp.forward(group.descriptors(), &self.dev)?,
            };
            offset += n;

            // Scatter-add into the owning structures
            let entries: Vec<(usize, usize, f64)> = group.owners().iter().enumerate().map(|(i, &owner)| (owner, i, 1.0)).collect();
            let scatter: SegmentSum = SegmentSum::new(batch_size, n, &entries)?;
            energy_pred = energy_pred + scatter.apply(atomwise_outputs.reshape_like(&(n,)), &self.dev)?;
        }

        let force_pred = match fprimes
        {
            Some(_) =>
            {
                let force_pred = match force_pred
                {
                    Some(force_pred) => force_pred,
                    None =>
                    {
                        let zeros: Tensor<(usize,), f64, Device> = self.dev.zeros_like(&(0,));
                        zeros.retaped::<GradTape>()
                    },
                };
                Some(force_pred.negate().reshape_like(&(n_atom, Const::<3>)))
            },
            None => None,
        };

        Ok(Prediction { energy: energy_pred.reshape_like(&(batch_size, Const::<1>)), force: force_pred })
    }

    /// Contract the dE/dG of one element with the rows of the sparse fingerprint derivatives belonging to its atoms
    ///
    /// # Parameters
    /// ```text
    /// gradients: dE/dG of the atoms of the element (n * P)
    /// slots: the position of each of these atoms once the batch is grouped by structure (n)
    /// fprimes: the sparse derivatives of the fingerprints (PQ * 3Q)
    /// contribution: fprimes^T * dE/dG restricted to these atoms (3Q)
    /// ```
    fn reconstruct_force(&self,
        gradients: Tensor<(usize, usize), f64, Device, GradTape>,
        slots: &[usize],
        fprimes: &SparseForceMap) -> Result<Tensor<(usize,), f64, Device, GradTape>, NnError>
    {
        let p: usize = self.input_length;
        let mut row_source: Vec<Option<usize>> = vec![None; fprimes.shape().0];
        for (i, &slot) in slots.iter().enumerate()
        {
            for k in 0..p
            {
                row_source[slot * p + k] = Some(i * p + k);
            }
        }
        let contraction: SegmentSum = fprimes.transpose_segments(&row_source, slots.len() * p)?;
        contraction.apply(gradients.reshape_like(&(slots.len() * p,)), &self.dev)
    }





    /// Save the global NN into the directory 'dir', one file per element
    ///
    /// # Parameters
    /// ```text
    /// dir: the output directory, created if it doesn't exist
    /// ```
    pub fn save(&self, dir: &str) -> Result<(), NnError>
    {
        create_output_dir(dir)?;
        for (element, mlp) in &self.elementwise_models
        {
            let filename: String = element_nn_file(dir, element);
            let saved: ElementNNSaved = ElementNNSaved
            {
                element: element.clone(),
                activation: mlp.activation(),
                layers: mlp.layers().iter().map(|layer| DenseSaved
                {
                    input_size: layer.input_size(),
                    output_size: layer.output_size(),
                    activated: layer.activation().is_some(),
                    weight: layer.weight().as_vec(),
                    bias: layer.bias().as_vec(),
                }).collect(),
            };
            save_file(&filename, SAVEFILE_VERSION, &saved).map_err(|err| error_file("creating", &filename, &format!("{:?}", err)))?;
        }
        info!("Saved the sub-networks of {} elements into '{}'", self.elementwise_models.len(), dir);
        Ok(())
    }

    /// Load the global NN from the directory 'dir'
    ///
    /// The architecture comes from 'para'; the weights of each element are read from its file in 'dir'.
    pub fn load(dir: &str, para: &NnPara) -> Result<Self, NnError>
    {
        let mut global_nn: GlobalNN = GlobalNN::from_para(para)?;
        let dev: Device = global_nn.dev.clone();
        for (element, mlp) in global_nn.elementwise_models.iter_mut()
        {
            let filename: String = element_nn_file(dir, element);
            let saved: ElementNNSaved = load_file(&filename, SAVEFILE_VERSION).map_err(|err| error_file("reading", &filename, &format!("{:?}", err)))?;
            if &saved.element != element
            {
                return Err(NnError::Configuration(format!("the file '{}' holds the network of element '{}' instead of '{}'", filename, saved.element, element)))
            }
            if saved.layers.len() != mlp.layers().len()
            {
                return Err(error_shape(&filename, &format!("{} layers", mlp.layers().len()), &format!("{} layers", saved.layers.len())))
            }
            let mut layers: Vec<Dense> = Vec::with_capacity(saved.layers.len());
            for (layer, layer_saved) in mlp.layers().iter().zip(saved.layers)
            {
                if (layer_saved.input_size, layer_saved.output_size) != (layer.input_size(), layer.output_size())
                {
                    return Err(error_shape(&filename, &format!("a {} -> {} layer", layer.input_size(), layer.output_size()), &format!("a {} -> {} layer", layer_saved.input_size, layer_saved.output_size)))
                }
                let activation: Option<Activation> = if layer_saved.activated { Some(saved.activation) } else { None };
                layers.push(Dense::from_values(layer_saved.input_size, layer_saved.output_size, activation, layer_saved.weight, layer_saved.bias, &dev)?);
            }
            *mlp = Mlp::from_layers(layers, saved.activation)?;
        }
        info!("Loaded the sub-networks of {} elements from '{}'", global_nn.elementwise_models.len(), dir);
        Ok(global_nn)
    }
}



/// The position of each atom once the atoms are grouped by structure in ascending owner index,
/// keeping the visiting order within a structure
fn structure_slots(owners: Vec<usize>) -> Vec<usize>
{
    let mut ordered_idx: Vec<usize> = (0..owners.len()).collect();
    ordered_idx.sort_by_key(|&n| owners[n]);
    let mut slots: Vec<usize> = vec![0; owners.len()];
    for (slot, &n) in ordered_idx.iter().enumerate()
    {
        slots[n] = slot;
    }
    slots
}
