//! Loss functions combining the per-atom energy error and the force error.
//!
//! Energies are compared per atom (divided by the number of atoms of their structure), forces are divided by the
//! square root of the number of atoms of their structure. Eq. (26) in A. Khorshidi, A.A. Peterson,
//! Computer Physics Communications 207 (2016) 310-324.
//!
//! The losses are recorded on the tape of the prediction, so '.backward()' on them gives the gradients of every
//! trainable tensor of the model, through the forces as well.
use crate::common::constants::{Device, GradTape, N_FORCE_COMPONENT};
use crate::common::error::*;
use crate::nn::global_nn::{GlobalNN, Prediction};
use dfdx::prelude::*;
use ndarray::{ArrayView1, ArrayView2};
use log::debug;





/// Targets handed to a loss function alongside the prediction
///
/// # Fields
/// ```text
/// energy: target energy of each structure (N * 1)
/// num_atoms: number of atoms of each structure (N)
/// force: target force of each atom (Q * 3), needed when the force coefficient is positive
/// ```
#[derive(Clone, Debug)]
pub struct LossTargets<'a>
{
    pub energy: ArrayView2<'a, f64>,
    pub num_atoms: ArrayView1<'a, usize>,
    pub force: Option<ArrayView2<'a, f64>>,
}

impl<'a> LossTargets<'a>
{
    pub fn new(energy: ArrayView2<'a, f64>, num_atoms: ArrayView1<'a, usize>) -> Self
    {
        LossTargets
        {
            energy,
            num_atoms,
            force: None,
        }
    }

    pub fn with_forces(mut self, force: ArrayView2<'a, f64>) -> Self
    {
        self.force = Some(force);
        self
    }
}





/// A scalar objective of the energy (and force) predictions
pub trait Loss
{
    /// Evaluate the loss on the tape of the prediction
    ///
    /// # Parameters
    /// ```text
    /// prediction: the output of the forward pass of 'model'
    /// targets: target energies (and forces), and number of atoms per structure
    /// model: the global NN, whose parameters enter the regularization term
    /// loss: the scalar loss, ready for '.backward()'
    /// ```
    fn forward(&self, prediction: Prediction, targets: &LossTargets, model: &GlobalNN) -> Result<Tensor<Rank0, f64, Device, GradTape>, NnError>;

    fn force_coefficient(&self) -> f64;
}





/// Squared error of the per-atom energies and forces, with L2 regularization
#[derive(Clone, Debug)]
pub struct MseLoss
{
    alpha: f64,
    reg_lambda: f64,
}

/// Squared error of the logarithm of the per-atom energies and forces, with L2 regularization.
///
/// Every per-atom energy (and, with the force term, every normalized force component) must be positive.
#[derive(Clone, Debug)]
pub struct MsleLoss
{
    alpha: f64,
    reg_lambda: f64,
}

/// Squared error of the per-atom energies, and the sum of tanh(|error|) of the normalized forces.
///
/// Unlike MseLoss and MsleLoss, there is neither the 0.5 factor nor the regularization term, and the force
/// coefficient only switches the force term on.
#[derive(Clone, Debug)]
pub struct TanhLoss
{
    alpha: f64,
}










impl MseLoss
{
    pub fn new(force_coefficient: f64) -> Self
    {
        MseLoss { alpha: force_coefficient, reg_lambda: 0.0 }
    }

    pub fn with_reg_lambda(mut self, reg_lambda: f64) -> Self
    {
        self.reg_lambda = reg_lambda;
        self
    }
}

impl Loss for MseLoss
{
    fn forward(&self, prediction: Prediction, targets: &LossTargets, model: &GlobalNN) -> Result<Tensor<Rank0, f64, Device, GradTape>, NnError>
    {
        let dev: &Device = model.device();
        let (energy_pred, num_atoms) = checked_energy(prediction.energy, targets)?;
        let energy_per_atom = scaled(energy_pred, &num_atoms, dev);
        let targets_per_atom: Vec<f64> = divided(targets.energy.iter().cloned(), &num_atoms);
        let energy_loss = squared_error(energy_per_atom, targets_per_atom, dev);

        let loss = if self.alpha > 0.0
        {
            let (force_pred, force_targets) = checked_forces(prediction.force, targets, &num_atoms)?;
            let num_atoms_force: Vec<f64> = force_normalizer(&num_atoms);
            let force_pred_per_atom = scaled(force_pred, &num_atoms_force, dev);
            let force_targets_per_atom: Vec<f64> = divided(force_targets.into_iter(), &num_atoms_force);
            let force_loss = squared_error(force_pred_per_atom, force_targets_per_atom, dev) * (self.alpha / N_FORCE_COMPONENT as f64);
            debug!("MSE loss: energy {:.8e}, force {:.8e}", energy_loss.array(), force_loss.array());
            (energy_loss + force_loss) * 0.5
        }
        else
        {
            debug!("MSE loss: energy {:.8e}", energy_loss.array());
            energy_loss * 0.5
        };
        Ok(regularized(loss, self.reg_lambda, model))
    }

    fn force_coefficient(&self) -> f64
    {
        self.alpha
    }
}





impl MsleLoss
{
    pub fn new(force_coefficient: f64) -> Self
    {
        MsleLoss { alpha: force_coefficient, reg_lambda: 0.0 }
    }

    pub fn with_reg_lambda(mut self, reg_lambda: f64) -> Self
    {
        self.reg_lambda = reg_lambda;
        self
    }
}

impl Loss for MsleLoss
{
    fn forward(&self, prediction: Prediction, targets: &LossTargets, model: &GlobalNN) -> Result<Tensor<Rank0, f64, Device, GradTape>, NnError>
    {
        let dev: &Device = model.device();
        let (energy_pred, num_atoms) = checked_energy(prediction.energy, targets)?;
        let energy_per_atom = checked_ln(scaled(energy_pred, &num_atoms, dev), "predicted energy per atom")?;
        let targets_per_atom: Vec<f64> = checked_ln_values(divided(targets.energy.iter().cloned(), &num_atoms), "target energy per atom")?;
        let energy_loss = squared_error(energy_per_atom, targets_per_atom, dev);

        let loss = if self.alpha > 0.0
        {
            let (force_pred, force_targets) = checked_forces(prediction.force, targets, &num_atoms)?;
            let num_atoms_force: Vec<f64> = force_normalizer(&num_atoms);
            let force_pred_per_atom = checked_ln(scaled(force_pred, &num_atoms_force, dev), "predicted normalized force")?;
            let force_targets_per_atom: Vec<f64> = checked_ln_values(divided(force_targets.into_iter(), &num_atoms_force), "target normalized force")?;
            let force_loss = squared_error(force_pred_per_atom, force_targets_per_atom, dev) * (self.alpha / N_FORCE_COMPONENT as f64);
            debug!("MSLE loss: energy {:.8e}, force {:.8e}", energy_loss.array(), force_loss.array());
            (energy_loss + force_loss) * 0.5
        }
        else
        {
            debug!("MSLE loss: energy {:.8e}", energy_loss.array());
            energy_loss * 0.5
        };
        Ok(regularized(loss, self.reg_lambda, model))
    }

    fn force_coefficient(&self) -> f64
    {
        self.alpha
    }
}





impl TanhLoss
{
    pub fn new(force_coefficient: f64) -> Self
    {
        TanhLoss { alpha: force_coefficient }
    }
}

impl Loss for TanhLoss
{
    fn forward(&self, prediction: Prediction, targets: &LossTargets, model: &GlobalNN) -> Result<Tensor<Rank0, f64, Device, GradTape>, NnError>
    {
        let dev: &Device = model.device();
        let (energy_pred, num_atoms) = checked_energy(prediction.energy, targets)?;
        let energy_per_atom = scaled(energy_pred, &num_atoms, dev);
        let targets_per_atom: Vec<f64> = divided(targets.energy.iter().cloned(), &num_atoms);
        let energy_loss = squared_error(energy_per_atom, targets_per_atom, dev);

        if self.alpha > 0.0
        {
            let (force_pred, force_targets) = checked_forces(prediction.force, targets, &num_atoms)?;
            let num_atoms_force: Vec<f64> = force_normalizer(&num_atoms);
            let force_pred_per_atom = scaled(force_pred, &num_atoms_force, dev);
            let force_targets_per_atom = constant(divided(force_targets.into_iter(), &num_atoms_force), dev);
            // Saturates for outliers
            let force_loss: Tensor<Rank0, f64, Device, GradTape> = (force_pred_per_atom - force_targets_per_atom).abs().tanh().sum();
            debug!("Tanh loss: energy {:.8e}, force {:.8e}", energy_loss.array(), force_loss.array());
            Ok(energy_loss + force_loss)
        }
        else
        {
            debug!("Tanh loss: energy {:.8e}", energy_loss.array());
            Ok(energy_loss)
        }
    }

    fn force_coefficient(&self) -> f64
    {
        self.alpha
    }
}





/// Check the energy shapes, flatten the predicted energies, and convert the number of atoms of each structure into floats
fn checked_energy(energy_pred: Tensor<(usize, Const<1>), f64, Device, GradTape>, targets: &LossTargets)
    -> Result<(Tensor<(usize,), f64, Device, GradTape>, Vec<f64>), NnError>
{
    let n_struct: usize = targets.num_atoms.len();
    let n_pred: usize = energy_pred.shape().0;
    if n_pred != n_struct
    {
        return Err(error_shape("energy_pred", &format!("{} rows", n_struct), &format!("{} rows", n_pred)))
    }
    if targets.energy.dim() != (n_struct, 1)
    {
        return Err(error_shape("energy_targets", &format!("({}, 1) like energy_pred", n_struct), &format!("{:?}", targets.energy.dim())))
    }
    if let Some(i) = targets.num_atoms.iter().position(|&n| n == 0)
    {
        return Err(NnError::NumericDomain(format!("structure {} has no atom, its per-atom energy is undefined", i)))
    }
    let num_atoms: Vec<f64> = targets.num_atoms.iter().map(|&n| n as f64).collect();
    Ok((energy_pred.reshape_like(&(n_struct,)), num_atoms))
}

/// Check that the forces are present and have one row per atom, and flatten them
fn checked_forces(force_pred: Option<Tensor<(usize, Const<3>), f64, Device, GradTape>>, targets: &LossTargets, num_atoms: &[f64])
    -> Result<(Tensor<(usize,), f64, Device, GradTape>, Vec<f64>), NnError>
{
    let force_pred = force_pred.ok_or_else(|| error_missing_input("force_pred", "when the force coefficient is positive"))?;
    let force_targets: ArrayView2<f64> = targets.force.ok_or_else(|| error_missing_input("force_targets", "when the force coefficient is positive"))?;
    let n_atom: usize = num_atoms.iter().sum::<f64>() as usize;
    let n_pred: usize = force_pred.shape().0;
    if n_pred != n_atom
    {
        return Err(error_shape("force_pred", &format!("{} * {}", n_atom, N_FORCE_COMPONENT), &format!("{} * {}", n_pred, N_FORCE_COMPONENT)))
    }
    if force_targets.dim() != (n_atom, N_FORCE_COMPONENT)
    {
        return Err(error_shape("force_targets", &format!("{} * {}", n_atom, N_FORCE_COMPONENT), &format!("{} * {}", force_targets.nrows(), force_targets.ncols())))
    }
    Ok((force_pred.reshape_like(&(n_atom * N_FORCE_COMPONENT,)), force_targets.iter().cloned().collect()))
}

/// The square root of the number of atoms of its structure, for each force component of each atom of the structure
fn force_normalizer(num_atoms: &[f64]) -> Vec<f64>
{
    num_atoms.iter().flat_map(|&n| std::iter::repeat(n.sqrt()).take(n as usize * N_FORCE_COMPONENT)).collect()
}

/// Divide each value by its divisor
fn divided<I: Iterator<Item = f64>>(values: I, divisors: &[f64]) -> Vec<f64>
{
    values.zip(divisors.iter()).map(|(x, n)| x / n).collect()
}

fn constant(values: Vec<f64>, dev: &Device) -> Tensor<(usize,), f64, Device>
{
    let len: usize = values.len();
    dev.tensor_from_vec(values, (len,))
}

/// Divide each value by its divisor on the tape
fn scaled(values: Tensor<(usize,), f64, Device, GradTape>, divisors: &[f64], dev: &Device) -> Tensor<(usize,), f64, Device, GradTape>
{
    values / constant(divisors.to_vec(), dev)
}

fn squared_error(pred: Tensor<(usize,), f64, Device, GradTape>, targets: Vec<f64>, dev: &Device) -> Tensor<Rank0, f64, Device, GradTape>
{
    (pred - constant(targets, dev)).square().sum()
}

fn checked_ln(values: Tensor<(usize,), f64, Device, GradTape>, variable: &str) -> Result<Tensor<(usize,), f64, Device, GradTape>, NnError>
{
    if let Some(&value) = values.as_vec().iter().find(|&&x| !(x > 0.0))
    {
        return Err(error_domain(variable, "the logarithm", value))
    }
    Ok(values.ln())
}

fn checked_ln_values(values: Vec<f64>, variable: &str) -> Result<Vec<f64>, NnError>
{
    if let Some(&value) = values.iter().find(|&&x| !(x > 0.0))
    {
        return Err(error_domain(variable, "the logarithm", value))
    }
    Ok(values.into_iter().map(f64::ln).collect())
}

fn regularized(loss: Tensor<Rank0, f64, Device, GradTape>, reg_lambda: f64, model: &GlobalNN) -> Tensor<Rank0, f64, Device, GradTape>
{
    if reg_lambda == 0.0
    {
        return loss
    }
    match l2_regularization(model)
    {
        Some(l2_reg) =>
        {
            debug!("L2 regularization {:.8e}", l2_reg.array());
            loss + l2_reg * reg_lambda
        },
        None => loss,
    }
}

/// Sum of the L2 norms of all the trainable tensors of the model, on a fresh tape
///
/// All-zero tensors (such as freshly initialized biases) have a zero subgradient and are left out;
/// None when every tensor is zero.
pub fn l2_regularization(model: &GlobalNN) -> Option<Tensor<Rank0, f64, Device, GradTape>>
{
    let mut l2_reg: Option<Tensor<Rank0, f64, Device, GradTape>> = None;
    for layer in model.layers()
    {
        let weight = layer.weight().retaped::<GradTape>().reshape_like(&(layer.input_size() * layer.output_size(),));
        let bias = layer.bias().retaped::<GradTape>();
        for norm in [l2_norm(weight), l2_norm(bias)].into_iter().flatten()
        {
            l2_reg = Some(match l2_reg
            {
                Some(l2_reg) => l2_reg + norm,
                None => norm,
            });
        }
    }
    l2_reg
}

fn l2_norm(w: Tensor<(usize,), f64, Device, GradTape>) -> Option<Tensor<Rank0, f64, Device, GradTape>>
{
    if w.as_vec().iter().all(|&x| x == 0.0)
    {
        return None
    }
    let squared: Tensor<Rank0, f64, Device, GradTape> = w.square().sum();
    Some(squared.sqrt())
}
