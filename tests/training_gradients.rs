use approx::assert_abs_diff_eq;
use bpnn::{Batch, Device, GlobalNN, HiddenSize, Loss, LossTargets, MseLoss, SparseForceMap, TanhLoss};
use dfdx::prelude::*;
use ndarray::{array, Array1, Array2};

const P: usize = 3;

/// Structure 0 holds an A and a B atom, structure 1 a single B atom
fn batch() -> Batch
{
    Batch::new(2)
        .with_group("A", array![[0.3, -0.4, 0.9]], vec![0]).unwrap()
        .with_group("B", array![[0.1, 0.7, -0.2], [-0.6, 0.2, 0.5]], vec![0, 1]).unwrap()
}

fn fprimes() -> SparseForceMap
{
    let mut rows: Vec<usize> = Vec::new();
    let mut cols: Vec<usize> = Vec::new();
    let mut values: Vec<f64> = Vec::new();
    for r in 0..(3 * P)
    {
        for c in 0..9
        {
            if (r + 2 * c) % 3 != 0
            {
                rows.push(r);
                cols.push(c);
                values.push(0.5 * (0.8 * r as f64 - 1.3 * c as f64).sin());
            }
        }
    }
    SparseForceMap::from_triplets((3 * P, 9), &rows, &cols, &values).unwrap()
}

fn model() -> GlobalNN
{
    GlobalNN::new(&["A", "B"], (P, 3, HiddenSize::PerLayer(vec![6, 4])), Device::default(), true, true).unwrap()
}

fn loss_value(loss: &dyn Loss, global_nn: &GlobalNN, energy: &Array2<f64>, force: &Array2<f64>) -> f64
{
    let batch: Batch = batch();
    let num_atoms: Array1<usize> = batch.atom_counts();
    let targets: LossTargets = LossTargets::new(energy.view(), num_atoms.view()).with_forces(force.view());
    let prediction = global_nn.forward(&batch, Some(&fprimes())).unwrap();
    loss.forward(prediction, &targets, global_nn).unwrap().array()
}

fn targets() -> (Array2<f64>, Array2<f64>)
{
    let energy: Array2<f64> = array![[0.8], [-0.3]];
    let force: Array2<f64> = Array2::from_shape_fn((3, 3), |(i, x)| 0.2 * (i as f64 + 0.5 * x as f64).cos());
    (energy, force)
}

#[test_log::test]
fn weight_gradients_include_the_force_term()
{
    let (energy, force) = targets();
    let batch: Batch = batch();
    let num_atoms: Array1<usize> = batch.atom_counts();
    let losses: Vec<Box<dyn Loss>> = vec![Box::new(MseLoss::new(0.5).with_reg_lambda(0.01)), Box::new(TanhLoss::new(0.5))];
    for loss in losses
    {
        let mut global_nn: GlobalNN = model();
        let targets: LossTargets = LossTargets::new(energy.view(), num_atoms.view()).with_forces(force.view());
        let prediction = global_nn.forward(&batch, Some(&fprimes())).unwrap();
        let gradients: Vec<Vec<f64>> = global_nn.gradient_values(&loss.forward(prediction, &targets, &global_nn).unwrap().backward());

        let values: Vec<Vec<f64>> = global_nn.parameter_values();
        let h: f64 = 1.0e-5;
        for t in 0..values.len()
        {
            for j in 0..values[t].len()
            {
                let mut plus: Vec<Vec<f64>> = values.clone();
                let mut minus: Vec<Vec<f64>> = values.clone();
                plus[t][j] += h;
                minus[t][j] -= h;
                global_nn.set_parameter_values(&plus).unwrap();
                let loss_plus: f64 = loss_value(loss.as_ref(), &global_nn, &energy, &force);
                global_nn.set_parameter_values(&minus).unwrap();
                let loss_minus: f64 = loss_value(loss.as_ref(), &global_nn, &energy, &force);
                assert_abs_diff_eq!(gradients[t][j], (loss_plus - loss_minus) / (2.0 * h), epsilon = 1.0e-6);
            }
        }
    }
}

#[test_log::test]
fn gradient_descent_lowers_the_loss()
{
    let (energy, force) = targets();
    let loss: MseLoss = MseLoss::new(1.0);
    let mut global_nn: GlobalNN = model();
    let batch: Batch = batch();
    let num_atoms: Array1<usize> = batch.atom_counts();
    let targets: LossTargets = LossTargets::new(energy.view(), num_atoms.view()).with_forces(force.view());

    let before: f64 = loss_value(&loss, &global_nn, &energy, &force);
    let prediction = global_nn.forward(&batch, Some(&fprimes())).unwrap();
    let grads = loss.forward(prediction, &targets, &global_nn).unwrap().backward();
    global_nn.update(&grads, |w, g| w.iter_mut().zip(g).for_each(|(w, g)| *w -= 1.0e-3 * g)).unwrap();
    let after: f64 = loss_value(&loss, &global_nn, &energy, &force);
    assert!(after < before);
}
