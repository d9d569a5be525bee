use approx::assert_abs_diff_eq;
use bpnn::{Batch, Device, GlobalNN, GradTape, HiddenSize, Loss, LossKind, LossPara, LossTargets, NnError, Para, Prediction, SparseForceMap};
use dfdx::prelude::*;
use ndarray::{array, Array1, Array2};

fn model() -> (GlobalNN, Batch, SparseForceMap)
{
    let global_nn: GlobalNN = GlobalNN::new(&["H", "O"], (2, 2, HiddenSize::Uniform(3)), Device::default(), true, true).unwrap();
    let batch: Batch = Batch::new(2)
        .with_group("H", array![[0.1, 0.2], [0.3, -0.1], [0.5, 0.0]], vec![0, 0, 1]).unwrap()
        .with_group("O", array![[1.0, 0.4], [0.8, 0.6]], vec![0, 1]).unwrap();
    let rows: Vec<usize> = (0..10).collect();
    let cols: Vec<usize> = (0..10).map(|r| (r * 7) % 15).collect();
    let values: Vec<f64> = (0..10).map(|r| 0.1 * r as f64 - 0.4).collect();
    let fprimes: SparseForceMap = SparseForceMap::from_triplets((10, 15), &rows, &cols, &values).unwrap();
    (global_nn, batch, fprimes)
}

#[test_log::test]
fn variants_are_interchangeable_through_the_parameters()
{
    let (global_nn, batch, fprimes) = model();
    let energy_targets: Array2<f64> = array![[-1.0], [0.5]];
    let force_targets: Array2<f64> = Array2::from_elem((5, 3), 0.05);
    let num_atoms: Array1<usize> = batch.atom_counts();
    assert_eq!(num_atoms, array![3, 2]);
    let targets: LossTargets = LossTargets::new(energy_targets.view(), num_atoms.view()).with_forces(force_targets.view());

    let mut loss_para: LossPara = Para::new().loss_para;
    loss_para.force_coefficient = 0.04;
    for kind in [LossKind::Mse, LossKind::Tanh]
    {
        loss_para.kind = kind;
        let loss: Box<dyn Loss> = loss_para.build();
        assert_eq!(loss.force_coefficient(), 0.04);
        let prediction: Prediction = global_nn.forward(&batch, Some(&fprimes)).unwrap();
        let value: f64 = loss.forward(prediction, &targets, &global_nn).unwrap().array();
        assert!(value.is_finite() && value > 0.0);
    }

    // Energy only: the tanh variant is exactly twice the squared-error variant
    loss_para.force_coefficient = 0.0;
    loss_para.kind = LossKind::Mse;
    let mse: f64 = loss_para.build().forward(global_nn.forward(&batch, Some(&fprimes)).unwrap(), &targets, &global_nn).unwrap().array();
    loss_para.kind = LossKind::Tanh;
    let tanh: f64 = loss_para.build().forward(global_nn.forward(&batch, Some(&fprimes)).unwrap(), &targets, &global_nn).unwrap().array();
    assert_abs_diff_eq!(tanh, 2.0 * mse, epsilon = 1.0e-12);
}

#[test_log::test]
fn log_variant_needs_positive_energies()
{
    let (global_nn, batch, _) = model();
    let num_atoms: Array1<usize> = batch.atom_counts();
    let mut loss_para: LossPara = Para::new().loss_para;
    loss_para.kind = LossKind::Msle;
    let energy_prediction = |values: Vec<f64>| -> Prediction {
        let energy: Tensor<(usize, Const<1>), f64, Device> = global_nn.device().tensor_from_vec(values, (2, Const::<1>));
        Prediction { energy: energy.retaped::<GradTape>(), force: None }
    };

    let energy_targets: Array2<f64> = array![[6.0], [2.0]];
    let targets: LossTargets = LossTargets::new(energy_targets.view(), num_atoms.view());
    let value: f64 = loss_para.build().forward(energy_prediction(vec![3.0, 4.0]), &targets, &global_nn).unwrap().array();
    assert_abs_diff_eq!(value, 0.5 * 2.0 * 2.0_f64.ln().powi(2), epsilon = 1.0e-12);

    let result = loss_para.build().forward(energy_prediction(vec![0.0, 4.0]), &targets, &global_nn);
    assert!(matches!(result, Err(NnError::NumericDomain(_))));
}
