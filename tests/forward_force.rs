use approx::assert_abs_diff_eq;
use bpnn::{Batch, Device, GlobalNN, HiddenSize, NnError, NnPara, Para, Prediction, SparseForceMap};
use ndarray::{Array1, Array2};

const P: usize = 3;

/// Element and owner structure of each atom, listed structure by structure, then element by element.
/// This is the order in which the predicted forces come out.
const ATOMS: [(&str, usize); 5] = [("A", 0), ("B", 0), ("A", 1), ("B", 1), ("B", 1)];

/// A linear "position -> fingerprint" map G = D R + c, standing in for a featurizer
struct LinearFeaturizer
{
    d: Array2<f64>,
    c: Array1<f64>,
}

impl LinearFeaturizer
{
    fn new(translation_invariant: bool) -> Self
    {
        let n_atom: usize = ATOMS.len();
        let mut d: Array2<f64> = Array2::from_shape_fn((P * n_atom, 3 * n_atom), |(r, c)| 0.3 * (1.7 * r as f64 + 0.9 * c as f64 + 0.1).sin());
        if translation_invariant
        {
            // Remove the mean over atoms of each Cartesian component, so that a rigid shift leaves G unchanged
            for mut row in d.rows_mut()
            {
                for x in 0..3
                {
                    let mean: f64 = (0..n_atom).map(|j| row[3 * j + x]).sum::<f64>() / n_atom as f64;
                    for j in 0..n_atom
                    {
                        row[3 * j + x] -= mean;
                    }
                }
            }
        }
        let c: Array1<f64> = Array1::from_shape_fn(P * n_atom, |r| 0.2 * (0.5 * r as f64).cos());
        LinearFeaturizer { d, c }
    }

    fn batch(&self, positions: &Array1<f64>) -> Batch
    {
        let g: Array1<f64> = self.d.dot(positions) + &self.c;
        let mut groups: Vec<(&str, Vec<f64>, Vec<usize>)> = vec![("A", Vec::new(), Vec::new()), ("B", Vec::new(), Vec::new())];
        for (i, &(element, owner)) in ATOMS.iter().enumerate()
        {
            let group = groups.iter_mut().find(|group| group.0 == element).unwrap();
            group.1.extend(g.slice(ndarray::s![i * P..(i + 1) * P]).iter());
            group.2.push(owner);
        }
        let mut batch: Batch = Batch::new(2);
        for (element, values, owners) in groups
        {
            let descriptors: Array2<f64> = Array2::from_shape_vec((owners.len(), P), values).unwrap();
            batch = batch.with_group(element, descriptors, owners).unwrap();
        }
        batch
    }

    fn fprimes(&self) -> SparseForceMap
    {
        let mut rows: Vec<usize> = Vec::new();
        let mut cols: Vec<usize> = Vec::new();
        let mut values: Vec<f64> = Vec::new();
        for ((r, c), &value) in self.d.indexed_iter()
        {
            rows.push(r);
            cols.push(c);
            values.push(value);
        }
        SparseForceMap::from_triplets(self.d.dim(), &rows, &cols, &values).unwrap()
    }
}

fn positions() -> Array1<f64>
{
    Array1::from_shape_fn(3 * ATOMS.len(), |i| 0.4 * (1.3 * i as f64).sin() + 0.1 * i as f64)
}

fn model(elements: &[&str]) -> GlobalNN
{
    GlobalNN::new(elements, (P, 3, HiddenSize::PerLayer(vec![6, 4])), Device::default(), true, true).unwrap()
}

#[test_log::test]
fn two_structure_batch_gives_energy_and_force_shapes()
{
    let global_nn: GlobalNN = GlobalNN::new(&["A", "B"], (20, 3, HiddenSize::Uniform(10)), Device::default(), true, true).unwrap();
    let batch: Batch = Batch::new(2)
        .with_group("A", Array2::from_elem((2, 20), 0.25), vec![0, 1]).unwrap()
        .with_group("B", Array2::from_elem((1, 20), -0.5), vec![1]).unwrap();
    let fprimes: SparseForceMap = SparseForceMap::from_triplets((60, 9), &[0, 21, 59], &[0, 4, 8], &[1.0, -1.0, 0.5]).unwrap();
    let prediction: Prediction = global_nn.forward(&batch, Some(&fprimes)).unwrap();
    assert_eq!(prediction.energy_values().dim(), (2, 1));
    assert_eq!(prediction.force_values().map(|force| force.dim()), Some((3, 3)));
}

#[test_log::test]
fn element_order_does_not_change_predictions()
{
    let featurizer: LinearFeaturizer = LinearFeaturizer::new(false);
    let batch: Batch = featurizer.batch(&positions());
    let fprimes: SparseForceMap = featurizer.fprimes();
    let ab: Prediction = model(&["A", "B"]).forward(&batch, Some(&fprimes)).unwrap();
    let ba: Prediction = model(&["B", "A"]).forward(&batch, Some(&fprimes)).unwrap();
    assert_eq!(ab.energy_values(), ba.energy_values());
    assert_eq!(ab.force_values(), ba.force_values());
}

#[test_log::test]
fn forces_match_finite_differences_of_the_energy()
{
    let global_nn: GlobalNN = model(&["A", "B"]);
    let featurizer: LinearFeaturizer = LinearFeaturizer::new(false);
    let r0: Array1<f64> = positions();
    let prediction: Prediction = global_nn.forward(&featurizer.batch(&r0), Some(&featurizer.fprimes())).unwrap();
    let force: Array2<f64> = prediction.force_values().unwrap();

    let total_energy = |r: &Array1<f64>| -> f64 {
        global_nn.forward(&featurizer.batch(r), Some(&featurizer.fprimes())).unwrap().energy_values().sum()
    };
    let h: f64 = 1.0e-5;
    for j in 0..ATOMS.len()
    {
        for x in 0..3
        {
            let mut rp: Array1<f64> = r0.clone();
            let mut rm: Array1<f64> = r0.clone();
            rp[3 * j + x] += h;
            rm[3 * j + x] -= h;
            let numeric: f64 = -(total_energy(&rp) - total_energy(&rm)) / (2.0 * h);
            assert_abs_diff_eq!(force[[j, x]], numeric, epsilon = 1.0e-4);
        }
    }
}

#[test_log::test]
fn translation_invariant_fingerprints_give_zero_net_force()
{
    let global_nn: GlobalNN = model(&["A", "B"]);
    let featurizer: LinearFeaturizer = LinearFeaturizer::new(true);
    let r0: Array1<f64> = positions();
    let force: Array2<f64> = global_nn.forward(&featurizer.batch(&r0), Some(&featurizer.fprimes())).unwrap().force_values().unwrap();
    for x in 0..3
    {
        assert_abs_diff_eq!(force.column(x).sum(), 0.0, epsilon = 1.0e-10);
    }

    // A rigid translation leaves the energy unchanged
    let shifted: Array1<f64> = Array1::from_shape_fn(r0.len(), |i| r0[i] + [0.7, -0.2, 1.1][i % 3]);
    let e0: Array2<f64> = global_nn.forward(&featurizer.batch(&r0), Some(&featurizer.fprimes())).unwrap().energy_values();
    let e1: Array2<f64> = global_nn.forward(&featurizer.batch(&shifted), Some(&featurizer.fprimes())).unwrap().energy_values();
    for i in 0..2
    {
        assert_abs_diff_eq!(e0[[i, 0]], e1[[i, 0]], epsilon = 1.0e-10);
    }
}

#[test_log::test]
fn energies_are_the_same_with_and_without_force_training()
{
    let featurizer: LinearFeaturizer = LinearFeaturizer::new(false);
    let batch: Batch = featurizer.batch(&positions());
    let mut para: NnPara = Para::new().nn_para;
    para.unique_atoms = vec![String::from("A"), String::from("B")];
    para.input_length = P;
    para.forcetraining = true;
    let with_forces: Prediction = GlobalNN::from_para(&para).unwrap().forward(&batch, Some(&featurizer.fprimes())).unwrap();
    para.forcetraining = false;
    let without_forces: Prediction = GlobalNN::from_para(&para).unwrap().forward(&batch, None).unwrap();
    assert_eq!(with_forces.energy_values(), without_forces.energy_values());
    assert!(without_forces.force.is_none());
}

#[test_log::test]
fn batch_elements_need_a_subnetwork()
{
    let featurizer: LinearFeaturizer = LinearFeaturizer::new(false);
    let batch: Batch = featurizer.batch(&positions());
    let result = model(&["A"]).forward(&batch, Some(&featurizer.fprimes()));
    assert!(matches!(result, Err(NnError::Configuration(_))));
}
