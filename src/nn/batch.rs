//! The batched fingerprints handed over by the featurizer, grouped by element
use crate::common::error::*;
use ndarray::{Array1, Array2, ArrayView2};
use std::collections::BTreeMap;





/// The fingerprints of all the atoms of one element across the batch
///
/// # Fields
/// ```text
/// descriptors: stacked fingerprints (n_atom_of_element * P)
/// owners: the index of the structure each atom belongs to (n_atom_of_element)
/// ```
#[derive(Clone, Debug)]
pub struct ElementGroup
{
    descriptors: Array2<f64>,
    owners: Vec<usize>,
}

impl ElementGroup
{
    pub fn new(descriptors: Array2<f64>, owners: Vec<usize>) -> Result<Self, NnError>
    {
        if descriptors.nrows() != owners.len()
        {
            return Err(error_shape("owner indices", &format!("one per fingerprint row ({})", descriptors.nrows()), &format!("{} long", owners.len())))
        }
        Ok(ElementGroup { descriptors, owners })
    }

    pub fn descriptors(&self) -> ArrayView2<f64>
    {
        self.descriptors.view()
    }

    pub fn owners(&self) -> &[usize]
    {
        &self.owners
    }

    pub fn n_atom(&self) -> usize
    {
        self.owners.len()
    }
}





/// A batch of structures: one ElementGroup per element symbol, plus the number of structures
#[derive(Clone, Debug)]
pub struct Batch
{
    groups: BTreeMap<String, ElementGroup>,
    batch_size: usize,
}










impl Batch
{
    pub fn new(batch_size: usize) -> Self
    {
        Batch
        {
            groups: BTreeMap::new(),
            batch_size,
        }
    }

    /// Add the atoms of an element, checking that their owner indices lie within the batch.
    /// Each element is inserted once.
    pub fn insert(&mut self, element: &str, group: ElementGroup) -> Result<(), NnError>
    {
        if self.groups.contains_key(element)
        {
            return Err(NnError::Configuration(format!("the atoms of element {} are already in the batch", element)))
        }
        if let Some(&index) = group.owners.iter().find(|&&index| index >= self.batch_size)
        {
            return Err(error_owner_index(element, index, self.batch_size))
        }
        self.groups.insert(element.to_string(), group);
        Ok(())
    }

    /// Builder form of 'insert'
    pub fn with_group(mut self, element: &str, descriptors: Array2<f64>, owners: Vec<usize>) -> Result<Self, NnError>
    {
        self.insert(element, ElementGroup::new(descriptors, owners)?)?;
        Ok(self)
    }

    pub fn batch_size(&self) -> usize
    {
        self.batch_size
    }

    pub fn get(&self, element: &str) -> Option<&ElementGroup>
    {
        self.groups.get(element)
    }

    /// Element symbols present in the batch, in sorted order
    pub fn elements(&self) -> impl Iterator<Item = &str>
    {
        self.groups.keys().map(|element| element.as_str())
    }

    /// Total number of atoms (Q)
    pub fn n_atom(&self) -> usize
    {
        self.groups.values().map(|group| group.n_atom()).sum()
    }

    /// Number of atoms of each structure, derived from the owner indices
    pub fn atom_counts(&self) -> Array1<usize>
    {
        let mut counts: Array1<usize> = Array1::zeros(self.batch_size);
        for group in self.groups.values()
        {
            for &index in &group.owners
            {
                counts[index] += 1;
            }
        }
        counts
    }
}
