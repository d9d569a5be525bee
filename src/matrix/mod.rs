//! About the matrix operations.
//!
//! The derivatives of the fingerprints with respect to the atomic positions are mostly zeros: the fingerprint of an atom
//! only depends on the atoms within its cutoff. They are therefore handed over as a sparse matrix in the compressed
//! sparse row (CSR) format.

use crate::common::constants::{Device, GradTape};
use crate::common::error::*;
use dfdx::prelude::*;





/// The sparse map from the fingerprint derivatives dE/dG to the atomic forces (the "fprimes").
///
/// Row r = i*P + k is the k-th fingerprint component of atom i, column c = 3*j + x is the x-th Cartesian component of
/// atom j. The map has P*Q rows and 3*Q columns; the forces are obtained by its transpose (3Q * PQ) applied to dE/dG,
/// see 'transpose_segments'.
///
/// # Fields
/// ```text
/// nrows: number of rows (P*Q)
/// ncols: number of columns (3*Q)
/// indptr: the start of each row in 'indices' and 'data' (nrows+1)
/// indices: the column index of each stored value
/// data: the stored values
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct SparseForceMap
{
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}










impl SparseForceMap
{
    /// Construct the sparse map from (row, column, value) triplets; duplicated entries are summed
    ///
    /// # Parameters
    /// ```text
    /// shape: (nrows, ncols) of the map
    /// rows, cols, values: the coordinates and values of the non-zero entries
    /// ```
    pub fn from_triplets(shape: (usize, usize), rows: &[usize], cols: &[usize], values: &[f64]) -> Result<Self, NnError>
    {
        let (nrows, ncols) = shape;
        if (rows.len() != cols.len()) || (rows.len() != values.len())
        {
            return Err(error_shape("sparse triplets", "three arrays of equal length", &format!("{}, {}, and {} long", rows.len(), cols.len(), values.len())))
        }
        for (&row, &col) in rows.iter().zip(cols.iter())
        {
            if (row >= nrows) || (col >= ncols)
            {
                return Err(error_shape("sparse entry", &format!("within {} * {}", nrows, ncols), &format!("at ({}, {})", row, col)))
            }
        }

        // Sort the entries by (row, column)
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by_key(|&n| (rows[n], cols[n]));

        let mut indptr: Vec<usize> = vec![0; nrows + 1];
        let mut indices: Vec<usize> = Vec::with_capacity(order.len());
        let mut data: Vec<f64> = Vec::with_capacity(order.len());
        let mut last: Option<(usize, usize)> = None;
        for n in order
        {
            if last == Some((rows[n], cols[n]))
            {
                if let Some(value) = data.last_mut()
                {
                    *value += values[n];
                }
                continue
            }
            last = Some((rows[n], cols[n]));
            indices.push(cols[n]);
            data.push(values[n]);
            indptr[rows[n] + 1] += 1;
        }
        for i in 0..nrows
        {
            indptr[i+1] += indptr[i];
        }

        Ok(SparseForceMap { nrows, ncols, indptr, indices, data })
    }

    /// Construct the sparse map from its CSR arrays
    pub fn from_csr(shape: (usize, usize), indptr: Vec<usize>, indices: Vec<usize>, data: Vec<f64>) -> Result<Self, NnError>
    {
        let (nrows, ncols) = shape;
        if indptr.len() != (nrows + 1)
        {
            return Err(error_shape("indptr", &format!("{} long", nrows + 1), &format!("{} long", indptr.len())))
        }
        if indices.len() != data.len()
        {
            return Err(error_shape("indices", &format!("{} long as data", data.len()), &format!("{} long", indices.len())))
        }
        if (indptr[0] != 0) || (indptr[nrows] != data.len()) || indptr.windows(2).any(|w| w[0] > w[1])
        {
            return Err(error_shape("indptr", &format!("non-decreasing from 0 to {}", data.len()), &format!("{:?}", indptr)))
        }
        if let Some(&col) = indices.iter().find(|&&col| col >= ncols)
        {
            return Err(error_shape("column index", &format!("smaller than {}", ncols), &format!("{}", col)))
        }
        Ok(SparseForceMap { nrows, ncols, indptr, indices, data })
    }

    pub fn shape(&self) -> (usize, usize)
    {
        (self.nrows, self.ncols)
    }

    /// Number of stored entries
    pub fn nnz(&self) -> usize
    {
        self.data.len()
    }

    /// The transpose of a row subset of the map, as a segment sum over a source vector
    ///
    /// Column c of the map becomes segment c; the entry (r, c, v) contributes v * source[row_source[r]].
    /// Rows mapped to None are left out, so that each part of a split operand gets its own sum.
    ///
    /// # Parameters
    /// ```text
    /// row_source: for each row, the position of its operand in the source vector (nrows long)
    /// source_len: length of the source vector
    /// ```
    pub fn transpose_segments(&self, row_source: &[Option<usize>], source_len: usize) -> Result<SegmentSum, NnError>
    {
        if row_source.len() != self.nrows
        {
            return Err(error_shape("row map", &format!("{} long", self.nrows), &format!("{} long", row_source.len())))
        }
        let mut entries: Vec<(usize, usize, f64)> = Vec::with_capacity(self.data.len());
        for (row, source) in row_source.iter().enumerate()
        {
            if let Some(source) = source
            {
                for n in self.indptr[row]..self.indptr[row+1]
                {
                    entries.push((self.indices[n], *source, self.data[n]));
                }
            }
        }
        SegmentSum::new(self.ncols, source_len, &entries)
    }
}





/// A weighted segment sum out[s] = sum of w * source[i] over the entries (s, i, w) of segment s.
///
/// The entries are laid out in a padded table of 'width' columns (padding reads source[0] with weight 0),
/// so the sum runs as a gather, a product and a row sum on the tape, and its reverse pass scatters back into the source.
///
/// # Fields
/// ```text
/// n_segment: number of segments, i.e. length of the output
/// source_len: length of the source vector
/// width: the largest number of entries of a segment (at least 1)
/// index: the source position of each table cell (n_segment * width)
/// weight: the weight of each table cell (n_segment * width)
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentSum
{
    n_segment: usize,
    source_len: usize,
    width: usize,
    index: Vec<usize>,
    weight: Vec<f64>,
}

impl SegmentSum
{
    /// Lay out the (segment, source position, weight) entries
    pub fn new(n_segment: usize, source_len: usize, entries: &[(usize, usize, f64)]) -> Result<Self, NnError>
    {
        let mut counts: Vec<usize> = vec![0; n_segment];
        for &(segment, source, _) in entries
        {
            if (segment >= n_segment) || (source >= source_len)
            {
                return Err(error_shape("segment entry", &format!("within {} segments over {} sources", n_segment, source_len), &format!("at ({}, {})", segment, source)))
            }
            counts[segment] += 1;
        }
        let width: usize = counts.iter().cloned().max().unwrap_or(0).max(1);

        let mut index: Vec<usize> = vec![0; n_segment * width];
        let mut weight: Vec<f64> = vec![0.0; n_segment * width];
        let mut filled: Vec<usize> = vec![0; n_segment];
        for &(segment, source, value) in entries
        {
            let cell: usize = segment * width + filled[segment];
            index[cell] = source;
            weight[cell] = value;
            filled[segment] += 1;
        }

        Ok(SegmentSum { n_segment, source_len, width, index, weight })
    }

    pub fn n_segment(&self) -> usize
    {
        self.n_segment
    }

    pub fn source_len(&self) -> usize
    {
        self.source_len
    }

    /// Sum the source vector into the segments, keeping the tape of the source
    pub fn apply(&self, source: Tensor<(usize,), f64, Device, GradTape>, dev: &Device) -> Result<Tensor<(usize,), f64, Device, GradTape>, NnError>
    {
        if source.shape().0 != self.source_len
        {
            return Err(error_shape("segment source", &format!("{} long", self.source_len), &format!("{} long", source.shape().0)))
        }
        if (self.n_segment == 0) || (self.source_len == 0)
        {
            let (_, tape) = source.split_tape();
            let zeros: Tensor<(usize,), f64, Device> = dev.zeros_like(&(self.n_segment,));
            return Ok(zeros.put_tape(tape))
        }
        let index: Tensor<(usize,), usize, Device> = dev.tensor_from_vec(self.index.clone(), (self.index.len(),));
        let weight: Tensor<(usize,), f64, Device> = dev.tensor_from_vec(self.weight.clone(), (self.weight.len(),));
        let gathered: Tensor<(usize,), f64, Device, GradTape> = source.gather(index);
        let table: Tensor<(usize, usize), f64, Device, GradTape> = (gathered * weight).reshape_like(&(self.n_segment, self.width));
        Ok(table.sum::<_, Axis<1>>())
    }
}
