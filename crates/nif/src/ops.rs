//! Batched tensor contractions for per-example generated weights.
//!
//! The defining operation of the dynamic evaluator: every example in a batch
//! carries its own weight matrix, so layers contract a `(batch, i)` input
//! against a `(batch, i, j)` weight tensor instead of sharing one matrix.
//! No cross-example mixing happens anywhere in these kernels.

use std::ops::Range;

use ndarray::{Array2, Array3, Axis, s};

use crate::error::{NifError, Result};

/// Per-example vector-matrix contraction: `out[a] = x[a] . w[a]`.
///
/// Equivalent to `einsum('ai,aij->aj', x, w)`.
pub fn batched_matvec(x: &Array2<f32>, w: &Array3<f32>) -> Result<Array2<f32>> {
    let (batch, in_dim) = x.dim();
    let (w_batch, w_in, w_out) = w.dim();
    if w_batch != batch || w_in != in_dim {
        return Err(NifError::dimension_mismatch(
            format!("({batch}, {in_dim}, _)"),
            format!("({w_batch}, {w_in}, {w_out})"),
        ));
    }
    let mut out = Array2::<f32>::zeros((batch, w_out));
    for a in 0..batch {
        let y = x.row(a).dot(&w.index_axis(Axis(0), a));
        out.row_mut(a).assign(&y);
    }
    Ok(out)
}

/// Reshape a column range of the flat vector into per-example weight matrices.
///
/// `flat` is `(batch, po_dim)`; the selected columns become a
/// `(batch, rows, cols)` tensor in row-major element order.
pub fn slice_weight_block(
    flat: &Array2<f32>,
    range: Range<usize>,
    rows: usize,
    cols: usize,
) -> Result<Array3<f32>> {
    if range.len() != rows * cols {
        return Err(NifError::layout_mismatch(
            rows * cols,
            range.len(),
            "weight block reshape",
        ));
    }
    let batch = flat.nrows();
    let block = flat.slice(s![.., range.start..range.end]).to_owned();
    block
        .into_shape((batch, rows, cols))
        .map_err(|e| NifError::dimension_mismatch(format!("({batch}, {rows}, {cols})"), e.to_string()))
}

/// Extract a column range of the flat vector as per-example bias vectors.
pub fn slice_bias_block(flat: &Array2<f32>, range: Range<usize>) -> Array2<f32> {
    flat.slice(s![.., range.start..range.end]).to_owned()
}
