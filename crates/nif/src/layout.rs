//! Weight layout arithmetic for the generated shape network.
//!
//! The parameter network emits one flat vector per example; this module
//! computes how that vector partitions into the shape network's weight and
//! bias blocks. The block order is fixed:
//!
//! ```text
//! first-w | hidden-w ... | last-w | first-b | hidden-b ... | last-b
//! ```
//!
//! Residual blocks double the hidden weight and bias counts (two
//! sub-transforms per hidden stage). Every consumer slices in exactly this
//! order through a [`FlatCursor`], which fails with a layout mismatch if the
//! arithmetic and the observed tensor width ever disagree.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::config::{Connectivity, ShapeNetConfig};
use crate::error::{NifError, Result};

/// Number of weight elements in the first, hidden and last blocks.
///
/// Under `last_layer` connectivity the hypernetwork generates no first or
/// hidden weights; the last block covers the linear combination over the
/// shared spatial basis.
pub fn compute_block_sizes(cfg: &ShapeNetConfig) -> (usize, usize, usize) {
    match cfg.connectivity {
        Connectivity::Full => {
            let n_first_w = cfg.input_dim * cfg.units;
            let n_hidden_w = if cfg.use_resblock {
                2 * cfg.nlayers * cfg.units * cfg.units
            } else {
                cfg.nlayers * cfg.units * cfg.units
            };
            let n_last_w = cfg.output_dim * cfg.units;
            (n_first_w, n_hidden_w, n_last_w)
        }
        Connectivity::LastLayer => (0, 0, cfg.output_dim * cfg.units),
    }
}

/// Partition of the flat parameter vector into named blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightLayout {
    /// First-layer weight elements (`input_dim * units`)
    pub n_first_w: usize,
    /// All hidden-layer weight elements
    pub n_hidden_w: usize,
    /// Last-layer weight elements
    pub n_last_w: usize,
    /// First-layer bias elements
    pub n_first_b: usize,
    /// All hidden-layer bias elements
    pub n_hidden_b: usize,
    /// Last-layer bias elements
    pub n_last_b: usize,
    /// Total flat vector width; the required parameter-net output width
    pub po_dim: usize,
}

impl WeightLayout {
    /// Compute the layout for a shape-network configuration.
    ///
    /// `latent_dim` is the parameter network's bottleneck width; under
    /// `last_layer` connectivity the whole flat vector is the coefficient
    /// vector over the shared basis, so `po_dim == latent_dim` and no bias
    /// elements are generated (the output bias is a learned variable of the
    /// basis network instead).
    pub fn from_config(cfg: &ShapeNetConfig, latent_dim: usize) -> Result<Self> {
        cfg.validate()?;
        let layout = match cfg.connectivity {
            Connectivity::Full => {
                let (n_first_w, n_hidden_w, n_last_w) = compute_block_sizes(cfg);
                let n_first_b = cfg.units;
                let n_hidden_b = if cfg.use_resblock {
                    2 * cfg.nlayers * cfg.units
                } else {
                    cfg.nlayers * cfg.units
                };
                let n_last_b = cfg.output_dim;
                WeightLayout {
                    n_first_w,
                    n_hidden_w,
                    n_last_w,
                    n_first_b,
                    n_hidden_b,
                    n_last_b,
                    po_dim: n_first_w
                        + n_hidden_w
                        + n_last_w
                        + n_first_b
                        + n_hidden_b
                        + n_last_b,
                }
            }
            Connectivity::LastLayer => WeightLayout {
                n_first_w: 0,
                n_hidden_w: 0,
                n_last_w: latent_dim,
                n_first_b: 0,
                n_hidden_b: 0,
                n_last_b: 0,
                po_dim: latent_dim,
            },
        };
        Ok(layout)
    }

    /// Total weight elements, which is also the offset of the first bias block
    pub fn weights_total(&self) -> usize {
        self.n_first_w + self.n_hidden_w + self.n_last_w
    }
}

/// Sequential cursor over the flat parameter vector.
///
/// Blocks must be taken contiguously, in the fixed layout order, and the
/// cursor must be exhausted exactly; anything else is a layout mismatch.
#[derive(Debug)]
pub struct FlatCursor {
    offset: usize,
    total: usize,
}

impl FlatCursor {
    /// Start a cursor over a flat vector of the given width
    pub fn new(total: usize) -> Self {
        FlatCursor { offset: 0, total }
    }

    /// Consume the next `n` elements, returning their column range
    pub fn take(&mut self, n: usize, block: &str) -> Result<Range<usize>> {
        let end = self.offset + n;
        if end > self.total {
            return Err(NifError::layout_mismatch(end, self.total, block));
        }
        let range = self.offset..end;
        self.offset = end;
        Ok(range)
    }

    /// Assert that the whole vector was consumed
    pub fn finish(self) -> Result<()> {
        if self.offset != self.total {
            return Err(NifError::layout_mismatch(
                self.total,
                self.offset,
                "flat parameter vector not fully consumed",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;

    fn cfg(
        input_dim: usize,
        output_dim: usize,
        units: usize,
        nlayers: usize,
        connectivity: Connectivity,
        use_resblock: bool,
    ) -> ShapeNetConfig {
        ShapeNetConfig {
            input_dim,
            output_dim,
            units,
            nlayers,
            connectivity,
            use_resblock,
            activation: Activation::Sine,
            omega_0: 30.0,
            weight_init_factor: 1.0,
        }
    }

    #[test]
    fn po_dim_matches_closed_form_polynomial() {
        // full connectivity, plain: l*n^2 + (si + so + 1 + l)*n + so
        for si in 1..=4 {
            for so in 1..=4 {
                for n in 1..=8 {
                    for l in 1..=4 {
                        let c = cfg(si, so, n, l, Connectivity::Full, false);
                        let layout = WeightLayout::from_config(&c, 3).unwrap();
                        let expected = l * n * n + (si + so + 1 + l) * n + so;
                        assert_eq!(layout.po_dim, expected, "si={si} so={so} n={n} l={l}");

                        // resblock: 2l*n^2 + (si + so + 1 + 2l)*n + so
                        let c = cfg(si, so, n, l, Connectivity::Full, true);
                        let layout = WeightLayout::from_config(&c, 3).unwrap();
                        let expected = 2 * l * n * n + (si + so + 1 + 2 * l) * n + so;
                        assert_eq!(layout.po_dim, expected);
                    }
                }
            }
        }
    }

    #[test]
    fn block_sizes_sum_to_po_dim() {
        for resblock in [false, true] {
            for connectivity in [Connectivity::Full, Connectivity::LastLayer] {
                for n in 1..=8 {
                    for l in 1..=4 {
                        let c = cfg(2, 3, n, l, connectivity, resblock);
                        let layout = WeightLayout::from_config(&c, 5).unwrap();
                        let sum = layout.n_first_w
                            + layout.n_hidden_w
                            + layout.n_last_w
                            + layout.n_first_b
                            + layout.n_hidden_b
                            + layout.n_last_b;
                        assert_eq!(sum, layout.po_dim);
                    }
                }
            }
        }
    }

    #[test]
    fn last_layer_po_dim_is_latent_dim() {
        let c = cfg(2, 3, 16, 2, Connectivity::LastLayer, false);
        let layout = WeightLayout::from_config(&c, 7).unwrap();
        assert_eq!(layout.po_dim, 7);
        assert_eq!(layout.n_first_w, 0);
        assert_eq!(layout.n_hidden_w, 0);
    }

    #[test]
    fn cursor_rejects_over_and_under_consumption() {
        let mut cursor = FlatCursor::new(10);
        cursor.take(6, "a").unwrap();
        assert!(cursor.take(5, "b").is_err());

        // expected is the full width, actual is what was consumed
        let mut cursor = FlatCursor::new(10);
        cursor.take(6, "a").unwrap();
        match cursor.finish() {
            Err(NifError::LayoutMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 10);
                assert_eq!(actual, 6);
            }
            other => panic!("expected a layout mismatch, got {other:?}"),
        }

        let mut cursor = FlatCursor::new(10);
        cursor.take(6, "a").unwrap();
        cursor.take(4, "b").unwrap();
        assert!(cursor.finish().is_ok());
    }

    #[test]
    fn cursor_ranges_are_contiguous_and_increasing() {
        let mut cursor = FlatCursor::new(12);
        let a = cursor.take(5, "a").unwrap();
        let b = cursor.take(3, "b").unwrap();
        let c = cursor.take(4, "c").unwrap();
        assert_eq!(a, 0..5);
        assert_eq!(b, 5..8);
        assert_eq!(c, 8..12);
        cursor.finish().unwrap();
    }
}
