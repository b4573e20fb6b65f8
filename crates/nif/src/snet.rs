//! Shape network evaluation under generated weights.
//!
//! The shape network holds no trainable weight matrices of its own under
//! full connectivity: every forward pass slices the per-example flat vector
//! produced by the parameter network into weight and bias blocks and runs
//! the batched contractions of [`crate::ops`]. Under `last_layer`
//! connectivity the spatial structure lives in a shared sinusoidal basis
//! network instead, and the flat vector is just the per-example coefficient
//! vector over that basis.
//!
//! The flat vector's width is checked against the layout before any block
//! is touched, so a mismatched parameter net fails with a layout error
//! rather than a panic deep inside a reshape.

use ndarray::{Array1, Array2, Array3, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::config::{Connectivity, ShapeNetConfig};
use crate::error::{NifError, Result};
use crate::layout::{FlatCursor, WeightLayout};
use crate::ops::{batched_matvec, slice_bias_block, slice_weight_block};
use crate::pnet::{build_siren_stack, PnetLayer};

/// Shape network evaluated with per-example generated weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedShapeNet {
    cfg: ShapeNetConfig,
    layout: WeightLayout,
}

impl GeneratedShapeNet {
    /// Create the evaluator for a validated configuration and its layout
    pub fn new(cfg: ShapeNetConfig, layout: WeightLayout) -> Self {
        GeneratedShapeNet { cfg, layout }
    }

    fn check_inputs(&self, coords: &Array2<f32>, flat: &Array2<f32>) -> Result<()> {
        if flat.ncols() != self.layout.po_dim {
            return Err(NifError::layout_mismatch(
                self.layout.po_dim,
                flat.ncols(),
                "flat parameter vector width",
            ));
        }
        if coords.ncols() != self.cfg.input_dim {
            return Err(NifError::dimension_mismatch(
                format!("(_, {})", self.cfg.input_dim),
                format!("(_, {})", coords.ncols()),
            ));
        }
        if coords.nrows() != flat.nrows() {
            return Err(NifError::dimension_mismatch(
                format!("({}, _)", flat.nrows()),
                format!("({}, _)", coords.nrows()),
            ));
        }
        Ok(())
    }

    /// Evaluate the field at `coords` under the weights in `flat`.
    ///
    /// Row `a` of the output depends only on row `a` of `coords` and row `a`
    /// of `flat`.
    pub fn forward(&self, coords: &Array2<f32>, flat: &Array2<f32>) -> Result<Array2<f32>> {
        self.check_inputs(coords, flat)?;
        let cfg = &self.cfg;
        let n = cfg.units;
        let blocks_per_layer = if cfg.use_resblock { 2 } else { 1 };

        let mut cur = FlatCursor::new(self.layout.po_dim);
        let w_first = slice_weight_block(
            flat,
            cur.take(cfg.input_dim * n, "first weights")?,
            cfg.input_dim,
            n,
        )?;
        let mut w_hidden = Vec::with_capacity(cfg.nlayers * blocks_per_layer);
        for _ in 0..cfg.nlayers * blocks_per_layer {
            w_hidden.push(slice_weight_block(
                flat,
                cur.take(n * n, "hidden weights")?,
                n,
                n,
            )?);
        }
        let w_last = slice_weight_block(
            flat,
            cur.take(n * cfg.output_dim, "last weights")?,
            n,
            cfg.output_dim,
        )?;
        let b_first = slice_bias_block(flat, cur.take(n, "first biases")?);
        let mut b_hidden = Vec::with_capacity(cfg.nlayers * blocks_per_layer);
        for _ in 0..cfg.nlayers * blocks_per_layer {
            b_hidden.push(slice_bias_block(flat, cur.take(n, "hidden biases")?));
        }
        let b_last = slice_bias_block(flat, cur.take(cfg.output_dim, "last biases")?);
        cur.finish()?;

        let sine = cfg.activation == Activation::Sine;
        let omega = cfg.omega_0;

        // first layer; omega scales the contraction but not the bias
        let mut u = if sine {
            (batched_matvec(coords, &w_first)? * omega + &b_first).mapv(f32::sin)
        } else {
            cfg.activation.apply(&(batched_matvec(coords, &w_first)? + &b_first))
        };

        for layer in 0..cfg.nlayers {
            if cfg.use_resblock {
                let i = 2 * layer;
                let h = if sine {
                    (batched_matvec(&u, &w_hidden[i])? * omega + &b_hidden[i]).mapv(f32::sin)
                } else {
                    cfg.activation
                        .apply(&(batched_matvec(&u, &w_hidden[i])? + &b_hidden[i]))
                };
                let g = if sine {
                    (batched_matvec(&h, &w_hidden[i + 1])? * omega + &b_hidden[i + 1])
                        .mapv(f32::sin)
                } else {
                    cfg.activation
                        .apply(&(batched_matvec(&h, &w_hidden[i + 1])? + &b_hidden[i + 1]))
                };
                u = (&u + &g) * 0.5;
            } else if sine {
                u = (batched_matvec(&u, &w_hidden[layer])? * omega + &b_hidden[layer])
                    .mapv(f32::sin);
            } else {
                let z = cfg
                    .activation
                    .apply(&(batched_matvec(&u, &w_hidden[layer])? + &b_hidden[layer]));
                u = z + &u;
            }
        }

        // linear readout
        Ok(batched_matvec(&u, &w_last)? + &b_last)
    }
}

/// Shared sinusoidal spatial basis for `last_layer` connectivity.
///
/// The basis network is an ordinary SIREN whose output width is
/// `output_dim * latent_dim`; the generated flat vector supplies only the
/// per-example coefficients, and the output bias is a learned variable here
/// rather than a generated block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedBasisNet {
    layers: Vec<PnetLayer>,
    bias: Array1<f32>,
    input_dim: usize,
    output_dim: usize,
    latent_dim: usize,
}

impl SharedBasisNet {
    /// Build the basis network with SIREN initialization
    pub fn build(cfg: &ShapeNetConfig, latent_dim: usize, rng: &mut impl Rng) -> Self {
        let layers = build_siren_stack(
            rng,
            cfg.input_dim,
            cfg.units,
            cfg.nlayers,
            cfg.output_dim * latent_dim,
            cfg.omega_0,
            cfg.use_resblock,
        );
        SharedBasisNet {
            layers,
            bias: Array1::zeros(cfg.output_dim),
            input_dim: cfg.input_dim,
            output_dim: cfg.output_dim,
            latent_dim,
        }
    }

    /// Evaluate the basis functions at `coords`, shape
    /// `(batch, output_dim, latent_dim)`.
    pub fn basis(&self, coords: &Array2<f32>) -> Result<Array3<f32>> {
        if coords.ncols() != self.input_dim {
            return Err(NifError::dimension_mismatch(
                format!("(_, {})", self.input_dim),
                format!("(_, {})", coords.ncols()),
            ));
        }
        let mut h = coords.to_owned();
        for layer in &self.layers {
            h = layer.forward(&h);
        }
        let batch = h.nrows();
        h.into_shape((batch, self.output_dim, self.latent_dim))
            .map_err(|e| {
                NifError::dimension_mismatch(
                    format!("({batch}, {}, {})", self.output_dim, self.latent_dim),
                    e.to_string(),
                )
            })
    }

    /// Contract the basis with per-example coefficients and add the bias:
    /// `out[a, o] = sum_k basis[a, o, k] * coeffs[a, k] + bias[o]`.
    pub fn forward(&self, coords: &Array2<f32>, coeffs: &Array2<f32>) -> Result<Array2<f32>> {
        if coeffs.ncols() != self.latent_dim {
            return Err(NifError::layout_mismatch(
                self.latent_dim,
                coeffs.ncols(),
                "basis coefficient width",
            ));
        }
        if coords.nrows() != coeffs.nrows() {
            return Err(NifError::dimension_mismatch(
                format!("({}, _)", coeffs.nrows()),
                format!("({}, _)", coords.nrows()),
            ));
        }
        let basis = self.basis(coords)?;
        let batch = coords.nrows();
        let mut out = Array2::<f32>::zeros((batch, self.output_dim));
        for a in 0..batch {
            let y = basis.index_axis(Axis(0), a).dot(&coeffs.row(a));
            out.row_mut(a).assign(&y);
        }
        out += &self.bias;
        Ok(out)
    }
}

/// Either shape-network topology, selected by the configured connectivity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShapeNet {
    /// All weights generated per example
    Generated(GeneratedShapeNet),
    /// Shared spatial basis with generated coefficients
    SharedBasis(SharedBasisNet),
}

impl ShapeNet {
    /// Build the topology named by the configuration's connectivity
    pub fn build(
        cfg: &ShapeNetConfig,
        layout: &WeightLayout,
        latent_dim: usize,
        rng: &mut impl Rng,
    ) -> Self {
        match cfg.connectivity {
            Connectivity::Full => ShapeNet::Generated(GeneratedShapeNet::new(cfg.clone(), *layout)),
            Connectivity::LastLayer => {
                ShapeNet::SharedBasis(SharedBasisNet::build(cfg, latent_dim, rng))
            }
        }
    }

    /// Evaluate the field at `coords` under the generated flat vector
    pub fn forward(&self, coords: &Array2<f32>, flat: &Array2<f32>) -> Result<Array2<f32>> {
        match self {
            ShapeNet::Generated(net) => net.forward(coords, flat),
            ShapeNet::SharedBasis(net) => net.forward(coords, flat),
        }
    }
}
