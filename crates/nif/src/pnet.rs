//! Parameter network: maps a low-dimensional context to a bottleneck latent
//! and the flat vector of generated shape-network weights.
//!
//! The stack is `first -> hidden x nlayers -> bottleneck -> output`, where
//! the output layer's width is the weight layout's `po_dim`. Two stacks
//! exist, chosen by the configured activation: a plain MLP with shortcut or
//! residual hidden blocks, and a SIREN stack with positional sine
//! evaluation. Layer variants are a closed enum rather than a class
//! hierarchy; the variant carries everything its evaluation rule needs.
//!
//! Each layer also propagates forward-mode tangents (`forward_jvp`), which
//! the Jacobian regularizer uses to differentiate the latent with respect
//! to the context exactly, without a taped autodiff engine.

use ndarray::{Array1, Array2, Array3, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::config::{ParameterNetConfig, ShapeNetConfig};
use crate::error::{NifError, Result};
use crate::init;
use crate::layout::WeightLayout;

/// Affine map `x . w + b` with trainable parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Affine {
    w: Array2<f32>,
    b: Array1<f32>,
}

impl Affine {
    fn new(w: Array2<f32>, b: Array1<f32>) -> Self {
        Affine { w, b }
    }

    fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        x.dot(&self.w) + &self.b
    }

    /// Tangent of the affine map (the bias drops out)
    fn jvp(&self, dx: &Array2<f32>) -> Array2<f32> {
        dx.dot(&self.w)
    }

    fn in_dim(&self) -> usize {
        self.w.nrows()
    }

    fn out_dim(&self) -> usize {
        self.w.ncols()
    }
}

/// Position of a sinusoidal layer, which selects its evaluation rule:
/// `first` and `hidden` apply the sine, `bottleneck` is plain affine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SirenPosition {
    /// First layer of a sinusoidal stack
    First,
    /// Hidden layer
    Hidden,
    /// Affine bottleneck (no sine applied)
    Bottleneck,
}

/// One parameter-network layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PnetLayer {
    /// `act(x . w + b)`
    Dense {
        /// Affine parameters
        affine: Affine,
        /// Activation applied to the affine output
        activation: Activation,
    },
    /// Simple shortcut: `x + act(x . w + b)`
    ShortCut {
        /// Affine parameters
        affine: Affine,
        /// Activation inside the shortcut branch
        activation: Activation,
    },
    /// Two-dense residual block: `act(x + L2(act(L1(x))))`
    ResBlock {
        /// First dense transform
        first: Affine,
        /// Second dense transform
        second: Affine,
        /// Shared activation
        activation: Activation,
    },
    /// Sinusoidal layer: `sin(omega_0 * (x . w) + b)` for first/hidden
    /// positions, plain affine at the bottleneck
    Siren {
        /// Affine parameters
        affine: Affine,
        /// Sine frequency scale
        omega_0: f32,
        /// Position-dependent evaluation rule
        position: SirenPosition,
    },
    /// Averaged sinusoidal residual block:
    /// `0.5 * (x + sin(omega_0 * (h . w2) + b2))` with
    /// `h = sin(omega_0 * (x . w1) + b1)`
    SirenRes {
        /// First sub-transform
        first: Affine,
        /// Second sub-transform
        second: Affine,
        /// Sine frequency scale
        omega_0: f32,
    },
}

fn sine_of(affine: &Affine, omega_0: f32, x: &Array2<f32>) -> Array2<f32> {
    let pre = x.dot(&affine.w) * omega_0 + &affine.b;
    pre.mapv(f32::sin)
}

impl PnetLayer {
    /// Evaluate the layer
    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        match self {
            PnetLayer::Dense { affine, activation } => activation.apply(&affine.forward(x)),
            PnetLayer::ShortCut { affine, activation } => {
                x + &activation.apply(&affine.forward(x))
            }
            PnetLayer::ResBlock {
                first,
                second,
                activation,
            } => {
                let h = activation.apply(&first.forward(x));
                activation.apply(&(x + &second.forward(&h)))
            }
            PnetLayer::Siren {
                affine,
                omega_0,
                position,
            } => match position {
                SirenPosition::First | SirenPosition::Hidden => sine_of(affine, *omega_0, x),
                SirenPosition::Bottleneck => affine.forward(x),
            },
            PnetLayer::SirenRes {
                first,
                second,
                omega_0,
            } => {
                let h = sine_of(first, *omega_0, x);
                (x + &sine_of(second, *omega_0, &h)) * 0.5
            }
        }
    }

    /// Evaluate the layer together with a forward-mode tangent
    pub fn forward_jvp(&self, x: &Array2<f32>, dx: &Array2<f32>) -> (Array2<f32>, Array2<f32>) {
        match self {
            PnetLayer::Dense { affine, activation } => {
                let z = affine.forward(x);
                let dy = &activation.apply_derivative(&z) * &affine.jvp(dx);
                (activation.apply(&z), dy)
            }
            PnetLayer::ShortCut { affine, activation } => {
                let z = affine.forward(x);
                let dy = dx + &(&activation.apply_derivative(&z) * &affine.jvp(dx));
                (x + &activation.apply(&z), dy)
            }
            PnetLayer::ResBlock {
                first,
                second,
                activation,
            } => {
                let z1 = first.forward(x);
                let h = activation.apply(&z1);
                let dh = &activation.apply_derivative(&z1) * &first.jvp(dx);
                let z2 = x + &second.forward(&h);
                let dz2 = dx + &second.jvp(&dh);
                (activation.apply(&z2), &activation.apply_derivative(&z2) * &dz2)
            }
            PnetLayer::Siren {
                affine,
                omega_0,
                position,
            } => match position {
                SirenPosition::First | SirenPosition::Hidden => {
                    let pre = x.dot(&affine.w) * *omega_0 + &affine.b;
                    let dy = pre.mapv(f32::cos) * affine.jvp(dx) * *omega_0;
                    (pre.mapv(f32::sin), dy)
                }
                SirenPosition::Bottleneck => (affine.forward(x), affine.jvp(dx)),
            },
            PnetLayer::SirenRes {
                first,
                second,
                omega_0,
            } => {
                let pre1 = x.dot(&first.w) * *omega_0 + &first.b;
                let h = pre1.mapv(f32::sin);
                let dh = pre1.mapv(f32::cos) * first.jvp(dx) * *omega_0;
                let pre2 = h.dot(&second.w) * *omega_0 + &second.b;
                let y = (x + &pre2.mapv(f32::sin)) * 0.5;
                let dy = (dx + &(pre2.mapv(f32::cos) * second.jvp(&dh) * *omega_0)) * 0.5;
                (y, dy)
            }
        }
    }

    /// Output width of the layer
    pub fn out_dim(&self) -> usize {
        match self {
            PnetLayer::Dense { affine, .. }
            | PnetLayer::ShortCut { affine, .. }
            | PnetLayer::Siren { affine, .. } => affine.out_dim(),
            PnetLayer::ResBlock { second, .. } | PnetLayer::SirenRes { second, .. } => {
                second.out_dim()
            }
        }
    }

    /// Input width of the layer
    pub fn in_dim(&self) -> usize {
        match self {
            PnetLayer::Dense { affine, .. }
            | PnetLayer::ShortCut { affine, .. }
            | PnetLayer::Siren { affine, .. } => affine.in_dim(),
            PnetLayer::ResBlock { first, .. } | PnetLayer::SirenRes { first, .. } => first.in_dim(),
        }
    }

    /// Visit every weight matrix / bias vector pair of the layer
    pub fn visit_params(&self, visitor: &mut dyn FnMut(&Array2<f32>, &Array1<f32>)) {
        match self {
            PnetLayer::Dense { affine, .. }
            | PnetLayer::ShortCut { affine, .. }
            | PnetLayer::Siren { affine, .. } => visitor(&affine.w, &affine.b),
            PnetLayer::ResBlock { first, second, .. }
            | PnetLayer::SirenRes { first, second, .. } => {
                visitor(&first.w, &first.b);
                visitor(&second.w, &second.b);
            }
        }
    }
}

/// Builds a SIREN stack layer-by-layer; shared between the parameter net and
/// the last-layer variant's spatial basis net.
pub(crate) fn build_siren_stack(
    rng: &mut impl Rng,
    input_dim: usize,
    units: usize,
    nlayers: usize,
    bottleneck_dim: usize,
    omega_0: f32,
    use_resblock: bool,
) -> Vec<PnetLayer> {
    let mut layers = Vec::with_capacity(nlayers + 2);
    let (w, b) = init::siren_first(rng, input_dim, units);
    layers.push(PnetLayer::Siren {
        affine: Affine::new(w, b),
        omega_0,
        position: SirenPosition::First,
    });
    for _ in 0..nlayers {
        if use_resblock {
            let (w1, b1) = init::siren_hidden(rng, units, units, omega_0);
            let (w2, b2) = init::siren_hidden(rng, units, units, omega_0);
            layers.push(PnetLayer::SirenRes {
                first: Affine::new(w1, b1),
                second: Affine::new(w2, b2),
                omega_0,
            });
        } else {
            let (w, b) = init::siren_hidden(rng, units, units, omega_0);
            layers.push(PnetLayer::Siren {
                affine: Affine::new(w, b),
                omega_0,
                position: SirenPosition::Hidden,
            });
        }
    }
    let (w, b) = init::siren_hidden(rng, units, bottleneck_dim, omega_0);
    layers.push(PnetLayer::Siren {
        affine: Affine::new(w, b),
        omega_0,
        position: SirenPosition::Bottleneck,
    });
    layers
}

const DENSE_INIT_STDDEV: f32 = 0.1;

/// The trained hypernetwork: context -> (flat weight vector, latent)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterNet {
    layers: Vec<PnetLayer>,
    input_dim: usize,
    latent_dim: usize,
    po_dim: usize,
}

impl ParameterNet {
    /// Build the parameter network for the given configuration pair.
    ///
    /// The final layer's width is taken from the weight layout; when the
    /// shape network is sinusoidal its initialization is the block-scaled
    /// hypernetwork scheme, otherwise plain truncated normal.
    pub fn build(
        cfg_p: &ParameterNetConfig,
        cfg_s: &ShapeNetConfig,
        layout: &WeightLayout,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        cfg_p.validate()?;

        let mut layers = if cfg_p.activation == Activation::Sine {
            build_siren_stack(
                rng,
                cfg_p.input_dim,
                cfg_p.units,
                cfg_p.nlayers,
                cfg_p.latent_dim,
                cfg_p.omega_0,
                cfg_p.use_resblock,
            )
        } else {
            let mut layers: Vec<PnetLayer> = Vec::with_capacity(cfg_p.nlayers + 3);
            layers.push(PnetLayer::Dense {
                affine: Affine::new(
                    init::truncated_normal(rng, cfg_p.input_dim, cfg_p.units, DENSE_INIT_STDDEV),
                    init::truncated_normal_bias(rng, cfg_p.units, DENSE_INIT_STDDEV),
                ),
                activation: cfg_p.activation,
            });
            for _ in 0..cfg_p.nlayers {
                let first = Affine::new(
                    init::truncated_normal(rng, cfg_p.units, cfg_p.units, DENSE_INIT_STDDEV),
                    init::truncated_normal_bias(rng, cfg_p.units, DENSE_INIT_STDDEV),
                );
                if cfg_p.use_resblock {
                    let second = Affine::new(
                        init::truncated_normal(rng, cfg_p.units, cfg_p.units, DENSE_INIT_STDDEV),
                        init::truncated_normal_bias(rng, cfg_p.units, DENSE_INIT_STDDEV),
                    );
                    layers.push(PnetLayer::ResBlock {
                        first,
                        second,
                        activation: cfg_p.activation,
                    });
                } else {
                    layers.push(PnetLayer::ShortCut {
                        affine: first,
                        activation: cfg_p.activation,
                    });
                }
            }
            // affine bottleneck exposing the latent
            layers.push(PnetLayer::Dense {
                affine: Affine::new(
                    init::truncated_normal(rng, cfg_p.units, cfg_p.latent_dim, DENSE_INIT_STDDEV),
                    init::truncated_normal_bias(rng, cfg_p.latent_dim, DENSE_INIT_STDDEV),
                ),
                activation: Activation::Linear,
            });
            layers
        };

        let (w, b) = if cfg_s.activation == Activation::Sine {
            init::hyper_output(
                rng,
                cfg_p.latent_dim,
                layout,
                cfg_s.input_dim,
                cfg_s.units,
                cfg_s.omega_0,
                cfg_s.weight_init_factor,
            )
        } else {
            (
                init::truncated_normal(rng, cfg_p.latent_dim, layout.po_dim, DENSE_INIT_STDDEV),
                init::truncated_normal_bias(rng, layout.po_dim, DENSE_INIT_STDDEV),
            )
        };
        layers.push(PnetLayer::Dense {
            affine: Affine::new(w, b),
            activation: Activation::Linear,
        });

        Ok(ParameterNet {
            layers,
            input_dim: cfg_p.input_dim,
            latent_dim: cfg_p.latent_dim,
            po_dim: layout.po_dim,
        })
    }

    /// Context dimension
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Bottleneck latent dimension
    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    /// Width of the flat weight-vector output
    pub fn po_dim(&self) -> usize {
        self.po_dim
    }

    fn check_context(&self, context: &Array2<f32>) -> Result<()> {
        if context.ncols() != self.input_dim {
            return Err(NifError::dimension_mismatch(
                format!("(_, {})", self.input_dim),
                format!("(_, {})", context.ncols()),
            ));
        }
        Ok(())
    }

    /// Forward pass: returns the flat weight vector and the bottleneck latent.
    pub fn forward(&self, context: &Array2<f32>) -> Result<(Array2<f32>, Array2<f32>)> {
        self.check_context(context)?;
        let mut h = context.to_owned();
        for layer in &self.layers[..self.layers.len() - 1] {
            h = layer.forward(&h);
        }
        let flat = self.layers[self.layers.len() - 1].forward(&h);
        Ok((flat, h))
    }

    /// Map a latent through the output layer only.
    pub fn latent_to_flat(&self, latent: &Array2<f32>) -> Result<Array2<f32>> {
        if latent.ncols() != self.latent_dim {
            return Err(NifError::dimension_mismatch(
                format!("(_, {})", self.latent_dim),
                format!("(_, {})", latent.ncols()),
            ));
        }
        Ok(self.layers[self.layers.len() - 1].forward(latent))
    }

    /// Batched Jacobian of the latent with respect to the context, shape
    /// `(batch, latent_dim, input_dim)`, via forward-mode tangents (one pass
    /// per context dimension).
    pub fn latent_jacobian(&self, context: &Array2<f32>) -> Result<Array3<f32>> {
        self.check_context(context)?;
        let batch = context.nrows();
        let mut jac = Array3::<f32>::zeros((batch, self.latent_dim, self.input_dim));
        for k in 0..self.input_dim {
            let mut h = context.to_owned();
            let mut dh = Array2::<f32>::zeros((batch, self.input_dim));
            dh.column_mut(k).fill(1.0);
            for layer in &self.layers[..self.layers.len() - 1] {
                let (next, dnext) = layer.forward_jvp(&h, &dh);
                h = next;
                dh = dnext;
            }
            jac.index_axis_mut(Axis(2), k).assign(&dh);
        }
        Ok(jac)
    }

    /// Visit every weight/bias pair in the network
    pub fn visit_params(&self, visitor: &mut dyn FnMut(&Array2<f32>, &Array1<f32>)) {
        for layer in &self.layers {
            layer.visit_params(visitor);
        }
    }
}
