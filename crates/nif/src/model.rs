//! The neural implicit flow model: a parameter network generating the
//! weights of a shape network, evaluated jointly or through decomposed
//! sub-mappings.
//!
//! Every operation is a pure function of the model state and its inputs;
//! nothing is cached between calls. The decomposed mappings
//! ([`Nif::context_to_flat_weights`], [`Nif::coords_and_flat_weights_to_field`])
//! compose to exactly the joint [`Nif::forward`], which lets a caller
//! amortize weight generation across many coordinate queries for the same
//! context.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{s, Array2, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{Connectivity, DType, MixedPolicy, ModelConfig, ParameterNetConfig, ShapeNetConfig};
use crate::error::{NifError, Result};
use crate::layout::WeightLayout;
use crate::pnet::ParameterNet;
use crate::snet::ShapeNet;

/// A complete hypernetwork model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nif {
    cfg_shape: ShapeNetConfig,
    cfg_param: ParameterNetConfig,
    policy: MixedPolicy,
    layout: WeightLayout,
    pnet: ParameterNet,
    snet: ShapeNet,
}

impl Nif {
    /// Build a model with freshly drawn initial weights.
    pub fn new(config: ModelConfig) -> Result<Self> {
        let mut rng = StdRng::from_entropy();
        Self::build(config, &mut rng)
    }

    /// Build a model with a seeded RNG; the same seed reproduces the same
    /// initial weights bit for bit.
    pub fn with_seed(config: ModelConfig, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::build(config, &mut rng)
    }

    fn build(config: ModelConfig, rng: &mut StdRng) -> Result<Self> {
        config.validate()?;
        let ModelConfig {
            cfg_shape_net: cfg_shape,
            cfg_parameter_net: cfg_param,
            mixed_policy: policy,
        } = config;

        let layout = WeightLayout::from_config(&cfg_shape, cfg_param.latent_dim)?;
        let pnet = ParameterNet::build(&cfg_param, &cfg_shape, &layout, rng)?;
        if pnet.po_dim() != layout.po_dim {
            return Err(NifError::layout_mismatch(
                layout.po_dim,
                pnet.po_dim(),
                "parameter net output width",
            ));
        }
        let snet = ShapeNet::build(&cfg_shape, &layout, cfg_param.latent_dim, rng);

        debug!(
            po_dim = layout.po_dim,
            latent_dim = cfg_param.latent_dim,
            connectivity = ?cfg_shape.connectivity,
            "built nif model"
        );
        Ok(Nif {
            cfg_shape,
            cfg_param,
            policy,
            layout,
            pnet,
            snet,
        })
    }

    /// Round an intermediate tensor when the policy computes in half precision
    fn cast_compute(&self, a: Array2<f32>) -> Array2<f32> {
        match self.policy.compute_dtype() {
            DType::F32 => a,
            DType::F16 => a.mapv(|v| half::f16::from_f32(v).to_f32()),
        }
    }

    /// Joint forward pass: field values at `coords` for each row's context.
    pub fn forward(&self, context: &Array2<f32>, coords: &Array2<f32>) -> Result<Array2<f32>> {
        let flat = self.context_to_flat_weights(context)?;
        self.coords_and_flat_weights_to_field(coords, &flat)
    }

    /// Forward pass over row-wise concatenated `[context | coords]` inputs,
    /// the layout training pipelines feed.
    pub fn forward_concat(&self, inputs: &Array2<f32>) -> Result<Array2<f32>> {
        let pi = self.cfg_param.input_dim;
        let si = self.cfg_shape.input_dim;
        if inputs.ncols() != pi + si {
            return Err(NifError::dimension_mismatch(
                format!("(_, {})", pi + si),
                format!("(_, {})", inputs.ncols()),
            ));
        }
        let context = inputs.slice(s![.., ..pi]).to_owned();
        let coords = inputs.slice(s![.., pi..]).to_owned();
        self.forward(&context, &coords)
    }

    /// Generate the flat weight vector for each context row.
    pub fn context_to_flat_weights(&self, context: &Array2<f32>) -> Result<Array2<f32>> {
        trace!(batch = context.nrows(), po_dim = self.layout.po_dim, "generating weights");
        let (flat, _) = self.pnet.forward(context)?;
        Ok(self.cast_compute(flat))
    }

    /// Map contexts to the bottleneck representation.
    ///
    /// Under `last_layer` connectivity the parameter net's final output is
    /// itself the compact representation (the basis coefficients), so that
    /// is what this returns; under full connectivity it is the bottleneck
    /// latent ahead of the output layer.
    pub fn context_to_latent(&self, context: &Array2<f32>) -> Result<Array2<f32>> {
        let (flat, latent) = self.pnet.forward(context)?;
        match self.snet {
            ShapeNet::Generated(_) => Ok(latent),
            ShapeNet::SharedBasis(_) => Ok(self.cast_compute(flat)),
        }
    }

    /// Expand a bottleneck latent to the flat weight vector.
    ///
    /// Not defined under `last_layer` connectivity, where the latent and the
    /// flat vector coincide.
    pub fn latent_to_flat_weights(&self, latent: &Array2<f32>) -> Result<Array2<f32>> {
        if let ShapeNet::SharedBasis(_) = self.snet {
            return Err(NifError::unsupported(
                "latent_to_flat_weights is undefined under last_layer connectivity",
            ));
        }
        let flat = self.pnet.latent_to_flat(latent)?;
        Ok(self.cast_compute(flat))
    }

    /// Evaluate the shape network at `coords` under an explicit flat vector.
    pub fn coords_and_flat_weights_to_field(
        &self,
        coords: &Array2<f32>,
        flat: &Array2<f32>,
    ) -> Result<Array2<f32>> {
        let field = self.snet.forward(coords, flat)?;
        Ok(self.cast_compute(field))
    }

    /// Evaluate the shared spatial basis at `coords`, shape
    /// `(batch, output_dim, latent_dim)`. Only defined under `last_layer`
    /// connectivity.
    pub fn coords_to_basis(&self, coords: &Array2<f32>) -> Result<Array3<f32>> {
        match &self.snet {
            ShapeNet::SharedBasis(net) => net.basis(coords),
            ShapeNet::Generated(_) => Err(NifError::unsupported(
                "coords_to_basis requires last_layer connectivity",
            )),
        }
    }

    /// Width of the flat weight vector
    pub fn po_dim(&self) -> usize {
        self.layout.po_dim
    }

    /// Bottleneck latent dimension
    pub fn latent_dim(&self) -> usize {
        self.cfg_param.latent_dim
    }

    /// The flat vector's block partition
    pub fn layout(&self) -> &WeightLayout {
        &self.layout
    }

    /// The model's connectivity
    pub fn connectivity(&self) -> Connectivity {
        self.cfg_shape.connectivity
    }

    /// Reconstruct the persisted configuration record
    pub fn config(&self) -> ModelConfig {
        ModelConfig {
            cfg_shape_net: self.cfg_shape.clone(),
            cfg_parameter_net: self.cfg_param.clone(),
            mixed_policy: self.policy,
        }
    }

    pub(crate) fn parameter_net(&self) -> &ParameterNet {
        &self.pnet
    }

    pub(crate) fn parameter_net_config(&self) -> &ParameterNetConfig {
        &self.cfg_param
    }

    /// Save the full model state (configuration and weights) as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load a model saved with [`Nif::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let model: Nif = serde_json::from_reader(BufReader::new(file))?;
        model.config().validate()?;
        Ok(model)
    }
}
