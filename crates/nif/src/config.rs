//! Configuration types for NIF models.
//!
//! A model is fully determined by a [`ShapeNetConfig`], a
//! [`ParameterNetConfig`] and a [`MixedPolicy`]. All three are plain serde
//! types; [`ModelConfig`] bundles them for JSON persistence, and loading a
//! saved configuration reproduces every field exactly (no silent default
//! substitution for values that were written out).

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use half::f16;
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::error::{NifError, Result};

fn default_omega_0() -> f32 {
    30.0
}

fn default_weight_init_factor() -> f32 {
    1.0
}

/// Which part of the shape network the hypernetwork generates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    /// All shape-network weights and biases are generated per example
    Full,
    /// Only the final linear combination over a shared spatial basis
    LastLayer,
}

/// Configuration of the shape network (coordinates -> field value)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeNetConfig {
    /// Spatial coordinate dimension
    pub input_dim: usize,
    /// Field value dimension
    pub output_dim: usize,
    /// Hidden layer width
    pub units: usize,
    /// Number of hidden layers
    pub nlayers: usize,
    /// Generated-weight topology
    pub connectivity: Connectivity,
    /// Two-stage averaged residual blocks instead of plain hidden layers
    #[serde(default)]
    pub use_resblock: bool,
    /// Hidden activation; `sine` selects the multiscale SIREN evaluator
    pub activation: Activation,
    /// Sine frequency scale for sinusoidal layers
    #[serde(default = "default_omega_0")]
    pub omega_0: f32,
    /// Scale factor on the hypernetwork output-layer weight initialization
    #[serde(default = "default_weight_init_factor")]
    pub weight_init_factor: f32,
}

impl ShapeNetConfig {
    /// Validate the configuration, failing before any layer is built.
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 || self.output_dim == 0 || self.units == 0 {
            return Err(NifError::invalid_config(format!(
                "shape net dimensions must be positive: input_dim={}, output_dim={}, units={}",
                self.input_dim, self.output_dim, self.units
            )));
        }
        if self.connectivity == Connectivity::LastLayer && self.activation != Activation::Sine {
            return Err(NifError::invalid_config(
                "last_layer connectivity requires a sine-activated shape net",
            ));
        }
        if self.activation == Activation::Sine && self.omega_0 <= 0.0 {
            return Err(NifError::invalid_config(format!(
                "omega_0 must be positive for sine activation, got {}",
                self.omega_0
            )));
        }
        if self.activation == Activation::Sine && self.weight_init_factor <= 0.0 {
            return Err(NifError::invalid_config(format!(
                "weight_init_factor must be positive for sine activation, got {}",
                self.weight_init_factor
            )));
        }
        Ok(())
    }
}

/// Configuration of the parameter network (context -> latent + flat weights)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterNetConfig {
    /// Context dimension (e.g. time, physical parameter)
    pub input_dim: usize,
    /// Bottleneck latent dimension
    pub latent_dim: usize,
    /// Hidden layer width
    pub units: usize,
    /// Number of hidden layers
    pub nlayers: usize,
    /// Hidden activation; `sine` selects a SIREN parameter-net stack
    pub activation: Activation,
    /// Residual blocks instead of simple shortcut layers
    #[serde(default)]
    pub use_resblock: bool,
    /// Sine frequency scale, used when `activation == sine`
    #[serde(default = "default_omega_0")]
    pub omega_0: f32,
    /// L1 penalty strength on parameter-net weights and biases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_reg: Option<f32>,
    /// L2 penalty strength on parameter-net weights and biases
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l2_reg: Option<f32>,
    /// L1 penalty strength on the flat weight-vector output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act_l1_reg: Option<f32>,
    /// L2 penalty strength on the flat weight-vector output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act_l2_reg: Option<f32>,
    /// Strength of the latent-Jacobian penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jac_reg: Option<f32>,
}

impl ParameterNetConfig {
    /// Validate the configuration, failing before any layer is built.
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 || self.latent_dim == 0 || self.units == 0 {
            return Err(NifError::invalid_config(format!(
                "parameter net dimensions must be positive: input_dim={}, latent_dim={}, units={}",
                self.input_dim, self.latent_dim, self.units
            )));
        }
        if self.activation == Activation::Sine && self.omega_0 <= 0.0 {
            return Err(NifError::invalid_config(format!(
                "omega_0 must be positive for sine activation, got {}",
                self.omega_0
            )));
        }
        Ok(())
    }
}

/// Floating-point dtype of a precision policy side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// IEEE 754 single precision
    F32,
    /// IEEE 754 half precision
    F16,
}

/// Compute/storage precision pair, named after the policy it mirrors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixedPolicy {
    /// f32 compute, f32 storage
    #[default]
    Float32,
    /// f16 compute, f16 storage
    Float16,
    /// f16 compute, f32 storage
    MixedFloat16,
}

impl MixedPolicy {
    /// Dtype used for intermediate computation
    pub fn compute_dtype(self) -> DType {
        match self {
            MixedPolicy::Float32 => DType::F32,
            MixedPolicy::Float16 | MixedPolicy::MixedFloat16 => DType::F16,
        }
    }

    /// Dtype used for stored values and model outputs
    pub fn variable_dtype(self) -> DType {
        match self {
            MixedPolicy::Float32 | MixedPolicy::MixedFloat16 => DType::F32,
            MixedPolicy::Float16 => DType::F16,
        }
    }

    /// Round a value to the storage dtype
    pub fn cast_to_storage(self, x: f32) -> f32 {
        match self.variable_dtype() {
            DType::F32 => x,
            DType::F16 => f16::from_f32(x).to_f32(),
        }
    }
}

/// Persisted record of a model's full configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Shape network configuration
    pub cfg_shape_net: ShapeNetConfig,
    /// Parameter network configuration
    pub cfg_parameter_net: ParameterNetConfig,
    /// Precision policy name
    #[serde(default)]
    pub mixed_policy: MixedPolicy,
}

impl ModelConfig {
    /// Validate both sub-configurations
    pub fn validate(&self) -> Result<()> {
        self.cfg_shape_net.validate()?;
        self.cfg_parameter_net.validate()
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from a JSON string, validating eagerly
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ModelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load a configuration from a JSON file, validating eagerly
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let config: ModelConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }
}
