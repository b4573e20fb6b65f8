//! # Neural Implicit Flow
//!
//! A hypernetwork representation for spatio-temporal fields: a parameter
//! network maps a low-dimensional context (time, physical parameters,
//! sensor readings) to the weights of a shape network, which is then
//! evaluated at arbitrary spatial coordinates with those generated weights.
//! Each batch row carries its own generated weights, so a single forward
//! pass evaluates many contexts at once.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use ndarray::arr2;
//! use nif::{
//!     Activation, Connectivity, MixedPolicy, ModelConfig, Nif,
//!     ParameterNetConfig, ShapeNetConfig,
//! };
//!
//! let config = ModelConfig {
//!     cfg_shape_net: ShapeNetConfig {
//!         input_dim: 1,
//!         output_dim: 1,
//!         units: 30,
//!         nlayers: 2,
//!         connectivity: Connectivity::Full,
//!         use_resblock: false,
//!         activation: Activation::Swish,
//!         omega_0: 30.0,
//!         weight_init_factor: 1.0,
//!     },
//!     cfg_parameter_net: ParameterNetConfig {
//!         input_dim: 1,
//!         latent_dim: 1,
//!         units: 30,
//!         nlayers: 2,
//!         activation: Activation::Swish,
//!         use_resblock: false,
//!         omega_0: 30.0,
//!         l1_reg: None,
//!         l2_reg: None,
//!         act_l1_reg: None,
//!         act_l2_reg: None,
//!         jac_reg: None,
//!     },
//!     mixed_policy: MixedPolicy::Float32,
//! };
//!
//! let model = Nif::with_seed(config, 42)?;
//! let context = arr2(&[[0.0_f32]]);
//! let coords = arr2(&[[0.5_f32]]);
//! let field = model.forward(&context, &coords)?;
//!
//! // amortize weight generation over many coordinate queries
//! let flat = model.context_to_flat_weights(&context)?;
//! let same = model.coords_and_flat_weights_to_field(&coords, &flat)?;
//! # Ok::<(), nif::NifError>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod activation;
pub mod config;
pub mod error;
pub mod init;
pub mod layout;
pub mod model;
pub mod ops;
pub mod pnet;
pub mod regularization;
pub mod snet;

// Re-export commonly used types
pub use activation::Activation;
pub use config::{
    Connectivity, DType, MixedPolicy, ModelConfig, ParameterNetConfig, ShapeNetConfig,
};
pub use error::{NifError, Result};
pub use layout::{compute_block_sizes, FlatCursor, WeightLayout};
pub use model::Nif;
pub use ops::{batched_matvec, slice_bias_block, slice_weight_block};
pub use pnet::{ParameterNet, PnetLayer, SirenPosition};
pub use snet::{GeneratedShapeNet, SharedBasisNet, ShapeNet};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        // Basic smoke test to ensure the crate compiles
        let cursor = FlatCursor::new(0);
        assert!(cursor.finish().is_ok());
    }
}
