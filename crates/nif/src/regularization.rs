//! Training-time penalty terms.
//!
//! Three families, each switched on by an optional strength in the
//! parameter-net configuration:
//!
//! - weight penalties (`l1_reg`, `l2_reg`) over every parameter-net weight
//!   and bias,
//! - activity penalties (`act_l1_reg`, `act_l2_reg`) over the generated
//!   flat weight vector,
//! - the latent-Jacobian penalty (`jac_reg`), the mean squared entry of
//!   `d latent / d context`, computed exactly with forward-mode tangents.
//!
//! All terms are returned as one scalar to be added to a data loss.

use ndarray::Array2;

use crate::error::Result;
use crate::model::Nif;
use crate::pnet::ParameterNet;

fn weight_penalty(pnet: &ParameterNet, l1: Option<f32>, l2: Option<f32>) -> f32 {
    if l1.is_none() && l2.is_none() {
        return 0.0;
    }
    let mut abs_sum = 0.0_f32;
    let mut sq_sum = 0.0_f32;
    pnet.visit_params(&mut |w, b| {
        abs_sum += w.iter().map(|v| v.abs()).sum::<f32>();
        abs_sum += b.iter().map(|v| v.abs()).sum::<f32>();
        sq_sum += w.iter().map(|v| v * v).sum::<f32>();
        sq_sum += b.iter().map(|v| v * v).sum::<f32>();
    });
    l1.map_or(0.0, |l| l * abs_sum) + l2.map_or(0.0, |l| l * sq_sum)
}

fn activity_penalty(flat: &Array2<f32>, l1: Option<f32>, l2: Option<f32>) -> f32 {
    let mut loss = 0.0_f32;
    if let Some(l) = l1 {
        loss += l * flat.iter().map(|v| v.abs()).sum::<f32>();
    }
    if let Some(l) = l2 {
        loss += l * flat.iter().map(|v| v * v).sum::<f32>();
    }
    loss
}

impl Nif {
    /// Total regularization loss for a context batch.
    ///
    /// Returns zero when no penalty strength is configured.
    pub fn regularization_loss(&self, context: &Array2<f32>) -> Result<f32> {
        let cfg = self.parameter_net_config().clone();
        let mut loss = weight_penalty(self.parameter_net(), cfg.l1_reg, cfg.l2_reg);

        if cfg.act_l1_reg.is_some() || cfg.act_l2_reg.is_some() {
            let flat = self.context_to_flat_weights(context)?;
            loss += activity_penalty(&flat, cfg.act_l1_reg, cfg.act_l2_reg);
        }

        if let Some(l) = cfg.jac_reg {
            let jac = self.parameter_net().latent_jacobian(context)?;
            let n = jac.len() as f32;
            let mean_sq = jac.iter().map(|v| v * v).sum::<f32>() / n;
            loss += l * mean_sq;
        }
        Ok(loss)
    }
}
