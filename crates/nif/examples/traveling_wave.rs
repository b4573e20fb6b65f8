//! Demonstration of a NIF model on a 1D traveling wave
//!
//! This example builds a small swish model, generates per-time-step
//! shape-network weights once, and evaluates the field on a spatial grid
//! for several time steps.

use ndarray::Array2;
use nif::{
    Activation, Connectivity, MixedPolicy, ModelConfig, Nif, ParameterNetConfig, ShapeNetConfig,
};

fn main() -> nif::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    println!("Neural Implicit Flow Demo");
    println!("=========================\n");

    let config = ModelConfig {
        cfg_shape_net: ShapeNetConfig {
            input_dim: 1,
            output_dim: 1,
            units: 30,
            nlayers: 2,
            connectivity: Connectivity::Full,
            use_resblock: false,
            activation: Activation::Swish,
            omega_0: 30.0,
            weight_init_factor: 1.0,
        },
        cfg_parameter_net: ParameterNetConfig {
            input_dim: 1,
            latent_dim: 1,
            units: 30,
            nlayers: 2,
            activation: Activation::Swish,
            use_resblock: false,
            omega_0: 30.0,
            l1_reg: None,
            l2_reg: None,
            act_l1_reg: None,
            act_l2_reg: None,
            jac_reg: Some(1e-2),
        },
        mixed_policy: MixedPolicy::Float32,
    };

    let model = Nif::with_seed(config, 42)?;
    println!("Built model:");
    println!("  flat weight vector width (po_dim): {}", model.po_dim());
    println!("  bottleneck latent dimension:       {}\n", model.latent_dim());

    // one context per time step
    let times = [0.0_f32, 0.25, 0.5];
    let grid: Vec<f32> = (0..8).map(|i| i as f32 / 7.0).collect();

    for &t in &times {
        // generate the weights once for this time step
        let context = Array2::from_elem((1, 1), t);
        let flat = model.context_to_flat_weights(&context)?;

        // broadcast the same generated weights over the whole grid
        let n = grid.len();
        let coords = Array2::from_shape_fn((n, 1), |(i, _)| grid[i]);
        let mut flat_rows = Array2::zeros((n, model.po_dim()));
        for mut row in flat_rows.rows_mut() {
            row.assign(&flat.row(0));
        }
        let field = model.coords_and_flat_weights_to_field(&coords, &flat_rows)?;

        let values: Vec<String> = field.column(0).iter().map(|v| format!("{v:+.4}")).collect();
        println!("t = {t:.2}: u(x) = [{}]", values.join(", "));
    }

    let contexts = Array2::from_shape_fn((times.len(), 1), |(i, _)| times[i]);
    let reg = model.regularization_loss(&contexts)?;
    println!("\nJacobian penalty over the three contexts: {reg:.6}");

    Ok(())
}
