//! End-to-end consistency tests for the full model: joint versus decomposed
//! evaluation, batch independence, the shared-basis variant, persistence,
//! and eager shape validation.

use ndarray::{arr2, Array2, Axis};
use nif::{
    Activation, Connectivity, MixedPolicy, ModelConfig, Nif, NifError, ParameterNetConfig,
    ShapeNetConfig,
};

fn base_config() -> ModelConfig {
    ModelConfig {
        cfg_shape_net: ShapeNetConfig {
            input_dim: 1,
            output_dim: 1,
            units: 4,
            nlayers: 1,
            connectivity: Connectivity::Full,
            use_resblock: false,
            activation: Activation::Swish,
            omega_0: 30.0,
            weight_init_factor: 1.0,
        },
        cfg_parameter_net: ParameterNetConfig {
            input_dim: 1,
            latent_dim: 1,
            units: 4,
            nlayers: 1,
            activation: Activation::Swish,
            use_resblock: false,
            omega_0: 30.0,
            l1_reg: None,
            l2_reg: None,
            act_l1_reg: None,
            act_l2_reg: None,
            jac_reg: None,
        },
        mixed_policy: MixedPolicy::Float32,
    }
}

fn sine_config() -> ModelConfig {
    let mut config = base_config();
    config.cfg_shape_net.activation = Activation::Sine;
    config.cfg_shape_net.units = 8;
    config.cfg_shape_net.nlayers = 2;
    config
}

#[test]
fn swish_model_evaluates_and_decomposes() {
    let model = Nif::with_seed(base_config(), 42).unwrap();
    let context = arr2(&[[0.0_f32]]);
    let coords = arr2(&[[0.5_f32]]);

    let joint = model.forward(&context, &coords).unwrap();
    assert_eq!(joint.dim(), (1, 1));
    assert!(joint[[0, 0]].is_finite());

    let flat = model.context_to_flat_weights(&context).unwrap();
    assert_eq!(flat.ncols(), model.po_dim());
    let decomposed = model
        .coords_and_flat_weights_to_field(&coords, &flat)
        .unwrap();
    assert!((joint[[0, 0]] - decomposed[[0, 0]]).abs() < 1e-6);
}

#[test]
fn batch_evaluation_is_row_independent() {
    for config in [base_config(), sine_config()] {
        let model = Nif::with_seed(config, 7).unwrap();
        for batch in [1usize, 8, 64] {
            let context =
                Array2::from_shape_fn((batch, 1), |(a, _)| a as f32 / batch as f32);
            let coords =
                Array2::from_shape_fn((batch, 1), |(a, _)| (a as f32 + 0.5) / batch as f32);
            let full = model.forward(&context, &coords).unwrap();
            assert_eq!(full.dim(), (batch, 1));

            for a in [0, batch - 1] {
                let c = context.row(a).insert_axis(Axis(0)).to_owned();
                let x = coords.row(a).insert_axis(Axis(0)).to_owned();
                let single = model.forward(&c, &x).unwrap();
                assert!(
                    (single[[0, 0]] - full[[a, 0]]).abs() < 1e-6,
                    "batch={batch} row={a}"
                );
            }
        }
    }
}

#[test]
fn sine_resblock_model_evaluates() {
    let mut config = sine_config();
    config.cfg_shape_net.use_resblock = true;
    config.cfg_parameter_net.use_resblock = true;
    let model = Nif::with_seed(config, 3).unwrap();
    let context = arr2(&[[0.1_f32], [0.9]]);
    let coords = arr2(&[[0.2_f32], [0.8]]);
    let out = model.forward(&context, &coords).unwrap();
    assert_eq!(out.dim(), (2, 1));
    assert!(out.iter().all(|v| v.is_finite()));
}

#[test]
fn last_layer_model_contracts_the_shared_basis() {
    let mut config = sine_config();
    config.cfg_shape_net.connectivity = Connectivity::LastLayer;
    config.cfg_parameter_net.latent_dim = 3;
    let model = Nif::with_seed(config, 11).unwrap();
    assert_eq!(model.po_dim(), 3);

    let context = arr2(&[[0.4_f32]]);
    let coords = arr2(&[[0.6_f32]]);
    let joint = model.forward(&context, &coords).unwrap();

    // reconstruct the contraction from the exposed basis and coefficients
    let coeffs = model.context_to_flat_weights(&context).unwrap();
    let basis = model.coords_to_basis(&coords).unwrap();
    let mut manual = 0.0_f32;
    for k in 0..3 {
        manual += basis[[0, 0, k]] * coeffs[[0, k]];
    }
    // the learned output bias starts at zero
    assert!((joint[[0, 0]] - manual).abs() < 1e-5);
}

#[test]
fn config_json_survives_a_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");

    let config = base_config();
    config.save(&path).unwrap();
    let reloaded = ModelConfig::load(&path).unwrap();
    assert_eq!(config, reloaded);

    // a model built from the reloaded config has the same layout
    let a = Nif::with_seed(config, 1).unwrap();
    let b = Nif::with_seed(reloaded, 1).unwrap();
    assert_eq!(a.po_dim(), b.po_dim());
    assert_eq!(a.layout(), b.layout());
}

#[test]
fn saved_model_reproduces_its_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");

    let model = Nif::with_seed(sine_config(), 5).unwrap();
    let context = arr2(&[[0.3_f32]]);
    let coords = arr2(&[[0.7_f32]]);
    let before = model.forward(&context, &coords).unwrap();

    model.save(&path).unwrap();
    let reloaded = Nif::load(&path).unwrap();
    let after = reloaded.forward(&context, &coords).unwrap();
    assert_eq!(before, after);
}

#[test]
fn half_precision_policy_rounds_outputs() {
    let mut config = base_config();
    config.mixed_policy = MixedPolicy::Float16;
    let model = Nif::with_seed(config, 42).unwrap();
    let out = model
        .forward(&arr2(&[[0.5_f32]]), &arr2(&[[0.5_f32]]))
        .unwrap();
    let v = out[[0, 0]];
    assert!(v.is_finite());
    // every output value must be representable in half precision
    assert_eq!(half::f16::from_f32(v).to_f32(), v);
}

#[test]
fn mismatched_flat_width_fails_eagerly() {
    let model = Nif::with_seed(base_config(), 0).unwrap();
    let coords = arr2(&[[0.5_f32]]);
    let flat = Array2::<f32>::zeros((1, model.po_dim() + 3));
    assert!(matches!(
        model.coords_and_flat_weights_to_field(&coords, &flat),
        Err(NifError::LayoutMismatch { .. })
    ));
}

#[test]
fn invalid_configs_are_rejected_at_construction() {
    let mut config = base_config();
    config.cfg_shape_net.units = 0;
    assert!(matches!(
        Nif::with_seed(config, 0),
        Err(NifError::InvalidConfig(_))
    ));

    let mut config = base_config();
    config.cfg_shape_net.connectivity = Connectivity::LastLayer;
    // last_layer requires a sine shape net
    assert!(matches!(
        Nif::with_seed(config, 0),
        Err(NifError::InvalidConfig(_))
    ));
}

#[test]
fn regularized_model_reports_a_positive_penalty() {
    let mut config = base_config();
    config.cfg_parameter_net.l2_reg = Some(1e-4);
    config.cfg_parameter_net.jac_reg = Some(1e-2);
    let model = Nif::with_seed(config, 17).unwrap();
    let loss = model.regularization_loss(&arr2(&[[0.5_f32]])).unwrap();
    assert!(loss > 0.0);
}
