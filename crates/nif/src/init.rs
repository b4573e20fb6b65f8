//! Weight initialization for the parameter network.
//!
//! Three families are used, matching the role of each layer:
//!
//! - truncated normal (stddev 0.1) for plain dense layers,
//! - SIREN positional uniform ranges for sinusoidal layers,
//! - a block-scaled uniform scheme for the hypernetwork output layer, whose
//!   columns feed different positions of the generated shape network and
//!   therefore need different initial variance.
//!
//! All functions are pure given the caller's RNG; seeding the RNG makes
//! every draw reproducible.

use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::layout::WeightLayout;

/// Truncated normal sample: resample anything beyond two standard deviations
fn truncated_normal_sample(rng: &mut impl Rng, normal: &Normal<f32>, stddev: f32) -> f32 {
    loop {
        let x = normal.sample(rng);
        if x.abs() <= 2.0 * stddev {
            return x;
        }
    }
}

/// Truncated-normal weight matrix (stddev 0.1 in the reference stacks)
pub fn truncated_normal(rng: &mut impl Rng, rows: usize, cols: usize, stddev: f32) -> Array2<f32> {
    let normal = Normal::new(0.0_f32, stddev).expect("Invalid normal distribution parameters");
    Array2::from_shape_fn((rows, cols), |_| truncated_normal_sample(rng, &normal, stddev))
}

/// Truncated-normal bias vector
pub fn truncated_normal_bias(rng: &mut impl Rng, len: usize, stddev: f32) -> Array1<f32> {
    let normal = Normal::new(0.0_f32, stddev).expect("Invalid normal distribution parameters");
    Array1::from_shape_fn(len, |_| truncated_normal_sample(rng, &normal, stddev))
}

fn uniform_matrix(rng: &mut impl Rng, rows: usize, cols: usize, limit: f32) -> Array2<f32> {
    let dist = Uniform::new(-limit, limit);
    Array2::from_shape_fn((rows, cols), |_| dist.sample(rng))
}

fn uniform_vector(rng: &mut impl Rng, len: usize, limit: f32) -> Array1<f32> {
    let dist = Uniform::new(-limit, limit);
    Array1::from_shape_fn(len, |_| dist.sample(rng))
}

/// First sinusoidal layer: weights `U(±1/fan_in)`, biases `U(±1/sqrt(fan_in))`
pub fn siren_first(rng: &mut impl Rng, fan_in: usize, fan_out: usize) -> (Array2<f32>, Array1<f32>) {
    let w = uniform_matrix(rng, fan_in, fan_out, 1.0 / fan_in as f32);
    let b = uniform_vector(rng, fan_out, 1.0 / (fan_in as f32).sqrt());
    (w, b)
}

/// Hidden or bottleneck sinusoidal layer: weights `U(±sqrt(6/fan_in)/omega_0)`,
/// biases `U(±1/sqrt(fan_in))`
pub fn siren_hidden(
    rng: &mut impl Rng,
    fan_in: usize,
    fan_out: usize,
    omega_0: f32,
) -> (Array2<f32>, Array1<f32>) {
    let w = uniform_matrix(rng, fan_in, fan_out, (6.0 / fan_in as f32).sqrt() / omega_0);
    let b = uniform_vector(rng, fan_out, 1.0 / (fan_in as f32).sqrt());
    (w, b)
}

/// Block-scaled initialization for the hypernetwork output layer.
///
/// Weights are `U(±sqrt(6/num_inputs) * weight_factor)`. Biases use a
/// per-column scale vector over the flat layout: first-weight columns are
/// divided by the shape net's `input_dim`, hidden-weight columns scaled by
/// `sqrt(6/width)/omega_0`, last-weight columns by `sqrt(6/(width+width))`
/// (Glorot range, that sub-layer is linear), and every bias column divided
/// by `width`. Each generated block then starts in the numeric range a
/// directly-initialized SIREN layer of the same position would.
pub fn hyper_output(
    rng: &mut impl Rng,
    num_inputs: usize,
    layout: &WeightLayout,
    input_dim: usize,
    width: usize,
    omega_0: f32,
    weight_factor: f32,
) -> (Array2<f32>, Array1<f32>) {
    let limit = (6.0 / num_inputs as f32).sqrt() * weight_factor;
    let w = uniform_matrix(rng, num_inputs, layout.po_dim, limit);

    let mut scale = Array1::<f32>::ones(layout.po_dim);
    let first_end = layout.n_first_w;
    let hidden_end = first_end + layout.n_hidden_w;
    let last_end = hidden_end + layout.n_last_w;
    for i in 0..first_end {
        scale[i] /= input_dim as f32;
    }
    let hidden_scale = (6.0 / width as f32).sqrt() / omega_0;
    for i in first_end..hidden_end {
        scale[i] *= hidden_scale;
    }
    let last_scale = (6.0 / (width + width) as f32).sqrt();
    for i in hidden_end..last_end {
        scale[i] *= last_scale;
    }
    for i in last_end..layout.po_dim {
        scale[i] /= width as f32;
    }

    let b = Array1::from_shape_fn(layout.po_dim, |i| {
        let s = scale[i];
        Uniform::new(-s, s).sample(rng)
    });
    (w, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Activation;
    use crate::config::{Connectivity, ShapeNetConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layout() -> WeightLayout {
        let cfg = ShapeNetConfig {
            input_dim: 2,
            output_dim: 1,
            units: 8,
            nlayers: 2,
            connectivity: Connectivity::Full,
            use_resblock: false,
            activation: Activation::Sine,
            omega_0: 30.0,
            weight_init_factor: 1.0,
        };
        WeightLayout::from_config(&cfg, 4).unwrap()
    }

    #[test]
    fn seeded_draws_are_bit_identical() {
        let layout = layout();
        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        let (wa, ba) = hyper_output(&mut rng_a, 4, &layout, 2, 8, 30.0, 1.0);
        let (wb, bb) = hyper_output(&mut rng_b, 4, &layout, 2, 8, 30.0, 1.0);
        assert_eq!(wa, wb);
        assert_eq!(ba, bb);
    }

    #[test]
    fn hyper_output_bias_respects_block_scales() {
        let layout = layout();
        let mut rng = StdRng::seed_from_u64(1);
        let (w, b) = hyper_output(&mut rng, 4, &layout, 2, 8, 30.0, 1.0);
        assert_eq!(w.dim(), (4, layout.po_dim));
        assert_eq!(b.len(), layout.po_dim);

        // first-weight columns: |b| < 1/input_dim
        for i in 0..layout.n_first_w {
            assert!(b[i].abs() < 1.0 / 2.0);
        }
        // hidden-weight columns: |b| < sqrt(6/width)/omega_0
        let hidden_limit = (6.0_f32 / 8.0).sqrt() / 30.0;
        for i in layout.n_first_w..layout.n_first_w + layout.n_hidden_w {
            assert!(b[i].abs() < hidden_limit);
        }
        // bias columns: |b| < 1/width
        for i in layout.weights_total()..layout.po_dim {
            assert!(b[i].abs() < 1.0 / 8.0);
        }
    }

    #[test]
    fn truncated_normal_stays_within_two_sigma() {
        let mut rng = StdRng::seed_from_u64(3);
        let w = truncated_normal(&mut rng, 32, 32, 0.1);
        assert!(w.iter().all(|v| v.abs() <= 0.2));
        // and is not degenerate
        assert!(w.iter().any(|v| v.abs() > 1e-4));
    }

    #[test]
    fn siren_ranges_match_position() {
        let mut rng = StdRng::seed_from_u64(5);
        let (w, b) = siren_first(&mut rng, 4, 16);
        assert!(w.iter().all(|v| v.abs() <= 0.25));
        assert!(b.iter().all(|v| v.abs() <= 0.5));

        let (w, _) = siren_hidden(&mut rng, 16, 16, 30.0);
        let limit = (6.0_f32 / 16.0).sqrt() / 30.0;
        assert!(w.iter().all(|v| v.abs() <= limit));
    }
}
