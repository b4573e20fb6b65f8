//! Pointwise activation functions for the parameter and shape networks.
//!
//! Sine activations are not listed here: sinusoidal layers scale their
//! pre-activation by `omega_0` and are evaluated by position, so they are
//! handled directly by the SIREN layer family and the multiscale shape-net
//! evaluator.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Pointwise activation function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// max(0, x)
    Relu,
    /// Hyperbolic tangent
    Tanh,
    /// Logistic sigmoid
    Sigmoid,
    /// x * sigmoid(x) (a.k.a. SiLU)
    Swish,
    /// Sinusoidal activation; evaluated positionally by SIREN layers
    Sine,
    /// Identity (no activation)
    Linear,
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    // split form avoids overflow for large negative inputs
    if x > 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let ex = x.exp();
        ex / (1.0 + ex)
    }
}

impl Activation {
    /// Apply the activation to a scalar
    pub fn eval(self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
            Activation::Swish => x * sigmoid(x),
            Activation::Sine => x.sin(),
            Activation::Linear => x,
        }
    }

    /// Derivative of the activation at a pre-activation value
    pub fn derivative(self, x: f32) -> f32 {
        match self {
            Activation::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - x.tanh().powi(2),
            Activation::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            Activation::Swish => {
                let s = sigmoid(x);
                s + x * s * (1.0 - s)
            }
            Activation::Sine => x.cos(),
            Activation::Linear => 1.0,
        }
    }

    /// Apply the activation element-wise
    pub fn apply(self, x: &Array2<f32>) -> Array2<f32> {
        x.mapv(|v| self.eval(v))
    }

    /// Element-wise derivative at the given pre-activations
    pub fn apply_derivative(self, x: &Array2<f32>) -> Array2<f32> {
        x.mapv(|v| self.derivative(v))
    }
}
