//! Gradient descent optimizers
//!
//! Both operate on the network's flattened parameter/gradient vectors so the
//! layers stay optimizer-agnostic.

use crate::config::OptimizerKind;

#[derive(Debug, Clone)]
pub enum Optimizer {
    /// Plain SGD
    Sgd { learning_rate: f64 },
    /// Adam with bias-corrected moment estimates
    Adam {
        learning_rate: f64,
        beta1: f64,
        beta2: f64,
        epsilon: f64,
        timestep: i32,
        first_moment: Vec<f64>,
        second_moment: Vec<f64>,
    },
}

impl Optimizer {
    pub fn new(kind: OptimizerKind, learning_rate: f64) -> Self {
        match kind {
            OptimizerKind::Sgd => Optimizer::Sgd { learning_rate },
            OptimizerKind::Adam => Optimizer::Adam {
                learning_rate,
                beta1: 0.9,
                beta2: 0.999,
                epsilon: 1e-8,
                timestep: 0,
                first_moment: Vec::new(),
                second_moment: Vec::new(),
            },
        }
    }

    /// Apply one update. `params` and `grads` must be in the same stable
    /// order across calls.
    pub fn step(&mut self, mut params: Vec<&mut f64>, grads: &[f64]) {
        match self {
            Optimizer::Sgd { learning_rate } => {
                for (param, grad) in params.iter_mut().zip(grads) {
                    **param -= *learning_rate * grad;
                }
            }
            Optimizer::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
                timestep,
                first_moment,
                second_moment,
            } => {
                if first_moment.len() != grads.len() {
                    *first_moment = vec![0.0; grads.len()];
                    *second_moment = vec![0.0; grads.len()];
                    *timestep = 0;
                }
                *timestep += 1;
                let bias1 = 1.0 - beta1.powi(*timestep);
                let bias2 = 1.0 - beta2.powi(*timestep);

                for (idx, grad) in grads.iter().enumerate() {
                    first_moment[idx] = *beta1 * first_moment[idx] + (1.0 - *beta1) * grad;
                    second_moment[idx] =
                        *beta2 * second_moment[idx] + (1.0 - *beta2) * grad * grad;

                    let m_hat = first_moment[idx] / bias1;
                    let v_hat = second_moment[idx] / bias2;
                    *params[idx] -= *learning_rate * m_hat / (v_hat.sqrt() + *epsilon);
                }
            }
        }
    }
}

/// Scale gradients in place so their global L2 norm does not exceed
/// `max_norm`
pub fn clip_gradients(grads: &mut [f64], max_norm: f64) {
    let norm = grads.iter().map(|g| g * g).sum::<f64>().sqrt();
    if norm > max_norm && norm > 0.0 {
        let scale = max_norm / norm;
        for grad in grads.iter_mut() {
            *grad *= scale;
        }
    }
}
