//! Dense layer and dropout used by the network head and between
//! recurrent layers

use super::ParameterArena;
use ndarray::{Array1, Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};
use serde::{Deserialize, Serialize};

/// Activation applied after the affine transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Linear,
    Relu,
}

impl Activation {
    fn apply(&self, pre: &Array1<f64>) -> Array1<f64> {
        match self {
            Activation::Linear => pre.clone(),
            Activation::Relu => pre.mapv(|v| v.max(0.0)),
        }
    }

    fn derivative(&self, pre: &Array1<f64>) -> Array1<f64> {
        match self {
            Activation::Linear => Array1::ones(pre.len()),
            Activation::Relu => pre.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct DenseCache {
    input: Array1<f64>,
    pre: Array1<f64>,
}

/// Fully connected layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    weights: Array2<f64>,
    biases: Array1<f64>,
    activation: Activation,
    #[serde(skip)]
    grad_w: Array2<f64>,
    #[serde(skip)]
    grad_b: Array1<f64>,
    #[serde(skip)]
    cache: Option<DenseCache>,
}

impl Dense {
    pub fn new(input_size: usize, output_size: usize, activation: Activation) -> Self {
        let limit = (1.0 / input_size as f64).sqrt();

        Self {
            weights: Array2::random((output_size, input_size), Uniform::new(-limit, limit)),
            biases: Array1::zeros(output_size),
            activation,
            grad_w: Array2::zeros((output_size, input_size)),
            grad_b: Array1::zeros(output_size),
            cache: None,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.ncols()
    }

    pub fn output_size(&self) -> usize {
        self.weights.nrows()
    }

    /// Forward pass without caching, for inference
    pub fn forward(&self, x: &Array1<f64>) -> Array1<f64> {
        let pre = self.weights.dot(x) + &self.biases;
        self.activation.apply(&pre)
    }

    /// Forward pass that caches activations for the backward pass
    pub fn forward_train(&mut self, x: &Array1<f64>) -> Array1<f64> {
        let pre = self.weights.dot(x) + &self.biases;
        let out = self.activation.apply(&pre);
        self.cache = Some(DenseCache {
            input: x.clone(),
            pre,
        });
        out
    }

    /// Accumulate gradients for the cached forward pass and return the
    /// gradient with respect to the layer input
    pub fn backward(&mut self, dout: &Array1<f64>) -> Array1<f64> {
        let cache = match self.cache.take() {
            Some(cache) => cache,
            None => return Array1::zeros(self.input_size()),
        };

        let dpre = dout * &self.activation.derivative(&cache.pre);
        let dpre_col = dpre.view().insert_axis(Axis(1));
        let input_row = cache.input.view().insert_axis(Axis(0));
        self.grad_w += &dpre_col.dot(&input_row);
        self.grad_b += &dpre;

        self.weights.t().dot(&dpre)
    }

    pub fn zero_grads(&mut self) {
        self.grad_w = Array2::zeros(self.weights.raw_dim());
        self.grad_b = Array1::zeros(self.biases.raw_dim());
    }

    pub(crate) fn params_mut(&mut self) -> Vec<&mut f64> {
        self.weights
            .iter_mut()
            .chain(self.biases.iter_mut())
            .collect()
    }

    pub(crate) fn grads(&self) -> Vec<f64> {
        self.grad_w
            .iter()
            .chain(self.grad_b.iter())
            .copied()
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    pub(crate) fn register(&self, arena: &mut ParameterArena) {
        arena.register(self.weights.len());
        arena.register(self.biases.len());
    }
}

/// Inverted dropout applied per timestep between recurrent layers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dropout {
    rate: f64,
    #[serde(skip)]
    masks: Vec<Array1<f64>>,
}

impl Dropout {
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 0.95),
            masks: Vec::new(),
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Apply fresh masks to a full output sequence, remembering them for the
    /// backward pass. Identity when the rate is zero.
    pub fn forward_train<R: Rng>(
        &mut self,
        seq: Vec<Array1<f64>>,
        rng: &mut R,
    ) -> Vec<Array1<f64>> {
        self.masks.clear();
        if self.rate <= 0.0 {
            return seq;
        }

        let keep = 1.0 - self.rate;
        let Ok(bernoulli) = Bernoulli::new(keep) else {
            return seq;
        };

        seq.into_iter()
            .map(|h| {
                let mask = Array1::from_shape_fn(h.len(), |_| {
                    if bernoulli.sample(rng) {
                        1.0 / keep
                    } else {
                        0.0
                    }
                });
                let out = &h * &mask;
                self.masks.push(mask);
                out
            })
            .collect()
    }

    /// Re-apply the masks from the most recent forward pass
    pub fn backward(&self, dseq: Vec<Array1<f64>>) -> Vec<Array1<f64>> {
        if self.rate <= 0.0 || self.masks.is_empty() {
            return dseq;
        }

        dseq.into_iter()
            .zip(self.masks.iter())
            .map(|(d, mask)| &d * mask)
            .collect()
    }
}
