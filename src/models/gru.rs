//! GRU cell with backpropagation through time

use super::{outer, sigmoid, tanh, ParameterArena};
use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
struct GruGradients {
    w_z: Array2<f64>,
    u_z: Array2<f64>,
    b_z: Array1<f64>,
    w_r: Array2<f64>,
    u_r: Array2<f64>,
    b_r: Array1<f64>,
    w_n: Array2<f64>,
    u_n: Array2<f64>,
    b_n: Array1<f64>,
}

#[derive(Debug, Clone)]
struct GruStep {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    z: Array1<f64>,
    r: Array1<f64>,
    n: Array1<f64>,
}

/// Gated recurrent unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GruCell {
    input_size: usize,
    hidden_size: usize,

    // Update gate
    w_z: Array2<f64>,
    u_z: Array2<f64>,
    b_z: Array1<f64>,

    // Reset gate
    w_r: Array2<f64>,
    u_r: Array2<f64>,
    b_r: Array1<f64>,

    // Candidate state
    w_n: Array2<f64>,
    u_n: Array2<f64>,
    b_n: Array1<f64>,

    #[serde(skip)]
    grads: GruGradients,
    #[serde(skip)]
    cache: Vec<GruStep>,
}

impl GruCell {
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();
        let input_dist = Uniform::new(-limit, limit);

        let mut cell = Self {
            input_size,
            hidden_size,
            w_z: Array2::random((hidden_size, input_size), input_dist),
            u_z: Array2::random((hidden_size, hidden_size), input_dist),
            b_z: Array1::zeros(hidden_size),
            w_r: Array2::random((hidden_size, input_size), input_dist),
            u_r: Array2::random((hidden_size, hidden_size), input_dist),
            b_r: Array1::zeros(hidden_size),
            w_n: Array2::random((hidden_size, input_size), input_dist),
            u_n: Array2::random((hidden_size, hidden_size), input_dist),
            b_n: Array1::zeros(hidden_size),
            grads: GruGradients::default(),
            cache: Vec::new(),
        };
        cell.zero_grads();
        cell
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    /// One step: returns the gate activations and the new hidden state
    fn step(
        &self,
        x: &Array1<f64>,
        h_prev: &Array1<f64>,
    ) -> (Array1<f64>, Array1<f64>, Array1<f64>, Array1<f64>) {
        // z = σ(W_z x + U_z h + b_z)
        let z = sigmoid(&(self.w_z.dot(x) + self.u_z.dot(h_prev) + &self.b_z));
        // r = σ(W_r x + U_r h + b_r)
        let r = sigmoid(&(self.w_r.dot(x) + self.u_r.dot(h_prev) + &self.b_r));
        // n = tanh(W_n x + U_n (r * h) + b_n)
        let rh = &r * h_prev;
        let n = tanh(&(self.w_n.dot(x) + self.u_n.dot(&rh) + &self.b_n));
        // h' = (1 - z) * n + z * h
        let h_new = &n + &(&z * &(h_prev - &n));

        (z, r, n, h_new)
    }

    /// Run the full sequence for inference, returning the hidden state at
    /// every timestep
    pub fn forward(&self, inputs: &[Array1<f64>]) -> Vec<Array1<f64>> {
        let mut h = Array1::zeros(self.hidden_size);
        let mut outputs = Vec::with_capacity(inputs.len());

        for x in inputs {
            let (_, _, _, h_new) = self.step(x, &h);
            h = h_new;
            outputs.push(h.clone());
        }

        outputs
    }

    /// Run the full sequence caching every step for [`Self::backward`]
    pub fn forward_train(&mut self, inputs: &[Array1<f64>]) -> Vec<Array1<f64>> {
        self.cache.clear();
        let mut h = Array1::zeros(self.hidden_size);
        let mut outputs = Vec::with_capacity(inputs.len());

        for x in inputs {
            let (z, r, n, h_new) = self.step(x, &h);
            self.cache.push(GruStep {
                x: x.clone(),
                h_prev: h.clone(),
                z,
                r,
                n,
            });
            h = h_new;
            outputs.push(h.clone());
        }

        outputs
    }

    /// Backpropagate through the cached sequence.
    ///
    /// `dh_out[t]` is the loss gradient flowing into the hidden state emitted
    /// at timestep `t` from the layer above; the return value is the same
    /// quantity for the layer below.
    pub fn backward(&mut self, dh_out: &[Array1<f64>]) -> Vec<Array1<f64>> {
        let steps = self.cache.len();
        let mut dx_all = vec![Array1::zeros(self.input_size); steps];
        let mut dh_next = Array1::zeros(self.hidden_size);

        for t in (0..steps).rev() {
            let step = &self.cache[t];
            let dh = &dh_out[t] + &dh_next;

            let one_minus_z = step.z.mapv(|v| 1.0 - v);
            let dz = &dh * &(&step.h_prev - &step.n);
            let dn = &dh * &one_minus_z;
            let mut dh_prev = &dh * &step.z;

            let dn_pre = &dn * &step.n.mapv(|v| 1.0 - v * v);
            let rh = &step.r * &step.h_prev;
            self.grads.w_n += &outer(&dn_pre, &step.x);
            self.grads.u_n += &outer(&dn_pre, &rh);
            self.grads.b_n += &dn_pre;

            let drh = self.u_n.t().dot(&dn_pre);
            let dr = &drh * &step.h_prev;
            dh_prev += &(&drh * &step.r);

            let dz_pre = &dz * &(&step.z * &one_minus_z);
            let dr_pre = &dr * &step.r.mapv(|v| v * (1.0 - v));
            self.grads.w_z += &outer(&dz_pre, &step.x);
            self.grads.u_z += &outer(&dz_pre, &step.h_prev);
            self.grads.b_z += &dz_pre;
            self.grads.w_r += &outer(&dr_pre, &step.x);
            self.grads.u_r += &outer(&dr_pre, &step.h_prev);
            self.grads.b_r += &dr_pre;

            dh_prev += &self.u_z.t().dot(&dz_pre);
            dh_prev += &self.u_r.t().dot(&dr_pre);

            dx_all[t] = self.w_z.t().dot(&dz_pre)
                + self.w_r.t().dot(&dr_pre)
                + self.w_n.t().dot(&dn_pre);
            dh_next = dh_prev;
        }

        dx_all
    }

    pub fn zero_grads(&mut self) {
        self.grads = GruGradients {
            w_z: Array2::zeros(self.w_z.raw_dim()),
            u_z: Array2::zeros(self.u_z.raw_dim()),
            b_z: Array1::zeros(self.b_z.raw_dim()),
            w_r: Array2::zeros(self.w_r.raw_dim()),
            u_r: Array2::zeros(self.u_r.raw_dim()),
            b_r: Array1::zeros(self.b_r.raw_dim()),
            w_n: Array2::zeros(self.w_n.raw_dim()),
            u_n: Array2::zeros(self.u_n.raw_dim()),
            b_n: Array1::zeros(self.b_n.raw_dim()),
        };
    }

    pub(crate) fn params_mut(&mut self) -> Vec<&mut f64> {
        self.w_z
            .iter_mut()
            .chain(self.u_z.iter_mut())
            .chain(self.b_z.iter_mut())
            .chain(self.w_r.iter_mut())
            .chain(self.u_r.iter_mut())
            .chain(self.b_r.iter_mut())
            .chain(self.w_n.iter_mut())
            .chain(self.u_n.iter_mut())
            .chain(self.b_n.iter_mut())
            .collect()
    }

    pub(crate) fn grads(&self) -> Vec<f64> {
        self.grads
            .w_z
            .iter()
            .chain(self.grads.u_z.iter())
            .chain(self.grads.b_z.iter())
            .chain(self.grads.w_r.iter())
            .chain(self.grads.u_r.iter())
            .chain(self.grads.b_r.iter())
            .chain(self.grads.w_n.iter())
            .chain(self.grads.u_n.iter())
            .chain(self.grads.b_n.iter())
            .copied()
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.w_z.len()
            + self.u_z.len()
            + self.b_z.len()
            + self.w_r.len()
            + self.u_r.len()
            + self.b_r.len()
            + self.w_n.len()
            + self.u_n.len()
            + self.b_n.len()
    }

    pub(crate) fn register(&self, arena: &mut ParameterArena) {
        for len in [
            self.w_z.len(),
            self.u_z.len(),
            self.b_z.len(),
            self.w_r.len(),
            self.u_r.len(),
            self.b_r.len(),
            self.w_n.len(),
            self.u_n.len(),
            self.b_n.len(),
        ] {
            arena.register(len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gru_forward_shapes() {
        let cell = GruCell::new(1, 16);
        let inputs = vec![Array1::zeros(1); 10];
        let outputs = cell.forward(&inputs);

        assert_eq!(outputs.len(), 10);
        assert_eq!(outputs[0].len(), 16);
    }

    #[test]
    fn test_gru_backward_shapes() {
        let mut cell = GruCell::new(1, 8);
        cell.zero_grads();
        let inputs = vec![Array1::ones(1); 5];
        cell.forward_train(&inputs);

        let dh_out = vec![Array1::ones(8); 5];
        let dx = cell.backward(&dh_out);

        assert_eq!(dx.len(), 5);
        assert_eq!(dx[0].len(), 1);
        assert_eq!(cell.grads().len(), cell.parameter_count());
    }
}
