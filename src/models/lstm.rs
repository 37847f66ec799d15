//! LSTM cell with backpropagation through time

use super::{outer, sigmoid, tanh, ParameterArena};
use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default)]
struct LstmGradients {
    w_ii: Array2<f64>,
    w_hi: Array2<f64>,
    b_i: Array1<f64>,
    w_if: Array2<f64>,
    w_hf: Array2<f64>,
    b_f: Array1<f64>,
    w_ig: Array2<f64>,
    w_hg: Array2<f64>,
    b_g: Array1<f64>,
    w_io: Array2<f64>,
    w_ho: Array2<f64>,
    b_o: Array1<f64>,
}

#[derive(Debug, Clone)]
struct LstmStep {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    tanh_c: Array1<f64>,
}

/// Long short-term memory cell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmCell {
    input_size: usize,
    hidden_size: usize,

    // Input gate
    w_ii: Array2<f64>,
    w_hi: Array2<f64>,
    b_i: Array1<f64>,

    // Forget gate
    w_if: Array2<f64>,
    w_hf: Array2<f64>,
    b_f: Array1<f64>,

    // Cell candidate
    w_ig: Array2<f64>,
    w_hg: Array2<f64>,
    b_g: Array1<f64>,

    // Output gate
    w_io: Array2<f64>,
    w_ho: Array2<f64>,
    b_o: Array1<f64>,

    #[serde(skip)]
    grads: LstmGradients,
    #[serde(skip)]
    cache: Vec<LstmStep>,
}

impl LstmCell {
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        let limit = (1.0 / hidden_size as f64).sqrt();
        let dist = Uniform::new(-limit, limit);

        let mut cell = Self {
            input_size,
            hidden_size,
            w_ii: Array2::random((hidden_size, input_size), dist),
            w_hi: Array2::random((hidden_size, hidden_size), dist),
            b_i: Array1::zeros(hidden_size),
            w_if: Array2::random((hidden_size, input_size), dist),
            w_hf: Array2::random((hidden_size, hidden_size), dist),
            // Forget bias starts at 1 so early training retains state
            b_f: Array1::from_elem(hidden_size, 1.0),
            w_ig: Array2::random((hidden_size, input_size), dist),
            w_hg: Array2::random((hidden_size, hidden_size), dist),
            b_g: Array1::zeros(hidden_size),
            w_io: Array2::random((hidden_size, input_size), dist),
            w_ho: Array2::random((hidden_size, hidden_size), dist),
            b_o: Array1::zeros(hidden_size),
            grads: LstmGradients::default(),
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

    #[allow(clippy::type_complexity)]
    fn step(
        &self,
        x: &Array1<f64>,
        h_prev: &Array1<f64>,
        c_prev: &Array1<f64>,
    ) -> (
        Array1<f64>,
        Array1<f64>,
        Array1<f64>,
        Array1<f64>,
        Array1<f64>,
        Array1<f64>,
    ) {
        // i = σ(W_ii x + W_hi h + b_i)
        let i = sigmoid(&(self.w_ii.dot(x) + self.w_hi.dot(h_prev) + &self.b_i));
        // f = σ(W_if x + W_hf h + b_f)
        let f = sigmoid(&(self.w_if.dot(x) + self.w_hf.dot(h_prev) + &self.b_f));
        // g = tanh(W_ig x + W_hg h + b_g)
        let g = tanh(&(self.w_ig.dot(x) + self.w_hg.dot(h_prev) + &self.b_g));
        // o = σ(W_io x + W_ho h + b_o)
        let o = sigmoid(&(self.w_io.dot(x) + self.w_ho.dot(h_prev) + &self.b_o));
        // c' = f * c + i * g
        let c_new = &f * c_prev + &i * &g;
        let tanh_c = tanh(&c_new);
        // h' = o * tanh(c')
        let h_new = &o * &tanh_c;

        (i, f, g, o, c_new, h_new)
    }

    /// Run the full sequence for inference, returning the hidden state at
    /// every timestep
    pub fn forward(&self, inputs: &[Array1<f64>]) -> Vec<Array1<f64>> {
        let mut h = Array1::zeros(self.hidden_size);
        let mut c = Array1::zeros(self.hidden_size);
        let mut outputs = Vec::with_capacity(inputs.len());

        for x in inputs {
            let (_, _, _, _, c_new, h_new) = self.step(x, &h, &c);
            h = h_new;
            c = c_new;
            outputs.push(h.clone());
        }

        outputs
    }

    /// Run the full sequence caching every step for [`Self::backward`]
    pub fn forward_train(&mut self, inputs: &[Array1<f64>]) -> Vec<Array1<f64>> {
        self.cache.clear();
        let mut h = Array1::zeros(self.hidden_size);
        let mut c = Array1::zeros(self.hidden_size);
        let mut outputs = Vec::with_capacity(inputs.len());

        for x in inputs {
            let (i, f, g, o, c_new, h_new) = self.step(x, &h, &c);
            self.cache.push(LstmStep {
                x: x.clone(),
                h_prev: h.clone(),
                c_prev: c.clone(),
                i,
                f,
                g,
                o,
                tanh_c: tanh(&c_new),
            });
            h = h_new;
            c = c_new;
            outputs.push(h.clone());
        }

        outputs
    }

    /// Backpropagate through the cached sequence; see `GruCell::backward`
    /// for the gradient-flow convention
    pub fn backward(&mut self, dh_out: &[Array1<f64>]) -> Vec<Array1<f64>> {
        let steps = self.cache.len();
        let mut dx_all = vec![Array1::zeros(self.input_size); steps];
        let mut dh_next = Array1::zeros(self.hidden_size);
        let mut dc_next = Array1::zeros(self.hidden_size);

        for t in (0..steps).rev() {
            let step = &self.cache[t];
            let dh = &dh_out[t] + &dh_next;

            let d_o = &dh * &step.tanh_c;
            let dc = &dc_next + &(&dh * &(&step.o * &step.tanh_c.mapv(|v| 1.0 - v * v)));
            let di = &dc * &step.g;
            let dg = &dc * &step.i;
            let df = &dc * &step.c_prev;
            let dc_prev = &dc * &step.f;

            let di_pre = &di * &step.i.mapv(|v| v * (1.0 - v));
            let df_pre = &df * &step.f.mapv(|v| v * (1.0 - v));
            let dg_pre = &dg * &step.g.mapv(|v| 1.0 - v * v);
            let do_pre = &d_o * &step.o.mapv(|v| v * (1.0 - v));

            self.grads.w_ii += &outer(&di_pre, &step.x);
            self.grads.w_hi += &outer(&di_pre, &step.h_prev);
            self.grads.b_i += &di_pre;
            self.grads.w_if += &outer(&df_pre, &step.x);
            self.grads.w_hf += &outer(&df_pre, &step.h_prev);
            self.grads.b_f += &df_pre;
            self.grads.w_ig += &outer(&dg_pre, &step.x);
            self.grads.w_hg += &outer(&dg_pre, &step.h_prev);
            self.grads.b_g += &dg_pre;
            self.grads.w_io += &outer(&do_pre, &step.x);
            self.grads.w_ho += &outer(&do_pre, &step.h_prev);
            self.grads.b_o += &do_pre;

            dx_all[t] = self.w_ii.t().dot(&di_pre)
                + self.w_if.t().dot(&df_pre)
                + self.w_ig.t().dot(&dg_pre)
                + self.w_io.t().dot(&do_pre);

            dh_next = self.w_hi.t().dot(&di_pre)
                + self.w_hf.t().dot(&df_pre)
                + self.w_hg.t().dot(&dg_pre)
                + self.w_ho.t().dot(&do_pre);
            dc_next = dc_prev;
        }

        dx_all
    }

    pub fn zero_grads(&mut self) {
        self.grads = LstmGradients {
            w_ii: Array2::zeros(self.w_ii.raw_dim()),
            w_hi: Array2::zeros(self.w_hi.raw_dim()),
            b_i: Array1::zeros(self.b_i.raw_dim()),
            w_if: Array2::zeros(self.w_if.raw_dim()),
            w_hf: Array2::zeros(self.w_hf.raw_dim()),
            b_f: Array1::zeros(self.b_f.raw_dim()),
            w_ig: Array2::zeros(self.w_ig.raw_dim()),
            w_hg: Array2::zeros(self.w_hg.raw_dim()),
            b_g: Array1::zeros(self.b_g.raw_dim()),
            w_io: Array2::zeros(self.w_io.raw_dim()),
            w_ho: Array2::zeros(self.w_ho.raw_dim()),
            b_o: Array1::zeros(self.b_o.raw_dim()),
        };
    }

    pub(crate) fn params_mut(&mut self) -> Vec<&mut f64> {
        self.w_ii
            .iter_mut()
            .chain(self.w_hi.iter_mut())
            .chain(self.b_i.iter_mut())
            .chain(self.w_if.iter_mut())
            .chain(self.w_hf.iter_mut())
            .chain(self.b_f.iter_mut())
            .chain(self.w_ig.iter_mut())
            .chain(self.w_hg.iter_mut())
            .chain(self.b_g.iter_mut())
            .chain(self.w_io.iter_mut())
            .chain(self.w_ho.iter_mut())
            .chain(self.b_o.iter_mut())
            .collect()
    }

    pub(crate) fn grads(&self) -> Vec<f64> {
        self.grads
            .w_ii
            .iter()
            .chain(self.grads.w_hi.iter())
            .chain(self.grads.b_i.iter())
            .chain(self.grads.w_if.iter())
            .chain(self.grads.w_hf.iter())
            .chain(self.grads.b_f.iter())
            .chain(self.grads.w_ig.iter())
            .chain(self.grads.w_hg.iter())
            .chain(self.grads.b_g.iter())
            .chain(self.grads.w_io.iter())
            .chain(self.grads.w_ho.iter())
            .chain(self.grads.b_o.iter())
            .copied()
            .collect()
    }

    pub fn parameter_count(&self) -> usize {
        self.w_ii.len()
            + self.w_hi.len()
            + self.b_i.len()
            + self.w_if.len()
            + self.w_hf.len()
            + self.b_f.len()
            + self.w_ig.len()
            + self.w_hg.len()
            + self.b_g.len()
            + self.w_io.len()
            + self.w_ho.len()
            + self.b_o.len()
    }

    pub(crate) fn register(&self, arena: &mut ParameterArena) {
        for len in [
            self.w_ii.len(),
            self.w_hi.len(),
            self.b_i.len(),
            self.w_if.len(),
            self.w_hf.len(),
            self.b_f.len(),
            self.w_ig.len(),
            self.w_hg.len(),
            self.b_g.len(),
            self.w_io.len(),
            self.w_ho.len(),
            self.b_o.len(),
        ] {
            arena.register(len);
        }
    }
}
