//! Recurrent regression networks
//!
//! The network is assembled from the variant policy in
//! [`crate::config::VariantSpec`]: a stack of recurrent layers with optional
//! interleaved dropout, followed by a dense head. Both supported cells carry
//! full backpropagation through time.

use crate::config::{CellKind, ModelConfig, RecurrentLayerSpec};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

mod dense;
mod gru;
mod lstm;

pub use dense::{Activation, Dense, Dropout};
pub use gru::GruCell;
pub use lstm::LstmCell;

pub(crate) fn sigmoid(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

pub(crate) fn tanh(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(|v| v.tanh())
}

/// Outer product `a ⊗ b` as an `[a.len(), b.len()]` matrix
pub(crate) fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    a.view()
        .insert_axis(Axis(1))
        .dot(&b.view().insert_axis(Axis(0)))
}

/// Tracks every parameter tensor the model builder allocates.
///
/// Explicit stand-in for the numeric backend's process-wide resource pool:
/// the builder resets it before each rebuild, so repeated build/dispose
/// cycles cannot accumulate backend state unnoticed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterArena {
    tensors: usize,
    elements: usize,
}

impl ParameterArena {
    pub fn reset(&mut self) {
        self.tensors = 0;
        self.elements = 0;
    }

    pub fn register(&mut self, elements: usize) {
        self.tensors += 1;
        self.elements += elements;
    }

    /// Number of live parameter tensors
    pub fn tensors(&self) -> usize {
        self.tensors
    }

    /// Total number of live parameter scalars
    pub fn elements(&self) -> usize {
        self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.tensors == 0
    }
}

/// One recurrent layer of either supported cell kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Recurrent {
    Gru(GruCell),
    Lstm(LstmCell),
}

impl Recurrent {
    fn from_spec(spec: &RecurrentLayerSpec, input_size: usize) -> Self {
        match spec.cell {
            CellKind::Gru => Recurrent::Gru(GruCell::new(input_size, spec.hidden_size)),
            CellKind::Lstm => Recurrent::Lstm(LstmCell::new(input_size, spec.hidden_size)),
        }
    }

    pub fn hidden_size(&self) -> usize {
        match self {
            Recurrent::Gru(cell) => cell.hidden_size(),
            Recurrent::Lstm(cell) => cell.hidden_size(),
        }
    }

    fn forward(&self, inputs: &[Array1<f64>]) -> Vec<Array1<f64>> {
        match self {
            Recurrent::Gru(cell) => cell.forward(inputs),
            Recurrent::Lstm(cell) => cell.forward(inputs),
        }
    }

    fn forward_train(&mut self, inputs: &[Array1<f64>]) -> Vec<Array1<f64>> {
        match self {
            Recurrent::Gru(cell) => cell.forward_train(inputs),
            Recurrent::Lstm(cell) => cell.forward_train(inputs),
        }
    }

    fn backward(&mut self, dh_out: &[Array1<f64>]) -> Vec<Array1<f64>> {
        match self {
            Recurrent::Gru(cell) => cell.backward(dh_out),
            Recurrent::Lstm(cell) => cell.backward(dh_out),
        }
    }

    fn zero_grads(&mut self) {
        match self {
            Recurrent::Gru(cell) => cell.zero_grads(),
            Recurrent::Lstm(cell) => cell.zero_grads(),
        }
    }

    fn params_mut(&mut self) -> Vec<&mut f64> {
        match self {
            Recurrent::Gru(cell) => cell.params_mut(),
            Recurrent::Lstm(cell) => cell.params_mut(),
        }
    }

    fn grads(&self) -> Vec<f64> {
        match self {
            Recurrent::Gru(cell) => cell.grads(),
            Recurrent::Lstm(cell) => cell.grads(),
        }
    }

    pub fn parameter_count(&self) -> usize {
        match self {
            Recurrent::Gru(cell) => cell.parameter_count(),
            Recurrent::Lstm(cell) => cell.parameter_count(),
        }
    }

    fn register(&self, arena: &mut ParameterArena) {
        match self {
            Recurrent::Gru(cell) => cell.register(arena),
            Recurrent::Lstm(cell) => cell.register(arena),
        }
    }
}

/// The assembled recurrent regression network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrentNet {
    window_size: usize,
    output_size: usize,
    layers: Vec<Recurrent>,
    dropouts: Vec<Dropout>,
    head: Vec<Dense>,
}

impl RecurrentNet {
    /// Instantiate fresh weights for the configured variant
    pub fn new(config: &ModelConfig) -> Self {
        let spec = config.variant().spec();

        let mut layers = Vec::with_capacity(spec.recurrent_layers.len());
        let mut dropouts = Vec::with_capacity(spec.recurrent_layers.len());
        let mut width = 1;
        for layer_spec in &spec.recurrent_layers {
            layers.push(Recurrent::from_spec(layer_spec, width));
            dropouts.push(Dropout::new(layer_spec.dropout));
            width = layer_spec.hidden_size;
        }

        let output_size = config.effective_horizon();
        let mut head = Vec::new();
        if let Some(hidden) = spec.head_hidden {
            head.push(Dense::new(width, hidden, Activation::Relu));
            width = hidden;
        }
        head.push(Dense::new(width, output_size, Activation::Linear));

        Self {
            window_size: config.window_size(),
            output_size,
            layers,
            dropouts,
            head,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(Recurrent::parameter_count)
            .sum::<usize>()
            + self.head.iter().map(Dense::parameter_count).sum::<usize>()
    }

    /// Record every parameter tensor in the builder's arena
    pub fn register_parameters(&self, arena: &mut ParameterArena) {
        for layer in &self.layers {
            layer.register(arena);
        }
        for dense in &self.head {
            dense.register(arena);
        }
    }

    fn unroll(window: ArrayView2<f64>) -> Vec<Array1<f64>> {
        window.axis_iter(Axis(0)).map(|row| row.to_owned()).collect()
    }

    /// Forecast from one window of shape `[W, 1]`
    pub fn forward(&self, window: ArrayView2<f64>) -> Array1<f64> {
        let mut seq = Self::unroll(window);
        for layer in &self.layers {
            seq = layer.forward(&seq);
        }

        let mut out = match seq.last() {
            Some(hidden) => hidden.clone(),
            None => return Array1::zeros(self.output_size),
        };
        for dense in &self.head {
            out = dense.forward(&out);
        }
        out
    }

    /// Forward and backward pass for one sample, accumulating gradients.
    /// Returns the sample's MSE loss.
    pub fn train_sample<R: Rng>(
        &mut self,
        window: ArrayView2<f64>,
        target: ArrayView1<f64>,
        rng: &mut R,
    ) -> f64 {
        let mut seq = Self::unroll(window);
        for (layer, dropout) in self.layers.iter_mut().zip(self.dropouts.iter_mut()) {
            seq = layer.forward_train(&seq);
            seq = dropout.forward_train(seq, rng);
        }

        let mut out = match seq.last() {
            Some(hidden) => hidden.clone(),
            None => return 0.0,
        };
        for dense in self.head.iter_mut() {
            out = dense.forward_train(&out);
        }

        let diff = &out - &target;
        let n = diff.len() as f64;
        let loss = diff.mapv(|v| v * v).mean().unwrap_or(0.0);

        let mut dout = diff.mapv(|v| 2.0 * v / n);
        for dense in self.head.iter_mut().rev() {
            dout = dense.backward(&dout);
        }

        let steps = seq.len();
        let top_width = dout.len();
        let mut dh_seq = vec![Array1::zeros(top_width); steps];
        if steps > 0 {
            dh_seq[steps - 1] = dout;
        }
        for (layer, dropout) in self
            .layers
            .iter_mut()
            .zip(self.dropouts.iter_mut())
            .rev()
        {
            dh_seq = dropout.backward(dh_seq);
            dh_seq = layer.backward(&dh_seq);
        }

        loss
    }

    pub fn zero_grads(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.zero_grads();
        }
        for dense in self.head.iter_mut() {
            dense.zero_grads();
        }
    }

    /// Every trainable scalar, in a stable order matching [`Self::gradients`]
    pub fn parameters_mut(&mut self) -> Vec<&mut f64> {
        let mut params = Vec::with_capacity(self.parameter_count());
        for layer in self.layers.iter_mut() {
            params.extend(layer.params_mut());
        }
        for dense in self.head.iter_mut() {
            params.extend(dense.params_mut());
        }
        params
    }

    /// Accumulated gradients, flattened in parameter order
    pub fn gradients(&self) -> Vec<f64> {
        let mut grads = Vec::with_capacity(self.parameter_count());
        for layer in &self.layers {
            grads.extend(layer.grads());
        }
        for dense in &self.head {
            grads.extend(dense.grads());
        }
        grads
    }
}
