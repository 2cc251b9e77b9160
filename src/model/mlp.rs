//! Multi-layer perceptron classifier.
//!
//! ReLU hidden layers, one logistic output unit, weighted binary log-loss with
//! an L2 penalty, trained with Adam on shuffled minibatches. When early
//! stopping is enabled a validation slice is held out and the weights with the
//! best validation accuracy are kept.

use anyhow::{bail, Result};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::Classifier;

const BETA_1: f64 = 0.9;
const BETA_2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;
const LOG_CLIP: f64 = 1e-15;

/// Network hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlpParams {
    /// Hidden layer widths below `wide_threshold` total votes.
    pub narrow_layers: Vec<usize>,
    /// Hidden layer widths from `wide_threshold` total votes on.
    pub wide_layers: Vec<usize>,
    pub wide_threshold: usize,
    /// L2 penalty.
    pub alpha: f64,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub batch_size: usize,
    pub early_stopping: bool,
    pub validation_fraction: f64,
    /// Epochs without improvement before stopping.
    pub patience: usize,
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for MlpParams {
    fn default() -> Self {
        Self {
            narrow_layers: vec![12],
            wide_layers: vec![24, 12],
            wide_threshold: 600,
            alpha: 0.1,
            learning_rate: 0.005,
            max_epochs: 500,
            batch_size: 200,
            early_stopping: true,
            validation_fraction: 0.1,
            patience: 20,
            tolerance: 1e-4,
            seed: 42,
        }
    }
}

impl MlpParams {
    /// Hidden layer widths for a history of `total_votes` entries.
    #[must_use]
    pub fn layers_for(&self, total_votes: usize) -> &[usize] {
        if total_votes < self.wide_threshold {
            &self.narrow_layers
        } else {
            &self.wide_layers
        }
    }
}

/// Dense layer, weights stored row-major as `outputs x inputs`.
#[derive(Debug, Clone)]
struct Layer {
    inputs: usize,
    outputs: usize,
    weights: Vec<f64>,
    bias: Vec<f64>,
}

impl Layer {
    fn zeros(inputs: usize, outputs: usize) -> Self {
        Self {
            inputs,
            outputs,
            weights: vec![0.0; inputs * outputs],
            bias: vec![0.0; outputs],
        }
    }

    /// Glorot-uniform initialisation; the logistic output uses a tighter bound.
    fn random(inputs: usize, outputs: usize, logistic: bool, rng: &mut StdRng) -> Self {
        let factor = if logistic { 2.0 } else { 6.0 };
        #[allow(clippy::cast_precision_loss)]
        let bound = (factor / (inputs + outputs) as f64).sqrt();
        let mut layer = Self::zeros(inputs, outputs);
        layer.weights.iter_mut().for_each(|w| *w = rng.gen_range(-bound..bound));
        layer.bias.iter_mut().for_each(|b| *b = rng.gen_range(-bound..bound));
        layer
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        (0..self.outputs)
            .map(|j| {
                let row = &self.weights[j * self.inputs..(j + 1) * self.inputs];
                self.bias[j] + row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>()
            })
            .collect()
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn log_loss(probability: f64, label: u8) -> f64 {
    let p = probability.clamp(LOG_CLIP, 1.0 - LOG_CLIP);
    if label == 1 {
        -p.ln()
    } else {
        -(1.0 - p).ln()
    }
}

/// Adam moment estimates shaped like the network.
struct Adam {
    first: Vec<Layer>,
    second: Vec<Layer>,
    step: i32,
    learning_rate: f64,
}

impl Adam {
    fn new(layers: &[Layer], learning_rate: f64) -> Self {
        let zeros = || -> Vec<Layer> {
            layers
                .iter()
                .map(|l| Layer::zeros(l.inputs, l.outputs))
                .collect()
        };
        Self {
            first: zeros(),
            second: zeros(),
            step: 0,
            learning_rate,
        }
    }

    fn update(&mut self, layers: &mut [Layer], grads: &[Layer]) {
        self.step += 1;
        let rate = self.learning_rate * (1.0 - BETA_2.powi(self.step)).sqrt() / (1.0 - BETA_1.powi(self.step));

        let apply = |params: &mut [f64], grads: &[f64], m: &mut [f64], v: &mut [f64]| {
            for i in 0..params.len() {
                m[i] = BETA_1 * m[i] + (1.0 - BETA_1) * grads[i];
                v[i] = BETA_2 * v[i] + (1.0 - BETA_2) * grads[i] * grads[i];
                params[i] -= rate * m[i] / (v[i].sqrt() + ADAM_EPSILON);
            }
        };

        for (((layer, grad), m), v) in layers
            .iter_mut()
            .zip(grads)
            .zip(self.first.iter_mut())
            .zip(self.second.iter_mut())
        {
            apply(&mut layer.weights, &grad.weights, &mut m.weights, &mut v.weights);
            apply(&mut layer.bias, &grad.bias, &mut m.bias, &mut v.bias);
        }
    }
}

/// Feed-forward network with a single logistic output.
#[derive(Debug, Clone)]
pub struct Mlp {
    params: MlpParams,
    hidden: Vec<usize>,
    layers: Vec<Layer>,
    loss_curve: Vec<f64>,
}

impl Mlp {
    #[must_use]
    pub fn new(params: MlpParams, hidden: &[usize]) -> Self {
        Self {
            params,
            hidden: hidden.to_vec(),
            layers: Vec::new(),
            loss_curve: Vec::new(),
        }
    }

    #[must_use]
    pub fn hidden_layers(&self) -> &[usize] {
        &self.hidden
    }

    /// Training loss per epoch of the last fit.
    #[must_use]
    pub fn loss_curve(&self) -> &[f64] {
        &self.loss_curve
    }

    /// Activations of every layer; the last holds the output probability.
    fn activations(&self, input: &[f64]) -> Vec<Vec<f64>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(input.to_vec());
        for (index, layer) in self.layers.iter().enumerate() {
            let mut z = layer.forward(&activations[index]);
            if index + 1 == self.layers.len() {
                z.iter_mut().for_each(|v| *v = sigmoid(*v));
            } else {
                z.iter_mut().for_each(|v| *v = v.max(0.0));
            }
            activations.push(z);
        }
        activations
    }

    /// One minibatch step. Returns the batch loss including the L2 term.
    fn train_batch(&mut self, batch: &[usize], data: &TrainingData<'_>, adam: &mut Adam) -> f64 {
        let mut grads: Vec<Layer> = self.layers.iter().map(|l| Layer::zeros(l.inputs, l.outputs)).collect();
        let weight_sum: f64 = batch.iter().map(|&i| data.weights[i]).sum::<f64>().max(f64::EPSILON);
        let mut loss = 0.0;

        for &i in batch {
            let activations = self.activations(&data.features[i]);
            let output = activations[activations.len() - 1][0];
            let label = data.labels[i];
            loss += data.weights[i] * log_loss(output, label);

            let mut delta = vec![data.weights[i] * (output - f64::from(label)) / weight_sum];
            for index in (0..self.layers.len()).rev() {
                let layer = &self.layers[index];
                let input = &activations[index];
                let grad = &mut grads[index];
                for (j, d) in delta.iter().enumerate() {
                    grad.bias[j] += d;
                    let row = &mut grad.weights[j * layer.inputs..(j + 1) * layer.inputs];
                    row.iter_mut().zip(input).for_each(|(g, x)| *g += d * x);
                }
                if index > 0 {
                    delta = (0..layer.inputs)
                        .map(|k| {
                            if input[k] <= 0.0 {
                                return 0.0;
                            }
                            delta
                                .iter()
                                .enumerate()
                                .map(|(j, d)| layer.weights[j * layer.inputs + k] * d)
                                .sum()
                        })
                        .collect();
                }
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let batch_len = batch.len() as f64;
        let mut penalty = 0.0;
        for (layer, grad) in self.layers.iter().zip(grads.iter_mut()) {
            for (g, w) in grad.weights.iter_mut().zip(&layer.weights) {
                *g += self.params.alpha * w / batch_len;
                penalty += w * w;
            }
        }

        adam.update(&mut self.layers, &grads);
        loss / weight_sum + 0.5 * self.params.alpha * penalty / batch_len
    }

    fn accuracy(&self, indices: &[usize], data: &TrainingData<'_>) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        let correct = indices
            .iter()
            .filter(|&&i| u8::from(self.predict_probability(&data.features[i]) >= 0.5) == data.labels[i])
            .count();
        #[allow(clippy::cast_precision_loss)]
        let score = correct as f64 / indices.len() as f64;
        score
    }
}

struct TrainingData<'a> {
    features: &'a [Vec<f64>],
    labels: &'a [u8],
    weights: &'a [f64],
}

impl Classifier for Mlp {
    fn fit(&mut self, features: &[Vec<f64>], labels: &[u8], weights: &[f64]) -> Result<()> {
        let n = features.len();
        if n == 0 {
            bail!("Cannot fit a network on zero rows");
        }
        if labels.len() != n || weights.len() != n {
            bail!("Network inputs disagree in length");
        }

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut sizes = vec![features[0].len()];
        sizes.extend(self.hidden.iter().copied().filter(|&w| w > 0));
        sizes.push(1);
        self.layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, pair)| Layer::random(pair[0], pair[1], i + 2 == sizes.len(), &mut rng))
            .collect();
        self.loss_curve.clear();

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let validation_len = if self.params.early_stopping {
            ((n as f64 * self.params.validation_fraction).round() as usize).min(n - 1)
        } else {
            0
        };
        let (validation, training) = order.split_at(validation_len);
        let mut training = training.to_vec();
        let validation = validation.to_vec();
        let early_stopping = !validation.is_empty();

        let data = TrainingData {
            features,
            labels,
            weights,
        };
        let mut adam = Adam::new(&self.layers, self.params.learning_rate);
        let batch_size = self.params.batch_size.clamp(1, training.len());

        let mut best_loss = f64::INFINITY;
        let mut best_score = f64::NEG_INFINITY;
        let mut best_layers = self.layers.clone();
        let mut stale_epochs = 0;

        for epoch in 0..self.params.max_epochs {
            training.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            for batch in training.chunks(batch_size) {
                #[allow(clippy::cast_precision_loss)]
                let share = batch.len() as f64;
                epoch_loss += self.train_batch(batch, &data, &mut adam) * share;
            }
            #[allow(clippy::cast_precision_loss)]
            let epoch_loss = epoch_loss / training.len() as f64;
            self.loss_curve.push(epoch_loss);

            let improved = if early_stopping {
                let score = self.accuracy(&validation, &data);
                let better = score > best_score + self.params.tolerance;
                if score > best_score {
                    best_score = score;
                    best_layers.clone_from(&self.layers);
                }
                better
            } else {
                let better = epoch_loss < best_loss - self.params.tolerance;
                best_loss = best_loss.min(epoch_loss);
                better
            };

            stale_epochs = if improved { 0 } else { stale_epochs + 1 };
            if stale_epochs > self.params.patience {
                trace!("Stopping after epoch {epoch}: no improvement for {stale_epochs} epochs");
                break;
            }
        }

        if early_stopping {
            self.layers = best_layers;
        }
        debug!(
            "Fitted MLP {:?}: {} epochs, final loss {:.4}",
            self.hidden,
            self.loss_curve.len(),
            self.loss_curve.last().copied().unwrap_or(f64::NAN)
        );
        Ok(())
    }

    fn predict_probability(&self, features: &[f64]) -> f64 {
        if self.layers.is_empty() {
            return 0.5;
        }
        let activations = self.activations(features);
        activations[activations.len() - 1][0]
    }

    fn final_loss(&self) -> Option<f64> {
        self.loss_curve.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(n: usize) -> (Vec<Vec<f64>>, Vec<u8>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(3);
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n {
            let liked = i % 2 == 0;
            let centre = if liked { 0.8 } else { 0.2 };
            rows.push(vec![
                centre + rng.gen_range(-0.15..0.15),
                centre + rng.gen_range(-0.15..0.15),
                rng.gen::<f64>(),
            ]);
            labels.push(u8::from(liked));
        }
        (rows, labels, vec![1.0; n])
    }

    #[test]
    fn test_layer_policy() {
        let params = MlpParams::default();
        assert_eq!(params.layers_for(300), &[12]);
        assert_eq!(params.layers_for(599), &[12]);
        assert_eq!(params.layers_for(600), &[24, 12]);
    }

    #[test]
    fn test_network_separates_blobs() {
        let (rows, labels, weights) = blobs(200);
        let params = MlpParams {
            early_stopping: false,
            max_epochs: 300,
            ..MlpParams::default()
        };
        let mut mlp = Mlp::new(params, &[12]);
        mlp.fit(&rows, &labels, &weights).unwrap();

        assert!(mlp.predict_probability(&[0.85, 0.8, 0.5]) > 0.6);
        assert!(mlp.predict_probability(&[0.15, 0.2, 0.5]) < 0.4);
    }

    #[test]
    fn test_loss_curve_recorded() {
        let (rows, labels, weights) = blobs(120);
        let params = MlpParams {
            early_stopping: false,
            max_epochs: 100,
            ..MlpParams::default()
        };
        let mut mlp = Mlp::new(params, &[24, 12]);
        mlp.fit(&rows, &labels, &weights).unwrap();

        let curve = mlp.loss_curve();
        assert!(!curve.is_empty());
        assert!(curve.len() <= 100);
        assert_eq!(mlp.final_loss(), curve.last().copied());
        assert!(curve.last().unwrap() < curve.first().unwrap());
    }

    #[test]
    fn test_probabilities_stay_in_unit_range() {
        let (rows, labels, weights) = blobs(50);
        let mut mlp = Mlp::new(
            MlpParams {
                early_stopping: false,
                max_epochs: 50,
                ..MlpParams::default()
            },
            &[12],
        );
        mlp.fit(&rows, &labels, &weights).unwrap();

        for probe in [[-10.0, -10.0, 0.0], [10.0, 10.0, 1.0], [0.5, 0.5, 0.5]] {
            let p = mlp.predict_probability(&probe);
            assert!((0.0..=1.0).contains(&p), "p = {p}");
        }
    }

    #[test]
    fn test_unfitted_network_is_undecided() {
        let mlp = Mlp::new(MlpParams::default(), &[12]);
        assert_eq!(mlp.predict_probability(&[0.1, 0.2]), 0.5);
        assert_eq!(mlp.final_loss(), None);
    }
}
