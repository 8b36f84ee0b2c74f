use super::net::{Network, SizeMismatch};
use super::output::OutputStrategy;
use super::parallel;

impl Network {
    /// Computes gradients of every weight and bias for the last `Network::feed_forward`
    /// call and the given target. Gradients are stored in the network, to be applied by
    /// `Network::optimize`.
    ///
    /// # Arguments
    /// * `target` - desired values of the output neurons.
    ///
    /// # Returns
    /// * `Ok(())` if a successful forward pass precedes the call and `target` has the size
    /// of the output layer;
    /// * `Err(BackpropError)` otherwise, leaving the gradients untouched.
    ///
    /// # Examples
    /// ```
    /// # use seqnet::sequential::{AdamConfig, Network};
    /// let mut net = Network::from_tag(&[2, 4, 1], "LMSE").unwrap();
    /// assert!(net.backpropagate(&[1.0]).is_err());
    ///
    /// net.feed_forward(&[0.5, -0.5]);
    /// net.backpropagate(&[1.0]).unwrap();
    /// net.optimize(1e-3, &AdamConfig::default());
    /// ```
    pub fn backpropagate(&mut self, target: &[f64]) -> Result<(), BackpropError> {
        if !self.cache.is_filled() {
            return Err(BackpropError::NoForwardPass);
        }
        let outputs = self.output_size();
        if target.len() != outputs {
            return Err(BackpropError::BadTarget(SizeMismatch {
                expected: outputs,
                got: target.len(),
            }));
        }

        let cache = &self.cache;
        let hidden = self.hidden;
        let last = self.layers.len() - 1;

        let mut delta = self.output.backward(cache.output(), target);

        // Connection layers strictly in reverse order: each delta needs the next one
        for i in (0..=last).rev() {
            if i < last {
                // Error of neuron `k` of layer `i + 1`: the next delta pulled back through
                // the weights leaving `k`, scaled by the activation slope at `k`'s logit
                let next_weights = &self.layers[i + 1].weights;
                let logits = &cache.logits[i];
                let next_delta = &delta;
                let mut layer_delta = vec![0.0; logits.len()];
                parallel::fill(&mut layer_delta, |k| {
                    let propagated: f64 = next_weights
                        .row(k)
                        .iter()
                        .zip(next_delta.iter())
                        .map(|(&w, &d)| w * d)
                        .sum();
                    propagated * hidden.derivative(logits[k])
                });
                delta = layer_delta;
            }

            // Outer product of the layer's input values and its delta
            let inputs = &cache.activations[i];
            let grads = &mut self.accumulators[i].grads;
            grads.biases.copy_from_slice(&delta);
            let cols = grads.weights.cols();
            let delta = &delta;
            parallel::for_each_row(grads.weights.as_mut_slice(), cols, |k, row| {
                let input = inputs[k];
                for (g, &d) in row.iter_mut().zip(delta.iter()) {
                    *g = input * d;
                }
            });
        }

        Ok(())
    }
}

/// Error structure for `Network::backpropagate`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackpropError {
    #[error("Backpropagation needs a successful forward pass right before it!")]
    NoForwardPass,
    #[error("Expected {} target value(s), but got {}!", .0.expected, .0.got)]
    BadTarget(SizeMismatch),
}
