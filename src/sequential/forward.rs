use std::mem;

use super::net::Network;
use super::output::OutputStrategy;
use super::parallel;

/// Intermediate values of one forward pass, kept for the backward pass that follows it.
///
/// * `logits[i]` - weighted sums of layer `i + 1`, one vector per connection layer;
/// * `activations[i]` - values of layer `i`, from the input echo to the final output.
#[derive(Debug, Clone, Default)]
pub(crate) struct ForwardCache {
    pub(crate) logits: Vec<Vec<f64>>,
    pub(crate) activations: Vec<Vec<f64>>,
    filled: bool,
}

impl ForwardCache {
    /// Marks the cache as stale, so that a backward pass refuses to use it.
    pub(crate) fn clear(&mut self) {
        self.filled = false;
    }

    pub(crate) fn is_filled(&self) -> bool {
        self.filled
    }

    pub(crate) fn output(&self) -> &[f64] {
        self.activations.last().map_or(&[], |a| a.as_slice())
    }
}

impl Network {
    /// Calculates output of the network for the given input and keeps the intermediate
    /// values for a following `Network::backpropagate`.
    ///
    /// # Arguments
    /// * `input` - values of the input neurons.
    ///
    /// # Returns
    /// * The output layer values if `input` has exactly `topology()[0]` values;
    /// * an empty vector otherwise.
    ///
    /// # Examples
    /// ```
    /// # use seqnet::sequential::Network;
    /// let mut net = Network::from_tag(&[10, 20, 20, 3], "SCE").unwrap();
    /// let output = net.feed_forward(&[1.0; 10]);
    /// assert_eq!(output.len(), 3);
    /// assert!(net.feed_forward(&[1.0; 9]).is_empty());
    /// ```
    pub fn feed_forward(&mut self, input: &[f64]) -> Vec<f64> {
        let mut cache = mem::take(&mut self.cache);
        let done = self.forward_into(input, &mut cache);
        self.cache = cache;

        if done {
            self.cache.output().to_vec()
        } else {
            Vec::new()
        }
    }

    /// Same as `Network::feed_forward`, without touching the network's cache.
    ///
    /// Takes `&self`, so any number of predictions may run at the same time.
    pub fn predict(&self, input: &[f64]) -> Vec<f64> {
        let mut cache = ForwardCache::default();
        if self.forward_into(input, &mut cache) {
            cache.activations.pop().unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    /// Runs the forward pass, filling `cache`. Returns `false` on a wrong input size.
    pub(crate) fn forward_into(&self, input: &[f64], cache: &mut ForwardCache) -> bool {
        cache.filled = false;
        if input.len() != self.topology[0] {
            return false;
        }

        let count = self.layers.len();
        cache.logits.resize_with(count, Vec::new);
        cache.activations.resize_with(count + 1, Vec::new);
        cache.activations[0].clear();
        cache.activations[0].extend_from_slice(input);

        for (i, layer) in self.layers.iter().enumerate() {
            let (done, rest) = cache.activations.split_at_mut(i + 1);
            let values = &done[i];
            let next = &mut rest[0];

            // Every destination neuron reads the same frozen values of the previous layer
            let logits = &mut cache.logits[i];
            logits.resize(layer.outputs(), 0.0);
            let (weights, biases) = (&layer.weights, &layer.biases);
            parallel::fill(logits, |j| {
                values
                    .iter()
                    .enumerate()
                    .map(|(k, &v)| v * weights.get(k, j))
                    .sum::<f64>()
                    + biases[j]
            });

            if i + 1 < count {
                let hidden = self.hidden;
                let logits = &*logits;
                next.resize(logits.len(), 0.0);
                parallel::fill(next, |j| hidden.apply(logits[j]));
            } else {
                *next = self.output.forward(logits);
            }
        }

        cache.filled = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Activation, OutputLayer};
    use super::*;

    fn fixed_net(output: OutputLayer) -> Network {
        let mut net = Network::new(&[2, 2, 1], output, Activation::ReLU).unwrap();
        net.set_weights(0, &[vec![1.0, -1.0], vec![2.0, 0.5]]).unwrap();
        net.set_biases(0, &[0.0, -3.0]).unwrap();
        net.set_weights(1, &[vec![3.0], vec![-2.0]]).unwrap();
        net.set_biases(1, &[0.25]).unwrap();
        net
    }

    #[test]
    fn computes_by_hand_example() {
        let mut net = fixed_net(OutputLayer::LinearMse);
        // hidden logits: [1 + 2*2, -1 + 0.5*2 - 3] = [5, -3] -> relu [5, 0]
        // output: 5*3 + 0*(-2) + 0.25
        assert_eq!(net.feed_forward(&[1.0, 2.0]), vec![15.25]);
        assert_eq!(net.cache.logits, vec![vec![5.0, -3.0], vec![15.25]]);
        assert_eq!(
            net.cache.activations,
            vec![vec![1.0, 2.0], vec![5.0, 0.0], vec![15.25]]
        );
        assert!(net.cache.is_filled());
    }

    #[test]
    fn cache_has_one_entry_per_layer() {
        let mut net = Network::from_tag(&[3, 4, 5, 6, 2], "SCE").unwrap();
        net.feed_forward(&[0.1, 0.2, 0.3]);
        assert_eq!(net.cache.activations.len(), net.connections() + 1);
        assert_eq!(net.cache.logits.len(), net.connections());
        for (a, &width) in net.cache.activations.iter().zip(net.topology()) {
            assert_eq!(a.len(), width);
        }
    }

    #[test]
    fn wrong_input_size_gives_empty_output_and_stale_cache() {
        let mut net = fixed_net(OutputLayer::LinearMse);
        net.feed_forward(&[1.0, 2.0]);
        assert!(net.feed_forward(&[1.0]).is_empty());
        assert!(net.feed_forward(&[]).is_empty());
        assert!(!net.cache.is_filled());
    }

    #[test]
    fn softmax_output_sums_to_one() {
        let mut net = fixed_net(OutputLayer::SoftmaxCrossEntropy);
        let out = net.feed_forward(&[1.0, 2.0]);
        assert_eq!(out, vec![1.0]);

        let mut net = Network::from_tag(&[3, 8, 4], "SCE").unwrap();
        let out = net.feed_forward(&[1e3, -1e3, 5.0]);
        assert!((out.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn predict_matches_feed_forward() {
        let mut net = Network::from_tag(&[3, 600, 2], "LMSE").unwrap();
        let input = [0.3, -0.7, 1.5];
        let predicted = net.predict(&input);
        assert!(!net.cache.is_filled());
        assert_eq!(predicted, net.feed_forward(&input));
        assert!(net.predict(&[0.0]).is_empty());
    }
}
