//! Structural changes of a trained network: growing and pruning hidden neurons.
//!
//! Adding or removing neuron `n` of hidden layer `l` touches two connection layers: the
//! incoming one (`l - 1`) gains or loses column `n` and bias `n`, the outgoing one (`l`)
//! gains or loses row `n`. Gradients and Adam moments follow the same reshaping; every
//! other value stays where it was.

use rand::{distributions::Uniform, prelude::Distribution, Rng};
use tracing::debug;

use super::net::{LayerError, Network};

/// New connections are drawn from `(-NEW_WEIGHT_SCALE, NEW_WEIGHT_SCALE)`, so that a fresh
/// neuron barely changes the network output.
pub const NEW_WEIGHT_SCALE: f64 = 0.01;

impl Network {
    /// Appends a neuron to hidden layer `layer`, with small random weights in and out and a
    /// zero bias.
    ///
    /// # Returns
    /// * `Ok(())` if `layer` is a hidden layer (neither the input nor the output);
    /// * `Err(LayerError)` otherwise.
    ///
    /// # Examples
    /// ```
    /// # use seqnet::sequential::Network;
    /// let mut net = Network::from_tag(&[2, 3, 1], "LMSE").unwrap();
    /// net.add_neuron(1).unwrap();
    /// assert_eq!(net.topology(), &[2, 4, 1]);
    /// assert!(net.add_neuron(0).is_err());
    /// assert!(net.add_neuron(2).is_err());
    /// ```
    pub fn add_neuron(&mut self, layer: usize) -> Result<(), LayerError> {
        self.add_neuron_with_rng(layer, &mut rand::thread_rng())
    }

    /// Same as `Network::add_neuron`, drawing the new weights from `rng`.
    pub fn add_neuron_with_rng<R: Rng + ?Sized>(
        &mut self,
        layer: usize,
        rng: &mut R,
    ) -> Result<(), LayerError> {
        self.check_hidden(layer)?;
        let between = Uniform::from(-NEW_WEIGHT_SCALE..NEW_WEIGHT_SCALE);

        let incoming = &mut self.layers[layer - 1];
        incoming.weights.push_col(between.sample_iter(&mut *rng));
        incoming.biases.push(0.0);
        let outgoing = &mut self.layers[layer];
        outgoing.weights.push_row(between.sample_iter(&mut *rng));

        let (incoming, outgoing) = self.accumulators.split_at_mut(layer);
        incoming[layer - 1].for_each_mut(|c| {
            c.weights.push_col(std::iter::repeat(0.0));
            c.biases.push(0.0);
        });
        outgoing[0].for_each_mut(|c| c.weights.push_row(std::iter::repeat(0.0)));

        self.topology[layer] += 1;
        self.cache.clear();
        debug!(layer, width = self.topology[layer], "neuron added");
        Ok(())
    }

    /// Removes neuron `neuron` of hidden layer `layer` together with its connections.
    ///
    /// # Returns
    /// * `Ok(())` if `layer` is a hidden layer, `neuron` exists in it and is not its last one;
    /// * `Err(LayerError)` otherwise.
    ///
    /// # Examples
    /// ```
    /// # use seqnet::sequential::Network;
    /// let mut net = Network::from_tag(&[2, 3, 1], "LMSE").unwrap();
    /// net.remove_neuron(1, 0).unwrap();
    /// assert_eq!(net.topology(), &[2, 2, 1]);
    /// assert!(net.remove_neuron(1, 2).is_err());
    /// ```
    pub fn remove_neuron(&mut self, layer: usize, neuron: usize) -> Result<(), LayerError> {
        self.check_hidden(layer)?;
        let width = self.topology[layer];
        if neuron >= width {
            return Err(LayerError::NeuronOutOfRange {
                layer,
                neuron,
                width,
            });
        }
        if width == 1 {
            return Err(LayerError::LastNeuron(layer));
        }

        let incoming = &mut self.layers[layer - 1];
        incoming.weights.remove_col(neuron);
        incoming.biases.remove(neuron);
        self.layers[layer].weights.remove_row(neuron);

        let (incoming, outgoing) = self.accumulators.split_at_mut(layer);
        incoming[layer - 1].for_each_mut(|c| {
            c.weights.remove_col(neuron);
            c.biases.remove(neuron);
        });
        outgoing[0].for_each_mut(|c| c.weights.remove_row(neuron));

        self.topology[layer] -= 1;
        self.cache.clear();
        debug!(layer, neuron, width = self.topology[layer], "neuron removed");
        Ok(())
    }

    fn check_hidden(&self, layer: usize) -> Result<(), LayerError> {
        let last = self.topology.len() - 1;
        if layer == 0 || layer >= last {
            return Err(LayerError::NotHidden { index: layer, last });
        }
        Ok(())
    }
}
