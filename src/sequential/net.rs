use rand::Rng;

use super::activation::Activation;
use super::forward::ForwardCache;
use super::output::OutputLayer;
use super::params::{Accumulators, Connection, Matrix};

/// Sequential fully-connected neural network.
///
/// Layer `0` is the input, the last layer is the output, everything in between is hidden.
/// Connection layer `i` joins layer `i` to layer `i + 1`: it holds a weight matrix of
/// `topology[i] x topology[i + 1]` (row = source neuron, column = destination neuron)
/// and one bias per neuron of layer `i + 1`.
///
/// Besides parameters, the network owns its training scratch space: gradients of the last
/// backward pass, Adam moments with their shared step counter, and the cache of the last
/// `Network::feed_forward` call. Because of that cache, `feed_forward` and
/// `Network::backpropagate` take `&mut self`; `Network::predict` is the cache-free
/// inference path.
#[derive(Debug, Clone)]
pub struct Network {
    /// The number of neurons in each layer.
    pub(super) topology: Vec<usize>,

    /// One per connection layer, `topology.len() - 1` in total.
    pub(super) layers: Vec<Connection>,

    /// Gradients and Adam moments, shaped like `layers`.
    pub(super) accumulators: Vec<Accumulators>,

    /// Adam step counter, incremented once per `Network::optimize` call.
    pub(super) step: u64,

    pub(super) hidden: Activation,
    pub(super) output: OutputLayer,

    /// Logits and activations of the last `Network::feed_forward` call.
    pub(super) cache: ForwardCache,
}

impl Network {
    /// Returns a randomly initialized network for the given topology.
    ///
    /// Weights of connection layer `i` are drawn from `[0, sqrt(2 / topology[i]))`,
    /// biases start at zero.
    ///
    /// # Arguments
    /// * `topology` - number of neurons in each layer, input first;
    /// * `output` - output layer strategy;
    /// * `hidden` - activation shared by all hidden layers.
    ///
    /// # Returns
    /// * `Ok(Network)` if there are at least two layers and none of them is empty;
    /// * `Err(NewNetError)` otherwise.
    ///
    /// # Examples
    /// ```
    /// # use seqnet::sequential::{Activation, Network, OutputLayer};
    /// let net = Network::new(&[3, 5, 6, 2], OutputLayer::SoftmaxCrossEntropy, Activation::ReLU).unwrap();
    /// assert_eq!(net.topology(), &[3, 5, 6, 2]);
    /// assert!(Network::new(&[3], OutputLayer::LinearMse, Activation::ReLU).is_err());
    /// ```
    pub fn new(
        topology: &[usize],
        output: OutputLayer,
        hidden: Activation,
    ) -> Result<Network, NewNetError> {
        Network::with_rng(topology, output, hidden, &mut rand::thread_rng())
    }

    /// Same as `Network::new`, with ReLU hidden layers and the output strategy picked by
    /// its tag (`"SCE"` or `"LMSE"`, see `OutputLayer::from_tag`).
    ///
    /// # Examples
    /// ```
    /// # use seqnet::sequential::{Network, OutputLayer};
    /// let net = Network::from_tag(&[2, 2, 2], "SCE").unwrap();
    /// assert_eq!(net.output_layer(), OutputLayer::SoftmaxCrossEntropy);
    /// ```
    pub fn from_tag(topology: &[usize], output_tag: &str) -> Result<Network, NewNetError> {
        Network::new(topology, OutputLayer::from_tag(output_tag), Activation::default())
    }

    /// Same as `Network::new`, drawing the initial weights from `rng`.
    ///
    /// # Examples
    /// ```
    /// # use seqnet::sequential::{Activation, Network, OutputLayer};
    /// use rand::{rngs::StdRng, SeedableRng};
    ///
    /// let a = Network::with_rng(&[4, 3, 1], OutputLayer::LinearMse, Activation::Tanh,
    ///                           &mut StdRng::seed_from_u64(7)).unwrap();
    /// let b = Network::with_rng(&[4, 3, 1], OutputLayer::LinearMse, Activation::Tanh,
    ///                           &mut StdRng::seed_from_u64(7)).unwrap();
    /// assert_eq!(a.weights(0).unwrap(), b.weights(0).unwrap());
    /// ```
    pub fn with_rng<R: Rng + ?Sized>(
        topology: &[usize],
        output: OutputLayer,
        hidden: Activation,
        rng: &mut R,
    ) -> Result<Network, NewNetError> {
        let mut net = Network::zeroed(topology, output, hidden)?;
        for layer in net.layers.iter_mut() {
            layer.randomize(rng);
        }
        Ok(net)
    }

    /// Allocates every structure for `topology` with all values at zero.
    pub(super) fn zeroed(
        topology: &[usize],
        output: OutputLayer,
        hidden: Activation,
    ) -> Result<Network, NewNetError> {
        if topology.len() < 2 {
            return Err(NewNetError::BadTopology(topology.len()));
        }
        if let Some(index) = topology.iter().position(|&width| width == 0) {
            return Err(NewNetError::EmptyLayer(index));
        }

        let mut layers = Vec::with_capacity(topology.len() - 1);
        let mut accumulators = Vec::with_capacity(topology.len() - 1);
        for (index, pair) in topology.windows(2).enumerate() {
            let too_large = NewNetError::TooLarge {
                index,
                inputs: pair[0],
                outputs: pair[1],
            };
            layers.push(Connection::try_zeros(pair[0], pair[1]).ok_or(too_large.clone())?);
            accumulators.push(Accumulators::try_zeros(pair[0], pair[1]).ok_or(too_large)?);
        }

        Ok(Network {
            topology: topology.to_vec(),
            layers,
            accumulators,
            step: 0,
            hidden,
            output,
            cache: ForwardCache::default(),
        })
    }

    pub fn topology(&self) -> &[usize] {
        &self.topology
    }

    pub fn input_size(&self) -> usize {
        self.topology[0]
    }

    pub fn output_size(&self) -> usize {
        self.topology[self.topology.len() - 1]
    }

    /// Number of connection layers, `topology().len() - 1`.
    pub fn connections(&self) -> usize {
        self.layers.len()
    }

    pub fn output_layer(&self) -> OutputLayer {
        self.output
    }

    pub fn hidden_activation(&self) -> Activation {
        self.hidden
    }

    /// Replaces the output strategy. Parameters are kept.
    pub fn set_output_layer(&mut self, output: OutputLayer) {
        self.output = output;
        self.cache.clear();
    }

    /// Replaces the activation of the hidden layers. Parameters are kept.
    pub fn set_hidden_activation(&mut self, hidden: Activation) {
        self.hidden = hidden;
        self.cache.clear();
    }

    /// Number of optimizer steps taken so far.
    pub fn steps(&self) -> u64 {
        self.step
    }

    /// Weight matrix of connection layer `index` (from layer `index` to `index + 1`).
    ///
    /// # Examples
    /// ```
    /// # use seqnet::sequential::Network;
    /// let net = Network::from_tag(&[2, 3, 1], "LMSE").unwrap();
    /// let w = net.weights(0).unwrap();
    /// assert_eq!((w.rows(), w.cols()), (2, 3));
    /// assert!(net.weights(2).is_err());
    /// ```
    pub fn weights(&self, index: usize) -> Result<&Matrix, LayerError> {
        Ok(&self.connection(index)?.weights)
    }

    /// Biases of the neurons of layer `index + 1`, i.e. those of connection layer `index`.
    pub fn biases(&self, index: usize) -> Result<&[f64], LayerError> {
        Ok(&self.connection(index)?.biases)
    }

    /// Overwrites the weights of connection layer `index`.
    ///
    /// # Returns
    /// * `Ok(())` if `weights` is exactly `topology[index] x topology[index + 1]`;
    /// * `Err(LayerError)` otherwise, leaving the network untouched.
    pub fn set_weights(&mut self, index: usize, weights: &[Vec<f64>]) -> Result<(), LayerError> {
        let current = &self.connection(index)?.weights;
        let (rows, cols) = (current.rows(), current.cols());
        let matrix = Matrix::from_rows(weights)
            .filter(|m| m.rows() == rows && m.cols() == cols)
            .ok_or_else(|| LayerError::WeightsShape {
                expected: (rows, cols),
                got: (weights.len(), weights.first().map_or(0, |r| r.len())),
            })?;
        self.layers[index].weights = matrix;
        self.cache.clear();
        Ok(())
    }

    /// Overwrites the biases of connection layer `index`.
    pub fn set_biases(&mut self, index: usize, biases: &[f64]) -> Result<(), LayerError> {
        let expected = self.connection(index)?.biases.len();
        if biases.len() != expected {
            return Err(LayerError::BiasesShape(SizeMismatch {
                expected,
                got: biases.len(),
            }));
        }
        self.layers[index].biases.copy_from_slice(biases);
        self.cache.clear();
        Ok(())
    }

    fn connection(&self, index: usize) -> Result<&Connection, LayerError> {
        self.layers
            .get(index)
            .ok_or(LayerError::ConnectionOutOfRange {
                index,
                count: self.layers.len(),
            })
    }
}

/// Error structure for `Network` construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NewNetError {
    #[error(
        "Net must have at least two layers (input and output), \
        but got topology with len {0}!"
    )]
    BadTopology(usize),
    #[error("Every layer needs at least one neuron, but layer {0} has none!")]
    EmptyLayer(usize),
    #[error("Connection layer {index} ({inputs}x{outputs}) is too large to allocate!")]
    TooLarge {
        index: usize,
        inputs: usize,
        outputs: usize,
    },
}

/// Error structure for layer, neuron and parameter access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayerError {
    #[error("Expected connection layer index below {count}, but got {index}!")]
    ConnectionOutOfRange { index: usize, count: usize },
    #[error("Layer {index} is not a hidden layer, hidden layers are 1..{last}!")]
    NotHidden { index: usize, last: usize },
    #[error("Expected neuron index below {width} in layer {layer}, but got {neuron}!")]
    NeuronOutOfRange {
        layer: usize,
        neuron: usize,
        width: usize,
    },
    #[error("Layer {0} has a single neuron, it cannot be removed!")]
    LastNeuron(usize),
    #[error("Expected {}x{} weights, but got {}x{}!", .expected.0, .expected.1, .got.0, .got.1)]
    WeightsShape {
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("Expected {} biases, but got {}!", .0.expected, .0.got)]
    BiasesShape(SizeMismatch),
}

/// Error structure for collections size mismatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Expected {expected} values, but got {got}!")]
pub struct SizeMismatch {
    pub expected: usize,
    pub got: usize,
}
