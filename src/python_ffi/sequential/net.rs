use pyo3::prelude::*;

use crate::sequential::{
    Activation, AdamConfig, BackpropError, LayerError, LoadError, Network as InnerNetwork,
    NewNetError, OutputLayer, OutputStrategy, SaveError, StopReason, TrainConfig, TrainError,
    UnknownActivation,
};
use crate::Impl_to_PyErr;

fn parse_activation(name: Option<String>) -> Result<Activation, UnknownActivation> {
    name.map_or(Ok(Activation::default()), |name| name.parse())
}

#[pyclass]
pub struct Network {
    pub(super) net: InnerNetwork,
}

#[pymethods]
impl Network {
    /// Network(topology, output="LMSE", activation="relu")
    #[new]
    pub fn new(
        topology: Vec<usize>,
        output: Option<String>,
        activation: Option<String>,
    ) -> PyResult<Self> {
        let output = output.map_or(OutputLayer::default(), |tag| OutputLayer::from_tag(&tag));
        let net = InnerNetwork::new(&topology, output, parse_activation(activation)?)?;
        Ok(Self { net })
    }

    #[staticmethod]
    pub fn load(path: String, activation: Option<String>) -> PyResult<Self> {
        let net = InnerNetwork::load_with_activation(&path, parse_activation(activation)?)?;
        Ok(Self { net })
    }

    pub fn save(&self, path: String) -> Result<(), SaveError> {
        self.net.save(&path)
    }

    pub fn topology(&self) -> Vec<usize> {
        self.net.topology().to_vec()
    }

    pub fn output_tag(&self) -> &'static str {
        self.net.output_layer().type_tag()
    }

    pub fn hidden_activation(&self) -> &'static str {
        self.net.hidden_activation().name()
    }

    /// Returns an empty list if the input size does not match the input layer.
    pub fn feed_forward(&mut self, input: Vec<f64>) -> Vec<f64> {
        self.net.feed_forward(&input)
    }

    pub fn predict(&self, input: Vec<f64>) -> Vec<f64> {
        self.net.predict(&input)
    }

    pub fn backpropagate(&mut self, target: Vec<f64>) -> Result<(), BackpropError> {
        self.net.backpropagate(&target)
    }

    pub fn optimize(&mut self, learning_rate: f64) {
        self.net.optimize(learning_rate, &AdamConfig::default());
    }

    /// Runs the training loop and returns `(epochs, best_loss, stop_reason)`.
    pub fn train(
        &mut self,
        train_inputs: Vec<Vec<f64>>,
        train_targets: Vec<Vec<f64>>,
        val_inputs: Vec<Vec<f64>>,
        val_targets: Vec<Vec<f64>>,
        learning_rate: f64,
        window: Option<usize>,
        target_loss: Option<f64>,
        std_threshold: Option<f64>,
        max_epochs: Option<usize>,
    ) -> Result<(usize, f64, &'static str), TrainError> {
        let mut config = TrainConfig::new(learning_rate);
        if let Some(window) = window {
            config = config.window(window);
        }
        if let Some(target_loss) = target_loss {
            config = config.target_loss(target_loss);
        }
        if let Some(std_threshold) = std_threshold {
            config = config.std_threshold(std_threshold);
        }
        config.max_epochs = max_epochs;

        let report = self.net.train(
            &train_inputs,
            &train_targets,
            &val_inputs,
            &val_targets,
            &config,
        )?;
        let stop = match report.stop {
            StopReason::Stabilized { .. } => "stabilized",
            StopReason::TargetReached => "target_reached",
            StopReason::EpochLimit => "epoch_limit",
        };
        Ok((report.epochs, report.best_loss, stop))
    }

    pub fn calc_loss(&self, inputs: Vec<Vec<f64>>, targets: Vec<Vec<f64>>) -> f64 {
        self.net.calc_loss(&inputs, &targets)
    }

    pub fn calc_accuracy(&self, inputs: Vec<Vec<f64>>, targets: Vec<Vec<f64>>) -> f64 {
        self.net.calc_accuracy(&inputs, &targets)
    }

    pub fn add_neuron(&mut self, layer: usize) -> Result<(), LayerError> {
        self.net.add_neuron(layer)
    }

    pub fn remove_neuron(&mut self, layer: usize, neuron: usize) -> Result<(), LayerError> {
        self.net.remove_neuron(layer, neuron)
    }

    pub fn weights(&self, index: usize) -> Result<Vec<Vec<f64>>, LayerError> {
        Ok(self.net.weights(index)?.to_rows())
    }

    pub fn biases(&self, index: usize) -> Result<Vec<f64>, LayerError> {
        Ok(self.net.biases(index)?.to_vec())
    }

    pub fn set_weights(&mut self, index: usize, weights: Vec<Vec<f64>>) -> Result<(), LayerError> {
        self.net.set_weights(index, &weights)
    }

    pub fn set_biases(&mut self, index: usize, biases: Vec<f64>) -> Result<(), LayerError> {
        self.net.set_biases(index, &biases)
    }
}

Impl_to_PyErr!(
    for NewNetError,
    LayerError,
    BackpropError,
    TrainError,
    LoadError,
    SaveError,
    UnknownActivation
);
