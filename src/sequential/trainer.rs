use std::collections::VecDeque;

use tracing::{debug, info};

use super::adam::AdamConfig;
use super::net::{Network, SizeMismatch};
use super::output::OutputStrategy;
use super::params::Connection;
use super::parallel;

/// Training loop settings.
///
/// # Examples
/// ```
/// # use seqnet::sequential::TrainConfig;
/// let config = TrainConfig::new(1e-3).window(1000).target_loss(1e-4);
/// assert_eq!(config.std_threshold, 1e-5);
/// assert_eq!(config.max_epochs, None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrainConfig {
    pub learning_rate: f64,

    /// Number of recent validation losses checked for stabilization. Values below 2 act as 2.
    pub window: usize,

    /// Training stops once the best validation loss is at or below this value.
    pub target_loss: f64,

    /// Training stops once the population standard deviation of the window is at or below
    /// this value.
    pub std_threshold: f64,

    /// Optional hard cap on the number of epochs. `None` runs until a stop condition fires.
    pub max_epochs: Option<usize>,

    pub adam: AdamConfig,
}

impl TrainConfig {
    /// Default settings for the given learning rate: a window of 100 epochs, target loss 0,
    /// threshold `1e-5` and no epoch cap.
    pub fn new(learning_rate: f64) -> TrainConfig {
        TrainConfig {
            learning_rate,
            window: 100,
            target_loss: 0.0,
            std_threshold: 1e-5,
            max_epochs: None,
            adam: AdamConfig::default(),
        }
    }

    pub fn window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn target_loss(mut self, target_loss: f64) -> Self {
        self.target_loss = target_loss;
        self
    }

    pub fn std_threshold(mut self, std_threshold: f64) -> Self {
        self.std_threshold = std_threshold;
        self
    }

    pub fn max_epochs(mut self, max_epochs: usize) -> Self {
        self.max_epochs = Some(max_epochs);
        self
    }

    pub fn adam(mut self, adam: AdamConfig) -> Self {
        self.adam = adam;
        self
    }
}

/// Why `Network::train` returned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopReason {
    /// The validation loss stopped moving: the window's standard deviation reached the
    /// threshold.
    Stabilized { std_dev: f64 },
    /// The best validation loss reached the target.
    TargetReached,
    /// `TrainConfig::max_epochs` epochs were run.
    EpochLimit,
}

/// Outcome of `Network::train`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainReport {
    /// Number of full passes over the training set.
    pub epochs: usize,
    /// Best validation loss seen; the network holds the parameters that produced it.
    pub best_loss: f64,
    pub stop: StopReason,
}

/// Fixed-capacity FIFO of recent validation losses.
#[derive(Debug, Clone)]
pub(crate) struct LossWindow {
    losses: VecDeque<f64>,
    capacity: usize,
}

impl LossWindow {
    pub(crate) fn new(capacity: usize) -> LossWindow {
        let capacity = capacity.max(2);
        LossWindow {
            losses: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Records a loss, dropping the oldest one when over capacity.
    ///
    /// # Returns
    /// * The population standard deviation of the window once it is full;
    /// * `None` while it is still filling.
    pub(crate) fn push(&mut self, loss: f64) -> Option<f64> {
        self.losses.push_back(loss);
        if self.losses.len() > self.capacity {
            self.losses.pop_front();
        }
        if self.losses.len() < self.capacity {
            return None;
        }

        let n = self.losses.len() as f64;
        let mean = self.losses.iter().sum::<f64>() / n;
        let variance = self.losses.iter().map(|l| (l - mean) * (l - mean)).sum::<f64>() / n;
        Some(variance.sqrt())
    }
}

impl Network {
    /// Trains the network with Adam, one example at a time, until the validation loss
    /// stabilizes or reaches the target.
    ///
    /// Each epoch runs forward, backward and optimizer steps for every training example in
    /// the given order, then measures the loss on the validation set. The parameters that
    /// produced the best validation loss are restored before returning, whatever epoch the
    /// loop stops at.
    ///
    /// With no `max_epochs` the loop is unbounded: a loss that neither stabilizes within
    /// `std_threshold` nor reaches `target_loss` keeps it running.
    ///
    /// # Arguments
    /// * `train_inputs`, `train_targets` - training examples;
    /// * `val_inputs`, `val_targets` - validation examples, used for stopping and model
    /// selection only;
    /// * `config` - learning rate and stop conditions.
    ///
    /// # Returns
    /// * `Ok(TrainReport)` when a stop condition fired;
    /// * `Err(TrainError)` if the examples do not fit the network, before any training.
    ///
    /// # Examples
    /// ```
    /// # use seqnet::sequential::{Network, TrainConfig};
    /// let mut net = Network::from_tag(&[1, 8, 1], "LMSE").unwrap();
    /// let inputs: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64 / 10.0]).collect();
    /// let targets: Vec<Vec<f64>> = inputs.iter().map(|x| vec![2.0 * x[0] + 1.0]).collect();
    ///
    /// let config = TrainConfig::new(1e-2).window(20).max_epochs(500);
    /// let report = net.train(&inputs, &targets, &inputs, &targets, &config).unwrap();
    /// assert!(report.epochs <= 500);
    /// assert_eq!(net.calc_loss(&inputs, &targets), report.best_loss);
    /// ```
    pub fn train(
        &mut self,
        train_inputs: &[Vec<f64>],
        train_targets: &[Vec<f64>],
        val_inputs: &[Vec<f64>],
        val_targets: &[Vec<f64>],
        config: &TrainConfig,
    ) -> Result<TrainReport, TrainError> {
        if !(config.learning_rate > 0.0) {
            return Err(TrainError::BadLearningRate(config.learning_rate));
        }
        if val_inputs.is_empty() {
            return Err(TrainError::NoValidationData);
        }
        self.check_examples(ExampleSet::Training, train_inputs, train_targets)?;
        self.check_examples(ExampleSet::Validation, val_inputs, val_targets)?;

        let mut window = LossWindow::new(config.window);
        let mut best_loss = f64::INFINITY;
        let mut best_params: Option<Vec<Connection>> = None;
        let mut epoch = 0;

        let stop = loop {
            epoch += 1;

            for (input, target) in train_inputs.iter().zip(train_targets.iter()) {
                self.feed_forward(input);
                self.backpropagate(target)?;
                self.optimize(config.learning_rate, &config.adam);
            }

            let loss = self.calc_loss(val_inputs, val_targets);
            let std_dev = window.push(loss);

            if tracing::enabled!(tracing::Level::DEBUG) {
                let accuracy = self.calc_accuracy(val_inputs, val_targets);
                debug!(epoch, loss, ?std_dev, accuracy, "epoch finished");
            }

            if loss < best_loss {
                best_loss = loss;
                best_params = Some(self.layers.clone());
            }

            if let Some(std_dev) = std_dev {
                if std_dev <= config.std_threshold {
                    break StopReason::Stabilized { std_dev };
                }
            }
            if best_loss <= config.target_loss {
                break StopReason::TargetReached;
            }
            if config.max_epochs.map_or(false, |max| epoch >= max) {
                break StopReason::EpochLimit;
            }
        };

        if let Some(params) = best_params {
            self.layers = params;
        }
        self.cache.clear();

        info!(epoch, best_loss, ?stop, "training finished");

        Ok(TrainReport {
            epochs: epoch,
            best_loss,
            stop,
        })
    }

    /// Mean loss over a set of examples, computed with the current output strategy.
    ///
    /// Examples whose input does not fit the network are skipped.
    ///
    /// # Returns
    /// * The mean loss of the fitting examples;
    /// * `NaN` if the sets are empty, have different lengths, or nothing fits.
    pub fn calc_loss(&self, inputs: &[Vec<f64>], targets: &[Vec<f64>]) -> f64 {
        if inputs.is_empty() || inputs.len() != targets.len() {
            return f64::NAN;
        }

        let (sum, count) = inputs
            .iter()
            .zip(targets.iter())
            .map(|(input, target)| (self.predict(input), target))
            .filter(|(output, _)| !output.is_empty())
            .fold((0.0, 0usize), |(sum, count), (output, target)| {
                (sum + self.output.loss(&output, target), count + 1)
            });

        if count == 0 {
            f64::NAN
        } else {
            sum / count as f64
        }
    }

    /// Share of examples whose largest output sits at the same index as the largest target
    /// value (one-hot targets).
    ///
    /// # Returns
    /// * A value in `[0, 1]`;
    /// * `0.0` if the sets are empty or have different lengths.
    ///
    /// # Examples
    /// ```
    /// # use seqnet::sequential::Network;
    /// let net = Network::from_tag(&[2, 3, 2], "SCE").unwrap();
    /// assert_eq!(net.calc_accuracy(&[], &[]), 0.0);
    /// assert_eq!(net.calc_accuracy(&[vec![0.0, 1.0]], &[]), 0.0);
    /// ```
    pub fn calc_accuracy(&self, inputs: &[Vec<f64>], targets: &[Vec<f64>]) -> f64 {
        if inputs.is_empty() || inputs.len() != targets.len() {
            return 0.0;
        }

        let hits = parallel::count(inputs, |i, input| {
            let output = self.predict(input);
            !output.is_empty() && argmax(&output) == argmax(&targets[i])
        });

        hits as f64 / inputs.len() as f64
    }

    fn check_examples(
        &self,
        set: ExampleSet,
        inputs: &[Vec<f64>],
        targets: &[Vec<f64>],
    ) -> Result<(), TrainError> {
        if inputs.len() != targets.len() {
            return Err(TrainError::CountMismatch {
                set,
                sizes: SizeMismatch {
                    expected: inputs.len(),
                    got: targets.len(),
                },
            });
        }
        let (input_size, output_size) = (self.input_size(), self.output_size());
        for (index, (input, target)) in inputs.iter().zip(targets.iter()).enumerate() {
            if input.len() != input_size {
                return Err(TrainError::BadInput {
                    set,
                    index,
                    sizes: SizeMismatch {
                        expected: input_size,
                        got: input.len(),
                    },
                });
            }
            if target.len() != output_size {
                return Err(TrainError::BadTarget {
                    set,
                    index,
                    sizes: SizeMismatch {
                        expected: output_size,
                        got: target.len(),
                    },
                });
            }
        }
        Ok(())
    }
}

/// Index of the first largest value.
fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max {
                (i, v)
            } else {
                (best, max)
            }
        })
        .0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExampleSet {
    Training,
    Validation,
}

impl std::fmt::Display for ExampleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ExampleSet::Training => f.write_str("training"),
            ExampleSet::Validation => f.write_str("validation"),
        }
    }
}

/// Error structure for `Network::train`
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrainError {
    #[error("Learning rate must be positive, but got {0}!")]
    BadLearningRate(f64),
    #[error("Validation set is empty!")]
    NoValidationData,
    #[error("Expected {} {set} target(s) to match the inputs, but got {}!", .sizes.expected, .sizes.got)]
    CountMismatch { set: ExampleSet, sizes: SizeMismatch },
    #[error("Expected {} input(s), but {set} sample [{index}] got {}!", .sizes.expected, .sizes.got)]
    BadInput {
        set: ExampleSet,
        index: usize,
        sizes: SizeMismatch,
    },
    #[error("Expected {} desired output(s), but {set} sample [{index}] got {}!", .sizes.expected, .sizes.got)]
    BadTarget {
        set: ExampleSet,
        index: usize,
        sizes: SizeMismatch,
    },
    #[error(transparent)]
    Backprop(#[from] super::backward::BackpropError),
}
