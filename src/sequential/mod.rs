//! Sequential neural network trained by backpropagation with the Adam optimizer

mod activation;
mod adam;
mod backward;
mod forward;
mod net;
mod output;
mod parallel;
mod params;
mod persist;
mod plasticity;
mod trainer;

pub use activation::*;
pub use adam::AdamConfig;
pub use backward::BackpropError;
pub use net::*;
pub use output::*;
pub use params::Matrix;
pub use persist::{LoadError, SaveError};
pub use plasticity::NEW_WEIGHT_SCALE;
pub use trainer::{ExampleSet, StopReason, TrainConfig, TrainError, TrainReport};
