//! Output layer strategies: a final activation paired with the loss it is trained against.
//!
//! The pairing matters for backpropagation: for both strategies the derivative of the loss
//! composed with the derivative of the activation collapses to `activated - target`, which
//! is what `OutputStrategy::backward` returns. A new strategy must either keep that property
//! or compute its own delta.

use std::fmt;

/// Small constant added inside the cross-entropy logarithm.
pub const LOG_EPSILON: f64 = 1e-9;

/// Capabilities every output strategy provides.
pub trait OutputStrategy {
    /// Turns the logits of the last layer into the network output.
    fn forward(&self, logits: &[f64]) -> Vec<f64>;

    /// Initial error signal (delta) of the last layer.
    fn backward(&self, activated: &[f64], target: &[f64]) -> Vec<f64> {
        activated
            .iter()
            .zip(target.iter())
            .map(|(&a, &t)| a - t)
            .collect()
    }

    /// Loss of a single example.
    fn loss(&self, activated: &[f64], target: &[f64]) -> f64;

    /// Identifier written to the description file.
    fn type_tag(&self) -> &'static str;
}

/// Softmax activation with categorical cross-entropy loss (tag `SCE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SoftmaxCrossEntropy;

impl OutputStrategy for SoftmaxCrossEntropy {
    fn forward(&self, logits: &[f64]) -> Vec<f64> {
        // Shifting by the maximum keeps `exp` from overflowing
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut out: Vec<f64> = logits.iter().map(|&l| (l - max).exp()).collect();
        let sum: f64 = out.iter().sum();
        for o in out.iter_mut() {
            *o /= sum;
        }
        out
    }

    /// `-sum(target * ln(activated + eps))`, floored at zero: a certain hit (`activated == 1`)
    /// would otherwise come out as `-ln(1 + eps)`.
    fn loss(&self, activated: &[f64], target: &[f64]) -> f64 {
        let log_likelihood: f64 = activated
            .iter()
            .zip(target.iter())
            .map(|(&a, &t)| t * (a + LOG_EPSILON).ln())
            .sum();
        (-log_likelihood).max(0.0)
    }

    fn type_tag(&self) -> &'static str {
        "SCE"
    }
}

/// Identity activation with mean squared error loss (tag `LMSE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinearMse;

impl OutputStrategy for LinearMse {
    fn forward(&self, logits: &[f64]) -> Vec<f64> {
        logits.to_vec()
    }

    fn loss(&self, activated: &[f64], target: &[f64]) -> f64 {
        if activated.is_empty() {
            return 0.0;
        }
        let sum: f64 = activated
            .iter()
            .zip(target.iter())
            .map(|(&a, &t)| (a - t) * (a - t))
            .sum();
        sum / activated.len() as f64
    }

    fn type_tag(&self) -> &'static str {
        "LMSE"
    }
}

/// Output strategy owned by a `Network`.
///
/// The set of strategies is closed; each variant delegates to its strategy type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputLayer {
    SoftmaxCrossEntropy,
    LinearMse,
}

impl OutputLayer {
    /// Picks the strategy for a persisted tag. Anything but `SCE` falls back to `LinearMse`.
    ///
    /// # Examples
    /// ```
    /// # use seqnet::sequential::OutputLayer;
    /// assert_eq!(OutputLayer::from_tag("SCE"), OutputLayer::SoftmaxCrossEntropy);
    /// assert_eq!(OutputLayer::from_tag("LMSE"), OutputLayer::LinearMse);
    /// assert_eq!(OutputLayer::from_tag("???"), OutputLayer::LinearMse);
    /// ```
    pub fn from_tag(tag: &str) -> OutputLayer {
        match tag.trim() {
            "SCE" => OutputLayer::SoftmaxCrossEntropy,
            _ => OutputLayer::LinearMse,
        }
    }

    fn strategy(&self) -> &dyn OutputStrategy {
        match self {
            OutputLayer::SoftmaxCrossEntropy => &SoftmaxCrossEntropy,
            OutputLayer::LinearMse => &LinearMse,
        }
    }
}

impl Default for OutputLayer {
    fn default() -> Self {
        OutputLayer::LinearMse
    }
}

impl OutputStrategy for OutputLayer {
    fn forward(&self, logits: &[f64]) -> Vec<f64> {
        self.strategy().forward(logits)
    }

    fn backward(&self, activated: &[f64], target: &[f64]) -> Vec<f64> {
        self.strategy().backward(activated, target)
    }

    fn loss(&self, activated: &[f64], target: &[f64]) -> f64 {
        self.strategy().loss(activated, target)
    }

    fn type_tag(&self) -> &'static str {
        self.strategy().type_tag()
    }
}

impl fmt::Display for OutputLayer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.type_tag())
    }
}
