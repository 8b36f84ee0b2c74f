//! Adam (adaptive moment estimation) optimizer.
//!
//! ```text
//! m = beta1 * m + (1 - beta1) * g
//! v = beta2 * v + (1 - beta2) * g^2
//! m_hat = m / (1 - beta1^t)
//! v_hat = v / (1 - beta2^t)
//! p -= learning_rate * m_hat / (sqrt(v_hat) + epsilon)
//! ```
//!
//! `t` is a single counter shared by every weight and bias of the network. It advances once
//! per `Network::optimize` call, which the training loop makes once per example.

use rayon::prelude::*;

use super::net::Network;
use super::parallel::PARALLEL_MIN_LEN;

/// Adam hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdamConfig {
    /// Decay rate of the first moment.
    pub beta1: f64,
    /// Decay rate of the second moment.
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        AdamConfig {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Per-step constants of the update rule.
struct Step {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    /// `1 - beta1^t`
    correction1: f64,
    /// `1 - beta2^t`
    correction2: f64,
}

impl Step {
    fn new(learning_rate: f64, config: &AdamConfig, t: u64) -> Step {
        let t = t as f64;
        Step {
            learning_rate,
            beta1: config.beta1,
            beta2: config.beta2,
            epsilon: config.epsilon,
            correction1: 1.0 - config.beta1.powf(t),
            correction2: 1.0 - config.beta2.powf(t),
        }
    }

    fn apply(&self, param: &mut f64, grad: f64, first: &mut f64, second: &mut f64) {
        *first = self.beta1 * *first + (1.0 - self.beta1) * grad;
        *second = self.beta2 * *second + (1.0 - self.beta2) * grad * grad;
        let m_hat = *first / self.correction1;
        let v_hat = *second / self.correction2;
        *param -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
    }

    fn apply_all(&self, params: &mut [f64], grads: &[f64], first: &mut [f64], second: &mut [f64]) {
        if params.len() >= PARALLEL_MIN_LEN {
            params
                .par_iter_mut()
                .zip(grads.par_iter())
                .zip(first.par_iter_mut().zip(second.par_iter_mut()))
                .for_each(|((p, &g), (m, v))| self.apply(p, g, m, v));
        } else {
            params
                .iter_mut()
                .zip(grads.iter())
                .zip(first.iter_mut().zip(second.iter_mut()))
                .for_each(|((p, &g), (m, v))| self.apply(p, g, m, v));
        }
    }
}

impl Network {
    /// Applies one Adam step to every weight and bias, using the gradients of the last
    /// `Network::backpropagate` call.
    ///
    /// # Arguments
    /// * `learning_rate` - step size;
    /// * `config` - decay rates and epsilon, see `AdamConfig::default`.
    pub fn optimize(&mut self, learning_rate: f64, config: &AdamConfig) {
        self.step += 1;
        let step = Step::new(learning_rate, config, self.step);

        for (layer, acc) in self.layers.iter_mut().zip(self.accumulators.iter_mut()) {
            step.apply_all(
                layer.weights.as_mut_slice(),
                acc.grads.weights.as_slice(),
                acc.first.weights.as_mut_slice(),
                acc.second.weights.as_mut_slice(),
            );
            step.apply_all(
                &mut layer.biases,
                &acc.grads.biases,
                &mut acc.first.biases,
                &mut acc.second.biases,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_step_moves_by_learning_rate() {
        // With bias correction the first step is `lr * g / (|g| + eps)`
        let step = Step::new(0.01, &AdamConfig::default(), 1);
        let (mut p, mut m, mut v) = (1.0, 0.0, 0.0);
        step.apply(&mut p, 0.5, &mut m, &mut v);
        assert!((p - 0.99).abs() < 1e-9);
        assert!((m - 0.05).abs() < 1e-15);
        assert!((v - 0.00025).abs() < 1e-15);

        let (mut p, mut m, mut v) = (1.0, 0.0, 0.0);
        step.apply(&mut p, -2.0, &mut m, &mut v);
        assert!((p - 1.01).abs() < 1e-9);
    }

    #[test]
    fn zero_gradient_keeps_parameter() {
        let step = Step::new(0.1, &AdamConfig::default(), 3);
        let (mut p, mut m, mut v) = (0.7, 0.0, 0.0);
        step.apply(&mut p, 0.0, &mut m, &mut v);
        assert_eq!(p, 0.7);
    }

    #[test]
    fn parallel_and_sequential_paths_agree() {
        let len = PARALLEL_MIN_LEN + 3;
        let grads: Vec<f64> = (0..len).map(|i| (i as f64 * 0.37).sin()).collect();
        let step = Step::new(0.05, &AdamConfig::default(), 4);

        let mut params = vec![0.5; len];
        let (mut first, mut second) = (vec![0.1; len], vec![0.2; len]);
        step.apply_all(&mut params, &grads, &mut first, &mut second);

        for i in 0..len {
            let (mut p, mut m, mut v) = (0.5, 0.1, 0.2);
            step.apply(&mut p, grads[i], &mut m, &mut v);
            assert_eq!((params[i], first[i], second[i]), (p, m, v));
        }
    }

    #[test]
    fn optimize_advances_step_and_moves_parameters() {
        let mut net = Network::from_tag(&[2, 3, 2], "LMSE").unwrap();
        net.feed_forward(&[1.0, -1.0]);
        net.backpropagate(&[5.0, -5.0]).unwrap();
        let before = net.clone();

        net.optimize(0.1, &AdamConfig::default());
        assert_eq!(net.steps(), 1);
        // The output biases always get a nonzero gradient here
        for (after, old) in net.biases(1).unwrap().iter().zip(before.biases(1).unwrap()) {
            assert!((after - old).abs() > 0.09);
        }
        net.optimize(0.1, &AdamConfig::default());
        assert_eq!(net.steps(), 2);
    }
}
