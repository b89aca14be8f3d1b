//! Parameter update rules.

use serde::{Deserialize, Serialize};

use crate::autodiff::Variable;

/// Updates parameters given the gradients computed on the tape they live in.
pub trait Optimizer {
    /// Move every parameter against its gradient.
    ///
    /// Parameters must be passed in the same order on every call, since stateful optimizers track
    /// them by position.
    fn step(&mut self, params: &mut [&mut Variable<'_>], gradients: &[f64]);
}

/// The optimizers that can be selected from a configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// Plain stochastic gradient descent.
    Sgd,
    /// Adaptive moment estimation.
    #[default]
    Adam,
}

impl OptimizerKind {
    /// Create the optimizer with the given learning rate.
    pub fn build(self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            Self::Sgd => Box::new(Sgd::new(learning_rate)),
            Self::Adam => Box::new(Adam::new(learning_rate)),
        }
    }
}

/// Stochastic gradient descent.
#[derive(Clone, Debug)]
pub struct Sgd {
    learning_rate: f64,
}

impl Sgd {
    /// Create an optimizer that steps by `learning_rate` times the gradient.
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [&mut Variable<'_>], gradients: &[f64]) {
        for param in params.iter_mut() {
            param.learn(gradients, self.learning_rate);
        }
    }
}

/// Adam optimizer with bias-corrected first and second moment estimates.
#[derive(Clone, Debug)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    m: Vec<f64>,
    v: Vec<f64>,
}

impl Adam {
    /// Create an optimizer with the usual betas (0.9, 0.999).
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Variable<'_>], gradients: &[f64]) {
        if self.m.len() != params.len() {
            self.m = vec![0.0; params.len()];
            self.v = vec![0.0; params.len()];
            self.t = 0;
        }
        self.t = self.t.saturating_add(1);
        let m_correction = 1.0 - self.beta1.powi(self.t);
        let v_correction = 1.0 - self.beta2.powi(self.t);
        for ((param, m), v) in params.iter_mut().zip(&mut self.m).zip(&mut self.v) {
            let g = param.gradient(gradients);
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let m_hat = *m / m_correction;
            let v_hat = *v / v_correction;
            param.value -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::Tape;

    fn minimize(optimizer: &mut dyn Optimizer, steps: usize) -> f64 {
        let tape = Tape::default();
        let mut value = 3.0;
        for _ in 0..steps {
            let mut x = tape.add_variable(value);
            let offset = tape.add_variable(1.0);
            let d = x - offset;
            let loss = d * d;
            let grads = loss.gradients();
            optimizer.step(&mut [&mut x], &grads);
            value = x.value;
            tape.clear();
        }
        value
    }

    #[test]
    fn sgd_converges_on_quadratic() {
        let x = minimize(&mut Sgd::new(0.1), 100);
        assert!((x - 1.0).abs() < 1e-6, "{x}");
    }

    #[test]
    fn adam_first_step_is_learning_rate() {
        let x = minimize(&mut Adam::new(0.01), 1);
        assert!((x - 2.99).abs() < 1e-6, "{x}");
    }

    #[test]
    fn adam_converges_on_quadratic() {
        let x = minimize(&mut Adam::new(0.1), 500);
        assert!((x - 1.0).abs() < 5e-2, "{x}");
    }

    #[test]
    fn kind_names() {
        let kind: OptimizerKind = serde_json::from_str("\"sgd\"").unwrap();
        assert_eq!(kind, OptimizerKind::Sgd);
        assert_eq!(OptimizerKind::default(), OptimizerKind::Adam);
    }
}
