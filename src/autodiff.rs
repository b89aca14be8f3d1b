//! Reverse-mode automatic differentiation over scalars recorded on a tape.

use std::{
    cell::RefCell,
    ops::{Add, Div, Mul, Sub},
};

/// A node in the computation graph holding the index of the nodes it depends on and the gradients
/// of the output with respect to each of the inputs.
#[derive(Debug)]
struct Node {
    from: [usize; 2],
    grad: [f64; 2],
}

/// A tape recording the computation graph where each element holds the local derivatives
/// of a variable with respect to variables that it directly depends on.
#[derive(Debug, Default)]
pub struct Tape {
    nodes: RefCell<Vec<Node>>,
}

impl Tape {
    /// Get the number of nodes in the tape.
    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Check if the tape is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all nodes from the tape.
    ///
    /// Variables created before clearing must not be used afterwards.
    pub fn clear(&self) {
        self.nodes.borrow_mut().clear();
    }

    /// Add a node to the tape and return its index.
    fn add_node(&self, from_x: usize, from_y: usize, grad_x: f64, grad_y: f64) -> usize {
        let mut nodes = self.nodes.borrow_mut();
        let index = nodes.len();
        nodes.push(Node {
            grad: [grad_x, grad_y],
            from: [from_x, from_y],
        });
        index
    }

    /// Add a variable to the tape and return it. A variable created this way does not depend on
    /// any other variable.
    pub fn add_variable(&self, value: f64) -> Variable<'_> {
        let index = {
            let id = self.len();
            self.add_node(id, id, 0.0, 0.0)
        };
        Variable {
            index,
            value,
            tape: self,
        }
    }
}

/// A variable in the computation graph. Operations on variables return new variables and do not
/// mutate the original ones.
#[derive(Debug, Clone, Copy)]
pub struct Variable<'ctx> {
    /// The value computed in the forward pass.
    pub value: f64,
    index: usize,
    tape: &'ctx Tape,
}

macro_rules! binary_op {
    ($trait:ident, $method:ident, |$x:ident, $y:ident| $value:expr, $grads:expr) => {
        impl<'ctx> $trait for Variable<'ctx> {
            type Output = Variable<'ctx>;

            fn $method(self, rhs: Self) -> Self::Output {
                $trait::$method(&self, &rhs)
            }
        }

        impl<'ctx> $trait for &Variable<'ctx> {
            type Output = Variable<'ctx>;

            fn $method(self, rhs: Self) -> Self::Output {
                assert!(std::ptr::eq(self.tape, rhs.tape), "variables are on different tapes");
                let ($x, $y) = (self.value, rhs.value);
                let (grad_x, grad_y) = $grads;
                Variable {
                    value: $value,
                    index: self.tape.add_node(self.index, rhs.index, grad_x, grad_y),
                    tape: self.tape,
                }
            }
        }
    };
}

binary_op!(Add, add, |x, y| x + y, (1.0, 1.0));
binary_op!(Sub, sub, |x, y| x - y, (1.0, -1.0));
binary_op!(Mul, mul, |x, y| x * y, (y, x));
binary_op!(Div, div, |x, y| x / y, (1.0 / y, -x / (y * y)));

impl<'ctx> Variable<'ctx> {
    /// Compute the gradient of this variable with respect to every node in the tape, indexed by
    /// node.
    pub fn gradients(&self) -> Vec<f64> {
        let mut gradients = vec![0.0; self.tape.len()];
        gradients[self.index] = 1.0;
        for (idx, n) in self.tape.nodes.borrow().iter().enumerate().rev() {
            gradients[n.from[0]] += n.grad[0] * gradients[idx];
            gradients[n.from[1]] += n.grad[1] * gradients[idx];
        }
        gradients
    }

    /// The gradient of this variable taken from the output of [`Variable::gradients`].
    pub fn gradient(&self, gradients: &[f64]) -> f64 {
        gradients[self.index]
    }

    /// Take a gradient descent step on the value of this variable.
    pub fn learn(&mut self, gradients: &[f64], learning_rate: f64) {
        self.value -= learning_rate * gradients[self.index];
    }

    /// Pass the value through unchanged, as a new node.
    #[must_use]
    pub fn identity(&self) -> Self {
        Variable {
            value: self.value,
            index: self.tape.add_node(self.index, self.index, 1.0, 0.0),
            tape: self.tape,
        }
    }

    /// The rectified linear unit.
    #[must_use]
    pub fn relu(&self) -> Self {
        let (value, grad) = if self.value > 0.0 {
            (self.value, 1.0)
        } else {
            (0.0, 0.0)
        };
        Variable {
            value,
            index: self.tape.add_node(self.index, self.index, grad, 0.0),
            tape: self.tape,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradients_of_expression() {
        let tape = Tape::default();
        let x = tape.add_variable(3.0);
        let y = tape.add_variable(2.0);
        // f = x * y + x / y - y
        let f = x * y + x / y - y;
        assert!((f.value - 5.5).abs() < 1e-12);
        let grads = f.gradients();
        assert!((x.gradient(&grads) - 2.5).abs() < 1e-12);
        assert!((y.gradient(&grads) - (3.0 - 0.75 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn relu_passes_gradient_only_when_positive() {
        let tape = Tape::default();
        let x = tape.add_variable(2.0);
        let y = tape.add_variable(-2.0);
        let f = x.relu() * tape.add_variable(3.0) + y.relu();
        let grads = f.gradients();
        assert_eq!(x.gradient(&grads), 3.0);
        assert_eq!(y.gradient(&grads), 0.0);
    }

    #[test]
    fn learn_descends() {
        let tape = Tape::default();
        let mut x = tape.add_variable(1.0);
        let f = x * x;
        let grads = f.gradients();
        x.learn(&grads, 0.25);
        assert!((x.value - 0.5).abs() < 1e-12);
        tape.clear();
        assert!(tape.is_empty());
    }
}
