//! A dense network mapping an input window to a forecast of every channel over the output window.
//!
//! The network flattens `[input_width, channels]` into one vector, passes it through two hidden
//! ReLU layers and a linear output layer of `output_width * channels` units, and reshapes the
//! result into `[output_width, channels]`. Parameters are plain `f64`s that get recorded on a
//! [`Tape`] for the duration of one forward/backward pass.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::{
    autodiff::{Tape, Variable},
    error::{Error, Result},
    optim::Optimizer,
    tensor::Tensor,
    window::{Batch, WindowShape},
};

/// Nonlinearity applied to the output of every neuron in a layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// No nonlinearity.
    Identity,
    /// Rectified linear unit.
    Relu,
}

impl Activation {
    fn apply<'a>(self, x: &Variable<'a>) -> Variable<'a> {
        match self {
            Self::Identity => x.identity(),
            Self::Relu => x.relu(),
        }
    }
}

struct NeuronVariables<'a> {
    bias: Variable<'a>,
    weights: Vec<Variable<'a>>,
}

/// A neuron holding a set of weights and a bias.
struct Neuron<'a> {
    bias: f64,
    weights: Vec<f64>,
    variables: Option<NeuronVariables<'a>>,
}

impl<'a> Neuron<'a> {
    /// Returns a list of all parameters of the neuron that are on the tape.
    fn parameters(&mut self) -> Vec<&mut Variable<'a>> {
        let mut params = Vec::new();
        if let Some(ref mut vs) = self.variables {
            params.push(&mut vs.bias);
            vs.weights.iter_mut().for_each(|w| params.push(w));
        }
        params
    }

    /// Copy the values of the variables on the tape back into the neuron.
    fn update_parameters(&mut self) {
        if let Some(variables) = self.variables.take() {
            self.bias = variables.bias.value;
            self.weights = variables.weights.into_iter().map(|w| w.value).collect();
        }
    }

    fn clear_parameters(&mut self) {
        self.variables.take();
    }

    /// Applies the neuron to the given input, recording its parameters on the tape first if
    /// needed.
    fn call(
        &mut self,
        tape: &'a Tape,
        input: &[Variable<'a>],
        activation: Activation,
    ) -> Variable<'a> {
        assert_eq!(input.len(), self.weights.len());
        let variables = self.variables.get_or_insert_with(|| {
            let bias = tape.add_variable(self.bias);
            let weights = self.weights.iter().map(|w| tape.add_variable(*w)).collect();
            NeuronVariables { bias, weights }
        });
        activation.apply(
            &variables
                .weights
                .iter()
                .zip(input)
                .fold(variables.bias.identity(), |acc, (w, x)| acc + w * x),
        )
    }
}

/// A fully connected layer of neurons.
pub struct Layer<'a> {
    neurons: Vec<Neuron<'a>>,
    input_size: usize,
    activation: Activation,
}

impl<'a> Layer<'a> {
    /// Create a layer with weights drawn from `distribution` and zero biases.
    pub fn new<R, D>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        rng: &mut R,
        distribution: D,
    ) -> Self
    where
        R: Rng,
        D: Distribution<f64> + Copy,
    {
        Self {
            neurons: (0..output_size)
                .map(|_| Neuron {
                    bias: 0.0,
                    weights: (0..input_size).map(|_| rng.sample(distribution)).collect(),
                    variables: None,
                })
                .collect(),
            input_size,
            activation,
        }
    }

    /// Create a layer from known parameters. `weights` holds `input_size` values for each bias,
    /// neuron after neuron.
    ///
    /// # Errors
    ///
    /// Returns an error if there isn't exactly `input_size` weights per bias.
    pub fn from_parts(
        input_size: usize,
        weights: &[f64],
        biases: &[f64],
        activation: Activation,
    ) -> Result<Self> {
        if input_size == 0 || weights.len() != biases.len() * input_size {
            return Err(Error::ElementCount {
                expected: biases.len() * input_size,
                actual: weights.len(),
            });
        }
        let neurons = weights
            .chunks_exact(input_size)
            .zip(biases)
            .map(|(w, &bias)| Neuron {
                bias,
                weights: w.to_vec(),
                variables: None,
            })
            .collect();
        Ok(Self {
            neurons,
            input_size,
            activation,
        })
    }

    /// Number of inputs of each neuron.
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Number of neurons.
    pub fn output_size(&self) -> usize {
        self.neurons.len()
    }

    /// The nonlinearity of the layer.
    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// All weights, neuron after neuron.
    pub fn weights(&self) -> Vec<f64> {
        self.neurons
            .iter()
            .flat_map(|n| n.weights.iter().copied())
            .collect()
    }

    /// The bias of every neuron.
    pub fn biases(&self) -> Vec<f64> {
        self.neurons.iter().map(|n| n.bias).collect()
    }

    /// Returns a list of all parameters of the layer that are on the tape.
    pub fn parameters(&mut self) -> Vec<&mut Variable<'a>> {
        self.neurons
            .iter_mut()
            .flat_map(|neuron| neuron.parameters())
            .collect()
    }

    /// Copy learned values back from the tape.
    pub fn update_parameters(&mut self) {
        self.neurons.iter_mut().for_each(|n| n.update_parameters());
    }

    /// Forget the variables on the tape without keeping their values.
    pub fn clear_parameters(&mut self) {
        self.neurons.iter_mut().for_each(|n| n.clear_parameters());
    }

    /// Applies the layer to the given input.
    pub fn call(&mut self, tape: &'a Tape, input: &[Variable<'a>]) -> Vec<Variable<'a>> {
        let activation = self.activation;
        self.neurons
            .iter_mut()
            .map(|neuron| neuron.call(tape, input, activation))
            .collect()
    }
}

/// A multi-layer perceptron holding a set of layers.
pub struct Mlp<'a> {
    layers: Vec<Layer<'a>>,
}

impl<'a> Mlp<'a> {
    /// Create an MLP with the given list of layers.
    pub fn new(layers: Vec<Layer<'a>>) -> Self {
        Self { layers }
    }

    /// The layers, from input to output.
    pub fn layers(&self) -> &[Layer<'a>] {
        &self.layers
    }

    /// Returns a list of all parameters of the MLP that are on the tape.
    pub fn parameters(&mut self) -> Vec<&mut Variable<'a>> {
        self.layers
            .iter_mut()
            .flat_map(|layer| layer.parameters())
            .collect()
    }

    /// Copy learned values back from the tape.
    pub fn update_parameters(&mut self) {
        self.layers.iter_mut().for_each(|l| l.update_parameters());
    }

    /// Forget the variables on the tape without keeping their values.
    pub fn clear_parameters(&mut self) {
        self.layers.iter_mut().for_each(|l| l.clear_parameters());
    }

    /// Applies the MLP to the given input.
    pub fn call(&mut self, tape: &'a Tape, input: &[Variable<'a>]) -> Vec<Variable<'a>> {
        match self.layers.split_first_mut() {
            Some((layer, ls)) => ls
                .iter_mut()
                .fold(layer.call(tape, input), |acc, layer| layer.call(tape, &acc)),
            None => Vec::new(),
        }
    }
}

/// Forecasts `output_width` steps of every channel from `input_width` standardized steps.
pub struct Forecaster<'a> {
    mlp: Mlp<'a>,
    shape: WindowShape,
    channels: usize,
}

impl<'a> Forecaster<'a> {
    /// Create a network with 2 hidden ReLU layers of `hidden` units, initialized with
    /// Glorot-normal weights.
    ///
    /// # Errors
    ///
    /// Returns an error if a size is zero.
    pub fn new<R>(shape: WindowShape, channels: usize, hidden: usize, rng: &mut R) -> Result<Self>
    where
        R: Rng,
    {
        let sizes = [
            shape.input_width * channels,
            hidden,
            hidden,
            shape.output_width * channels,
        ];
        if sizes.contains(&0) {
            return Err(Error::InvalidConfig(format!("layer sizes {sizes:?} must be positive")));
        }
        let mut layers = Vec::with_capacity(sizes.len() - 1);
        for (i, pair) in sizes.windows(2).enumerate() {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let std = (2.0 / (fan_in + fan_out) as f64).sqrt();
            let distribution =
                Normal::new(0.0, std).map_err(|err| Error::InvalidConfig(err.to_string()))?;
            let activation = if i + 2 < sizes.len() {
                Activation::Relu
            } else {
                Activation::Identity
            };
            layers.push(Layer::new(fan_in, fan_out, activation, rng, distribution));
        }
        Self::from_layers(shape, channels, layers)
    }

    /// Assemble a network from existing layers.
    ///
    /// # Errors
    ///
    /// Returns an error if the layer sizes don't chain from `input_width * channels` inputs to
    /// `output_width * channels` outputs.
    pub fn from_layers(shape: WindowShape, channels: usize, layers: Vec<Layer<'a>>) -> Result<Self> {
        let mut expected = shape.input_width * channels;
        for layer in &layers {
            if layer.input_size() != expected {
                return Err(Error::InvalidConfig(format!(
                    "layer takes {} inputs but receives {expected}",
                    layer.input_size()
                )));
            }
            expected = layer.output_size();
        }
        if layers.is_empty() || expected != shape.output_width * channels {
            return Err(Error::InvalidConfig(format!(
                "network outputs {expected} values instead of {}",
                shape.output_width * channels
            )));
        }
        Ok(Self {
            mlp: Mlp::new(layers),
            shape,
            channels,
        })
    }

    /// The window shape the network was built for.
    pub fn shape(&self) -> WindowShape {
        self.shape
    }

    /// Number of channels per step.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// The layers, from input to output.
    pub fn layers(&self) -> &[Layer<'a>] {
        self.mlp.layers()
    }

    /// Number of trainable values.
    pub fn parameter_count(&self) -> usize {
        self.layers()
            .iter()
            .map(|l| l.output_size() * (l.input_size() + 1))
            .sum()
    }

    /// Forecast the labels of a `[b, input_width, channels]` tensor of standardized inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the inputs have the wrong shape.
    pub fn predict(&mut self, tape: &'a Tape, inputs: &Tensor) -> Result<Tensor> {
        let outputs = self.forward(tape, inputs);
        let predictions = outputs.and_then(|outputs| self.collect(&outputs));
        self.mlp.clear_parameters();
        tape.clear();
        predictions
    }

    /// Take one optimization step on the mean squared error of `batch` and return the loss
    /// before the step.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch doesn't match the window shape.
    pub fn train_step(
        &mut self,
        tape: &'a Tape,
        batch: &Batch,
        optimizer: &mut dyn Optimizer,
    ) -> Result<f64> {
        let loss = match self.loss(tape, batch) {
            Ok((loss, _)) => loss,
            Err(err) => {
                self.mlp.clear_parameters();
                tape.clear();
                return Err(err);
            }
        };
        let gradients = loss.gradients();
        optimizer.step(&mut self.mlp.parameters(), &gradients);
        self.mlp.update_parameters();
        tape.clear();
        Ok(loss.value)
    }

    /// Compute the mean squared error of `batch` and the predictions, without learning.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch doesn't match the window shape.
    pub fn evaluate(&mut self, tape: &'a Tape, batch: &Batch) -> Result<(f64, Tensor)> {
        let result = self
            .loss(tape, batch)
            .map(|(loss, predictions)| (loss.value, predictions));
        self.mlp.clear_parameters();
        tape.clear();
        result
    }

    fn loss(&mut self, tape: &'a Tape, batch: &Batch) -> Result<(Variable<'a>, Tensor)> {
        let outputs = self.forward(tape, &batch.inputs)?;
        let expected = [outputs.len(), self.shape.output_width, self.channels];
        if batch.labels.shape() != expected {
            return Err(Error::IncompatibleShapes(
                batch.labels.shape().to_vec(),
                expected.to_vec(),
            ));
        }
        let labels = batch.labels.ravel();
        let mut total = tape.add_variable(0.0);
        for (pred, target) in outputs.iter().flatten().zip(&labels) {
            let diff = pred - &tape.add_variable(f64::from(*target));
            total = total + diff * diff;
        }
        let loss = total / tape.add_variable(labels.len().max(1) as f64);
        Ok((loss, self.collect(&outputs)?))
    }

    fn forward(&mut self, tape: &'a Tape, inputs: &Tensor) -> Result<Vec<Vec<Variable<'a>>>> {
        let shape = inputs.shape();
        let expected = [self.shape.input_width, self.channels];
        if shape.len() != 3 || shape[1..] != expected {
            return Err(Error::IncompatibleShapes(
                shape.to_vec(),
                vec![shape.first().copied().unwrap_or(0), expected[0], expected[1]],
            ));
        }
        let values = inputs.ravel();
        Ok(values
            .chunks_exact(self.shape.input_width * self.channels)
            .map(|sample| {
                let input: Vec<_> = sample
                    .iter()
                    .map(|x| tape.add_variable(f64::from(*x)))
                    .collect();
                self.mlp.call(tape, &input)
            })
            .collect())
    }

    fn collect(&self, outputs: &[Vec<Variable<'a>>]) -> Result<Tensor> {
        let values = outputs.iter().flatten().map(|v| v.value as f32).collect();
        Tensor::from_vec(
            &[outputs.len(), self.shape.output_width, self.channels],
            values,
        )
    }
}
