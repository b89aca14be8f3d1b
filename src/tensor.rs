//! An N-dimensional array of `f32` used to carry batches of windows.

use std::sync::Arc;

use crate::error::{Error, Result};

pub mod layout;

pub use layout::Layout;

/// A dense tensor with a shared data buffer and a strided layout.
///
/// Cloning a tensor is cheap since the data buffer is reference-counted. Element-wise
/// operations are broadcasted, so a `[channels]` tensor can be combined with a
/// `[batch, width, channels]` one directly.
#[derive(Clone, Debug)]
pub struct Tensor {
    buffer: Arc<[f32]>,
    layout: Layout,
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.iter().eq(other.iter())
    }
}

impl<'a> IntoIterator for &'a Tensor {
    type Item = f32;

    type IntoIter = TensorIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        TensorIter {
            tensor: self,
            indices: self.layout.iter(),
        }
    }
}

impl Tensor {
    /// Create a tensor given its shape and data.
    ///
    /// The order of the elements in `data` is in increasing order of the last axis, then the second
    /// last, and so on.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` doesn't hold exactly as many elements as the shape requires.
    pub fn new(shape: &[usize], data: &[f32]) -> Result<Self> {
        Self::from_vec(shape, data.to_vec())
    }

    /// Create a tensor given its shape, taking ownership of the data.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` doesn't hold exactly as many elements as the shape requires.
    pub fn from_vec(shape: &[usize], data: Vec<f32>) -> Result<Self> {
        let layout = Layout::from(shape);
        if layout.capacity() != data.len() {
            return Err(Error::ElementCount {
                expected: layout.capacity(),
                actual: data.len(),
            });
        }
        Ok(Self {
            buffer: Arc::from(data),
            layout,
        })
    }

    /// Create a scalar holding the given value.
    ///
    /// This is a special tensor that has no shape.
    pub fn scalar(value: f32) -> Self {
        Self {
            buffer: Arc::from([value]),
            layout: Layout::from(&[] as &[usize]),
        }
    }

    /// Create a tensor of the given shape filled with zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        let layout = Layout::from(shape);
        Self {
            buffer: Arc::from(vec![0.0; layout.capacity()]),
            layout,
        }
    }

    /// Return the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Return the layout of the tensor.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Return the number of elements.
    pub fn len(&self) -> usize {
        self.layout.capacity()
    }

    /// Check if the tensor holds no element.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a row-major iterator over the tensor.
    pub fn iter(&self) -> TensorIter<'_> {
        self.into_iter()
    }

    /// Collect all elements of the tensor into a [`Vec`], in row-major order.
    pub fn ravel(&self) -> Vec<f32> {
        self.iter().collect()
    }

    /// Apply `op` to each element.
    #[must_use]
    pub fn map<F>(&self, op: F) -> Self
    where
        F: Fn(f32) -> f32,
    {
        Self {
            buffer: self.iter().map(op).collect(),
            layout: Layout::from(self.shape()),
        }
    }

    /// Take the absolute value of each element.
    #[must_use]
    pub fn abs(&self) -> Self {
        self.map(f32::abs)
    }

    /// Add `other` to `self`, element-wise, broadcasting if necessary.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.broadcast(other, |x, y| x + y)
    }

    /// Subtract `other` from `self`, element-wise, broadcasting if necessary.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.broadcast(other, |x, y| x - y)
    }

    /// Multiply `self` by `other`, element-wise, broadcasting if necessary.
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.broadcast(other, |x, y| x * y)
    }

    /// Divide `self` by `other`, element-wise, broadcasting if necessary.
    pub fn div(&self, other: &Self) -> Result<Self> {
        self.broadcast(other, |x, y| x / y)
    }

    /// Reduce along the given axes by summing all elements.
    ///
    /// Reduced axes are kept with size 1.
    pub fn sum(&self, axes: &[usize]) -> Result<Self> {
        self.reduce(axes, |acc, x| acc + x)
    }

    /// Reduce along the given axes by averaging all elements.
    ///
    /// Reduced axes are kept with size 1.
    pub fn mean(&self, axes: &[usize]) -> Result<Self> {
        let sum = self.sum(axes)?;
        let count: usize = axes.iter().map(|&axis| self.shape()[axis]).product();
        Ok(sum.map(|x| x / count as f32))
    }

    /// Reshape the tensor to the given shape, keeping the number of elements unchanged.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        let layout = Layout::from(shape);
        if layout.capacity() != self.len() {
            return Err(Error::IncompatibleShapes(self.shape().to_vec(), shape.to_vec()));
        }
        let buffer = if self.layout.is_contiguous() {
            Arc::clone(&self.buffer)
        } else {
            self.iter().collect()
        };
        Ok(Self { buffer, layout })
    }

    fn expand(&self, shape: &[usize]) -> Result<Self> {
        Ok(Self {
            buffer: Arc::clone(&self.buffer),
            layout: self.layout.expand(shape)?,
        })
    }

    fn broadcast<F>(&self, other: &Self, op: F) -> Result<Self>
    where
        F: Fn(f32, f32) -> f32,
    {
        let shape = layout::broadcast_shape(self.shape(), other.shape())?;
        let lhs = self.expand(&shape)?;
        let rhs = other.expand(&shape)?;
        let buffer = lhs.iter().zip(rhs.iter()).map(|(x, y)| op(x, y));
        Ok(Self {
            buffer: buffer.collect(),
            layout: Layout::from(&shape[..]),
        })
    }

    fn reduce<F>(&self, axes: &[usize], op: F) -> Result<Self>
    where
        F: Fn(f32, f32) -> f32,
    {
        let (layout, reducer) = self.layout.reduce(axes)?;
        let mut buffer = vec![0.0; layout.capacity()];
        for idx in &self.layout {
            let dst_pos = reducer.translate(&idx);
            let src_pos = self.layout.translate(&idx);
            buffer[dst_pos] = op(buffer[dst_pos], self.buffer[src_pos]);
        }
        Ok(Self {
            buffer: buffer.into(),
            layout,
        })
    }
}

/// A row-major iterator over a tensor.
#[derive(Debug)]
pub struct TensorIter<'a> {
    tensor: &'a Tensor,
    indices: layout::IndexIter<'a>,
}

impl Iterator for TensorIter<'_> {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        self.indices
            .next()
            .map(|idx| self.tensor.buffer[self.tensor.layout.translate(&idx)])
    }
}
