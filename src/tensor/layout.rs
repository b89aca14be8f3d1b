//! Memory layout of a tensor.

use crate::error::{Error, Result};

/// A layout describes how a tensor is laid out in its data buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Layout {
    /// The number of elements in each axis.
    shape: Box<[usize]>,

    /// The number of elements in the data buffer that need to be skipped to move to the next
    /// element in each axis.
    strides: Box<[usize]>,
}

impl From<&[usize]> for Layout {
    fn from(shape: &[usize]) -> Self {
        if shape.is_empty() {
            return Self::scalar();
        }
        Self::contiguous(shape)
    }
}

impl<const N: usize> From<&[usize; N]> for Layout {
    fn from(shape: &[usize; N]) -> Self {
        Self::from(&shape[..])
    }
}

impl<'a> IntoIterator for &'a Layout {
    type Item = Box<[usize]>;
    type IntoIter = IndexIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        IndexIter {
            layout: self,
            index: Box::from(vec![0; self.shape.len()]),
            exhausted: self.capacity() == 0,
        }
    }
}

impl Layout {
    /// Creates a contiguous row-major layout based on the given shape.
    fn contiguous(shape: &[usize]) -> Self {
        // Go backwards through the shape to calculate the strides. The last stride is always 1.
        let mut strides = vec![1; shape.len()].into_boxed_slice();
        for idx in (0..shape.len() - 1).rev() {
            strides[idx] = strides[idx + 1] * shape[idx + 1];
        }
        Self {
            shape: Box::from(shape),
            strides,
        }
    }

    /// Returns the layout for a scalar, which has no shape nor strides.
    fn scalar() -> Self {
        Self::default()
    }

    /// Returns the number of elements in each axis.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the strides of each axis.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Creates a row-major iterator over all indices of the tensor.
    pub fn iter(&self) -> IndexIter<'_> {
        self.into_iter()
    }

    /// Returns the number of elements in the tensor having this layout.
    pub fn capacity(&self) -> usize {
        self.shape.iter().product()
    }

    /// Returns true if the elements are laid out row-major without gaps.
    pub fn is_contiguous(&self) -> bool {
        *self == Self::from(&self.shape[..])
    }

    /// Translates a tensor index into a position in the data buffer.
    pub fn translate(&self, index: &[usize]) -> usize {
        let index_it = index.iter().rev();
        let strides_it = self.strides.iter().rev();
        index_it.zip(strides_it).map(|(x, s)| x * s).sum()
    }

    /// Returns 2 layouts where the first is the reduced layout and the second is the reducer
    /// layout. The reducer layout maps an index in the original tensor to a position in the
    /// reduced tensor.
    ///
    /// # Errors
    ///
    /// Returns an error if one of the axes does not exist.
    pub fn reduce(&self, axes: &[usize]) -> Result<(Self, Self)> {
        let mut reduced_shape = self.shape.clone();
        for &axis in axes {
            let Some(size) = reduced_shape.get_mut(axis) else {
                return Err(Error::UnknownAxis(axis));
            };
            *size = 1;
        }
        let reduced_layout = Self::from(&reduced_shape[..]);
        let mut reducer_layout = reduced_layout.clone();
        for &axis in axes {
            // Zeroing the stride keeps the reduced axis from contributing to the position, so
            // every element along it lands on the same slot.
            reducer_layout.strides[axis] = 0;
        }
        Ok((reduced_layout, reducer_layout))
    }

    /// Returns a new layout with singleton axes expanded to a larger size.
    ///
    /// The layout can also be expanded to a larger number of axes, and the new ones are
    /// prepended. Expanding never touches the data buffer; the expanded axes get a stride of 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout cannot be expanded to the new shape.
    pub fn expand(&self, new_shape: &[usize]) -> Result<Self> {
        if new_shape.len() < self.shape.len() {
            return Err(Error::IncompatibleShapes(
                self.shape.to_vec(),
                new_shape.to_vec(),
            ));
        }
        let mut new_strides = vec![0; new_shape.len()];
        for dim in 0..self.shape.len() {
            let old_idx = self.shape.len() - dim - 1;
            let new_idx = new_shape.len() - dim - 1;
            if self.shape[old_idx] == new_shape[new_idx] {
                new_strides[new_idx] = self.strides[old_idx];
            } else if self.shape[old_idx] != 1 {
                return Err(Error::IncompatibleShapes(
                    self.shape.to_vec(),
                    new_shape.to_vec(),
                ));
            }
        }
        Ok(Self {
            shape: Box::from(new_shape),
            strides: new_strides.into_boxed_slice(),
        })
    }
}

/// Returns the shape that 2 shapes broadcast to.
///
/// Shapes are aligned on their trailing axes; an axis of size 1 stretches to match the other.
pub fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> Result<Vec<usize>> {
    let (small, large) = if lhs.len() < rhs.len() {
        (lhs, rhs)
    } else {
        (rhs, lhs)
    };
    let mut shape = large.to_vec();
    for dim in 0..small.len() {
        let sm_idx = small.len() - dim - 1;
        let lg_idx = large.len() - dim - 1;
        let (sm_size, lg_size) = (small[sm_idx], large[lg_idx]);
        if sm_size == 1 {
            shape[lg_idx] = lg_size;
        } else if lg_size == 1 || lg_size == sm_size {
            shape[lg_idx] = sm_size;
        } else {
            return Err(Error::IncompatibleShapes(lhs.to_vec(), rhs.to_vec()));
        }
    }
    Ok(shape)
}

/// An iterator over a tensor's indices in row-major order.
#[derive(Debug)]
pub struct IndexIter<'a> {
    layout: &'a Layout,
    index: Box<[usize]>,
    exhausted: bool,
}

impl Iterator for IndexIter<'_> {
    type Item = Box<[usize]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let index = self.index.clone();
        for (i, s) in self.layout.shape.iter().enumerate().rev() {
            self.index[i] += 1;
            if self.index[i] < *s {
                return Some(index);
            }
            self.index[i] = 0;
        }
        self.exhausted = true;
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_strides() {
        let layout = Layout::from(&[2, 3, 4][..]);
        assert_eq!(layout.strides(), &[12, 4, 1]);
        assert_eq!(layout.capacity(), 24);
        assert!(layout.is_contiguous());
    }

    #[test]
    fn reduce_zeroes_reduced_strides() {
        let layout = Layout::from(&[2, 3, 2][..]);
        let (reduced, reducer) = layout.reduce(&[0, 1]).unwrap();
        assert_eq!(reduced.shape(), &[1, 1, 2]);
        assert_eq!(reducer.strides(), &[0, 0, 1]);
        assert!(matches!(layout.reduce(&[3]), Err(Error::UnknownAxis(3))));
    }

    #[test]
    fn expand_prepends_axes() {
        let layout = Layout::from(&[2][..]);
        let expanded = layout.expand(&[4, 3, 2]).unwrap();
        assert_eq!(expanded.shape(), &[4, 3, 2]);
        assert_eq!(expanded.strides(), &[0, 0, 1]);
        assert!(!expanded.is_contiguous());
        assert!(layout.expand(&[4, 3]).is_err());
    }

    #[test]
    fn broadcast_shapes() {
        assert_eq!(broadcast_shape(&[5, 6, 2], &[2]).unwrap(), vec![5, 6, 2]);
        assert_eq!(broadcast_shape(&[1, 3], &[4, 1]).unwrap(), vec![4, 3]);
        assert!(broadcast_shape(&[5, 6, 2], &[3]).is_err());
    }

    #[test]
    fn empty_layout_has_no_indices() {
        let layout = Layout::from(&[0, 2][..]);
        assert_eq!(layout.iter().count(), 0);
        assert_eq!(Layout::from(&[] as &[usize]).iter().count(), 1);
    }
}
