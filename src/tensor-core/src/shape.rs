//! Tensor shape and the row-major, tile-padded stride layout.

/// Ordered sequence of positive dimension sizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

/// Innermost dimension is padded up to a multiple of this many elements so the
/// storage can be handed to the accelerator via DMA.
pub const INNER_TILE: usize = 16;

/// Base address alignment, in bytes, required of owning tensor storage.
pub const BASE_ALIGNMENT: usize = 64;

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Shape(dims.into())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Number of logical elements (unpadded).
    pub fn element_count(&self) -> usize {
        self.0.iter().product()
    }

    /// Row-major strides (in elements) with the innermost dimension padded to
    /// [`INNER_TILE`], plus the total number of elements the padded layout
    /// requires to be allocated.
    ///
    /// Invariant: `strides[i] >= strides[i+1] * padded_dims[i+1]`, with
    /// equality unless dimension `i+1` needed padding.
    pub fn padded_strides(&self) -> (Vec<usize>, usize) {
        let n = self.0.len();
        if n == 0 {
            return (Vec::new(), 1);
        }

        let mut padded_dims = self.0.clone();
        let last = n - 1;
        padded_dims[last] = pad_to_tile(self.0[last]);

        let mut strides = vec![0usize; n];
        strides[last] = 1;
        for i in (0..last).rev() {
            strides[i] = strides[i + 1] * padded_dims[i + 1];
        }

        let allocated = strides[0] * padded_dims[0].max(1);
        let allocated = if n == 1 { padded_dims[0] } else { allocated };
        (strides, allocated)
    }
}

fn pad_to_tile(size: usize) -> usize {
    if size == 0 {
        return 0;
    }
    ((size + INNER_TILE - 1) / INNER_TILE) * INNER_TILE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_innermost_dim_to_tile() {
        let shape = Shape::new(vec![1, 10, 80]);
        let (strides, allocated) = shape.padded_strides();
        // 80 is already a multiple of 16
        assert_eq!(strides, vec![10 * 80, 80, 1]);
        assert_eq!(allocated, 1 * 10 * 80);
    }

    #[test]
    fn pads_when_not_a_tile_multiple() {
        let shape = Shape::new(vec![1, 5, 70]);
        let (strides, allocated) = shape.padded_strides();
        // 70 -> padded to 80
        assert_eq!(strides[1], 80);
        assert_eq!(allocated, 1 * 5 * 80);
    }

    #[test]
    fn element_count_uses_logical_dims() {
        let shape = Shape::new(vec![1, 5, 70]);
        assert_eq!(shape.element_count(), 350);
    }
}
