//! The aligned tensor type: owns or views a 64-byte-aligned backing buffer.

use std::sync::Arc;

use crate::buffer::AlignedBuffer;
use crate::dtype::DType;
use crate::error::TensorError;
use crate::shape::Shape;

/// A rectangular N-D array of a fixed numeric type.
///
/// Either *owns* its backing storage (the `Arc` is the sole owner; storage is
/// freed when the last `Tensor` referencing it drops) or is a *view* sharing
/// storage with another tensor — views never outlive the `Arc` they hold a
/// clone of, which stands in for the "view lifetime <= source lifetime"
/// invariant from the design notes without threading an explicit lifetime
/// parameter through every caller.
#[derive(Clone)]
pub struct Tensor {
    dtype: DType,
    shape: Shape,
    strides: Vec<usize>,
    storage: Arc<AlignedBuffer>,
    element_offset: usize,
}

impl Tensor {
    /// Allocate an owning tensor whose storage is 64-byte aligned and whose
    /// innermost stride is padded to the next multiple of 16 elements.
    pub fn alloc(shape: Shape, dtype: DType) -> Result<Self, TensorError> {
        let (strides, allocated_elements) = shape.padded_strides();
        let byte_len = allocated_elements * dtype.size_of();
        let storage = AlignedBuffer::alloc(byte_len).ok_or_else(|| TensorError::AllocError {
            element_count: shape.element_count(),
            dtype,
        })?;
        Ok(Self {
            dtype,
            shape,
            strides,
            storage: Arc::new(storage),
            element_offset: 0,
        })
    }

    /// Build a non-owning view into `source`, starting at `element_offset`
    /// elements, shaped `shape`.
    pub fn view(source: &Tensor, shape: Shape, element_offset: usize) -> Result<Self, TensorError> {
        let requested = shape.element_count();
        let source_len = source.storage.len() / source.dtype.size_of();
        if element_offset + requested > source_len {
            return Err(TensorError::OutOfBounds {
                offset: element_offset,
                requested,
                source_len,
            });
        }
        let (strides, _) = shape.padded_strides();
        Ok(Self {
            dtype: source.dtype,
            shape,
            strides,
            storage: Arc::clone(&source.storage),
            element_offset: source.element_offset + element_offset,
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn element_count(&self) -> usize {
        self.shape.element_count()
    }

    /// True if this tensor is the sole owner of its storage (no live views).
    pub fn owns_storage(&self) -> bool {
        Arc::strong_count(&self.storage) == 1
    }

    pub fn is_aligned(&self) -> bool {
        self.storage.is_aligned_to(crate::shape::BASE_ALIGNMENT)
    }

    fn byte_offset(&self) -> usize {
        self.element_offset * self.dtype.size_of()
    }

    /// Read-only access to the tensor's contiguous logical elements as `f32`.
    ///
    /// Panics if `dtype() != DType::F32`. Returns the `element_count()`
    /// logical elements starting at this tensor's offset; contents beyond
    /// that (tile padding) are not exposed.
    pub fn as_f32(&self) -> &[f32] {
        assert_eq!(self.dtype, DType::F32, "tensor is not f32");
        let bytes = &self.storage.as_slice()[self.byte_offset()..];
        // SAFETY: AlignedBuffer is 64-byte aligned (a multiple of f32's
        // alignment) and contains at least element_count() f32s from this
        // offset per the bounds check performed at construction.
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const f32, self.element_count()) }
    }

    /// Mutable access to this tensor's `f32` elements. Returns `None` if this
    /// tensor does not exclusively own its storage (a live view exists).
    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        assert_eq!(self.dtype, DType::F32, "tensor is not f32");
        if !self.owns_storage() {
            return None;
        }
        let count = self.element_count();
        let offset = self.byte_offset();
        let storage = Arc::get_mut(&mut self.storage)?;
        // SAFETY: exclusive ownership just verified via Arc::get_mut.
        let bytes = unsafe { storage.as_mut_slice() };
        let bytes = &mut bytes[offset..];
        Some(unsafe { std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut f32, count) })
    }

    /// Read-only access to the tensor's contiguous logical elements as `i32`.
    pub fn as_i32(&self) -> &[i32] {
        assert_eq!(self.dtype, DType::I32, "tensor is not i32");
        let bytes = &self.storage.as_slice()[self.byte_offset()..];
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const i32, self.element_count()) }
    }

    /// Mutable access to this tensor's `i32` elements. Returns `None` if this
    /// tensor does not exclusively own its storage (a live view exists).
    pub fn as_i32_mut(&mut self) -> Option<&mut [i32]> {
        assert_eq!(self.dtype, DType::I32, "tensor is not i32");
        if !self.owns_storage() {
            return None;
        }
        let count = self.element_count();
        let offset = self.byte_offset();
        let storage = Arc::get_mut(&mut self.storage)?;
        // SAFETY: exclusive ownership just verified via Arc::get_mut.
        let bytes = unsafe { storage.as_mut_slice() };
        let bytes = &mut bytes[offset..];
        Some(unsafe { std::slice::from_raw_parts_mut(bytes.as_mut_ptr() as *mut i32, count) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_is_aligned_and_zeroed() {
        let t = Tensor::alloc(Shape::new(vec![1, 10, 80]), DType::F32).unwrap();
        assert!(t.is_aligned());
        assert!(t.as_f32().iter().all(|&v| v == 0.0));
        assert_eq!(t.as_f32().len(), 800);
    }

    #[test]
    fn view_matches_source_contents() {
        let mut t = Tensor::alloc(Shape::new(vec![4]), DType::F32).unwrap();
        t.as_f32_mut().unwrap().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);

        let view = Tensor::view(&t, Shape::new(vec![4]), 0).unwrap();
        assert_eq!(view.as_f32(), t.as_f32());
    }

    #[test]
    fn view_out_of_bounds_errors() {
        let t = Tensor::alloc(Shape::new(vec![4]), DType::F32).unwrap();
        let err = Tensor::view(&t, Shape::new(vec![8]), 0);
        assert!(matches!(err, Err(TensorError::OutOfBounds { .. })));
    }

    #[test]
    fn owning_tensor_loses_mut_access_once_viewed() {
        let mut t = Tensor::alloc(Shape::new(vec![4]), DType::F32).unwrap();
        assert!(t.as_f32_mut().is_some());
        let _view = Tensor::view(&t, Shape::new(vec![4]), 0).unwrap();
        assert!(t.as_f32_mut().is_none());
    }
}
