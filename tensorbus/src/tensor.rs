//! Tensors submitted to the store

use crate::dtype::{Dtype, Element, ElementType};
use crate::error::{BusError, BusResult};
use std::borrow::Cow;
use tensorbus_shm::{SegmentAllocator, SegmentRefs};

/// Where the bytes of a tensor live
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    /// Private process memory
    Host(Vec<u8>),
    /// A shared memory segment
    Shared(SegmentRefs),
}

/// Dense, contiguous tensor: element type, shape and bytes
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    element_type: ElementType,
    shape: Vec<usize>,
    storage: Storage,
}

fn element_count(shape: &[usize]) -> BusResult<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| BusError::InvalidTensor(format!("element count of {shape:?} overflows")))
}

impl Tensor {
    /// Tensor over raw native-endian bytes; the length must match the shape
    pub fn from_bytes(
        element_type: ElementType,
        shape: Vec<usize>,
        bytes: Vec<u8>,
    ) -> BusResult<Self> {
        let expected = element_count(&shape)?
            .checked_mul(element_type.size())
            .ok_or_else(|| BusError::InvalidTensor(format!("byte size of {shape:?} overflows")))?;
        if bytes.len() != expected {
            return Err(BusError::InvalidTensor(format!(
                "{} bytes given for {element_type} tensor of shape {shape:?} ({expected} expected)",
                bytes.len()
            )));
        }
        Ok(Self {
            element_type,
            shape,
            storage: Storage::Host(bytes),
        })
    }

    /// Tensor over typed values
    pub fn from_slice<T: Element>(shape: Vec<usize>, values: &[T]) -> BusResult<Self> {
        let mut bytes = Vec::with_capacity(std::mem::size_of_val(values));
        for &value in values {
            value.extend_bytes(&mut bytes);
        }
        Self::from_bytes(T::TYPE, shape, bytes)
    }

    /// Zero-filled tensor
    pub fn zeros(element_type: ElementType, shape: Vec<usize>) -> BusResult<Self> {
        let len = element_count(&shape)?
            .checked_mul(element_type.size())
            .ok_or_else(|| BusError::InvalidTensor(format!("byte size of {shape:?} overflows")))?;
        Self::from_bytes(element_type, shape, vec![0; len])
    }

    /// Move the tensor into shared memory.
    ///
    /// Already shared tensors are returned as they are.
    pub fn share_memory<A>(&self, allocator: &mut A) -> BusResult<Self>
    where
        A: SegmentAllocator + ?Sized,
    {
        match &self.storage {
            Storage::Shared(_) => Ok(self.clone()),
            Storage::Host(bytes) => Ok(Self {
                element_type: self.element_type,
                shape: self.shape.clone(),
                storage: Storage::Shared(allocator.share(bytes)?),
            }),
        }
    }

    /// Same element type and shape, backed by `refs`
    pub(crate) fn with_segment(&self, refs: SegmentRefs) -> Self {
        Self {
            element_type: self.element_type,
            shape: self.shape.clone(),
            storage: Storage::Shared(refs),
        }
    }

    /// Bytes of the tensor, read through `allocator` when shared
    pub fn contents<'a, A>(&'a self, allocator: &A) -> BusResult<Cow<'a, [u8]>>
    where
        A: SegmentAllocator + ?Sized,
    {
        match &self.storage {
            Storage::Host(bytes) => Ok(Cow::Borrowed(bytes)),
            Storage::Shared(refs) => Ok(Cow::Owned(allocator.read(refs)?)),
        }
    }

    /// Element type
    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Wire dtype
    pub fn dtype(&self) -> Dtype {
        self.element_type.into()
    }

    /// Shape
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Payload size in bytes
    pub fn nbytes(&self) -> usize {
        self.numel() * self.element_type.size()
    }

    /// Storage
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Whether the bytes live in shared memory
    pub fn is_shared(&self) -> bool {
        matches!(self.storage, Storage::Shared(_))
    }

    /// Segment backing the tensor, if shared
    pub fn segment(&self) -> Option<&SegmentRefs> {
        match &self.storage {
            Storage::Shared(refs) => Some(refs),
            Storage::Host(_) => None,
        }
    }
}
