//! Consumer side: mapping the segment a handle names

use crate::dtype::{Dtype, Element};
use crate::error::{BusError, BusResult};
use crate::handle::TensorHandle;
use std::path::Path;
use tensorbus_shm::SegmentView;

/// Read-only view of a published tensor
pub struct MappedTensor {
    handle: TensorHandle,
    view: SegmentView,
}

impl MappedTensor {
    /// Map the segment of `handle` from `dir`.
    ///
    /// Fails for `unknown` dtypes and for segments smaller than the
    /// payload the handle describes.
    pub fn attach(dir: &Path, handle: &TensorHandle) -> BusResult<Self> {
        if handle.dtype == Dtype::Unknown {
            return Err(BusError::UnsupportedDtype(handle.dtype));
        }
        let nbytes = handle.nbytes().ok_or_else(|| {
            BusError::InvalidTensor(format!("byte size of {:?} overflows", handle.dims))
        })?;

        let view = SegmentView::attach(dir, &handle.refs())?;
        if view.data_size() < nbytes {
            return Err(BusError::InvalidTensor(format!(
                "segment {} holds {} bytes, handle needs {nbytes}",
                handle.segment_ref,
                view.data_size()
            )));
        }
        Ok(Self {
            handle: handle.clone(),
            view,
        })
    }

    /// Consistent copy of the payload bytes
    pub fn read_bytes(&mut self) -> BusResult<&[u8]> {
        let nbytes = self.handle.nbytes().unwrap_or_default();
        Ok(&self.view.read()?[..nbytes])
    }

    /// Payload decoded as `T`; `T` must match the handle dtype
    pub fn to_vec<T: Element>(&mut self) -> BusResult<Vec<T>> {
        let requested = Dtype::from(T::TYPE);
        if requested != self.handle.dtype {
            return Err(BusError::InvalidTensor(format!(
                "cannot read {} tensor as {}",
                self.handle.dtype, T::TYPE
            )));
        }
        let size = T::TYPE.size();
        Ok(self
            .read_bytes()?
            .chunks_exact(size)
            .map(T::from_bytes)
            .collect())
    }

    /// Whether the publisher wrote since the last read
    pub fn has_changed(&self) -> bool {
        self.view.has_changed()
    }

    /// Handle the view was attached with
    pub fn handle(&self) -> &TensorHandle {
        &self.handle
    }

    /// Shape
    pub fn shape(&self) -> &[usize] {
        &self.handle.dims
    }
}
