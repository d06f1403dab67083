//! Named tensors of the publishing process.
//!
//! The store decides, per submit, whether a tensor gets a fresh segment
//! or is copied into the one already announced under its name. Either
//! way one `share_tensor` message goes out, so consumers learn that the
//! contents changed even when the handle did not.

use crate::dtype::ElementType;
use crate::error::{BusError, BusResult};
use crate::handle::TensorHandle;
use crate::publisher::Publisher;
use crate::tensor::Tensor;
use std::collections::HashMap;
use tensorbus_shm::{SegmentAllocator, ShmAllocator};
use tracing::{debug, warn};

/// A tensor exported under a name
#[derive(Debug, Clone)]
pub struct TensorEntry {
    name: String,
    tensor: Tensor,
    handle: TensorHandle,
}

impl TensorEntry {
    /// Entry name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shape fixed at export
    pub fn shape(&self) -> &[usize] {
        self.tensor.shape()
    }

    /// Element type fixed at export
    pub fn element_type(&self) -> ElementType {
        self.tensor.element_type()
    }

    /// Shared tensor backing the entry
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    /// Handle announced for the entry
    pub fn handle(&self) -> &TensorHandle {
        &self.handle
    }
}

/// Owner of every named tensor entry and of their segments
pub struct TensorStore<A: SegmentAllocator = ShmAllocator> {
    allocator: A,
    publisher: Publisher,
    entries: HashMap<String, TensorEntry>,
}

impl<A: SegmentAllocator> TensorStore<A> {
    /// Empty store exporting through `allocator`
    pub fn new(allocator: A, publisher: Publisher) -> Self {
        Self {
            allocator,
            publisher,
            entries: HashMap::new(),
        }
    }

    /// Publish `tensor` under `name` and return the handle announced for it.
    ///
    /// Without `overwrite`, an existing entry must have the same shape and
    /// element type; its segment is then updated in place and its handle
    /// reused. With `overwrite`, or for a new name, a fresh segment is
    /// exported and the previous one (if any) released.
    pub fn submit(&mut self, name: &str, tensor: &Tensor, overwrite: bool) -> BusResult<TensorHandle> {
        let handle = match self.entries.get(name) {
            Some(entry) if !overwrite => {
                if entry.shape() != tensor.shape() {
                    return Err(BusError::ShapeMismatch {
                        name: name.to_string(),
                        expected: entry.shape().to_vec(),
                        actual: tensor.shape().to_vec(),
                    });
                }
                if entry.element_type() != tensor.element_type() {
                    return Err(BusError::DtypeMismatch {
                        name: name.to_string(),
                        expected: entry.element_type(),
                        actual: tensor.element_type(),
                    });
                }

                let bytes = tensor.contents(&self.allocator)?.into_owned();
                let refs = entry.handle.refs();
                self.allocator.copy_into(&refs, &bytes)?;
                debug!(name, segment = %refs.segment_ref, "tensor updated in place");
                entry.handle.clone()
            }
            _ => self.export(name, tensor)?,
        };

        self.publisher.share_tensor(name, &handle)?;
        Ok(handle)
    }

    // Every entry owns a segment of its own, even when `tensor` is already
    // backed by shared memory.
    fn export(&mut self, name: &str, tensor: &Tensor) -> BusResult<TensorHandle> {
        let bytes = tensor.contents(&self.allocator)?.into_owned();
        let shared = tensor.with_segment(self.allocator.share(&bytes)?);
        let handle = TensorHandle::export(&shared)?;

        let entry = TensorEntry {
            name: name.to_string(),
            tensor: shared,
            handle: handle.clone(),
        };
        if let Some(previous) = self.entries.insert(name.to_string(), entry) {
            // the new handle is live; a stale segment must not fail the publish
            if let Err(e) = self.allocator.release(&previous.handle.refs()) {
                warn!(name, segment = %previous.handle.segment_ref, error = %e, "failed to release replaced segment");
            }
        }
        debug!(name, handle = %handle, "tensor exported");
        Ok(handle)
    }

    /// Entry stored under `name`
    pub fn get(&self, name: &str) -> Option<&TensorEntry> {
        self.entries.get(name)
    }

    /// Handle announced for `name`
    pub fn handle(&self, name: &str) -> Option<&TensorHandle> {
        self.entries.get(name).map(TensorEntry::handle)
    }

    /// Current bytes of the entry under `name`
    pub fn contents(&self, name: &str) -> BusResult<Option<Vec<u8>>> {
        self.entries
            .get(name)
            .map(|entry| Ok(entry.tensor.contents(&self.allocator)?.into_owned()))
            .transpose()
    }

    /// Drop the entry and release its segment; its handle stops resolving
    pub fn remove(&mut self, name: &str) -> BusResult<Option<TensorEntry>> {
        let Some(entry) = self.entries.get(name) else {
            return Ok(None);
        };
        self.allocator.release(&entry.handle.refs())?;
        debug!(name, "tensor removed");
        Ok(self.entries.remove(name))
    }

    /// Names of every entry, in no particular order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entry
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Allocator owning the segments
    pub fn allocator(&self) -> &A {
        &self.allocator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::message::Message;
    use std::sync::Arc;
    use tensorbus_common::config::{QueueConfig, ShmConfig};

    struct Fixture {
        _dir: tempfile::TempDir,
        broker: Arc<MemoryBroker>,
        store: TensorStore,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(MemoryBroker::new());
        let allocator = ShmAllocator::new(ShmConfig {
            dir: dir.path().to_path_buf(),
            prefix: "store".to_string(),
        });
        let store = TensorStore::new(
            allocator,
            Publisher::new(broker.clone(), QueueConfig::default()),
        );
        Fixture {
            _dir: dir,
            broker,
            store,
        }
    }

    fn announced(broker: &MemoryBroker) -> Vec<String> {
        broker.pending(&QueueConfig::default().outbound_queue())
    }

    #[test]
    fn same_shape_reuses_handle_and_refreshes_contents() {
        let mut f = fixture();
        let first = Tensor::from_slice(vec![2], &[1.0f32, 2.0]).unwrap();
        let second = Tensor::from_slice(vec![2], &[3.0f32, 4.0]).unwrap();

        let h1 = f.store.submit("w", &first, false).unwrap();
        let h2 = f.store.submit("w", &second, false).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(f.store.allocator().len(), 1);
        assert_eq!(
            f.store.contents("w").unwrap().unwrap(),
            second.contents(f.store.allocator()).unwrap().into_owned()
        );

        let messages = announced(&f.broker);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], messages[1]);
    }

    #[test]
    fn shape_checked_before_dtype() {
        let mut f = fixture();
        let base = Tensor::zeros(ElementType::F32, vec![2, 2]).unwrap();
        f.store.submit("w", &base, false).unwrap();

        let both_differ = Tensor::zeros(ElementType::I32, vec![4]).unwrap();
        assert!(matches!(
            f.store.submit("w", &both_differ, false),
            Err(BusError::ShapeMismatch { .. })
        ));

        let dtype_differs = Tensor::zeros(ElementType::I32, vec![2, 2]).unwrap();
        assert!(matches!(
            f.store.submit("w", &dtype_differs, false),
            Err(BusError::DtypeMismatch { .. })
        ));
        assert_eq!(announced(&f.broker).len(), 1);
    }

    #[test]
    fn overwrite_replaces_segment() {
        let mut f = fixture();
        let base = Tensor::zeros(ElementType::F32, vec![2]).unwrap();
        let bigger = Tensor::zeros(ElementType::U8, vec![5]).unwrap();

        let old = f.store.submit("w", &base, false).unwrap();
        let new = f.store.submit("w", &bigger, true).unwrap();
        assert_ne!(old, new);
        assert_eq!(new.dims, vec![5]);
        assert_eq!(f.store.allocator().len(), 1);
        assert!(!f.store.allocator().dir().join(&old.segment_ref).exists());
    }

    #[test]
    fn announcement_carries_handle() {
        let mut f = fixture();
        let tensor = Tensor::zeros(ElementType::U8, vec![3]).unwrap();
        let handle = f.store.submit("img", &tensor, false).unwrap();

        let message = Message::decode(&announced(&f.broker)[0]).unwrap();
        assert_eq!(message, Message::share_tensor("img", handle));
    }

    #[test]
    fn unknown_dtype_is_exported() {
        let mut f = fixture();
        let tensor = Tensor::zeros(ElementType::F64, vec![2]).unwrap();
        let handle = f.store.submit("d", &tensor, false).unwrap();
        assert_eq!(handle.dtype, crate::dtype::Dtype::Unknown);
    }

    #[test]
    fn remove_releases_segment() {
        let mut f = fixture();
        let tensor = Tensor::zeros(ElementType::U8, vec![3]).unwrap();
        let handle = f.store.submit("img", &tensor, false).unwrap();

        assert!(f.store.remove("img").unwrap().is_some());
        assert!(f.store.remove("img").unwrap().is_none());
        assert!(f.store.is_empty());
        assert!(!f.store.allocator().dir().join(&handle.segment_ref).exists());
    }

    #[test]
    fn entries_never_share_a_segment() {
        let mut f = fixture();
        let tensor = Tensor::from_slice(vec![4], &[1u8, 2, 3, 4]).unwrap();
        let a = f.store.submit("a", &tensor, false).unwrap();

        let alias = f.store.get("a").unwrap().tensor().clone();
        let b = f.store.submit("b", &alias, false).unwrap();
        assert_ne!(a.segment_ref, b.segment_ref);
        assert_eq!(f.store.allocator().len(), 2);

        f.store.remove("a").unwrap();
        let mut mapped =
            crate::consumer::MappedTensor::attach(f.store.allocator().dir(), &b).unwrap();
        assert_eq!(mapped.read_bytes().unwrap(), &[1, 2, 3, 4]);

        let update = Tensor::from_slice(vec![4], &[9u8, 9, 9, 9]).unwrap();
        assert_eq!(f.store.submit("b", &update, false).unwrap(), b);
        assert_eq!(mapped.read_bytes().unwrap(), &[9, 9, 9, 9]);
        assert!(f.store.remove("b").unwrap().is_some());
        assert!(f.store.is_empty());
    }

    #[test]
    fn foreign_segment_is_rejected() {
        let mut f = fixture();
        let other_dir = tempfile::tempdir().unwrap();
        let mut other = ShmAllocator::new(ShmConfig {
            dir: other_dir.path().to_path_buf(),
            prefix: "other".to_string(),
        });
        let foreign = Tensor::zeros(ElementType::U8, vec![2])
            .unwrap()
            .share_memory(&mut other)
            .unwrap();

        assert!(matches!(
            f.store.submit("x", &foreign, false),
            Err(BusError::Shm(_))
        ));
        assert!(f.store.get("x").is_none());
        assert!(announced(&f.broker).is_empty());
    }

    #[test]
    fn failed_remove_keeps_entry() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(MemoryBroker::new());
        let mut store = TensorStore::new(
            RefusingRelease(ShmAllocator::new(ShmConfig {
                dir: dir.path().to_path_buf(),
                prefix: "refuse".to_string(),
            })),
            Publisher::new(broker.clone(), QueueConfig::default()),
        );
        let tensor = Tensor::zeros(ElementType::U8, vec![2]).unwrap();
        let first = store.submit("w", &tensor, false).unwrap();

        assert!(store.remove("w").is_err());
        assert_eq!(store.handle("w"), Some(&first));

        // overwrite still publishes although the old segment cannot be released
        let second = store.submit("w", &tensor, true).unwrap();
        assert_ne!(first, second);
        assert_eq!(store.handle("w"), Some(&second));
        assert_eq!(announced(&broker).len(), 2);
    }

    struct RefusingRelease(ShmAllocator);

    impl SegmentAllocator for RefusingRelease {
        fn share(&mut self, bytes: &[u8]) -> tensorbus_shm::ShmResult<tensorbus_shm::SegmentRefs> {
            self.0.share(bytes)
        }

        fn copy_into(
            &mut self,
            refs: &tensorbus_shm::SegmentRefs,
            bytes: &[u8],
        ) -> tensorbus_shm::ShmResult<()> {
            self.0.copy_into(refs, bytes)
        }

        fn read(&self, refs: &tensorbus_shm::SegmentRefs) -> tensorbus_shm::ShmResult<Vec<u8>> {
            self.0.read(refs)
        }

        fn release(&mut self, refs: &tensorbus_shm::SegmentRefs) -> tensorbus_shm::ShmResult<()> {
            Err(tensorbus_shm::ShmError::NotShared {
                segment: refs.segment_ref.clone(),
            })
        }
    }
}
