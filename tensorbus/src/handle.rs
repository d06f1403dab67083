//! Tensor handle codec.
//!
//! A handle is the only thing another process needs to map a published
//! tensor: `manager_ref::segment_ref::dtype::d0,d1,...`.

use crate::dtype::Dtype;
use crate::error::{BusError, BusResult};
use crate::tensor::{Storage, Tensor};
use std::fmt;
use std::str::FromStr;
use tensorbus_common::consts::{DIMS_DELIMITER, FIELD_DELIMITER};
use tensorbus_shm::SegmentRefs;

const HANDLE_FIELDS: usize = 4;

/// Self-describing address of a tensor in shared memory
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorHandle {
    /// Owning segment manager
    pub manager_ref: String,
    /// Segment within the manager
    pub segment_ref: String,
    /// Element dtype
    pub dtype: Dtype,
    /// Shape, outermost first
    pub dims: Vec<usize>,
}

impl TensorHandle {
    /// Build the handle of a shared tensor.
    ///
    /// Fails with [`BusError::NotShared`] for tensors in process memory.
    pub fn export(tensor: &Tensor) -> BusResult<Self> {
        match tensor.storage() {
            Storage::Shared(refs) => Ok(Self {
                manager_ref: refs.manager_ref.clone(),
                segment_ref: refs.segment_ref.clone(),
                dtype: tensor.dtype(),
                dims: tensor.shape().to_vec(),
            }),
            Storage::Host(_) => Err(BusError::NotShared),
        }
    }

    /// Encode to the wire form
    pub fn encode(&self) -> String {
        let mut dims = String::new();
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                dims.push(DIMS_DELIMITER);
            }
            dims.push_str(&dim.to_string());
        }
        [
            self.manager_ref.as_str(),
            self.segment_ref.as_str(),
            self.dtype.as_str(),
            dims.as_str(),
        ]
        .join(FIELD_DELIMITER)
    }

    /// Decode the wire form
    pub fn decode(encoded: &str) -> BusResult<Self> {
        let malformed = |reason: String| BusError::MalformedHandle {
            handle: encoded.to_string(),
            reason,
        };

        let fields: Vec<&str> = encoded.split(FIELD_DELIMITER).collect();
        let [manager_ref, segment_ref, dtype, dims] = fields[..] else {
            return Err(malformed(format!(
                "expected {HANDLE_FIELDS} fields, found {}",
                fields.len()
            )));
        };

        if manager_ref.is_empty() || segment_ref.is_empty() {
            return Err(malformed("empty segment reference".to_string()));
        }

        let dtype =
            Dtype::from_tag(dtype).ok_or_else(|| malformed(format!("unknown dtype `{dtype}`")))?;

        let dims = if dims.is_empty() {
            Vec::new()
        } else {
            dims.split(DIMS_DELIMITER)
                .map(|d| {
                    d.parse::<usize>()
                        .map_err(|_| malformed(format!("invalid dimension `{d}`")))
                })
                .collect::<BusResult<Vec<_>>>()?
        };

        Ok(Self {
            manager_ref: manager_ref.to_string(),
            segment_ref: segment_ref.to_string(),
            dtype,
            dims,
        })
    }

    /// Allocator references of the segment
    pub fn refs(&self) -> SegmentRefs {
        SegmentRefs::new(self.manager_ref.clone(), self.segment_ref.clone())
    }

    /// Payload size implied by dtype and dims; `None` for unknown dtypes
    pub fn nbytes(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(self.dtype.element_size()?, |acc, &d| acc.checked_mul(d))
    }
}

impl fmt::Display for TensorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for TensorHandle {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::ElementType;
    use proptest::prelude::*;

    fn handle(dims: Vec<usize>) -> TensorHandle {
        TensorHandle {
            manager_ref: "tb_41".to_string(),
            segment_ref: "tb_41_0".to_string(),
            dtype: Dtype::Float32,
            dims,
        }
    }

    #[test]
    fn encodes_fields_in_order() {
        assert_eq!(handle(vec![3, 4]).encode(), "tb_41::tb_41_0::float32::3,4");
        assert_eq!(handle(vec![]).encode(), "tb_41::tb_41_0::float32::");
    }

    #[test]
    fn decodes_scalar_shape() {
        let decoded = TensorHandle::decode("tb_41::tb_41_0::float32::").unwrap();
        assert_eq!(decoded, handle(vec![]));
    }

    #[test]
    fn rejects_unknown_dtype_tag() {
        assert!(matches!(
            TensorHandle::decode("a::b::weirdtype::1,2"),
            Err(BusError::MalformedHandle { .. })
        ));
    }

    #[test]
    fn rejects_wrong_field_count() {
        for bad in ["a::b::uint8", "a::b::uint8::1::2", "", "a"] {
            assert!(
                matches!(
                    TensorHandle::decode(bad),
                    Err(BusError::MalformedHandle { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_bad_dimensions() {
        for bad in ["a::b::uint8::1,x", "a::b::uint8::-1", "a::b::uint8::1,,2"] {
            assert!(TensorHandle::decode(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn export_requires_shared_memory() {
        let tensor = Tensor::zeros(ElementType::F32, vec![2]).unwrap();
        assert!(matches!(
            TensorHandle::export(&tensor),
            Err(BusError::NotShared)
        ));
    }

    #[test]
    fn nbytes_follows_dtype() {
        assert_eq!(handle(vec![3, 4]).nbytes(), Some(48));
        assert_eq!(handle(vec![]).nbytes(), Some(4));
        let unknown = TensorHandle {
            dtype: Dtype::Unknown,
            ..handle(vec![2])
        };
        assert_eq!(unknown.nbytes(), None);
    }

    fn any_dtype() -> impl Strategy<Value = Dtype> {
        prop_oneof![
            Just(Dtype::Uint8),
            Just(Dtype::Float32),
            Just(Dtype::Int32),
            Just(Dtype::Unknown),
        ]
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(
            manager_ref in "[a-z][a-z0-9_]{0,12}",
            seq in 0u32..10_000,
            dtype in any_dtype(),
            dims in prop::collection::vec(0usize..100_000, 0..6),
        ) {
            let original = TensorHandle {
                segment_ref: format!("{manager_ref}_{seq}"),
                manager_ref,
                dtype,
                dims,
            };
            let decoded: TensorHandle = original.encode().parse().unwrap();
            prop_assert_eq!(decoded, original);
        }
    }
}
