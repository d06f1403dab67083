//! Element types of tensors and their wire dtype

use std::fmt;

/// Element type of a tensor as held by the publishing process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Unsigned 8-bit integer
    U8,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// Signed 64-bit integer
    I64,
    /// IEEE half precision float
    F16,
    /// IEEE single precision float
    F32,
    /// IEEE double precision float
    F64,
    /// One byte boolean
    Bool,
}

impl ElementType {
    /// Bytes per element
    pub const fn size(self) -> usize {
        match self {
            Self::U8 | Self::I8 | Self::Bool => 1,
            Self::I16 | Self::F16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    /// Lowercase name
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "uint8",
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::F16 => "float16",
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dtype carried by a handle. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    /// `uint8`
    Uint8,
    /// `float32`
    Float32,
    /// `int32`
    Int32,
    /// Any other element type; consumers cannot reinterpret it
    Unknown,
}

impl Dtype {
    /// Wire tag
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Float32 => "float32",
            Self::Int32 => "int32",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a wire tag; `None` for anything outside the closed set
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "uint8" => Some(Self::Uint8),
            "float32" => Some(Self::Float32),
            "int32" => Some(Self::Int32),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    /// Bytes per element, `None` for `Unknown`
    pub const fn element_size(self) -> Option<usize> {
        match self {
            Self::Uint8 => Some(1),
            Self::Float32 | Self::Int32 => Some(4),
            Self::Unknown => None,
        }
    }
}

impl From<ElementType> for Dtype {
    fn from(element_type: ElementType) -> Self {
        match element_type {
            ElementType::U8 => Self::Uint8,
            ElementType::F32 => Self::Float32,
            ElementType::I32 => Self::Int32,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primitive that can be packed into tensor bytes (native endianness)
pub trait Element: Copy + Send + 'static {
    /// Element type tag
    const TYPE: ElementType;

    /// Append the native-endian bytes of `self`
    fn extend_bytes(self, out: &mut Vec<u8>);

    /// Rebuild from exactly `TYPE.size()` bytes
    fn from_bytes(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const TYPE: ElementType = ElementType::$variant;

                fn extend_bytes(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_ne_bytes());
                }

                fn from_bytes(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_ne_bytes(raw)
                }
            }
        )*
    };
}

impl_element!(
    u8 => U8,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_three_element_types_have_a_wire_dtype() {
        assert_eq!(Dtype::from(ElementType::U8), Dtype::Uint8);
        assert_eq!(Dtype::from(ElementType::F32), Dtype::Float32);
        assert_eq!(Dtype::from(ElementType::I32), Dtype::Int32);
        for other in [
            ElementType::I8,
            ElementType::I16,
            ElementType::I64,
            ElementType::F16,
            ElementType::F64,
            ElementType::Bool,
        ] {
            assert_eq!(Dtype::from(other), Dtype::Unknown);
        }
    }

    #[test]
    fn tags_round_trip() {
        for dtype in [Dtype::Uint8, Dtype::Float32, Dtype::Int32, Dtype::Unknown] {
            assert_eq!(Dtype::from_tag(dtype.as_str()), Some(dtype));
        }
        assert_eq!(Dtype::from_tag("weirdtype"), None);
        assert_eq!(Dtype::from_tag("Float32"), None);
    }

    #[test]
    fn element_sizes_agree() {
        assert_eq!(Dtype::Float32.element_size(), Some(ElementType::F32.size()));
        assert_eq!(Dtype::Unknown.element_size(), None);
    }

    #[test]
    fn element_bytes_round_trip() {
        let mut out = Vec::new();
        (-2.5f32).extend_bytes(&mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(f32::from_bytes(&out), -2.5);
    }
}
