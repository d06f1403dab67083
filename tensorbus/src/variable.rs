//! Scalar variables mirrored across processes

use std::fmt;

/// Scalar value of a published variable.
///
/// Integers are always classified as [`Variable::Int`], never as floats.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    /// `int`
    Int(i64),
    /// `float`
    Float(f64),
    /// `str`
    Str(String),
}

impl Variable {
    /// Wire type tag
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
        }
    }

    /// Coerce a wire value according to its type tag
    pub fn from_wire(type_tag: &str, value: &str) -> Result<Self, String> {
        match type_tag {
            "int" => value
                .parse()
                .map(Self::Int)
                .map_err(|e| format!("invalid int `{value}`: {e}")),
            "float" => value
                .parse()
                .map(Self::Float)
                .map_err(|e| format!("invalid float `{value}`: {e}")),
            "str" => Ok(Self::Str(value.to_string())),
            other => Err(format!("unknown type tag `{other}`")),
        }
    }

    /// Integer value, if any
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value, if any
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String value, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// Wire representation of the value (without the type tag)
impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
        }
    }
}

macro_rules! variable_from {
    ($variant:ident: $($ty:ty),*) => {
        $(
            impl From<$ty> for Variable {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

variable_from!(Int: i8, i16, i32, i64, u8, u16, u32);
variable_from!(Float: f32, f64);
variable_from!(Str: String, &str);
