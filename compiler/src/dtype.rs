//! Buffer element types
//!
//! The element types a captured kernel may reference, with their byte width
//! and the spelling used in generated C.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    Int8,
    Uint8,
    Int16,
    Int32,
    Int64,
    Uint32,
    Half,
    Float,
    Double,
}

impl DType {
    /// Size of one element in bytes
    pub fn itemsize(&self) -> usize {
        match self {
            DType::Bool | DType::Int8 | DType::Uint8 => 1,
            DType::Int16 | DType::Half => 2,
            DType::Int32 | DType::Uint32 | DType::Float => 4,
            DType::Int64 | DType::Double => 8,
        }
    }

    /// C spelling of the element type.
    ///
    /// `uint8` and `half` are macros provided by the generated header.
    pub fn c_name(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::Int8 => "signed char",
            DType::Uint8 => "uint8",
            DType::Int16 => "short",
            DType::Int32 => "int",
            DType::Int64 => "long long",
            DType::Uint32 => "unsigned int",
            DType::Half => "half",
            DType::Float => "float",
            DType::Double => "double",
        }
    }

    /// Byte size of `len` elements of this type, `None` on overflow
    pub fn byte_size(&self, len: usize) -> Option<usize> {
        len.checked_mul(self.itemsize())
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Bool => "bool",
            DType::Int8 => "int8",
            DType::Uint8 => "uint8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Uint32 => "uint32",
            DType::Half => "half",
            DType::Float => "float",
            DType::Double => "double",
        };
        write!(f, "{}", name)
    }
}
