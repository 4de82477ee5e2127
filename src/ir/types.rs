//! Types, header and struct layouts

use std::fmt;

/// Type annotation carried by every expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    /// Fixed-width bit string (`bit<W>` or `int<W>`)
    Bits {
        /// Width in bits
        width: u32,
        /// Two's complement signedness
        signed: bool,
    },
    /// Boolean
    Bool,
    /// Member of the `error` enumeration
    Error,
    /// Header type by name
    Header(String),
    /// Struct type by name
    Struct(String),
    /// Extern type by name (`Register`, `Counter`, ...)
    Extern(String),
    /// `packet_in` / `packet_out`
    Packet,
    /// Compile-time string (only as an extern argument)
    String,
    /// No value
    Void,
}

impl Type {
    /// Unsigned bit string of `width` bits
    pub fn bits(width: u32) -> Self {
        Type::Bits {
            width,
            signed: false,
        }
    }

    /// Logical width in bits for scalar types
    pub fn width(&self) -> Option<u32> {
        match self {
            Type::Bits { width, .. } => Some(*width),
            Type::Bool => Some(1),
            Type::Error => Some(16),
            _ => None,
        }
    }

    /// Width of the storage slot used for this type in assembly
    pub fn storage_width(&self) -> Option<u32> {
        match self {
            Type::Bool => Some(8),
            other => other.width(),
        }
    }

    /// Scalar types can live in a single metadata field
    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Bits { .. } | Type::Bool | Type::Error)
    }

    /// Mask covering all bits of the type (saturates at 64 bits)
    pub fn mask(&self) -> u64 {
        match self.width() {
            Some(w) if w < 64 => (1u64 << w) - 1,
            _ => u64::MAX,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bits { width, signed: false } => write!(f, "bit<{}>", width),
            Type::Bits { width, signed: true } => write!(f, "int<{}>", width),
            Type::Bool => f.write_str("bool"),
            Type::Error => f.write_str("error"),
            Type::Header(name) | Type::Struct(name) | Type::Extern(name) => f.write_str(name),
            Type::Packet => f.write_str("packet"),
            Type::String => f.write_str("string"),
            Type::Void => f.write_str("void"),
        }
    }
}

/// Named field of a header or struct
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: Type,
}

impl Field {
    /// Create a new field
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Header type declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderType {
    /// Type name
    pub name: String,
    /// Fields in wire order
    pub fields: Vec<Field>,
}

impl HeaderType {
    /// Total width of the header in bits
    pub fn width(&self) -> u32 {
        self.fields.iter().filter_map(|f| f.ty.width()).sum()
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Struct type declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructType {
    /// Type name
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<Field>,
}

impl StructType {
    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Append a field unless one with the same name exists; returns whether it was added
    pub fn push_unique(&mut self, field: Field) -> bool {
        if self.field(&field.name).is_some() {
            return false;
        }
        self.fields.push(field);
        true
    }
}
