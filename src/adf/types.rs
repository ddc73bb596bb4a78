//! Type definition model for ADF files

use crate::error::{Error, Result};
use crate::hash::hash_little;

/// Kind of a type definition
///
/// Stored as a u32 code in the type directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TypeKind {
    Primitive = 0,
    Structure = 1,
    Pointer = 2,
    Array = 3,
    InlineArray = 4,
    String = 5,
    BitField = 7,
    Enumeration = 8,
    StringHash = 9,
}

impl TryFrom<u32> for TypeKind {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        Ok(match value {
            0 => TypeKind::Primitive,
            1 => TypeKind::Structure,
            2 => TypeKind::Pointer,
            3 => TypeKind::Array,
            4 => TypeKind::InlineArray,
            5 => TypeKind::String,
            7 => TypeKind::BitField,
            8 => TypeKind::Enumeration,
            9 => TypeKind::StringHash,
            v => return Err(Error::InvalidAdf(format!("unknown type kind {}", v))),
        })
    }
}

impl TypeKind {
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Built-in scalar types, addressed by fixed name hashes
///
/// These never appear in a type directory; every file may reference them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    /// 64-bit offset to a null-terminated string
    String,
}

impl PrimitiveType {
    pub const INT8_HASH: u32 = 0x580D0A62;
    pub const UINT8_HASH: u32 = 0x0CA2821D;
    pub const INT16_HASH: u32 = 0xD13FCF93;
    pub const UINT16_HASH: u32 = 0x86D152BD;
    pub const INT32_HASH: u32 = 0x192FE633;
    pub const UINT32_HASH: u32 = 0x075E4E4F;
    pub const INT64_HASH: u32 = 0xAF41354F;
    pub const UINT64_HASH: u32 = 0xA139E01F;
    pub const FLOAT_HASH: u32 = 0x7515A207;
    pub const DOUBLE_HASH: u32 = 0xC609F663;
    pub const STRING_HASH: u32 = 0x8955583E;

    pub const ALL: [PrimitiveType; 11] = [
        PrimitiveType::Int8,
        PrimitiveType::UInt8,
        PrimitiveType::Int16,
        PrimitiveType::UInt16,
        PrimitiveType::Int32,
        PrimitiveType::UInt32,
        PrimitiveType::Int64,
        PrimitiveType::UInt64,
        PrimitiveType::Float,
        PrimitiveType::Double,
        PrimitiveType::String,
    ];

    pub fn from_hash(hash: u32) -> Option<Self> {
        Some(match hash {
            Self::INT8_HASH => PrimitiveType::Int8,
            Self::UINT8_HASH => PrimitiveType::UInt8,
            Self::INT16_HASH => PrimitiveType::Int16,
            Self::UINT16_HASH => PrimitiveType::UInt16,
            Self::INT32_HASH => PrimitiveType::Int32,
            Self::UINT32_HASH => PrimitiveType::UInt32,
            Self::INT64_HASH => PrimitiveType::Int64,
            Self::UINT64_HASH => PrimitiveType::UInt64,
            Self::FLOAT_HASH => PrimitiveType::Float,
            Self::DOUBLE_HASH => PrimitiveType::Double,
            Self::STRING_HASH => PrimitiveType::String,
            _ => return None,
        })
    }

    pub fn hash(self) -> u32 {
        match self {
            PrimitiveType::Int8 => Self::INT8_HASH,
            PrimitiveType::UInt8 => Self::UINT8_HASH,
            PrimitiveType::Int16 => Self::INT16_HASH,
            PrimitiveType::UInt16 => Self::UINT16_HASH,
            PrimitiveType::Int32 => Self::INT32_HASH,
            PrimitiveType::UInt32 => Self::UINT32_HASH,
            PrimitiveType::Int64 => Self::INT64_HASH,
            PrimitiveType::UInt64 => Self::UINT64_HASH,
            PrimitiveType::Float => Self::FLOAT_HASH,
            PrimitiveType::Double => Self::DOUBLE_HASH,
            PrimitiveType::String => Self::STRING_HASH,
        }
    }

    /// Byte width on disk; strings occupy an offset slot
    pub fn size(self) -> u64 {
        match self {
            PrimitiveType::Int8 | PrimitiveType::UInt8 => 1,
            PrimitiveType::Int16 | PrimitiveType::UInt16 => 2,
            PrimitiveType::Int32 | PrimitiveType::UInt32 | PrimitiveType::Float => 4,
            PrimitiveType::Int64
            | PrimitiveType::UInt64
            | PrimitiveType::Double
            | PrimitiveType::String => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Int8 => "int8",
            PrimitiveType::UInt8 => "uint8",
            PrimitiveType::Int16 => "int16",
            PrimitiveType::UInt16 => "uint16",
            PrimitiveType::Int32 => "int32",
            PrimitiveType::UInt32 => "uint32",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::UInt64 => "uint64",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::String => "String",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

/// Structure field descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDefinition {
    pub name: String,
    pub type_hash: u32,
    pub size: u32,
    /// Packed offset: low 24 bits are bytes, high 8 bits the bit offset
    pub offset: u32,
    pub default_type: u32,
    pub default_value: u64,
}

impl MemberDefinition {
    pub const RECORD_SIZE: usize = 32;

    pub fn new(name: impl Into<String>, type_hash: u32, size: u32, offset: u32) -> Self {
        Self {
            name: name.into(),
            type_hash,
            size,
            offset,
            default_type: 0,
            default_value: 0,
        }
    }

    pub fn byte_offset(&self) -> u64 {
        (self.offset & 0x00FF_FFFF) as u64
    }

    pub fn bit_offset(&self) -> u32 {
        self.offset >> 24
    }
}

/// Enumeration option
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub name: String,
    pub value: i32,
}

impl EnumMember {
    pub const RECORD_SIZE: usize = 12;
}

/// A named type's memory shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDefinition {
    pub kind: TypeKind,
    pub size: u32,
    pub alignment: u32,
    pub name_hash: u32,
    pub name: String,
    pub flags: u32,
    /// Element type for Array/InlineArray
    pub element_type_hash: u32,
    /// Fixed element count for InlineArray
    pub element_length: u32,
    /// Fields, Structure only
    pub members: Vec<MemberDefinition>,
    /// Options, Enumeration only
    pub enum_members: Vec<EnumMember>,
}

impl TypeDefinition {
    /// Fixed part of a type directory record, including the member count
    pub const HEADER_SIZE: usize = 40;

    fn new(kind: TypeKind, name: &str, size: u32, alignment: u32) -> Self {
        Self {
            kind,
            size,
            alignment,
            name_hash: hash_little(name),
            name: name.to_string(),
            flags: 0,
            element_type_hash: 0,
            element_length: 0,
            members: Vec::new(),
            enum_members: Vec::new(),
        }
    }

    pub fn structure(
        name: &str,
        size: u32,
        alignment: u32,
        members: Vec<MemberDefinition>,
    ) -> Self {
        Self {
            members,
            ..Self::new(TypeKind::Structure, name, size, alignment)
        }
    }

    /// Variable-length array: an offset+count pair pointing elsewhere
    pub fn array(name: &str, element_type_hash: u32, alignment: u32) -> Self {
        Self {
            element_type_hash,
            ..Self::new(TypeKind::Array, name, 16, alignment)
        }
    }

    /// Fixed-length array embedded by value
    pub fn inline_array(
        name: &str,
        element_type_hash: u32,
        element_length: u32,
        element_size: u32,
        alignment: u32,
    ) -> Self {
        Self {
            element_type_hash,
            element_length,
            ..Self::new(
                TypeKind::InlineArray,
                name,
                element_size * element_length,
                alignment,
            )
        }
    }

    pub fn string_hash(name: &str, size: u32) -> Self {
        Self::new(TypeKind::StringHash, name, size, size)
    }

    pub fn enumeration(name: &str, size: u32, enum_members: Vec<EnumMember>) -> Self {
        Self {
            enum_members,
            ..Self::new(TypeKind::Enumeration, name, size, size)
        }
    }

    /// Look up the name of an enumeration value
    pub fn enum_name(&self, value: i32) -> Option<&str> {
        self.enum_members
            .iter()
            .find(|m| m.value == value)
            .map(|m| m.name.as_str())
    }
}
