//! Hand-built types and byte streams shared by the codec tests

use crate::adf::header::{AdfHeader, ADF_VERSION};
use crate::adf::io::{AdfWriter, Endian};
use crate::adf::registry::TypeRegistry;
use crate::adf::strings::{NameTable, StringHashInfo};
use crate::adf::types::{EnumMember, MemberDefinition, PrimitiveType, TypeDefinition, TypeKind};
use crate::hash::hash_little;

pub fn pair() -> TypeDefinition {
    TypeDefinition::structure(
        "Pair",
        8,
        4,
        vec![
            MemberDefinition::new("a", PrimitiveType::INT32_HASH, 4, 0),
            MemberDefinition::new("b", PrimitiveType::INT32_HASH, 4, 4),
        ],
    )
}

pub fn int_array() -> TypeDefinition {
    TypeDefinition::array("IntArray", PrimitiveType::INT32_HASH, 8)
}

pub fn string_array() -> TypeDefinition {
    TypeDefinition::array("StrArray", PrimitiveType::STRING_HASH, 8)
}

pub fn holder() -> TypeDefinition {
    TypeDefinition::structure(
        "Holder",
        24,
        8,
        vec![
            MemberDefinition::new("items", int_array().name_hash, 16, 0),
            MemberDefinition::new("count", PrimitiveType::UINT32_HASH, 4, 16),
        ],
    )
}

pub fn two_arrays() -> TypeDefinition {
    TypeDefinition::structure(
        "TwoArrays",
        32,
        8,
        vec![
            MemberDefinition::new("first", int_array().name_hash, 16, 0),
            MemberDefinition::new("second", int_array().name_hash, 16, 16),
        ],
    )
}

pub fn record() -> TypeDefinition {
    TypeDefinition::structure(
        "Rec",
        24,
        8,
        vec![
            MemberDefinition::new("label", PrimitiveType::STRING_HASH, 8, 0),
            MemberDefinition::new("names", string_array().name_hash, 16, 8),
        ],
    )
}

pub fn two_strings() -> TypeDefinition {
    TypeDefinition::structure(
        "TwoStrings",
        16,
        8,
        vec![
            MemberDefinition::new("a", PrimitiveType::STRING_HASH, 8, 0),
            MemberDefinition::new("b", PrimitiveType::STRING_HASH, 8, 8),
        ],
    )
}

pub fn float3() -> TypeDefinition {
    TypeDefinition::inline_array("Float3", PrimitiveType::FLOAT_HASH, 3, 4, 4)
}

pub fn vec3_holder() -> TypeDefinition {
    TypeDefinition::structure(
        "Vec3Holder",
        16,
        4,
        vec![
            MemberDefinition::new("pos", float3().name_hash, 12, 0),
            MemberDefinition::new("flags", PrimitiveType::UINT32_HASH, 4, 12),
        ],
    )
}

pub fn double2() -> TypeDefinition {
    TypeDefinition::inline_array("Double2", PrimitiveType::DOUBLE_HASH, 2, 8, 8)
}

pub fn float3_array() -> TypeDefinition {
    TypeDefinition::array("Float3Array", float3().name_hash, 8)
}

/// Inline `range` in the root plus an array of inline `Float3` points
pub fn track() -> TypeDefinition {
    TypeDefinition::structure(
        "Track",
        32,
        8,
        vec![
            MemberDefinition::new("range", double2().name_hash, 16, 0),
            MemberDefinition::new("points", float3_array().name_hash, 16, 16),
        ],
    )
}

pub fn name_hash() -> TypeDefinition {
    TypeDefinition::string_hash("NameHash", 4)
}

pub fn kind() -> TypeDefinition {
    TypeDefinition::enumeration(
        "Kind",
        4,
        vec![
            EnumMember {
                name: "Small".into(),
                value: 0,
            },
            EnumMember {
                name: "Large".into(),
                value: 1,
            },
        ],
    )
}

pub fn tagged() -> TypeDefinition {
    TypeDefinition::structure(
        "Tagged",
        8,
        4,
        vec![
            MemberDefinition::new("name", name_hash().name_hash, 4, 0),
            MemberDefinition::new("kind", kind().name_hash, 4, 4),
        ],
    )
}

pub fn all_types() -> Vec<TypeDefinition> {
    vec![
        pair(),
        int_array(),
        string_array(),
        holder(),
        two_arrays(),
        record(),
        two_strings(),
        float3(),
        vec3_holder(),
        double2(),
        float3_array(),
        track(),
        name_hash(),
        kind(),
        tagged(),
    ]
}

pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry.register_all(all_types());
    registry
}

/// Zero-filled instance body with typed pokes
pub struct Body {
    pub bytes: Vec<u8>,
    endian: Endian,
}

impl Body {
    pub fn new(len: usize) -> Self {
        Self::with_endian(len, Endian::Little)
    }

    pub fn with_endian(len: usize, endian: Endian) -> Self {
        Self {
            bytes: vec![0; len],
            endian,
        }
    }

    pub fn put(&mut self, offset: usize, bytes: &[u8]) -> &mut Self {
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn u32(&mut self, offset: usize, value: u32) -> &mut Self {
        let bytes = match self.endian {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        };
        self.put(offset, &bytes)
    }

    pub fn u64(&mut self, offset: usize, value: u64) -> &mut Self {
        let bytes = match self.endian {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        };
        self.put(offset, &bytes)
    }

    pub fn f32(&mut self, offset: usize, value: f32) -> &mut Self {
        self.u32(offset, value.to_bits())
    }

    pub fn f64(&mut self, offset: usize, value: f64) -> &mut Self {
        self.u64(offset, value.to_bits())
    }

    fn point(&mut self, offset: usize) -> &mut Self {
        self.f32(offset, 4.0).f32(offset + 4, 5.0).f32(offset + 8, 6.0)
    }

    fn range(&mut self, offset: usize) -> &mut Self {
        self.f64(offset, 1.5).f64(offset + 8, 2.5)
    }
}

/// `TwoArrays` whose slots both point at three ints at 32
pub fn shared_array_body() -> Vec<u8> {
    let mut body = Body::new(44);
    body.u64(0, 32).u64(8, 3).u64(16, 32).u64(24, 3);
    body.u32(32, 10).u32(36, 20).u32(40, 30);
    body.bytes
}

/// `Rec` whose array element reuses the root's string payload
pub fn foreign_string_body() -> Vec<u8> {
    let mut body = Body::new(40);
    body.u64(0, 24).u64(8, 32).u64(16, 1);
    body.put(24, b"x\0");
    body.u64(32, 24);
    body.bytes
}

/// `TwoStrings` with both fields pointing at one payload
pub fn dedup_string_body() -> Vec<u8> {
    let mut body = Body::new(21);
    body.u64(0, 16).u64(8, 16);
    body.put(16, b"same\0");
    body.bytes
}

/// `Vec3Holder` followed by its inline array copy
pub fn inline_copy_body() -> Vec<u8> {
    let mut body = Body::new(28);
    body.f32(0, 1.0).f32(4, 2.0).f32(8, 3.0).u32(12, 7);
    body.f32(16, 1.0).f32(20, 2.0).f32(24, 3.0);
    body.bytes
}

/// `Track` with one point and a copy region after the root holding the
/// point (44, padded to 48) and then the range, last member first
pub fn shared_inline_body() -> Vec<u8> {
    let mut body = Body::new(76);
    body.range(0).u64(16, 64).u64(24, 1);
    body.point(32).range(48);
    body.point(64);
    body.bytes
}

/// `Track` where the root and the points member each carry their own copy
pub fn own_inline_body() -> Vec<u8> {
    let mut body = Body::new(72);
    body.range(0).u64(16, 48).u64(24, 1);
    body.range(32);
    body.point(48).point(60);
    body.bytes
}

pub struct FixtureInstance {
    pub name: String,
    pub type_hash: u32,
    pub alignment: u64,
    pub body: Vec<u8>,
}

/// Complete ADF stream assembled section by section
pub struct FixtureFile {
    pub endian: Endian,
    pub comment: String,
    pub types: Vec<TypeDefinition>,
    /// Written in the given order; keep sorted by hash for round trips
    pub string_hashes: Vec<StringHashInfo>,
    pub instances: Vec<FixtureInstance>,
}

impl FixtureFile {
    pub fn new(endian: Endian) -> Self {
        Self {
            endian,
            comment: String::new(),
            types: Vec::new(),
            string_hashes: Vec::new(),
            instances: Vec::new(),
        }
    }

    pub fn with_type(mut self, def: TypeDefinition) -> Self {
        self.types.push(def);
        self
    }

    pub fn with_instance(mut self, name: &str, def: &TypeDefinition, body: Vec<u8>) -> Self {
        self.instances.push(FixtureInstance {
            name: name.to_string(),
            type_hash: def.name_hash,
            alignment: def.alignment as u64,
            body,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut names = NameTable::new();
        for instance in &self.instances {
            names.get_or_insert(&instance.name);
        }
        for def in &self.types {
            names.get_or_insert(&def.name);
            for member in &def.members {
                names.get_or_insert(&member.name);
            }
            for option in &def.enum_members {
                names.get_or_insert(&option.name);
            }
        }

        let mut header = AdfHeader {
            endian: self.endian,
            version: ADF_VERSION,
            comment: self.comment.clone(),
            ..Default::default()
        };
        let mut w = AdfWriter::new(self.endian);
        header.write(&mut w).unwrap();
        w.align(16).unwrap();

        let mut placed = Vec::new();
        for instance in &self.instances {
            w.align(instance.alignment).unwrap();
            placed.push(w.position());
            w.write_bytes(&instance.body).unwrap();
        }

        w.align(8).unwrap();
        header.instance_count = self.instances.len() as u32;
        header.instance_offset = w.position() as u32;
        for (instance, offset) in self.instances.iter().zip(&placed) {
            w.write_u32(hash_little(&instance.name)).unwrap();
            w.write_u32(instance.type_hash).unwrap();
            w.write_u32(*offset as u32).unwrap();
            w.write_u32(instance.body.len() as u32).unwrap();
            w.write_u64(names.position(&instance.name).unwrap() as u64).unwrap();
        }

        w.align(8).unwrap();
        header.type_count = self.types.len() as u32;
        header.type_offset = w.position() as u32;
        for def in &self.types {
            w.write_u32(def.kind.code()).unwrap();
            w.write_u32(def.size).unwrap();
            w.write_u32(def.alignment).unwrap();
            w.write_u32(def.name_hash).unwrap();
            w.write_u64(names.position(&def.name).unwrap() as u64).unwrap();
            w.write_u32(def.flags).unwrap();
            w.write_u32(def.element_type_hash).unwrap();
            w.write_u32(def.element_length).unwrap();
            match def.kind {
                TypeKind::Structure => {
                    w.write_u32(def.members.len() as u32).unwrap();
                    for m in &def.members {
                        w.write_u64(names.position(&m.name).unwrap() as u64).unwrap();
                        w.write_u32(m.type_hash).unwrap();
                        w.write_u32(m.size).unwrap();
                        w.write_u32(m.offset).unwrap();
                        w.write_u32(m.default_type).unwrap();
                        w.write_u64(m.default_value).unwrap();
                    }
                }
                TypeKind::Enumeration => {
                    w.write_u32(def.enum_members.len() as u32).unwrap();
                    for e in &def.enum_members {
                        w.write_u64(names.position(&e.name).unwrap() as u64).unwrap();
                        w.write_i32(e.value).unwrap();
                    }
                }
                _ => w.write_u32(0).unwrap(),
            }
        }

        w.align(8).unwrap();
        header.string_hash_count = self.string_hashes.len() as u32;
        header.string_hash_offset = w.position() as u32;
        for info in &self.string_hashes {
            w.write_cstring(&info.value).unwrap();
            w.write_u32(info.value_hash).unwrap();
            w.write_u32(info.unknown).unwrap();
        }

        header.name_count = names.len() as u32;
        header.name_offset = w.position() as u32;
        for name in names.names() {
            w.write_u8(name.len() as u8).unwrap();
        }
        for name in names.names() {
            w.write_cstring(name).unwrap();
        }

        header.total_size = w.position() as u32;
        w.seek(0).unwrap();
        header.write(&mut w).unwrap();
        w.into_inner()
    }
}
