//! Instance object graph
//!
//! An instance is a flat list of top-level members: the root structure
//! plus one member per distinct array target. Array slots refer to
//! members by id, so aliased arrays share a single canonical member and
//! no node ever owns another member directly.

use crate::adf::registry::TypeRegistry;
use crate::adf::types::PrimitiveType;
use crate::hash::hash_little;

/// Small integer naming a top-level member within one instance
pub type MemberId = usize;

/// Id of the root member
pub const ROOT_ID: MemberId = 0;

/// Fixed-width scalar value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
}

impl Scalar {
    pub fn size(&self) -> u64 {
        match self {
            Scalar::Int8(_) | Scalar::UInt8(_) => 1,
            Scalar::Int16(_) | Scalar::UInt16(_) => 2,
            Scalar::Int32(_) | Scalar::UInt32(_) | Scalar::Float(_) => 4,
            Scalar::Int64(_) | Scalar::UInt64(_) | Scalar::Double(_) => 8,
        }
    }

    /// Unsigned storage of `size` bytes holding `value`; `None` when the
    /// size is unsupported or the value does not fit
    pub fn unsigned(size: u64, value: u64) -> Option<Self> {
        Some(match size {
            1 => Scalar::UInt8(u8::try_from(value).ok()?),
            2 => Scalar::UInt16(u16::try_from(value).ok()?),
            4 => Scalar::UInt32(u32::try_from(value).ok()?),
            8 => Scalar::UInt64(value),
            _ => return None,
        })
    }

    /// Unsigned storage of `size` bytes holding the two's complement bits
    /// of a signed `value`
    pub fn from_signed_bits(size: u64, value: i64) -> Option<Self> {
        if value >= 0 {
            return Self::unsigned(size, value as u64);
        }
        Some(match size {
            1 => Scalar::UInt8(i8::try_from(value).ok()? as u8),
            2 => Scalar::UInt16(i16::try_from(value).ok()? as u16),
            4 => Scalar::UInt32(i32::try_from(value).ok()? as u32),
            8 => Scalar::UInt64(value as u64),
            _ => return None,
        })
    }

    /// Scalar of the given primitive type; `None` for strings and for
    /// values outside the type's range
    pub fn from_i64(primitive: PrimitiveType, value: i64) -> Option<Self> {
        Some(match primitive {
            PrimitiveType::Int8 => Scalar::Int8(i8::try_from(value).ok()?),
            PrimitiveType::UInt8 => Scalar::UInt8(u8::try_from(value).ok()?),
            PrimitiveType::Int16 => Scalar::Int16(i16::try_from(value).ok()?),
            PrimitiveType::UInt16 => Scalar::UInt16(u16::try_from(value).ok()?),
            PrimitiveType::Int32 => Scalar::Int32(i32::try_from(value).ok()?),
            PrimitiveType::UInt32 => Scalar::UInt32(u32::try_from(value).ok()?),
            PrimitiveType::Int64 => Scalar::Int64(value),
            PrimitiveType::UInt64 => Scalar::UInt64(u64::try_from(value).ok()?),
            PrimitiveType::Float => Scalar::Float(value as f32),
            PrimitiveType::Double => Scalar::Double(value as f64),
            PrimitiveType::String => return None,
        })
    }

    pub fn from_u64(primitive: PrimitiveType, value: u64) -> Option<Self> {
        match primitive {
            PrimitiveType::UInt64 => Some(Scalar::UInt64(value)),
            _ => Self::from_i64(primitive, i64::try_from(value).ok()?),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            Scalar::Int8(v) => v as i64,
            Scalar::UInt8(v) => v as i64,
            Scalar::Int16(v) => v as i64,
            Scalar::UInt16(v) => v as i64,
            Scalar::Int32(v) => v as i64,
            Scalar::UInt32(v) => v as i64,
            Scalar::Int64(v) => v,
            Scalar::UInt64(v) => v as i64,
            Scalar::Float(_) | Scalar::Double(_) => return None,
        })
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::Float(v) => v as f64,
            Scalar::Double(v) => v,
            other => other.as_i64().unwrap_or_default() as f64,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Scalar::Float(_) | Scalar::Double(_))
    }
}

/// String leaf; the payload lives in a member's string table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringNode {
    pub value: String,
    /// Payload offset in the source instance, if decoded
    pub source_offset: Option<u64>,
    /// Member whose string table physically holds the payload, when that
    /// is not the member containing this slot
    pub foreign_owner: Option<MemberId>,
}

impl StringNode {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            source_offset: None,
            foreign_owner: None,
        }
    }
}

/// Target of an Array-kind slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArraySlot {
    /// Stored offset and count are both zero
    Empty,
    /// First slot seen for this target; the member's elements are its content
    Owner(MemberId),
    /// Further slot aliasing an already owned member
    Reference { id: MemberId, count: u64 },
}

impl ArraySlot {
    pub fn target(&self) -> Option<MemberId> {
        match *self {
            ArraySlot::Empty => None,
            ArraySlot::Owner(id) | ArraySlot::Reference { id, .. } => Some(id),
        }
    }
}

/// A node in the expanded object tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Primitive, enumeration, bit field or raw pointer value
    Scalar { type_hash: u32, value: Scalar },
    String(StringNode),
    /// Hash reference, with its text when the file's table resolves it
    StringHash {
        type_hash: u32,
        value: Option<String>,
        hash: u64,
    },
    Structure { type_hash: u32, fields: Vec<Node> },
    InlineArray { type_hash: u32, elements: Vec<Node> },
    /// Offset+count slot of a variable-length array
    Array { type_hash: u32, slot: ArraySlot },
}

impl Node {
    pub fn scalar(type_hash: u32, value: Scalar) -> Self {
        Node::Scalar { type_hash, value }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Node::String(StringNode::new(value))
    }

    /// StringHash leaf whose hash is computed from `value`
    pub fn string_hash(type_hash: u32, value: impl Into<String>) -> Self {
        let value = value.into();
        Node::StringHash {
            type_hash,
            hash: hash_little(&value) as u64,
            value: Some(value),
        }
    }

    pub fn type_hash(&self) -> u32 {
        match self {
            Node::String(_) => PrimitiveType::STRING_HASH,
            Node::Scalar { type_hash, .. }
            | Node::StringHash { type_hash, .. }
            | Node::Structure { type_hash, .. }
            | Node::InlineArray { type_hash, .. }
            | Node::Array { type_hash, .. } => *type_hash,
        }
    }

    /// Nested nodes stored inline (fields or inline elements)
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Structure { fields, .. } => fields,
            Node::InlineArray { elements, .. } => elements,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> &mut [Node] {
        match self {
            Node::Structure { fields, .. } => fields,
            Node::InlineArray { elements, .. } => elements,
            _ => &mut [],
        }
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Node::Scalar { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::String(s) => Some(&s.value),
            _ => None,
        }
    }

    pub fn as_slot(&self) -> Option<ArraySlot> {
        match self {
            Node::Array { slot, .. } => Some(*slot),
            _ => None,
        }
    }

    /// Call `f` on this node and every inline descendant, depth first
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        f(self);
        for child in self.children() {
            child.walk(f);
        }
    }

    pub fn walk_strings_mut(&mut self, f: &mut impl FnMut(&mut StringNode)) {
        if let Node::String(s) = self {
            f(s);
        }
        for child in self.children_mut() {
            child.walk_strings_mut(f);
        }
    }

    /// Outermost InlineArray nodes at or below this node
    pub fn collect_inline_arrays<'a>(&'a self, out: &mut Vec<&'a Node>) {
        match self {
            Node::InlineArray { .. } => out.push(self),
            _ => {
                for child in self.children() {
                    child.collect_inline_arrays(out);
                }
            }
        }
    }
}

/// Data of a top-level member
#[derive(Debug, Clone, PartialEq)]
pub enum MemberContent {
    /// The instance's root structure
    Root(Node),
    /// Elements of a variable-length array
    Array { type_hash: u32, elements: Vec<Node> },
}

impl MemberContent {
    pub fn nodes(&self) -> &[Node] {
        match self {
            MemberContent::Root(node) => std::slice::from_ref(node),
            MemberContent::Array { elements, .. } => elements,
        }
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        match self {
            MemberContent::Root(node) => std::slice::from_mut(node),
            MemberContent::Array { elements, .. } => elements,
        }
    }

    pub fn type_hash(&self) -> u32 {
        match self {
            MemberContent::Root(node) => node.type_hash(),
            MemberContent::Array { type_hash, .. } => *type_hash,
        }
    }
}

/// One contiguous block of an instance's data
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: MemberId,
    /// Start of this block in the source instance, if decoded
    pub source_offset: Option<u64>,
    pub content: MemberContent,
}

impl Member {
    pub fn element_count(&self) -> u64 {
        match &self.content {
            MemberContent::Root(_) => 1,
            MemberContent::Array { elements, .. } => elements.len() as u64,
        }
    }

    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Node)) {
        for node in self.content.nodes() {
            node.walk(f);
        }
    }

    pub fn inline_arrays(&self) -> Vec<&Node> {
        let mut out = Vec::new();
        for node in self.content.nodes() {
            node.collect_inline_arrays(&mut out);
        }
        out
    }
}

/// One top-level named object of an ADF file
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub name: String,
    pub name_hash: u32,
    pub type_hash: u32,
    /// Ordered by source offset when decoded, by creation when authored
    pub members: Vec<Member>,
    /// Byte size of the source instance, if decoded
    pub source_size: Option<u64>,
}

impl Instance {
    /// New authored instance with `root` as its structure
    pub fn new(name: impl Into<String>, root: Node) -> Self {
        let name = name.into();
        Self {
            name_hash: hash_little(&name),
            type_hash: root.type_hash(),
            name,
            members: vec![Member {
                id: ROOT_ID,
                source_offset: None,
                content: MemberContent::Root(root),
            }],
            source_size: None,
        }
    }

    /// Append an array member and return its id for use in an [`ArraySlot`]
    pub fn add_array(&mut self, type_hash: u32, elements: Vec<Node>) -> MemberId {
        let id = self.next_id();
        self.members.push(Member {
            id,
            source_offset: None,
            content: MemberContent::Array {
                type_hash,
                elements,
            },
        });
        id
    }

    pub fn next_id(&self) -> MemberId {
        self.members.iter().map(|m| m.id + 1).max().unwrap_or(0)
    }

    pub fn root(&self) -> Option<&Node> {
        self.members.iter().find_map(|m| match &m.content {
            MemberContent::Root(node) => Some(node),
            _ => None,
        })
    }

    pub fn member(&self, id: MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    /// Look up a root field by name
    pub fn field<'a>(
        &'a self,
        registry: &TypeRegistry,
        name: &str,
    ) -> Option<&'a Node> {
        let root = self.root()?;
        let def = registry.get(root.type_hash())?;
        let index = def.members.iter().position(|m| m.name == name)?;
        root.children().get(index)
    }

    /// Elements of the array a slot points at
    pub fn array_elements(&self, slot: ArraySlot) -> Option<&[Node]> {
        match &self.member(slot.target()?)?.content {
            MemberContent::Array { elements, .. } => Some(elements),
            MemberContent::Root(_) => None,
        }
    }

    /// Whether every member carries a decoded source offset
    pub fn has_source_layout(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(|m| m.source_offset.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(Scalar::unsigned(2, 0xFFFF), Some(Scalar::UInt16(0xFFFF)));
        assert_eq!(Scalar::unsigned(3, 1), None);
        assert_eq!(
            Scalar::from_i64(PrimitiveType::Int8, -3),
            Some(Scalar::Int8(-3))
        );
        assert_eq!(Scalar::from_i64(PrimitiveType::String, 1), None);
        assert_eq!(Scalar::Int16(-2).as_i64(), Some(-2));
        assert_eq!(Scalar::Float(1.5).as_i64(), None);
        assert_eq!(Scalar::Float(1.5).as_f64(), 1.5);
        assert_eq!(Scalar::UInt64(7).size(), 8);
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        assert_eq!(Scalar::unsigned(2, 0x1_0005), None);
        assert_eq!(Scalar::unsigned(1, 300), None);
        assert_eq!(Scalar::from_i64(PrimitiveType::Int32, 4_294_967_297), None);
        assert_eq!(Scalar::from_i64(PrimitiveType::UInt8, 300), None);
        assert_eq!(Scalar::from_i64(PrimitiveType::UInt32, -1), None);
        assert_eq!(Scalar::from_i64(PrimitiveType::UInt64, -1), None);
        assert_eq!(
            Scalar::from_u64(PrimitiveType::UInt64, u64::MAX),
            Some(Scalar::UInt64(u64::MAX))
        );
        assert_eq!(Scalar::from_u64(PrimitiveType::Int64, u64::MAX), None);
        assert_eq!(
            Scalar::from_u64(PrimitiveType::UInt16, 65_535),
            Some(Scalar::UInt16(65_535))
        );
        assert_eq!(Scalar::from_signed_bits(4, -1), Some(Scalar::UInt32(u32::MAX)));
        assert_eq!(Scalar::from_signed_bits(1, -129), None);
        assert_eq!(Scalar::from_signed_bits(2, 70_000), None);
    }

    #[test]
    fn test_inline_arrays_are_outermost_only() {
        let inner = Node::InlineArray {
            type_hash: 2,
            elements: vec![Node::scalar(PrimitiveType::UINT8_HASH, Scalar::UInt8(1))],
        };
        let outer = Node::InlineArray {
            type_hash: 1,
            elements: vec![inner.clone(), inner],
        };
        let root = Node::Structure {
            type_hash: 9,
            fields: vec![outer, Node::string("x")],
        };
        let mut out = Vec::new();
        root.collect_inline_arrays(&mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].type_hash(), 1);
    }

    #[test]
    fn test_authored_instance_ids() {
        let root = Node::Structure {
            type_hash: 9,
            fields: vec![],
        };
        let mut instance = Instance::new("thing", root);
        assert_eq!(instance.name_hash, hash_little("thing"));
        let a = instance.add_array(5, vec![]);
        let b = instance.add_array(5, vec![]);
        assert_eq!((a, b), (1, 2));
        assert!(!instance.has_source_layout());
        assert_eq!(
            instance.array_elements(ArraySlot::Reference { id: b, count: 0 }),
            Some(&[][..])
        );
        assert_eq!(instance.array_elements(ArraySlot::Empty), None);
    }
}
