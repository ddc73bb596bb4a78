//! Instance graph builder
//!
//! Expands an instance's flat byte range into members and nodes. Array
//! slots are followed breadth first; each distinct target offset becomes
//! one canonical member, and later slots pointing at the same offset
//! become references sharing its id.

use std::collections::{HashMap, VecDeque};

use tracing::debug;

use crate::adf::io::{AdfReader, Endian};
use crate::adf::node::{
    ArraySlot, Instance, Member, MemberContent, MemberId, Node, Scalar, StringNode, ROOT_ID,
};
use crate::adf::registry::TypeRegistry;
use crate::adf::types::{PrimitiveType, TypeKind};
use crate::error::{Error, Result};

/// Array member waiting to be expanded
struct PendingArray {
    id: MemberId,
    offset: u64,
    type_hash: u32,
    count: u64,
}

/// Decoder state for one instance
pub(crate) struct InstanceDecoder<'a> {
    registry: &'a TypeRegistry,
    string_hashes: &'a HashMap<u64, String>,
    reader: AdfReader<'a>,
    /// (source offset, id), kept ordered by offset
    order: Vec<(u64, MemberId)>,
    contents: HashMap<MemberId, MemberContent>,
    offset_to_id: HashMap<u64, MemberId>,
    next_id: MemberId,
    worklist: VecDeque<PendingArray>,
}

impl<'a> InstanceDecoder<'a> {
    pub(crate) fn new(
        registry: &'a TypeRegistry,
        string_hashes: &'a HashMap<u64, String>,
        data: &'a [u8],
        endian: Endian,
    ) -> Self {
        Self {
            registry,
            string_hashes,
            reader: AdfReader::new(data, endian),
            order: Vec::new(),
            contents: HashMap::new(),
            offset_to_id: HashMap::new(),
            next_id: ROOT_ID + 1,
            worklist: VecDeque::new(),
        }
    }

    /// Decode the whole instance rooted at offset 0
    pub(crate) fn decode(
        mut self,
        name: String,
        name_hash: u32,
        type_hash: u32,
    ) -> Result<Instance> {
        let root_def = self.registry.resolve(type_hash)?;
        if root_def.kind != TypeKind::Structure {
            return Err(Error::InvalidAdf(format!(
                "instance {} has non-structure type {}",
                name, root_def.name
            )));
        }

        self.order.push((0, ROOT_ID));
        let root = self.decode_value(type_hash, 0)?;
        self.contents.insert(ROOT_ID, MemberContent::Root(root));

        while let Some(pending) = self.worklist.pop_front() {
            let elements = self.decode_array(&pending)?;
            self.contents.insert(
                pending.id,
                MemberContent::Array {
                    type_hash: pending.type_hash,
                    elements,
                },
            );
        }

        let mut members = Vec::with_capacity(self.order.len());
        for (offset, id) in &self.order {
            let content = self.contents.remove(id).ok_or_else(|| {
                Error::InvalidAdf(format!("member {} of {} was never expanded", id, name))
            })?;
            members.push(Member {
                id: *id,
                source_offset: Some(*offset),
                content,
            });
        }
        setup_string_references(&mut members);

        debug!(
            "Decoded instance {} ({} members, {} bytes)",
            name,
            members.len(),
            self.reader.len()
        );

        Ok(Instance {
            name,
            name_hash,
            type_hash,
            members,
            source_size: Some(self.reader.len()),
        })
    }

    fn decode_array(&mut self, pending: &PendingArray) -> Result<Vec<Node>> {
        let registry = self.registry;
        let (element_hash, element_size) = registry.element_of(pending.type_hash)?;
        if element_size == 0 && pending.count > 0 {
            return Err(Error::InvalidAdf(format!(
                "array at {:#x} has zero-sized elements",
                pending.offset
            )));
        }

        let end = pending
            .count
            .checked_mul(element_size)
            .and_then(|len| len.checked_add(pending.offset))
            .filter(|&end| end <= self.reader.len())
            .ok_or_else(|| {
                Error::InvalidAdf(format!(
                    "array at {:#x} with {} elements exceeds instance data ({} bytes)",
                    pending.offset,
                    pending.count,
                    self.reader.len()
                ))
            })?;
        debug!("Array member {} spans {:#x}..{:#x}", pending.id, pending.offset, end);

        let mut elements = Vec::with_capacity(pending.count as usize);
        for i in 0..pending.count {
            elements.push(self.decode_value(element_hash, pending.offset + i * element_size)?);
        }
        Ok(elements)
    }

    fn decode_value(&mut self, type_hash: u32, offset: u64) -> Result<Node> {
        if let Some(primitive) = PrimitiveType::from_hash(type_hash) {
            return self.decode_primitive(primitive, type_hash, offset);
        }

        let registry = self.registry;
        let def = registry.resolve(type_hash)?;
        match def.kind {
            TypeKind::Structure => {
                let mut fields = Vec::with_capacity(def.members.len());
                for member in &def.members {
                    fields.push(self.decode_value(member.type_hash, offset + member.byte_offset())?);
                }
                Ok(Node::Structure { type_hash, fields })
            }
            TypeKind::InlineArray => {
                let element_size = registry.size_of(def.element_type_hash)?;
                if element_size == 0 && def.element_length > 0 {
                    return Err(Error::InvalidAdf(format!(
                        "inline array {} has zero-sized elements",
                        def.name
                    )));
                }
                let end = (def.element_length as u64)
                    .checked_mul(element_size)
                    .and_then(|len| len.checked_add(offset));
                if !matches!(end, Some(end) if end <= self.reader.len()) {
                    return Err(Error::InvalidAdf(format!(
                        "inline array {} at {:#x} exceeds instance data ({} bytes)",
                        def.name,
                        offset,
                        self.reader.len()
                    )));
                }
                let mut elements = Vec::with_capacity(def.element_length as usize);
                for i in 0..def.element_length as u64 {
                    elements.push(self.decode_value(def.element_type_hash, offset + i * element_size)?);
                }
                Ok(Node::InlineArray { type_hash, elements })
            }
            TypeKind::Array => {
                self.reader.seek(offset)?;
                let target = self.reader.read_u64()?;
                let count = self.reader.read_u64()?;
                let slot = self.array_slot(type_hash, target, count);
                Ok(Node::Array { type_hash, slot })
            }
            TypeKind::StringHash => {
                self.reader.seek(offset)?;
                let hash = match def.size {
                    4 => self.reader.read_u32()? as u64,
                    8 => self.reader.read_u64()?,
                    size => {
                        return Err(Error::InvalidAdf(format!(
                            "string hash type {} has unsupported size {}",
                            def.name, size
                        )))
                    }
                };
                let value = self.string_hashes.get(&hash).cloned();
                Ok(Node::StringHash {
                    type_hash,
                    value,
                    hash,
                })
            }
            TypeKind::String => self.decode_primitive(PrimitiveType::String, type_hash, offset),
            TypeKind::Primitive
            | TypeKind::Enumeration
            | TypeKind::BitField
            | TypeKind::Pointer => {
                self.reader.seek(offset)?;
                let raw = match def.size {
                    1 => self.reader.read_u8()? as u64,
                    2 => self.reader.read_u16()? as u64,
                    4 => self.reader.read_u32()? as u64,
                    8 => self.reader.read_u64()?,
                    _ => 0,
                };
                let value = Scalar::unsigned(def.size as u64, raw).ok_or_else(|| {
                    Error::InvalidAdf(format!(
                        "type {} has unsupported scalar size {}",
                        def.name, def.size
                    ))
                })?;
                Ok(Node::Scalar { type_hash, value })
            }
        }
    }

    fn decode_primitive(
        &mut self,
        primitive: PrimitiveType,
        type_hash: u32,
        offset: u64,
    ) -> Result<Node> {
        self.reader.seek(offset)?;
        let value = match primitive {
            PrimitiveType::Int8 => Scalar::Int8(self.reader.read_i8()?),
            PrimitiveType::UInt8 => Scalar::UInt8(self.reader.read_u8()?),
            PrimitiveType::Int16 => Scalar::Int16(self.reader.read_i16()?),
            PrimitiveType::UInt16 => Scalar::UInt16(self.reader.read_u16()?),
            PrimitiveType::Int32 => Scalar::Int32(self.reader.read_i32()?),
            PrimitiveType::UInt32 => Scalar::UInt32(self.reader.read_u32()?),
            PrimitiveType::Int64 => Scalar::Int64(self.reader.read_i64()?),
            PrimitiveType::UInt64 => Scalar::UInt64(self.reader.read_u64()?),
            PrimitiveType::Float => Scalar::Float(self.reader.read_f32()?),
            PrimitiveType::Double => Scalar::Double(self.reader.read_f64()?),
            PrimitiveType::String => {
                let target = self.reader.read_u64()?;
                let value = self.reader.read_cstring_at(target)?;
                return Ok(Node::String(StringNode {
                    value,
                    source_offset: Some(target),
                    foreign_owner: None,
                }));
            }
        };
        Ok(Node::Scalar { type_hash, value })
    }

    /// Resolve an offset+count pair to a slot, creating a member on first sight
    fn array_slot(&mut self, type_hash: u32, target: u64, count: u64) -> ArraySlot {
        if target == 0 && count == 0 {
            return ArraySlot::Empty;
        }
        if let Some(&id) = self.offset_to_id.get(&target) {
            return ArraySlot::Reference { id, count };
        }

        let id = self.next_id;
        self.next_id += 1;
        self.offset_to_id.insert(target, id);

        // Keep the member list ordered by source offset
        let at = self
            .order
            .iter()
            .position(|&(offset, _)| offset > target)
            .unwrap_or(self.order.len());
        self.order.insert(at, (target, id));

        self.worklist.push_back(PendingArray {
            id,
            offset: target,
            type_hash,
            count,
        });
        ArraySlot::Owner(id)
    }
}

/// Mark strings whose payload sits in another member's string table
///
/// A payload belongs to the member whose region (from its start up to the
/// next member's start) contains the payload offset. `members` must be
/// ordered by source offset.
///
/// The last member's region is open-ended, so a payload past it belongs to
/// that member rather than being left unowned. A string in some earlier
/// member that points there is therefore foreign even though no member
/// follows the payload.
pub(crate) fn setup_string_references(members: &mut [Member]) {
    let regions: Vec<(u64, MemberId)> = members
        .iter()
        .filter_map(|m| m.source_offset.map(|o| (o, m.id)))
        .collect();

    for member in members.iter_mut() {
        let own_id = member.id;
        for node in member.content.nodes_mut() {
            node.walk_strings_mut(&mut |s| {
                let Some(target) = s.source_offset else {
                    return;
                };
                let holder = regions
                    .iter()
                    .take_while(|&&(offset, _)| offset < target)
                    .last()
                    .map(|&(_, id)| id);
                s.foreign_owner = match holder {
                    Some(id) if id != own_id => Some(id),
                    _ => None,
                };
            });
        }
    }
}
