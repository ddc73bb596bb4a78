//! Instance body writer
//!
//! Emits the bytes of one instance from its graph and a [`LayoutPlan`].
//! Offsets are never recomputed here; every position comes from the plan
//! or from a type definition's member offsets.

use crate::adf::io::{align_up, AdfWriter, Endian};
use crate::adf::layout::LayoutPlan;
use crate::adf::node::{ArraySlot, Instance, MemberContent, MemberId, Node, Scalar};
use crate::adf::registry::TypeRegistry;
use crate::error::{Error, Result};

struct Emitter<'a> {
    instance: &'a Instance,
    plan: &'a LayoutPlan,
    registry: &'a TypeRegistry,
    writer: AdfWriter,
}

/// Write `instance` laid out by `plan`, returning exactly `plan.size` bytes.
///
/// Anything written past the planned size is reported as a `SizeMismatch`.
pub fn emit(
    instance: &Instance,
    plan: &LayoutPlan,
    registry: &TypeRegistry,
    endian: Endian,
) -> Result<Vec<u8>> {
    let mut emitter = Emitter {
        instance,
        plan,
        registry,
        writer: AdfWriter::with_len(plan.size as usize, endian),
    };

    for layout in &plan.members {
        for (value, offset) in &layout.strings {
            emitter.writer.seek(*offset)?;
            emitter.writer.write_cstring(value)?;
        }
    }

    for member in &instance.members {
        let layout = plan.member(member.id).ok_or_else(|| {
            Error::InvalidAdf(format!("no layout for member {}", member.id))
        })?;

        match &member.content {
            MemberContent::Root(node) => {
                emitter.write_node(node, instance.type_hash, layout.offset, member.id)?
            }
            MemberContent::Array {
                type_hash,
                elements,
            } => {
                let (element_hash, element_size) = registry.element_of(*type_hash)?;
                for (i, element) in elements.iter().enumerate() {
                    let position = layout.offset + i as u64 * element_size;
                    emitter.write_node(element, element_hash, position, member.id)?;
                }
            }
        }

        if let Some(copy) = &layout.inline_copy {
            emitter.write_inline_copy(copy.offset, &copy.sources)?;
        }
    }

    let data = emitter.writer.into_inner();
    if data.len() as u64 != plan.size {
        return Err(Error::SizeMismatch(format!(
            "instance {} wrote {} bytes, layout planned {}",
            instance.name,
            data.len(),
            plan.size
        )));
    }
    Ok(data)
}

impl Emitter<'_> {
    fn write_inline_copy(&mut self, start: u64, sources: &[MemberId]) -> Result<()> {
        let mut position = start;
        let mut first = true;
        for &id in sources {
            let Some(member) = self.instance.member(id) else {
                continue;
            };
            for node in member.inline_arrays() {
                let hash = node.type_hash();
                if !first {
                    position = align_up(position, self.registry.alignment_of(hash)?);
                }
                self.write_node(node, hash, position, id)?;
                position += self.registry.size_of(hash)?;
                first = false;
            }
        }
        Ok(())
    }

    fn write_node(
        &mut self,
        node: &Node,
        type_hash: u32,
        position: u64,
        member: MemberId,
    ) -> Result<()> {
        match node {
            Node::Scalar { value, .. } => {
                self.writer.seek(position)?;
                self.write_scalar(*value)
            }
            Node::String(s) => {
                let owner = s
                    .foreign_owner
                    .filter(|id| self.plan.member(*id).is_some())
                    .unwrap_or(member);
                let target = self.plan.string_position(owner, &s.value).ok_or_else(|| {
                    Error::InvalidAdf(format!(
                        "string {:?} missing from table of member {}",
                        s.value, owner
                    ))
                })?;
                self.writer.seek(position)?;
                self.writer.write_u64(target)
            }
            Node::StringHash { hash, .. } => {
                let size = self.registry.size_of(type_hash)?;
                self.writer.seek(position)?;
                match size {
                    4 => self.writer.write_u32(*hash as u32),
                    8 => self.writer.write_u64(*hash),
                    size => Err(Error::InvalidAdf(format!(
                        "string hash of unsupported size {}",
                        size
                    ))),
                }
            }
            Node::Structure { fields, .. } => {
                let def = self.registry.resolve(type_hash)?;
                for (field, member_def) in fields.iter().zip(&def.members) {
                    self.write_node(
                        field,
                        member_def.type_hash,
                        position + member_def.byte_offset(),
                        member,
                    )?;
                }
                Ok(())
            }
            Node::InlineArray { elements, .. } => {
                let (element_hash, element_size) = self.registry.element_of(type_hash)?;
                for (i, element) in elements.iter().enumerate() {
                    self.write_node(
                        element,
                        element_hash,
                        position + i as u64 * element_size,
                        member,
                    )?;
                }
                Ok(())
            }
            Node::Array { slot, .. } => {
                let (offset, count) = match *slot {
                    ArraySlot::Empty => (0, 0),
                    ArraySlot::Owner(id) => {
                        let count = self
                            .instance
                            .member(id)
                            .map(|m| m.element_count())
                            .unwrap_or_default();
                        (self.plan.member_offset(id)?, count)
                    }
                    ArraySlot::Reference { id, count } => (self.plan.member_offset(id)?, count),
                };
                self.writer.seek(position)?;
                self.writer.write_u64(offset)?;
                self.writer.write_u64(count)
            }
        }
    }

    fn write_scalar(&mut self, value: Scalar) -> Result<()> {
        let writer = &mut self.writer;
        match value {
            Scalar::Int8(v) => writer.write_i8(v),
            Scalar::UInt8(v) => writer.write_u8(v),
            Scalar::Int16(v) => writer.write_i16(v),
            Scalar::UInt16(v) => writer.write_u16(v),
            Scalar::Int32(v) => writer.write_i32(v),
            Scalar::UInt32(v) => writer.write_u32(v),
            Scalar::Int64(v) => writer.write_i64(v),
            Scalar::UInt64(v) => writer.write_u64(v),
            Scalar::Float(v) => writer.write_f32(v),
            Scalar::Double(v) => writer.write_f64(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adf::decoder::InstanceDecoder;
    use crate::adf::fixtures;
    use crate::adf::layout::{compute_layout, InlinePlacement};
    use std::collections::HashMap;

    fn decode(registry: &TypeRegistry, type_hash: u32, data: &[u8]) -> Instance {
        let hashes = HashMap::new();
        InstanceDecoder::new(registry, &hashes, data, Endian::Little)
            .decode("test".into(), 0, type_hash)
            .unwrap()
    }

    fn reencode(type_hash: u32, data: &[u8]) -> Vec<u8> {
        let registry = fixtures::registry();
        let instance = decode(&registry, type_hash, data);
        let plan = compute_layout(&instance, &registry).unwrap();
        emit(&instance, &plan, &registry, Endian::Little).unwrap()
    }

    #[test]
    fn test_pair_round_trip() {
        let data = [1, 0, 0, 0, 2, 0, 0, 0];
        assert_eq!(reencode(fixtures::pair().name_hash, &data), data);
    }

    #[test]
    fn test_empty_array_round_trip() {
        let mut body = fixtures::Body::new(24);
        body.u32(16, 9);
        assert_eq!(reencode(fixtures::holder().name_hash, &body.bytes), body.bytes);
    }

    #[test]
    fn test_shared_array_round_trip() {
        let body = fixtures::shared_array_body();
        assert_eq!(reencode(fixtures::two_arrays().name_hash, &body), body);
    }

    #[test]
    fn test_string_dedup_round_trip() {
        let body = fixtures::dedup_string_body();
        let out = reencode(fixtures::two_strings().name_hash, &body);
        assert_eq!(out, body);
        assert_eq!(&out[0..8], &out[8..16]);
    }

    #[test]
    fn test_foreign_string_round_trip() {
        let body = fixtures::foreign_string_body();
        assert_eq!(reencode(fixtures::record().name_hash, &body), body);
    }

    #[test]
    fn test_inline_copy_round_trip() {
        let body = fixtures::inline_copy_body();
        assert_eq!(body.len(), 28);
        assert_eq!(reencode(fixtures::vec3_holder().name_hash, &body), body);
    }

    #[test]
    fn test_missing_inline_copy_round_trip() {
        // No copy region in the source: re-encoding must not add one
        let body = fixtures::inline_copy_body();
        let trimmed = &body[..16];
        assert_eq!(reencode(fixtures::vec3_holder().name_hash, trimmed), trimmed);
    }

    #[test]
    fn test_shared_copy_spans_members() {
        let registry = fixtures::registry();
        let body = fixtures::shared_inline_body();
        let instance = decode(&registry, fixtures::track().name_hash, &body);
        assert_eq!(instance.members.len(), 2);

        let plan = compute_layout(&instance, &registry).unwrap();
        assert_eq!(
            plan.placement,
            InlinePlacement::Shared { index: 0, floor: 32 }
        );
        let copy = plan.members[0].inline_copy.as_ref().unwrap();
        assert_eq!((copy.offset, copy.len), (32, 32));
        assert_eq!(copy.sources, vec![1, 0]);

        let out = emit(&instance, &plan, &registry, Endian::Little).unwrap();
        assert_eq!(out, body);
        // Point copy first, then the range padded up to its 8-byte alignment
        assert_eq!(&out[32..44], &out[64..76]);
        assert_eq!(&out[44..48], &[0; 4]);
        assert_eq!(&out[48..64], &out[0..16]);
    }

    #[test]
    fn test_own_copies_per_member() {
        let registry = fixtures::registry();
        let body = fixtures::own_inline_body();
        let instance = decode(&registry, fixtures::track().name_hash, &body);

        let plan = compute_layout(&instance, &registry).unwrap();
        assert_eq!(
            plan.placement,
            InlinePlacement::Own {
                copies: vec![(0, 16), (1, 12)]
            }
        );
        assert_eq!(plan.member(1).unwrap().offset, 48);
        assert_eq!(emit(&instance, &plan, &registry, Endian::Little).unwrap(), body);
    }

    #[test]
    fn test_overrun_of_planned_size() {
        let registry = fixtures::registry();
        let instance = decode(&registry, fixtures::pair().name_hash, &[1, 0, 0, 0, 2, 0, 0, 0]);
        let mut plan = compute_layout(&instance, &registry).unwrap();
        plan.size = 4;
        assert!(matches!(
            emit(&instance, &plan, &registry, Endian::Little),
            Err(Error::SizeMismatch(_))
        ));
    }
}
