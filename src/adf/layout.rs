//! Layout planning for instance encoding
//!
//! `compute_layout` derives every member's offset, its string chunk and the
//! placement of the inline-array copy region purely from the object graph
//! and the registered type shapes. The result is consumed by the encoder.
//!
//! ## Member layout
//!
//! ```text
//! start (16-aligned)
//! +-- content            root structure or array elements
//! +-- inline copy        optional, see below
//! +-- strings            8-aligned, null-terminated, deduplicated
//! end                    next member starts at align16(end)
//! ```
//!
//! Instances may carry a second copy of their inline arrays. Where that
//! copy lives is not recorded anywhere, so for decoded instances it is
//! searched for: the first member whose trailing gap in the source can
//! hold every inline array (in reverse member order) gets a shared copy;
//! failing that, every member whose own inline arrays fit its own gap gets
//! a private copy; failing that, the copy is omitted.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::adf::io::align_up;
use crate::adf::node::{Instance, MemberContent, MemberId, Node};
use crate::adf::registry::TypeRegistry;
use crate::adf::strings::{InstanceStringTable, StringHashInfo};
use crate::adf::types::{PrimitiveType, TypeKind};
use crate::error::{Error, Result};

/// Alignment between consecutive top-level members
pub const MEMBER_ALIGNMENT: u64 = 16;

/// Alignment of a member's string chunk
pub const STRING_ALIGNMENT: u64 = 8;

/// Size of an Array slot (offset + count)
pub const ARRAY_SLOT_SIZE: u64 = 16;

/// Layout inputs for one member, in member order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberFacts {
    pub source_offset: Option<u64>,
    pub content_size: u64,
    pub string_bytes: u64,
    /// (size, alignment) of each outermost inline array, in content order
    pub inline_arrays: Vec<(u64, u64)>,
}

/// Where the inline-array copies go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlinePlacement {
    /// No copy is written
    None,
    /// All inline arrays, last member first, after member `index`
    Shared { index: usize, floor: u64 },
    /// Each listed member (index, floor) gets a copy of its own arrays
    Own { copies: Vec<(usize, u64)> },
}

/// Inline-array copy region of one member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineCopy {
    pub offset: u64,
    pub len: u64,
    /// Members whose inline arrays are written here, in order
    pub sources: Vec<MemberId>,
}

/// Final placement of one top-level member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberLayout {
    pub id: MemberId,
    pub offset: u64,
    pub content_size: u64,
    pub inline_copy: Option<InlineCopy>,
    pub strings_offset: u64,
    /// Strings of this member's table with their instance-relative offsets
    pub strings: Vec<(String, u64)>,
    pub end: u64,
}

/// Complete layout of one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutPlan {
    pub members: Vec<MemberLayout>,
    pub placement: InlinePlacement,
    pub size: u64,
    /// Entries produced by resolved StringHash leaves
    pub string_hashes: Vec<StringHashInfo>,
    index: HashMap<MemberId, usize>,
}

impl LayoutPlan {
    pub fn member(&self, id: MemberId) -> Option<&MemberLayout> {
        self.index.get(&id).map(|&i| &self.members[i])
    }

    pub fn member_offset(&self, id: MemberId) -> Result<u64> {
        self.member(id)
            .map(|m| m.offset)
            .ok_or_else(|| Error::InvalidAdf(format!("no layout for member {}", id)))
    }

    /// Offset of `value` within the string table of member `owner`
    pub fn string_position(&self, owner: MemberId, value: &str) -> Option<u64> {
        self.member(owner)?
            .strings
            .iter()
            .find(|(s, _)| s == value)
            .map(|&(_, offset)| offset)
    }
}

/// Bytes needed by inline arrays placed back to back from `start`;
/// every array but the first is aligned to its own alignment
pub fn region_size(start: u64, items: &[(u64, u64)]) -> u64 {
    let mut position = start;
    for (i, &(size, alignment)) in items.iter().enumerate() {
        if i > 0 {
            position = align_up(position, alignment);
        }
        position += size;
    }
    position - start
}

fn member_end(region_start: u64, region_len: u64, string_bytes: u64) -> u64 {
    let end = region_start + region_len;
    if string_bytes > 0 {
        align_up(end, STRING_ALIGNMENT) + string_bytes
    } else {
        end
    }
}

/// Try to place `items` right after member `index`'s content.
///
/// Returns the region length that reproduces the source position of the
/// following member (or the source instance size for the last member).
fn fit(
    facts: &[MemberFacts],
    index: usize,
    items: &[(u64, u64)],
    source_size: u64,
) -> Option<u64> {
    let member = &facts[index];
    let region_start = member.source_offset? + member.content_size;
    let needed = region_size(region_start, items);
    let end = member_end(region_start, needed, member.string_bytes);

    match facts.get(index + 1) {
        Some(next) => {
            let next_offset = next.source_offset?;
            let aligned = align_up(end, MEMBER_ALIGNMENT);
            if aligned > next_offset {
                return None;
            }
            let slack = (next_offset - aligned) & !(MEMBER_ALIGNMENT - 1);
            Some(needed + slack)
        }
        None => {
            if end > source_size {
                return None;
            }
            if member.string_bytes == 0 {
                return Some(source_size - region_start);
            }
            let strings_at = source_size - member.string_bytes;
            if strings_at % STRING_ALIGNMENT == 0 && strings_at >= region_start + needed {
                Some(strings_at - region_start)
            } else {
                Some(needed)
            }
        }
    }
}

/// Decide where inline-array copies go.
///
/// `source_size` is `None` for authored instances, which always get a
/// shared copy after their last member.
pub fn plan_inline_arrays(facts: &[MemberFacts], source_size: Option<u64>) -> InlinePlacement {
    let total: u64 = facts
        .iter()
        .flat_map(|f| f.inline_arrays.iter())
        .map(|&(size, _)| size)
        .sum();
    if total == 0 {
        return InlinePlacement::None;
    }

    let shared: Vec<(u64, u64)> = facts
        .iter()
        .rev()
        .flat_map(|f| f.inline_arrays.iter().copied())
        .collect();

    let source_size = match source_size {
        Some(size) if facts.iter().all(|f| f.source_offset.is_some()) => size,
        _ => {
            return InlinePlacement::Shared {
                index: facts.len() - 1,
                floor: 0,
            }
        }
    };

    for index in 0..facts.len() {
        if let Some(floor) = fit(facts, index, &shared, source_size) {
            return InlinePlacement::Shared { index, floor };
        }
    }

    // Greedy: every member whose own arrays fit its own gap
    let copies: Vec<(usize, u64)> = facts
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.inline_arrays.is_empty())
        .filter_map(|(i, f)| fit(facts, i, &f.inline_arrays, source_size).map(|floor| (i, floor)))
        .collect();

    if copies.is_empty() {
        InlinePlacement::None
    } else {
        InlinePlacement::Own { copies }
    }
}

/// Validates node shapes against the registry and measures them
struct Measurer<'a> {
    registry: &'a TypeRegistry,
    instance: &'a Instance,
}

impl Measurer<'_> {
    fn measure(&self, node: &Node, type_hash: u32) -> Result<u64> {
        if !matches!(node, Node::String(_)) && node.type_hash() != type_hash {
            return Err(Error::InvalidAdf(format!(
                "node of type {:#010x} stored where {:#010x} is expected",
                node.type_hash(),
                type_hash
            )));
        }

        match node {
            Node::String(_) => {
                let is_string = type_hash == PrimitiveType::STRING_HASH
                    || self.registry.resolve(type_hash)?.kind == TypeKind::String;
                if !is_string {
                    return Err(Error::InvalidAdf(format!(
                        "string stored in non-string field of type {:#010x}",
                        type_hash
                    )));
                }
                Ok(PrimitiveType::String.size())
            }
            Node::Scalar { value, .. } => {
                let size = self.registry.size_of(type_hash)?;
                if value.size() != size {
                    return Err(Error::SizeMismatch(format!(
                        "{}-byte value for {}-byte type {:#010x}",
                        value.size(),
                        size,
                        type_hash
                    )));
                }
                Ok(size)
            }
            Node::StringHash { .. } => {
                let def = self.registry.resolve(type_hash)?;
                if def.kind != TypeKind::StringHash {
                    return Err(Error::InvalidAdf(format!(
                        "string hash stored in {} field",
                        def.name
                    )));
                }
                Ok(def.size as u64)
            }
            Node::Structure { fields, .. } => {
                let def = self.registry.resolve(type_hash)?;
                if fields.len() != def.members.len() {
                    return Err(Error::SizeMismatch(format!(
                        "structure {} has {} fields, definition declares {}",
                        def.name,
                        fields.len(),
                        def.members.len()
                    )));
                }
                for (field, member) in fields.iter().zip(&def.members) {
                    self.measure(field, member.type_hash)?;
                }
                Ok(def.size as u64)
            }
            Node::InlineArray { elements, .. } => {
                let def = self.registry.resolve(type_hash)?;
                if elements.len() != def.element_length as usize {
                    return Err(Error::SizeMismatch(format!(
                        "inline array {} has {} elements, definition declares {}",
                        def.name,
                        elements.len(),
                        def.element_length
                    )));
                }
                for element in elements {
                    self.measure(element, def.element_type_hash)?;
                }
                Ok(def.size as u64)
            }
            Node::Array { slot, .. } => {
                if let Some(id) = slot.target() {
                    match self.instance.member(id).map(|m| &m.content) {
                        Some(MemberContent::Array { .. }) => {}
                        _ => {
                            return Err(Error::InvalidAdf(format!(
                                "array slot points at missing member {}",
                                id
                            )))
                        }
                    }
                }
                Ok(ARRAY_SLOT_SIZE)
            }
        }
    }

    fn content_size(&self, content: &MemberContent) -> Result<u64> {
        match content {
            MemberContent::Root(node) => self.measure(node, self.instance.type_hash),
            MemberContent::Array {
                type_hash,
                elements,
            } => {
                let (element_hash, _) = self.registry.element_of(*type_hash)?;
                let mut size = 0;
                for element in elements {
                    size += self.measure(element, element_hash)?;
                }
                Ok(size)
            }
        }
    }
}

/// Compute the full layout of `instance`
pub fn compute_layout(instance: &Instance, registry: &TypeRegistry) -> Result<LayoutPlan> {
    let measurer = Measurer { registry, instance };

    // String tables, keyed by the member that physically holds them
    let mut tables: HashMap<MemberId, InstanceStringTable> = HashMap::new();
    let mut string_hashes = Vec::new();
    for member in &instance.members {
        member.walk(&mut |node| match node {
            Node::String(s) => {
                let owner = s
                    .foreign_owner
                    .filter(|id| instance.member(*id).is_some())
                    .unwrap_or(member.id);
                tables
                    .entry(owner)
                    .or_default()
                    .put_optional(s.source_offset, &s.value);
            }
            Node::StringHash {
                value: Some(value),
                hash,
                ..
            } => string_hashes.push(StringHashInfo::new(value.clone(), *hash as u32)),
            _ => {}
        });
    }

    let mut facts = Vec::with_capacity(instance.members.len());
    for member in &instance.members {
        let mut inline_arrays = Vec::new();
        for node in member.inline_arrays() {
            let hash = node.type_hash();
            inline_arrays.push((registry.size_of(hash)?, registry.alignment_of(hash)?));
        }
        facts.push(MemberFacts {
            source_offset: member.source_offset,
            content_size: measurer.content_size(&member.content)?,
            string_bytes: tables.get(&member.id).map_or(0, |t| t.byte_size()),
            inline_arrays,
        });
    }

    let source_size = if instance.has_source_layout() {
        instance.source_size
    } else {
        None
    };
    let placement = plan_inline_arrays(&facts, source_size);
    match &placement {
        InlinePlacement::None if facts.iter().any(|f| !f.inline_arrays.is_empty()) => warn!(
            "No room for inline array copies in instance {}, omitting them",
            instance.name
        ),
        InlinePlacement::None => {}
        other => debug!("Inline array placement for {}: {:?}", instance.name, other),
    }

    let all_sources: Vec<MemberId> = instance.members.iter().rev().map(|m| m.id).collect();
    let mut members = Vec::with_capacity(instance.members.len());
    let mut index = HashMap::with_capacity(instance.members.len());
    let mut position = 0u64;

    for (i, (member, fact)) in instance.members.iter().zip(&facts).enumerate() {
        let offset = align_up(position, MEMBER_ALIGNMENT);
        let content_end = offset + fact.content_size;

        let inline_copy = match &placement {
            InlinePlacement::Shared { index, floor } if *index == i => {
                let shared: Vec<(u64, u64)> = facts
                    .iter()
                    .rev()
                    .flat_map(|f| f.inline_arrays.iter().copied())
                    .collect();
                Some(InlineCopy {
                    offset: content_end,
                    len: region_size(content_end, &shared).max(*floor),
                    sources: all_sources.clone(),
                })
            }
            InlinePlacement::Own { copies } => copies
                .iter()
                .find(|(index, _)| *index == i)
                .map(|&(_, floor)| InlineCopy {
                    offset: content_end,
                    len: region_size(content_end, &fact.inline_arrays).max(floor),
                    sources: vec![member.id],
                }),
            _ => None,
        };

        let region_end = content_end + inline_copy.as_ref().map_or(0, |c| c.len);
        let mut strings = Vec::new();
        let mut strings_offset = region_end;
        let mut end = region_end;
        if let Some(table) = tables.get(&member.id).filter(|t| !t.is_empty()) {
            strings_offset = align_up(region_end, STRING_ALIGNMENT);
            end = strings_offset;
            for value in table.strings() {
                strings.push((value.to_string(), end));
                end += value.len() as u64 + 1;
            }
        }

        index.insert(member.id, members.len());
        members.push(MemberLayout {
            id: member.id,
            offset,
            content_size: fact.content_size,
            inline_copy,
            strings_offset,
            strings,
            end,
        });
        position = end;
    }

    Ok(LayoutPlan {
        members,
        placement,
        size: position,
        string_hashes,
        index,
    })
}
