//! Generic tree view of instances
//!
//! A self-describing shape (named fields, type names and hashes, typed
//! scalar values, flat array members) that text converters can serialize
//! with serde and hand back for re-encoding. Layout and offsets never
//! appear here; imported instances are laid out from scratch.

use serde::{Deserialize, Serialize};

use crate::adf::node::{ArraySlot, Instance, Member, MemberContent, MemberId, Node, Scalar, StringNode};
use crate::adf::registry::TypeRegistry;
use crate::adf::types::{PrimitiveType, TypeKind};
use crate::error::{Error, Result};
use crate::hash::hash_little;

/// All instances of one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDocument {
    #[serde(default)]
    pub comment: String,
    pub instances: Vec<TreeInstance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeInstance {
    pub name: String,
    pub type_name: String,
    /// Zero means "resolve `type_name`"
    #[serde(default)]
    pub type_hash: u32,
    /// Root first, then one entry per array member
    pub members: Vec<TreeMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeMember {
    pub id: MemberId,
    pub type_name: String,
    #[serde(default)]
    pub type_hash: u32,
    pub value: TreeValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub type_name: String,
    #[serde(default)]
    pub type_hash: u32,
    pub value: TreeValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeValue {
    Int {
        value: i64,
    },
    #[serde(rename = "uint")]
    UInt {
        value: u64,
    },
    Float {
        value: f64,
    },
    Enum {
        value: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    String {
        value: String,
    },
    StringHash {
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        hash: u64,
    },
    Struct {
        fields: Vec<TreeNode>,
    },
    Elements {
        items: Vec<TreeNode>,
    },
    ArrayRef {
        target: Option<MemberId>,
        #[serde(default)]
        count: u64,
        #[serde(default)]
        owner: bool,
    },
}

fn type_name(registry: &TypeRegistry, type_hash: u32) -> String {
    registry
        .type_name(type_hash)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:#010x}", type_hash))
}

/// Convert a decoded or authored instance to its tree form
pub fn export_instance(instance: &Instance, registry: &TypeRegistry) -> Result<TreeInstance> {
    let mut members = Vec::with_capacity(instance.members.len());
    for member in &instance.members {
        let type_hash = member.content.type_hash();
        let value = match &member.content {
            MemberContent::Root(node) => export_node(node, instance.type_hash, registry)?,
            MemberContent::Array { elements, .. } => {
                let (element_hash, _) = registry.element_of(type_hash)?;
                TreeValue::Elements {
                    items: export_list(elements, element_hash, registry)?,
                }
            }
        };
        members.push(TreeMember {
            id: member.id,
            type_name: type_name(registry, type_hash),
            type_hash,
            value,
        });
    }

    Ok(TreeInstance {
        name: instance.name.clone(),
        type_name: type_name(registry, instance.type_hash),
        type_hash: instance.type_hash,
        members,
    })
}

fn export_list(nodes: &[Node], type_hash: u32, registry: &TypeRegistry) -> Result<Vec<TreeNode>> {
    nodes
        .iter()
        .map(|node| {
            Ok(TreeNode {
                name: None,
                type_name: type_name(registry, type_hash),
                type_hash,
                value: export_node(node, type_hash, registry)?,
            })
        })
        .collect()
}

fn export_node(node: &Node, type_hash: u32, registry: &TypeRegistry) -> Result<TreeValue> {
    Ok(match node {
        Node::Scalar { value, .. } => export_scalar(*value, type_hash, registry),
        Node::String(s) => TreeValue::String {
            value: s.value.clone(),
        },
        Node::StringHash { value, hash, .. } => TreeValue::StringHash {
            value: value.clone(),
            hash: *hash,
        },
        Node::Structure { fields, .. } => {
            let def = registry.resolve(type_hash)?;
            let mut out = Vec::with_capacity(fields.len());
            for (field, member) in fields.iter().zip(&def.members) {
                out.push(TreeNode {
                    name: Some(member.name.clone()),
                    type_name: type_name(registry, member.type_hash),
                    type_hash: member.type_hash,
                    value: export_node(field, member.type_hash, registry)?,
                });
            }
            TreeValue::Struct { fields: out }
        }
        Node::InlineArray { elements, .. } => {
            let (element_hash, _) = registry.element_of(type_hash)?;
            TreeValue::Elements {
                items: export_list(elements, element_hash, registry)?,
            }
        }
        Node::Array { slot, .. } => match *slot {
            ArraySlot::Empty => TreeValue::ArrayRef {
                target: None,
                count: 0,
                owner: false,
            },
            ArraySlot::Owner(id) => TreeValue::ArrayRef {
                target: Some(id),
                count: 0,
                owner: true,
            },
            ArraySlot::Reference { id, count } => TreeValue::ArrayRef {
                target: Some(id),
                count,
                owner: false,
            },
        },
    })
}

fn export_scalar(value: Scalar, type_hash: u32, registry: &TypeRegistry) -> TreeValue {
    if let Some(def) = registry.get(type_hash) {
        if def.kind == TypeKind::Enumeration {
            let raw = value.as_i64().unwrap_or_default();
            return TreeValue::Enum {
                value: raw as u64,
                name: def.enum_name(raw as i32).map(str::to_string),
            };
        }
    }
    match value {
        Scalar::Float(_) | Scalar::Double(_) => TreeValue::Float {
            value: value.as_f64(),
        },
        Scalar::UInt8(_) | Scalar::UInt16(_) | Scalar::UInt32(_) => TreeValue::UInt {
            value: value.as_i64().unwrap_or_default() as u64,
        },
        Scalar::UInt64(v) => TreeValue::UInt { value: v },
        _ => TreeValue::Int {
            value: value.as_i64().unwrap_or_default(),
        },
    }
}

/// Resolve a tree type reference: the hash when set, otherwise the name
fn resolve_hash(registry: &TypeRegistry, type_hash: u32, name: &str) -> Result<u32> {
    if type_hash != 0 {
        return Ok(type_hash);
    }
    if let Some(primitive) = PrimitiveType::from_name(name) {
        return Ok(primitive.hash());
    }
    registry
        .find_by_name(name)
        .map(|d| d.name_hash)
        .ok_or_else(|| Error::InvalidAdf(format!("unknown type name {:?}", name)))
}

/// Build an authored instance from its tree form
///
/// Array targets must name members of the same tree; StringHash hashes are
/// recomputed from their text when present.
pub fn import_instance(tree: &TreeInstance, registry: &TypeRegistry) -> Result<Instance> {
    let type_hash = resolve_hash(registry, tree.type_hash, &tree.type_name)?;
    registry.resolve(type_hash)?;

    let ids: Vec<MemberId> = tree.members.iter().map(|m| m.id).collect();
    let mut members = Vec::with_capacity(tree.members.len());
    let mut has_root = false;
    for member in &tree.members {
        if ids.iter().filter(|&&id| id == member.id).count() > 1 {
            return Err(Error::InvalidAdf(format!("duplicate member id {}", member.id)));
        }
        let member_hash = resolve_hash(registry, member.type_hash, &member.type_name)?;
        let content = match &member.value {
            TreeValue::Elements { items } if member_hash != type_hash || has_root => {
                let (element_hash, _) = registry.element_of(member_hash)?;
                MemberContent::Array {
                    type_hash: member_hash,
                    elements: import_list(items, element_hash, registry, &ids)?,
                }
            }
            value if !has_root => {
                has_root = true;
                MemberContent::Root(import_value(value, type_hash, registry, &ids)?)
            }
            _ => {
                return Err(Error::InvalidAdf(format!(
                    "member {} of {} is neither the root nor an array",
                    member.id, tree.name
                )))
            }
        };
        members.push(Member {
            id: member.id,
            source_offset: None,
            content,
        });
    }
    if !has_root {
        return Err(Error::InvalidAdf(format!("instance {} has no root", tree.name)));
    }

    Ok(Instance {
        name: tree.name.clone(),
        name_hash: hash_little(&tree.name),
        type_hash,
        members,
        source_size: None,
    })
}

fn import_list(
    items: &[TreeNode],
    type_hash: u32,
    registry: &TypeRegistry,
    ids: &[MemberId],
) -> Result<Vec<Node>> {
    items
        .iter()
        .map(|item| import_value(&item.value, type_hash, registry, ids))
        .collect()
}

fn import_value(
    value: &TreeValue,
    type_hash: u32,
    registry: &TypeRegistry,
    ids: &[MemberId],
) -> Result<Node> {
    let mismatch = || {
        Error::InvalidAdf(format!(
            "value {:?} does not fit type {}",
            value,
            type_name(registry, type_hash)
        ))
    };

    if let Some(primitive) = PrimitiveType::from_hash(type_hash) {
        let scalar = match (primitive, value) {
            (PrimitiveType::String, TreeValue::String { value }) => {
                return Ok(Node::String(StringNode::new(value.clone())))
            }
            (PrimitiveType::Float, TreeValue::Float { value }) => Scalar::Float(*value as f32),
            (PrimitiveType::Double, TreeValue::Float { value }) => Scalar::Double(*value),
            (PrimitiveType::Float | PrimitiveType::Double | PrimitiveType::String, _) => {
                return Err(mismatch())
            }
            (_, TreeValue::Int { value }) => {
                Scalar::from_i64(primitive, *value).ok_or_else(mismatch)?
            }
            (_, TreeValue::UInt { value }) => {
                Scalar::from_u64(primitive, *value).ok_or_else(mismatch)?
            }
            _ => return Err(mismatch()),
        };
        return Ok(Node::scalar(type_hash, scalar));
    }

    let def = registry.resolve(type_hash)?;
    match (def.kind, value) {
        (TypeKind::Structure, TreeValue::Struct { fields }) => {
            // Slots in definition order; named fields may come in any order
            let mut slots: Vec<Option<Node>> = vec![None; def.members.len()];
            for (i, field) in fields.iter().enumerate() {
                let index = match &field.name {
                    Some(name) => def.members.iter().position(|m| &m.name == name),
                    None => (i < def.members.len()).then_some(i),
                }
                .ok_or_else(|| {
                    Error::InvalidAdf(format!("field {:?} not in {}", field.name, def.name))
                })?;
                if slots[index].is_some() {
                    return Err(Error::InvalidAdf(format!(
                        "field {} of {} given twice",
                        def.members[index].name, def.name
                    )));
                }
                let member_type = def.members[index].type_hash;
                slots[index] = Some(import_value(&field.value, member_type, registry, ids)?);
            }

            let mut out = Vec::with_capacity(slots.len());
            for (slot, member) in slots.into_iter().zip(&def.members) {
                out.push(slot.ok_or_else(|| {
                    Error::SizeMismatch(format!(
                        "structure {} is missing field {}",
                        def.name, member.name
                    ))
                })?);
            }
            Ok(Node::Structure {
                type_hash,
                fields: out,
            })
        }
        (TypeKind::InlineArray, TreeValue::Elements { items }) => Ok(Node::InlineArray {
            type_hash,
            elements: import_list(items, def.element_type_hash, registry, ids)?,
        }),
        (TypeKind::Array, TreeValue::ArrayRef { target, count, owner }) => {
            let slot = match (*target, *owner) {
                (None, _) => ArraySlot::Empty,
                (Some(id), _) if !ids.contains(&id) => {
                    return Err(Error::InvalidAdf(format!(
                        "array slot points at missing member {}",
                        id
                    )))
                }
                (Some(id), true) => ArraySlot::Owner(id),
                (Some(id), false) => ArraySlot::Reference { id, count: *count },
            };
            Ok(Node::Array { type_hash, slot })
        }
        (TypeKind::String, TreeValue::String { value }) => {
            Ok(Node::String(StringNode::new(value.clone())))
        }
        (TypeKind::StringHash, TreeValue::StringHash { value, hash }) => Ok(match value {
            Some(text) => Node::string_hash(type_hash, text.clone()),
            None => Node::StringHash {
                type_hash,
                value: None,
                hash: *hash,
            },
        }),
        (
            TypeKind::Enumeration | TypeKind::BitField | TypeKind::Pointer | TypeKind::Primitive,
            TreeValue::Enum { value, .. } | TreeValue::UInt { value },
        ) => {
            let scalar = Scalar::unsigned(def.size as u64, *value).ok_or_else(mismatch)?;
            Ok(Node::scalar(type_hash, scalar))
        }
        (TypeKind::Enumeration, TreeValue::Int { value }) => {
            let scalar = Scalar::from_signed_bits(def.size as u64, *value).ok_or_else(mismatch)?;
            Ok(Node::scalar(type_hash, scalar))
        }
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adf::encoder::emit;
    use crate::adf::fixtures;
    use crate::adf::io::Endian;
    use crate::adf::layout::compute_layout;

    fn sample() -> Instance {
        let record = fixtures::record();
        let mut instance = Instance::new(
            "rec",
            Node::Structure {
                type_hash: record.name_hash,
                fields: vec![
                    Node::string("label"),
                    Node::Array {
                        type_hash: fixtures::string_array().name_hash,
                        slot: ArraySlot::Owner(1),
                    },
                ],
            },
        );
        instance.add_array(
            fixtures::string_array().name_hash,
            vec![Node::string("a"), Node::string("b")],
        );
        instance
    }

    #[test]
    fn test_export_shape() {
        let registry = fixtures::registry();
        let tree = export_instance(&sample(), &registry).unwrap();
        assert_eq!(tree.type_name, "Rec");
        assert_eq!(tree.members.len(), 2);
        assert_eq!(tree.members[1].type_name, "StrArray");

        match &tree.members[0].value {
            TreeValue::Struct { fields } => {
                assert_eq!(fields[0].name.as_deref(), Some("label"));
                assert_eq!(fields[0].type_name, "String");
                assert_eq!(
                    fields[1].value,
                    TreeValue::ArrayRef {
                        target: Some(1),
                        count: 0,
                        owner: true
                    }
                );
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_json_round_trip() {
        let registry = fixtures::registry();
        let instance = sample();
        let tree = export_instance(&instance, &registry).unwrap();
        let json = serde_json::to_string_pretty(&tree).unwrap();
        assert!(json.contains("\"kind\": \"array_ref\""));

        let parsed: TreeInstance = serde_json::from_str(&json).unwrap();
        let imported = import_instance(&parsed, &registry).unwrap();
        assert_eq!(imported, instance);
    }

    #[test]
    fn test_import_by_name_and_enum() {
        let registry = fixtures::registry();
        let json = r#"{
            "name": "tag",
            "type_name": "Tagged",
            "members": [{
                "id": 0,
                "type_name": "Tagged",
                "value": { "kind": "struct", "fields": [
                    { "name": "name", "type_name": "NameHash",
                      "value": { "kind": "string_hash", "value": "hello" } },
                    { "name": "kind", "type_name": "Kind",
                      "value": { "kind": "enum", "value": 1, "name": "Large" } }
                ]}
            }]
        }"#;
        let tree: TreeInstance = serde_json::from_str(json).unwrap();
        let instance = import_instance(&tree, &registry).unwrap();
        assert_eq!(instance.type_hash, fixtures::tagged().name_hash);

        let root = instance.root().unwrap();
        assert_eq!(
            root.children()[0],
            Node::string_hash(fixtures::name_hash().name_hash, "hello")
        );
        assert_eq!(root.children()[1].as_scalar(), Some(Scalar::UInt32(1)));

        let exported = export_instance(&instance, &registry).unwrap();
        match &exported.members[0].value {
            TreeValue::Struct { fields } => assert_eq!(
                fields[1].value,
                TreeValue::Enum {
                    value: 1,
                    name: Some("Large".into())
                }
            ),
            other => panic!("unexpected value {:?}", other),
        }
    }

    fn pair_tree(fields: &str) -> TreeInstance {
        let json = format!(
            r#"{{
                "name": "pair",
                "type_name": "Pair",
                "members": [{{
                    "id": 0,
                    "type_name": "Pair",
                    "value": {{ "kind": "struct", "fields": [{}] }}
                }}]
            }}"#,
            fields
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_named_fields_follow_definition_order() {
        let registry = fixtures::registry();
        let tree = pair_tree(
            r#"{ "name": "b", "type_name": "int32", "value": { "kind": "int", "value": 2 } },
               { "name": "a", "type_name": "int32", "value": { "kind": "int", "value": 1 } }"#,
        );
        let instance = import_instance(&tree, &registry).unwrap();
        let plan = compute_layout(&instance, &registry).unwrap();
        let bytes = emit(&instance, &plan, &registry, Endian::Little).unwrap();
        assert_eq!(bytes, [1, 0, 0, 0, 2, 0, 0, 0]);
    }

    #[test]
    fn test_duplicate_and_missing_fields() {
        let registry = fixtures::registry();
        let twice = pair_tree(
            r#"{ "name": "a", "type_name": "int32", "value": { "kind": "int", "value": 1 } },
               { "name": "a", "type_name": "int32", "value": { "kind": "int", "value": 2 } }"#,
        );
        assert!(matches!(
            import_instance(&twice, &registry),
            Err(Error::InvalidAdf(_))
        ));

        let missing = pair_tree(
            r#"{ "name": "b", "type_name": "int32", "value": { "kind": "int", "value": 2 } }"#,
        );
        assert!(matches!(
            import_instance(&missing, &registry),
            Err(Error::SizeMismatch(_))
        ));
    }

    #[test]
    fn test_out_of_range_int_is_rejected() {
        let registry = fixtures::registry();
        let tree = pair_tree(
            r#"{ "name": "a", "type_name": "int32", "value": { "kind": "int", "value": 4294967297 } },
               { "name": "b", "type_name": "int32", "value": { "kind": "int", "value": 2 } }"#,
        );
        assert!(matches!(
            import_instance(&tree, &registry),
            Err(Error::InvalidAdf(_))
        ));
    }

    #[test]
    fn test_import_rejects_missing_target() {
        let registry = fixtures::registry();
        let mut tree = export_instance(&sample(), &registry).unwrap();
        tree.members.truncate(1);
        assert!(matches!(
            import_instance(&tree, &registry),
            Err(Error::InvalidAdf(_))
        ));
    }

    #[test]
    fn test_imported_inline_count_is_checked() {
        let registry = fixtures::registry();
        let json = r#"{
            "name": "v",
            "type_name": "Vec3Holder",
            "members": [{
                "id": 0,
                "type_name": "Vec3Holder",
                "value": { "kind": "struct", "fields": [
                    { "name": "pos", "type_name": "Float3",
                      "value": { "kind": "elements", "items": [
                        { "type_name": "float", "value": { "kind": "float", "value": 1.0 } }
                      ]}},
                    { "name": "flags", "type_name": "uint32",
                      "value": { "kind": "uint", "value": 0 } }
                ]}
            }]
        }"#;
        let tree: TreeInstance = serde_json::from_str(json).unwrap();
        let instance = import_instance(&tree, &registry).unwrap();
        assert!(matches!(
            compute_layout(&instance, &registry),
            Err(Error::SizeMismatch(_))
        ));
    }
}
