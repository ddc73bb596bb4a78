//! Type registry keyed by name hash

use std::collections::HashMap;

use crate::adf::types::{PrimitiveType, TypeDefinition, TypeKind};
use crate::error::{Error, Result};

/// Known type definitions for one load/save operation
///
/// Registration is first-wins: adding a hash that is already present is a
/// silent no-op. Type libraries are merged by registering their
/// definitions before any instance is decoded.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<u32, TypeDefinition>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition; returns false if the hash was already known
    pub fn register(&mut self, definition: TypeDefinition) -> bool {
        if self.types.contains_key(&definition.name_hash) {
            return false;
        }
        self.types.insert(definition.name_hash, definition);
        true
    }

    /// Register every definition, returning how many were new
    pub fn register_all<I>(&mut self, definitions: I) -> usize
    where
        I: IntoIterator<Item = TypeDefinition>,
    {
        let mut added = 0;
        for definition in definitions {
            if self.register(definition) {
                added += 1;
            }
        }
        added
    }

    pub fn resolve(&self, name_hash: u32) -> Result<&TypeDefinition> {
        self.types
            .get(&name_hash)
            .ok_or(Error::UnknownType(name_hash))
    }

    pub fn get(&self, name_hash: u32) -> Option<&TypeDefinition> {
        self.types.get(&name_hash)
    }

    pub fn contains(&self, name_hash: u32) -> bool {
        self.types.contains_key(&name_hash)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Human-readable name for a type hash (built-ins included)
    pub fn type_name(&self, name_hash: u32) -> Option<&str> {
        if let Some(primitive) = PrimitiveType::from_hash(name_hash) {
            return Some(primitive.name());
        }
        self.types.get(&name_hash).map(|d| d.name.as_str())
    }

    /// Find a definition by name (linear; used by tree import)
    pub fn find_by_name(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.values().find(|d| d.name == name)
    }

    /// Byte size of a value of the given type
    pub fn size_of(&self, type_hash: u32) -> Result<u64> {
        if let Some(primitive) = PrimitiveType::from_hash(type_hash) {
            return Ok(primitive.size());
        }
        Ok(self.resolve(type_hash)?.size as u64)
    }

    /// Alignment of a value of the given type
    pub fn alignment_of(&self, type_hash: u32) -> Result<u64> {
        if let Some(primitive) = PrimitiveType::from_hash(type_hash) {
            return Ok(primitive.size());
        }
        Ok(self.resolve(type_hash)?.alignment.max(1) as u64)
    }

    /// Element type and element size of an Array/InlineArray definition
    pub fn element_of(&self, array_hash: u32) -> Result<(u32, u64)> {
        let def = self.resolve(array_hash)?;
        if !matches!(def.kind, TypeKind::Array | TypeKind::InlineArray) {
            return Err(Error::InvalidAdf(format!(
                "type {} ({:#010x}) is not an array",
                def.name, array_hash
            )));
        }
        Ok((def.element_type_hash, self.size_of(def.element_type_hash)?))
    }
}
