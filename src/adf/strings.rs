//! Name table, string-hash entries and per-member string tables

use std::collections::HashMap;

use crate::error::{Error, Result};

/// File-wide table of type, member and instance names
///
/// Append-only; indices handed out stay valid for the table's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameTable {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from names in file order; repeated names keep their first index
    pub fn from_names(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self { names, index }
    }

    pub fn get(&self, index: u64) -> Result<&str> {
        self.names
            .get(index as usize)
            .map(|s| s.as_str())
            .ok_or_else(|| {
                Error::InvalidAdf(format!(
                    "name index {} out of range ({} names)",
                    index,
                    self.names.len()
                ))
            })
    }

    pub fn position(&self, value: &str) -> Option<usize> {
        self.index.get(value).copied()
    }

    pub fn get_or_insert(&mut self, value: &str) -> usize {
        if let Some(&i) = self.index.get(value) {
            return i;
        }
        let i = self.names.len();
        self.names.push(value.to_string());
        self.index.insert(value.to_string(), i);
        i
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A string paired with its hash, used to resolve StringHash fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringHashInfo {
    pub value: String,
    pub value_hash: u32,
    pub unknown: u32,
}

impl StringHashInfo {
    pub fn new(value: impl Into<String>, value_hash: u32) -> Self {
        Self {
            value: value.into(),
            value_hash,
            unknown: 0,
        }
    }
}

/// Drop exact duplicates (value, hash, unknown) and order by hash
pub fn dedup_string_hashes(mut infos: Vec<StringHashInfo>) -> Vec<StringHashInfo> {
    let mut seen = std::collections::HashSet::new();
    infos.retain(|info| seen.insert(info.clone()));
    infos.sort_by_key(|info| info.value_hash);
    infos
}

/// Strings belonging to one top-level member of an instance
///
/// Entries with a known source offset are kept ordered by that offset;
/// strings without one keep their insertion position. Equal values
/// collapse onto the first entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceStringTable {
    entries: Vec<(Option<u64>, String)>,
}

impl InstanceStringTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn contains(&self, value: &str) -> bool {
        self.entries.iter().any(|(_, v)| v == value)
    }

    /// Add a string whose source offset is known
    pub fn put_at(&mut self, offset: u64, value: &str) {
        if self.contains(value) {
            return;
        }
        let at = self
            .entries
            .iter()
            .position(|(o, _)| matches!(o, Some(existing) if *existing > offset))
            .unwrap_or(self.entries.len());
        self.entries.insert(at, (Some(offset), value.to_string()));
    }

    /// Add a string with no known position
    pub fn put(&mut self, value: &str) {
        if self.contains(value) {
            return;
        }
        self.entries.push((None, value.to_string()));
    }

    pub fn put_optional(&mut self, offset: Option<u64>, value: &str) {
        match offset {
            Some(offset) => self.put_at(offset, value),
            None => self.put(value),
        }
    }

    pub fn strings(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, v)| v.as_str())
    }

    /// Bytes needed for all strings including their terminators
    pub fn byte_size(&self) -> u64 {
        self.entries.iter().map(|(_, v)| v.len() as u64 + 1).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
