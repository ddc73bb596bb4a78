//! ADF container reading and writing

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{debug, info};

use crate::adf::decoder::InstanceDecoder;
use crate::adf::encoder::emit;
use crate::adf::header::{AdfHeader, ADF_VERSION};
use crate::adf::io::{AdfReader, AdfWriter, Endian};
use crate::adf::layout::compute_layout;
use crate::adf::node::Instance;
use crate::adf::registry::TypeRegistry;
use crate::adf::strings::{dedup_string_hashes, NameTable, StringHashInfo};
use crate::adf::types::{EnumMember, MemberDefinition, TypeDefinition, TypeKind};
use crate::error::{Error, Result};

/// Options for encoding an ADF file
#[derive(Debug, Clone, Default)]
pub struct AdfWriteOptions {
    /// Byte order override (default: the file's own)
    pub endian: Option<Endian>,
    /// Header comment override
    pub comment: Option<String>,
}

impl AdfWriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = Some(endian);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Raw instance directory record
#[derive(Debug, Clone, Copy)]
struct InstanceEntry {
    name_hash: u32,
    type_hash: u32,
    offset: u32,
    size: u32,
    name_index: u64,
}

impl InstanceEntry {
    const RECORD_SIZE: usize = 24;

    fn read(reader: &mut AdfReader) -> Result<Self> {
        Ok(Self {
            name_hash: reader.read_u32()?,
            type_hash: reader.read_u32()?,
            offset: reader.read_u32()?,
            size: reader.read_u32()?,
            name_index: reader.read_u64()?,
        })
    }
}

/// A decoded ADF file
///
/// Holds the file's own type directory, string-hash directory and name
/// table so that re-encoding keeps indices and entries stable.
#[derive(Debug, Clone, Default)]
pub struct AdfFile {
    pub endian: Endian,
    pub comment: String,
    /// Type definitions stored in this file, in directory order
    pub types: Vec<TypeDefinition>,
    pub string_hashes: Vec<StringHashInfo>,
    pub names: NameTable,
    pub instances: Vec<Instance>,
}

impl AdfFile {
    /// Empty file for authoring
    pub fn new(endian: Endian) -> Self {
        Self {
            endian,
            ..Default::default()
        }
    }

    /// Read and decode a file from disk
    pub fn open<P: AsRef<Path>>(path: P, registry: &mut TypeRegistry) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::parse(&data, registry)
    }

    /// Decode a file starting at offset 0
    pub fn parse(data: &[u8], registry: &mut TypeRegistry) -> Result<Self> {
        Self::parse_at(data, 0, registry)
    }

    /// Decode a file whose header starts at `base`.
    ///
    /// The file's type directory is merged into `registry` before any
    /// instance is decoded. Nothing is registered if the header or one of
    /// the directories fails to parse.
    pub fn parse_at(data: &[u8], base: u64, registry: &mut TypeRegistry) -> Result<Self> {
        let header = AdfHeader::parse(data, base)?;
        debug!(
            "ADF header: {} instances, {} types, {} string hashes, {} names, {} bytes",
            header.instance_count,
            header.type_count,
            header.string_hash_count,
            header.name_count,
            header.total_size
        );

        let mut reader = AdfReader::new(data, header.endian);
        let names = read_names(&mut reader, &header, base)?;
        let types = read_types(&mut reader, &header, base, &names)?;
        let string_hashes = read_string_hashes(&mut reader, &header, base)?;

        let directory_start = base + header.instance_offset as u64;
        check_section(
            &header,
            base,
            directory_start,
            header.instance_count,
            InstanceEntry::RECORD_SIZE as u64,
        )?;
        reader.seek(directory_start)?;
        let mut entries = Vec::with_capacity(header.instance_count as usize);
        for _ in 0..header.instance_count {
            entries.push(InstanceEntry::read(&mut reader)?);
        }

        let added = registry.register_all(types.iter().cloned());
        debug!("Registered {} of {} file types", added, types.len());

        let mut hash_lookup = HashMap::with_capacity(string_hashes.len());
        for info in &string_hashes {
            hash_lookup
                .entry(info.value_hash as u64)
                .or_insert_with(|| info.value.clone());
        }

        let mut instances = Vec::with_capacity(entries.len());
        for entry in &entries {
            let start = base + entry.offset as u64;
            let end = start + entry.size as u64;
            if end > data.len() as u64 {
                return Err(Error::InvalidAdf(format!(
                    "instance at {:#x} with {} bytes exceeds file length {}",
                    start,
                    entry.size,
                    data.len()
                )));
            }
            let name = names.get(entry.name_index)?.to_string();
            let body = &data[start as usize..end as usize];
            let instance = InstanceDecoder::new(registry, &hash_lookup, body, header.endian)
                .decode(name, entry.name_hash, entry.type_hash)?;
            instances.push(instance);
        }

        Ok(AdfFile {
            endian: header.endian,
            comment: header.comment,
            types,
            string_hashes,
            names,
            instances,
        })
    }

    /// Harvest only the type directory of a file (type library import)
    pub fn read_type_library(data: &[u8]) -> Result<Vec<TypeDefinition>> {
        let header = AdfHeader::parse(data, 0)?;
        let mut reader = AdfReader::new(data, header.endian);
        let names = read_names(&mut reader, &header, 0)?;
        read_types(&mut reader, &header, 0, &names)
    }

    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.instances.iter().find(|i| i.name == name)
    }

    /// Encode with default options
    pub fn encode(&self, registry: &TypeRegistry) -> Result<Vec<u8>> {
        self.encode_with_options(registry, &AdfWriteOptions::default())
    }

    /// Encode to disk
    pub fn save<P: AsRef<Path>>(&self, path: P, registry: &TypeRegistry) -> Result<()> {
        let data = self.encode(registry)?;
        std::fs::write(path.as_ref(), data)?;
        Ok(())
    }

    pub fn encode_with_options(
        &self,
        registry: &TypeRegistry,
        options: &AdfWriteOptions,
    ) -> Result<Vec<u8>> {
        let endian = options.endian.unwrap_or(self.endian);
        let comment = options.comment.as_deref().unwrap_or(&self.comment);

        let names = self.collect_names()?;

        let mut bodies = Vec::with_capacity(self.instances.len());
        let mut produced = Vec::new();
        for instance in &self.instances {
            let plan = compute_layout(instance, registry)?;
            bodies.push(emit(instance, &plan, registry, endian)?);
            produced.extend(plan.string_hashes);
        }

        let mut string_hashes = self.string_hashes.clone();
        let mut known: HashSet<(String, u32)> = string_hashes
            .iter()
            .map(|info| (info.value.clone(), info.value_hash))
            .collect();
        for info in produced {
            if known.insert((info.value.clone(), info.value_hash)) {
                string_hashes.push(info);
            }
        }
        let string_hashes = dedup_string_hashes(string_hashes);

        let mut header = AdfHeader {
            endian,
            version: ADF_VERSION,
            comment: comment.to_string(),
            ..Default::default()
        };
        let mut writer = AdfWriter::new(endian);
        header.write(&mut writer)?;
        writer.align(16)?;

        let mut placed = Vec::with_capacity(bodies.len());
        for (instance, body) in self.instances.iter().zip(&bodies) {
            writer.align(registry.alignment_of(instance.type_hash)?)?;
            placed.push(writer.position());
            writer.write_bytes(body)?;
        }

        writer.align(8)?;
        header.instance_count = to_u32(self.instances.len() as u64, "instance count")?;
        header.instance_offset = to_u32(writer.position(), "instance offset")?;
        for ((instance, body), offset) in self.instances.iter().zip(&bodies).zip(&placed) {
            writer.write_u32(instance.name_hash)?;
            writer.write_u32(instance.type_hash)?;
            writer.write_u32(to_u32(*offset, "instance offset")?)?;
            writer.write_u32(to_u32(body.len() as u64, "instance size")?)?;
            writer.write_u64(name_index(&names, &instance.name)?)?;
        }

        writer.align(8)?;
        header.type_count = to_u32(self.types.len() as u64, "type count")?;
        header.type_offset = to_u32(writer.position(), "type offset")?;
        for def in &self.types {
            write_type_definition(&mut writer, def, &names)?;
        }

        writer.align(8)?;
        header.string_hash_count = to_u32(string_hashes.len() as u64, "string hash count")?;
        header.string_hash_offset = to_u32(writer.position(), "string hash offset")?;
        for info in &string_hashes {
            writer.write_cstring(&info.value)?;
            writer.write_u32(info.value_hash)?;
            writer.write_u32(info.unknown)?;
        }

        header.name_count = to_u32(names.len() as u64, "name count")?;
        header.name_offset = to_u32(writer.position(), "name offset")?;
        for name in names.names() {
            writer.write_u8(name.len() as u8)?;
        }
        for name in names.names() {
            writer.write_cstring(name)?;
        }

        header.total_size = to_u32(writer.position(), "total size")?;
        writer.seek(0)?;
        header.write(&mut writer)?;

        let data = writer.into_inner();
        info!(
            "Encoded ADF: {} instances, {} types, {} bytes",
            self.instances.len(),
            self.types.len(),
            data.len()
        );
        Ok(data)
    }

    /// The decoded name table extended with every name this file writes
    fn collect_names(&self) -> Result<NameTable> {
        let mut names = self.names.clone();
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
        if let Some(long) = names.names().iter().find(|n| n.len() > u8::MAX as usize) {
            return Err(Error::InvalidAdf(format!(
                "name {:?} is longer than {} bytes",
                long,
                u8::MAX
            )));
        }
        Ok(names)
    }
}

fn to_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::InvalidAdf(format!("{} {} does not fit in 32 bits", what, value)))
}

fn name_index(names: &NameTable, name: &str) -> Result<u64> {
    names
        .position(name)
        .map(|i| i as u64)
        .ok_or_else(|| Error::InvalidAdf(format!("name {:?} missing from name table", name)))
}

/// Fail unless `count` records of at least `min_size` bytes fit between
/// `start` and the end of the file
fn check_section(
    header: &AdfHeader,
    base: u64,
    start: u64,
    count: u32,
    min_size: u64,
) -> Result<()> {
    let end = base + header.total_size as u64;
    let required = start + count as u64 * min_size;
    if required > end {
        return Err(Error::TruncatedStream {
            required,
            available: end,
        });
    }
    Ok(())
}

/// Length byte plus terminator
const MIN_NAME_SIZE: u64 = 2;

/// Terminator plus hash and unknown words
const MIN_STRING_HASH_SIZE: u64 = 9;

fn read_names(reader: &mut AdfReader, header: &AdfHeader, base: u64) -> Result<NameTable> {
    let start = base + header.name_offset as u64;
    check_section(header, base, start, header.name_count, MIN_NAME_SIZE)?;
    reader.seek(start)?;
    let mut lengths = Vec::with_capacity(header.name_count as usize);
    for _ in 0..header.name_count {
        lengths.push(reader.read_u8()? as usize);
    }

    let mut names = Vec::with_capacity(lengths.len());
    for (i, length) in lengths.into_iter().enumerate() {
        let name = reader.read_cstring()?;
        if name.len() != length {
            return Err(Error::InvalidAdf(format!(
                "name {} is {} bytes, table says {}",
                i,
                name.len(),
                length
            )));
        }
        names.push(name);
    }
    Ok(NameTable::from_names(names))
}

fn read_types(
    reader: &mut AdfReader,
    header: &AdfHeader,
    base: u64,
    names: &NameTable,
) -> Result<Vec<TypeDefinition>> {
    let start = base + header.type_offset as u64;
    check_section(
        header,
        base,
        start,
        header.type_count,
        TypeDefinition::HEADER_SIZE as u64,
    )?;
    reader.seek(start)?;
    let mut types = Vec::with_capacity(header.type_count as usize);
    for _ in 0..header.type_count {
        types.push(read_type_definition(reader, names)?);
    }
    Ok(types)
}

fn read_string_hashes(
    reader: &mut AdfReader,
    header: &AdfHeader,
    base: u64,
) -> Result<Vec<StringHashInfo>> {
    let start = base + header.string_hash_offset as u64;
    check_section(header, base, start, header.string_hash_count, MIN_STRING_HASH_SIZE)?;
    reader.seek(start)?;
    let mut infos = Vec::with_capacity(header.string_hash_count as usize);
    for _ in 0..header.string_hash_count {
        infos.push(StringHashInfo {
            value: reader.read_cstring()?,
            value_hash: reader.read_u32()?,
            unknown: reader.read_u32()?,
        });
    }
    Ok(infos)
}

/// Read one type directory record
pub fn read_type_definition(reader: &mut AdfReader, names: &NameTable) -> Result<TypeDefinition> {
    let kind = TypeKind::try_from(reader.read_u32()?)?;
    let size = reader.read_u32()?;
    let alignment = reader.read_u32()?;
    let name_hash = reader.read_u32()?;
    let name = names.get(reader.read_u64()?)?.to_string();
    let flags = reader.read_u32()?;
    let element_type_hash = reader.read_u32()?;
    let element_length = reader.read_u32()?;
    let member_count = reader.read_u32()?;

    let record_size = match kind {
        TypeKind::Structure => MemberDefinition::RECORD_SIZE,
        TypeKind::Enumeration => EnumMember::RECORD_SIZE,
        _ => 0,
    } as u64;
    let required = reader.position() + member_count as u64 * record_size;
    if required > reader.len() {
        return Err(Error::TruncatedStream {
            required,
            available: reader.len(),
        });
    }

    let mut members = Vec::new();
    let mut enum_members = Vec::new();
    match kind {
        TypeKind::Structure => {
            for _ in 0..member_count {
                members.push(MemberDefinition {
                    name: names.get(reader.read_u64()?)?.to_string(),
                    type_hash: reader.read_u32()?,
                    size: reader.read_u32()?,
                    offset: reader.read_u32()?,
                    default_type: reader.read_u32()?,
                    default_value: reader.read_u64()?,
                });
            }
        }
        TypeKind::Enumeration => {
            for _ in 0..member_count {
                enum_members.push(EnumMember {
                    name: names.get(reader.read_u64()?)?.to_string(),
                    value: reader.read_i32()?,
                });
            }
        }
        _ if member_count != 0 => {
            return Err(Error::InvalidAdf(format!(
                "type {} of kind {:?} declares {} members",
                name, kind, member_count
            )))
        }
        _ => {}
    }

    Ok(TypeDefinition {
        kind,
        size,
        alignment,
        name_hash,
        name,
        flags,
        element_type_hash,
        element_length,
        members,
        enum_members,
    })
}

/// Write one type directory record; every name must already be in `names`
pub fn write_type_definition(
    writer: &mut AdfWriter,
    def: &TypeDefinition,
    names: &NameTable,
) -> Result<()> {
    writer.write_u32(def.kind.code())?;
    writer.write_u32(def.size)?;
    writer.write_u32(def.alignment)?;
    writer.write_u32(def.name_hash)?;
    writer.write_u64(name_index(names, &def.name)?)?;
    writer.write_u32(def.flags)?;
    writer.write_u32(def.element_type_hash)?;
    writer.write_u32(def.element_length)?;

    match def.kind {
        TypeKind::Structure => {
            writer.write_u32(to_u32(def.members.len() as u64, "member count")?)?;
            for member in &def.members {
                writer.write_u64(name_index(names, &member.name)?)?;
                writer.write_u32(member.type_hash)?;
                writer.write_u32(member.size)?;
                writer.write_u32(member.offset)?;
                writer.write_u32(member.default_type)?;
                writer.write_u64(member.default_value)?;
            }
        }
        TypeKind::Enumeration => {
            writer.write_u32(to_u32(def.enum_members.len() as u64, "member count")?)?;
            for option in &def.enum_members {
                writer.write_u64(name_index(names, &option.name)?)?;
                writer.write_i32(option.value)?;
            }
        }
        _ => writer.write_u32(0)?,
    }
    Ok(())
}
