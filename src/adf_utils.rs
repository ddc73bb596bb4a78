//! ADF file utility functions
//!
//! This module contains the file-level operations behind the command line
//! tool: inspecting, exporting, importing and verifying ADF files.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::adf::{export_instance, import_instance, AdfHeader, TreeDocument};
use crate::{
    utils::{create_glob_matcher, format_size, matches_filter},
    AdfFile, AdfWriteOptions, Endian, TypeRegistry,
};

/// Build a registry from type library files
pub fn load_type_libraries(paths: &[PathBuf]) -> Result<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    for path in paths {
        let data =
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let types = AdfFile::read_type_library(&data)
            .with_context(|| format!("Failed to read types from {}", path.display()))?;
        let total = types.len();
        let added = registry.register_all(types);
        info!("Loaded {} types ({} new) from {}", total, added, path.display());
    }
    Ok(registry)
}

fn open_adf(path: &Path, registry: &mut TypeRegistry) -> Result<(Vec<u8>, AdfFile)> {
    let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file = AdfFile::parse(&data, registry)
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    Ok((data, file))
}

/// Print header and directory information
pub fn show_info(adf_path: &Path, type_libraries: &[PathBuf]) -> Result<()> {
    println!("Opening {}...", adf_path.display());

    let mut registry = load_type_libraries(type_libraries)?;
    let (data, file) = open_adf(adf_path, &mut registry)?;
    let header = AdfHeader::parse(&data, 0)?;

    println!();
    println!("ADF Information:");
    println!("  File: {}", adf_path.display());
    println!("  Size: {}", format_size(data.len() as u64));
    println!("  Byte order: {:?}", header.endian);
    println!("  Version: {}", header.version);
    if !header.comment.is_empty() {
        println!("  Comment: {}", header.comment);
    }
    println!("  Instances: {}", header.instance_count);
    println!("  Types: {}", header.type_count);
    println!("  String hashes: {}", header.string_hash_count);
    println!("  Names: {}", header.name_count);

    if !file.instances.is_empty() {
        println!();
        println!("Instances:");
        for instance in &file.instances {
            println!(
                "  {:<40} {:<32} {:>4} members {:>10}",
                instance.name,
                registry.type_name(instance.type_hash).unwrap_or("?"),
                instance.members.len(),
                format_size(instance.source_size.unwrap_or_default())
            );
        }
    }

    Ok(())
}

/// Export instances as a JSON tree
pub fn export_json(
    adf_path: &Path,
    type_libraries: &[PathBuf],
    filter: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let mut registry = load_type_libraries(type_libraries)?;
    let (_, file) = open_adf(adf_path, &mut registry)?;
    let matcher = filter.map(create_glob_matcher).transpose()?;

    let mut instances = Vec::new();
    for instance in &file.instances {
        if !matches_filter(&instance.name, matcher.as_ref()) {
            continue;
        }
        instances.push(
            export_instance(instance, &registry)
                .with_context(|| format!("Failed to export {}", instance.name))?,
        );
    }

    let count = instances.len();
    let document = TreeDocument {
        comment: file.comment.clone(),
        instances,
    };
    let json = serde_json::to_string_pretty(&document)?;

    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported {} instances to {}", count, path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Rebuild an ADF file from a JSON tree, using `template` for types,
/// names and string hashes
pub fn import_json(
    json_path: &Path,
    template: &Path,
    type_libraries: &[PathBuf],
    output: &Path,
    big_endian: bool,
) -> Result<()> {
    let mut registry = load_type_libraries(type_libraries)?;
    let (_, mut file) = open_adf(template, &mut registry)?;

    let json = fs::read_to_string(json_path)
        .with_context(|| format!("Failed to read {}", json_path.display()))?;
    let document: TreeDocument = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse {}", json_path.display()))?;

    for tree in &document.instances {
        let instance = import_instance(tree, &registry)
            .with_context(|| format!("Failed to import {}", tree.name))?;
        match file.instances.iter_mut().find(|i| i.name == instance.name) {
            Some(existing) => *existing = instance,
            None => {
                warn!("Instance {} not in template, appending", instance.name);
                file.instances.push(instance);
            }
        }
    }

    let mut options = AdfWriteOptions::new().comment(document.comment.clone());
    if big_endian {
        options = options.endian(Endian::Big);
    }
    let data = file
        .encode_with_options(&registry, &options)
        .with_context(|| format!("Failed to encode {}", output.display()))?;
    fs::write(output, &data).with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Wrote {} instances ({}) to {}",
        file.instances.len(),
        format_size(data.len() as u64),
        output.display()
    );
    Ok(())
}

/// Decode and re-encode a file, checking the bytes are unchanged
pub fn verify_file(adf_path: &Path, type_libraries: &[PathBuf]) -> Result<()> {
    let mut registry = load_type_libraries(type_libraries)?;
    let (data, file) = open_adf(adf_path, &mut registry)?;
    let encoded = file
        .encode(&registry)
        .with_context(|| format!("Failed to re-encode {}", adf_path.display()))?;

    if let Some(offset) = first_difference(&data, &encoded) {
        bail!(
            "{}: re-encoded output differs at offset {:#x} ({} -> {})",
            adf_path.display(),
            offset,
            format_size(data.len() as u64),
            format_size(encoded.len() as u64)
        );
    }

    println!(
        "{}: OK ({} instances, {})",
        adf_path.display(),
        file.instances.len(),
        format_size(data.len() as u64)
    );
    Ok(())
}

/// First offset where two buffers differ, including a length difference
pub fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then(|| a.len().min(b.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_difference() {
        assert_eq!(first_difference(b"abc", b"abc"), None);
        assert_eq!(first_difference(b"abc", b"abd"), Some(2));
        assert_eq!(first_difference(b"abc", b"ab"), Some(2));
        assert_eq!(first_difference(b"", b"x"), Some(0));
    }
}
