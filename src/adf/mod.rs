//! ADF (Arbitrary Data Format) binary codec
//!
//! ADF is a typed container: a type directory describes structure shapes,
//! and each named instance is a flat byte range of one of those types,
//! with arrays and strings reached through instance-relative offsets.
//!
//! ## Format Overview
//!
//! An ADF file consists of:
//! - Header with signature, version 4 and section offsets/counts
//! - Instance bodies
//! - Instance directory (name hash, type hash, offset, size, name)
//! - Type directory (kind, size, alignment, members)
//! - String-hash directory (text for hashed string fields)
//! - Name table
//!
//! Decoding rebuilds each instance as an object graph in which aliased
//! arrays share one member. Encoding lays the graph out again and
//! reproduces tool-written files byte for byte.
//!
//! ## Example
//!
//! ```rust,no_run
//! use unadf::{AdfFile, TypeRegistry};
//!
//! let mut registry = TypeRegistry::new();
//! let library = std::fs::read("types.adf")?;
//! registry.register_all(AdfFile::read_type_library(&library)?);
//!
//! let data = std::fs::read("level.adf")?;
//! let file = AdfFile::parse(&data, &mut registry)?;
//! for instance in &file.instances {
//!     println!("{} ({} members)", instance.name, instance.members.len());
//! }
//!
//! assert_eq!(file.encode(&registry)?, data);
//! # Ok::<(), unadf::Error>(())
//! ```

mod decoder;
mod encoder;
mod file;
mod header;
pub mod io;
pub mod layout;
mod node;
mod registry;
mod strings;
pub mod tree;
mod types;

#[cfg(test)]
mod fixtures;

pub use encoder::emit;
pub use file::{read_type_definition, write_type_definition, AdfFile, AdfWriteOptions};
pub use header::{AdfHeader, ADF_MAGIC, ADF_VERSION};
pub use io::{AdfReader, AdfWriter, Endian};
pub use layout::{compute_layout, LayoutPlan};
pub use node::{
    ArraySlot, Instance, Member, MemberContent, MemberId, Node, Scalar, StringNode, ROOT_ID,
};
pub use registry::TypeRegistry;
pub use strings::{dedup_string_hashes, InstanceStringTable, NameTable, StringHashInfo};
pub use tree::{export_instance, import_instance, TreeDocument, TreeInstance, TreeValue};
pub use types::{EnumMember, MemberDefinition, PrimitiveType, TypeDefinition, TypeKind};
