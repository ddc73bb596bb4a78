//! # unadf
//!
//! A Rust library for reading and writing ADF (Arbitrary Data Format) files.
//!
//! ## Overview
//!
//! ADF files store typed game data: a directory of structure definitions
//! and a set of named instances laid out according to them. This library
//! provides:
//!
//! - Decoding instances into an object graph with shared array members
//! - Byte-identical re-encoding of tool-written files
//! - Little and big endian files, embedded at any base offset
//! - Type library merging across files
//! - A generic serde tree for text conversion
//!
//! ## Example - Reading
//!
//! ```rust,no_run
//! use unadf::{AdfFile, TypeRegistry};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut registry = TypeRegistry::new();
//!     let file = AdfFile::open("settings.adf", &mut registry)?;
//!
//!     for instance in &file.instances {
//!         println!("{}: {}", instance.name, registry.type_name(instance.type_hash).unwrap_or("?"));
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Example - Authoring
//!
//! ```rust,no_run
//! use unadf::{AdfFile, Endian, Instance, MemberDefinition, Node, PrimitiveType, Scalar,
//!             TypeDefinition, TypeRegistry};
//!
//! fn main() -> anyhow::Result<()> {
//!     let pair = TypeDefinition::structure(
//!         "Pair",
//!         8,
//!         4,
//!         vec![
//!             MemberDefinition::new("a", PrimitiveType::INT32_HASH, 4, 0),
//!             MemberDefinition::new("b", PrimitiveType::INT32_HASH, 4, 4),
//!         ],
//!     );
//!     let mut registry = TypeRegistry::new();
//!     registry.register(pair.clone());
//!
//!     let mut file = AdfFile::new(Endian::Little);
//!     file.instances.push(Instance::new(
//!         "pair",
//!         Node::Structure {
//!             type_hash: pair.name_hash,
//!             fields: vec![
//!                 Node::scalar(PrimitiveType::INT32_HASH, Scalar::Int32(1)),
//!                 Node::scalar(PrimitiveType::INT32_HASH, Scalar::Int32(2)),
//!             ],
//!         },
//!     ));
//!     file.types.push(pair);
//!
//!     file.save("pair.adf", &registry)?;
//!     Ok(())
//! }
//! ```

pub mod adf;
pub mod adf_utils;
pub mod error;
pub mod hash;
pub mod utils;

pub use adf::{
    AdfFile, AdfWriteOptions, ArraySlot, Endian, Instance, MemberDefinition, Node, PrimitiveType,
    Scalar, TypeDefinition, TypeKind, TypeRegistry,
};
pub use error::{Error, Result};
pub use utils::{create_glob_matcher, format_size, matches_filter};
