//! atomlink: a target-architecture-parametric static linker core.
//!
//! This crate implements the internal model and link engine of a
//! static linker that turns relocatable objects, static archives and
//! dynamic-library stubs into a single executable, dynamic library,
//! bundle, or merged relocatable object. Command-line parsing,
//! universal-binary slicing, and on-disk mmap mechanics are left to
//! callers; this crate owns everything from "bytes of one input file"
//! to "bytes of the linked output."

pub mod archive;
pub mod atom;
pub mod container;
pub mod dead_strip;
pub mod debug_info;
pub mod error;
pub mod exports_trie;
pub mod fixup;
pub mod islands;
pub mod layout;
pub mod macho;
pub mod options;
pub mod reader;
pub mod resolver;
pub mod strtab;
pub mod stubs;
pub mod symtab;
pub mod tools;
pub mod writer;

pub use error::{Error, Result};
pub use options::LinkOptions;
pub use writer::{link, ArchiveInput, DylibInput, LinkOutput, LinkRequest, ObjectInput};
