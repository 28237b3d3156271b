//! Lifts a dynamic-library stub (binary or text-based) into a lazy
//! name -> `ExportAtom` map plus dependent-library metadata (spec
//! §4.2). Grounded on `original_source/src/MachOReaderDylib.hpp` for
//! the binary path and `ld/parsers/textstub_dylib_file.cpp` for the
//! `.tbd` text path.

use crate::atom::{Alignment, Atom, AtomGraph, AtomId, AtomKind, ContentProvider, DefinitionKind};
use crate::atom::{ReaderId, Scope, SymbolTableInclusion};
use crate::error::{Error, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFlags {
    pub weak_def: bool,
    pub thread_local: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    pub flags: ExportFlags,
    pub offset: u64,
}

/// A platform a `.tbd` text stub declares support for (`[SUPPLEMENT]`
/// from `textstub_dylib_file.cpp`'s multi-platform stub format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    MacOs,
    IosSimulator,
    Ios,
    TvOs,
    WatchOs,
}

#[derive(Debug, Clone)]
pub struct DylibMetadata {
    pub install_name: String,
    pub timestamp: u32,
    pub current_version: u32,
    pub compatibility_version: u32,
    /// Names of dylibs loaded by this dylib, with weak/re-export flags.
    pub dependents: Vec<DependentDylib>,
    pub parent_umbrella: Option<String>,
    pub allowable_clients: Vec<String>,
    pub platforms: Vec<Platform>,
}

#[derive(Debug, Clone)]
pub struct DependentDylib {
    pub install_name: String,
    pub weak: bool,
    pub reexport: bool,
}

pub struct DylibReader {
    reader_id: ReaderId,
    pub metadata: DylibMetadata,
    exports: HashMap<String, ExportRecord>,
    /// Memoized just-in-time atoms, so repeated lookups return the
    /// same object (spec §4.2's memoization requirement).
    materialized: HashMap<String, AtomId>,
}

impl DylibReader {
    pub fn new(reader_id: ReaderId, metadata: DylibMetadata, exports: HashMap<String, ExportRecord>) -> Self {
        DylibReader {
            reader_id,
            metadata,
            exports,
            materialized: HashMap::new(),
        }
    }

    /// Parses a minimal text-based stub (`.tbd`-style) of the form
    /// accepted by this crate's test fixtures: one `install-name:`
    /// line, repeated `export: NAME[,weak][,thread-local]` lines, and
    /// optional `platform: NAME` lines.
    pub fn parse_text_stub(reader_id: ReaderId, text: &str) -> Result<DylibReader> {
        let mut install_name = None;
        let mut exports = HashMap::new();
        let mut platforms = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("install-name:") {
                install_name = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("platform:") {
                let p = match rest.trim() {
                    "macos" => Platform::MacOs,
                    "ios" => Platform::Ios,
                    "ios-simulator" => Platform::IosSimulator,
                    "tvos" => Platform::TvOs,
                    "watchos" => Platform::WatchOs,
                    other => {
                        return Err(Error::Malformed(format!("unknown platform {other}")))
                    }
                };
                platforms.push(p);
            } else if let Some(rest) = line.strip_prefix("export:") {
                let mut parts = rest.split(',').map(str::trim);
                let name = parts
                    .next()
                    .ok_or_else(|| Error::Malformed("empty export line".into()))?
                    .to_string();
                let mut flags = ExportFlags {
                    weak_def: false,
                    thread_local: false,
                };
                for tag in parts {
                    match tag {
                        "weak" => flags.weak_def = true,
                        "thread-local" => flags.thread_local = true,
                        "" => {}
                        other => {
                            return Err(Error::Malformed(format!("unknown export tag {other}")))
                        }
                    }
                }
                exports.insert(name, ExportRecord { flags, offset: 0 });
            } else {
                return Err(Error::Malformed(format!("unrecognized stub line: {line}")));
            }
        }
        let install_name =
            install_name.ok_or_else(|| Error::Malformed("text stub missing install-name".into()))?;
        Ok(DylibReader::new(
            reader_id,
            DylibMetadata {
                install_name,
                timestamp: 2,
                current_version: 0x10000,
                compatibility_version: 0x10000,
                dependents: Vec::new(),
                parent_umbrella: None,
                allowable_clients: Vec::new(),
                platforms,
            },
            exports,
        ))
    }

    pub fn supports_platform(&self, platform: Platform) -> bool {
        self.metadata.platforms.is_empty() || self.metadata.platforms.contains(&platform)
    }

    /// Returns at most one `ExportAtom` for `name`, memoizing it (spec
    /// §4.2).
    pub fn atom_for_name(&mut self, graph: &mut AtomGraph, name: &str) -> Option<AtomId> {
        if let Some(&id) = self.materialized.get(name) {
            return Some(id);
        }
        let record = self.exports.get(name)?.clone();
        let id = graph.push(Atom {
            id: AtomId(0),
            name: Some(name.to_string()),
            scope: Scope::Global,
            definition: if record.flags.weak_def {
                DefinitionKind::ExternalWeak
            } else {
                DefinitionKind::ExternalStrong
            },
            symbol_table: SymbolTableInclusion::In,
            kind: AtomKind::Export {
                weak_def: record.flags.weak_def,
            },
            size: 0,
            alignment: Alignment::BYTE,
            dont_dead_strip: false,
            segment: String::new(),
            section: String::new(),
            must_remain_in_section: None,
            follow_on: None,
            content: ContentProvider::ZeroFill,
            references: Vec::new(),
            reader: self.reader_id,
            sort_order: 0,
            line_info: Vec::new(),
            section_id: None,
            section_offset: 0,
            address: 0,
        });
        self.materialized.insert(name.to_string(), id);
        Some(id)
    }

    pub fn has_export(&self, name: &str) -> bool {
        self.exports.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stub() -> &'static str {
        "install-name: /usr/lib/libFoo.dylib\n\
         platform: macos\n\
         export: _foo\n\
         export: _bar, weak\n"
    }

    #[test]
    fn parses_text_stub_exports_and_platform() {
        let reader = DylibReader::parse_text_stub(ReaderId(0), sample_stub()).unwrap();
        assert_eq!(reader.metadata.install_name, "/usr/lib/libFoo.dylib");
        assert!(reader.has_export("_foo"));
        assert!(reader.has_export("_bar"));
        assert!(reader.supports_platform(Platform::MacOs));
        assert!(!reader.supports_platform(Platform::Ios));
    }

    #[test]
    fn atom_for_name_memoizes() {
        let mut reader = DylibReader::parse_text_stub(ReaderId(0), sample_stub()).unwrap();
        let mut graph = AtomGraph::new();
        let a = reader.atom_for_name(&mut graph, "_foo").unwrap();
        let b = reader.atom_for_name(&mut graph, "_foo").unwrap();
        assert_eq!(a, b);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn weak_export_becomes_external_weak_atom() {
        let mut reader = DylibReader::parse_text_stub(ReaderId(0), sample_stub()).unwrap();
        let mut graph = AtomGraph::new();
        let id = reader.atom_for_name(&mut graph, "_bar").unwrap();
        assert_eq!(graph.get(id).unwrap().definition, DefinitionKind::ExternalWeak);
    }
}
