//! Unix (SysV variant) static archive parsing (spec §4's
//! `ArchiveReader` sits on top of this; spec §6 "Input static-archive"
//! describes the contract this module implements).
//!
//! Grounded on goblin's `archive/mod.rs`: the same `FileHeader`
//! layout, the same `"/               "` symbol-lookup-table magic
//! name, the same linear member walk with even-byte padding. Rewritten
//! against `scroll` (the crate's only binary-I/O dependency) rather
//! than `byteorder`, which the inherited `Cargo.toml` doesn't carry.

use crate::error::{Error, Result};
use scroll::Pread;
use std::collections::HashMap;

pub const SIZEOF_MAGIC: usize = 8;
pub const MAGIC: &[u8; SIZEOF_MAGIC] = b"!<arch>\x0a";

const SIZEOF_FILE_IDENTIFIER: usize = 16;
const SIZEOF_FILE_SIZE: usize = 10;
pub const SIZEOF_FILE_HEADER: usize = SIZEOF_FILE_IDENTIFIER + 12 + 6 + 6 + 8 + SIZEOF_FILE_SIZE + 2;

/// The special index member named `"/               "`: a big-endian
/// symbol-index table used to drive load-on-demand member lookup.
pub const SYMBOL_LOOKUP_NAME: &str = "/               ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub identifier: String,
    pub size: usize,
}

impl FileHeader {
    pub fn parse(bytes: &[u8], offset: usize) -> Result<FileHeader> {
        if offset + SIZEOF_FILE_HEADER > bytes.len() {
            return Err(Error::Malformed("truncated archive file header".into()));
        }
        let raw = &bytes[offset..offset + SIZEOF_FILE_HEADER];
        let identifier = std::str::from_utf8(&raw[0..SIZEOF_FILE_IDENTIFIER])
            .map_err(|_| Error::Malformed("non-utf8 archive member name".into()))?
            .to_string();
        let size_field = &raw[48..48 + SIZEOF_FILE_SIZE];
        let size_str = std::str::from_utf8(size_field)
            .map_err(|_| Error::Malformed("non-utf8 archive file size".into()))?
            .trim_end();
        let size = size_str
            .parse::<usize>()
            .map_err(|_| Error::Malformed(format!("bad archive file size {size_str:?}")))?;
        let terminator = &raw[58..60];
        if terminator != [0x60, 0x0a] {
            return Err(Error::Malformed("bad archive file header terminator".into()));
        }
        Ok(FileHeader { identifier, size })
    }
}

#[derive(Debug, Clone)]
pub struct Member {
    pub header: FileHeader,
    /// Offset of the member's content, immediately following the header.
    pub offset: usize,
}

impl Member {
    pub fn name(&self) -> &str {
        self.header.identifier.trim_end()
    }

    pub fn size(&self) -> usize {
        self.header.size
    }
}

/// The symbol→member index parsed out of the `"/"`-named member, used
/// to drive load-on-demand (spec §2 item 4, §4.1's archive contract).
#[derive(Debug, Default)]
pub struct SymbolIndex {
    /// Byte offsets (into the archive) of the member providing each symbol.
    pub symbol_offsets: Vec<u32>,
    pub names: Vec<String>,
}

impl SymbolIndex {
    pub fn parse(bytes: &[u8]) -> Result<SymbolIndex> {
        if bytes.len() < 4 {
            return Ok(SymbolIndex::default());
        }
        let count: u32 = bytes.pread_with(0, scroll::BE)?;
        let count = count as usize;
        let mut symbol_offsets = Vec::with_capacity(count);
        let mut pos = 4usize;
        for _ in 0..count {
            let off: u32 = bytes.pread_with(pos, scroll::BE)?;
            symbol_offsets.push(off);
            pos += 4;
        }
        let strtab = &bytes[pos..];
        let mut names = Vec::with_capacity(count);
        let mut i = 0;
        while names.len() < count && i < strtab.len() {
            let end = strtab[i..].iter().position(|&b| b == 0).map(|p| i + p);
            match end {
                Some(end) => {
                    let s = std::str::from_utf8(&strtab[i..end])
                        .map_err(|_| Error::Malformed("non-utf8 archive symbol name".into()))?;
                    names.push(s.to_string());
                    i = end + 1;
                }
                None => break,
            }
        }
        Ok(SymbolIndex { symbol_offsets, names })
    }

    /// Returns the archive-relative offset of the member defining `symbol`.
    pub fn lookup(&self, symbol: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n == symbol)
            .and_then(|i| self.symbol_offsets.get(i).copied())
    }
}

/// A parsed static archive: the member table plus (if present) the
/// symbol lookup index.
#[derive(Debug)]
pub struct Archive<'a> {
    data: &'a [u8],
    members_by_offset: HashMap<usize, Member>,
    members_by_name: HashMap<String, usize>,
    pub index: SymbolIndex,
}

impl<'a> Archive<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Archive<'a>> {
        if data.len() < SIZEOF_MAGIC || &data[0..SIZEOF_MAGIC] != MAGIC {
            return Err(Error::Malformed("invalid archive magic".into()));
        }
        let mut members_by_offset = HashMap::new();
        let mut members_by_name = HashMap::new();
        let mut pos = SIZEOF_MAGIC;
        while pos + SIZEOF_FILE_HEADER <= data.len() {
            let header = FileHeader::parse(data, pos)?;
            let content_offset = pos + SIZEOF_FILE_HEADER;
            let size = header.size;
            let name = header.identifier.trim_end().to_string();
            members_by_name.entry(name).or_insert(content_offset);
            members_by_offset.insert(
                content_offset,
                Member {
                    header,
                    offset: content_offset,
                },
            );
            pos = content_offset + size;
            if pos & 1 == 1 {
                pos += 1; // even-byte member padding
            }
        }
        let mut index = SymbolIndex::default();
        if let Some(&off) = members_by_name.get(SYMBOL_LOOKUP_NAME.trim_end()) {
            if let Some(member) = members_by_offset.get(&off) {
                let content = &data[member.offset..member.offset + member.size()];
                index = SymbolIndex::parse(content)?;
            }
        }
        Ok(Archive {
            data,
            members_by_offset,
            members_by_name,
            index,
        })
    }

    pub fn member_at(&self, offset: usize) -> Option<&Member> {
        self.members_by_offset.get(&offset)
    }

    pub fn member_named(&self, name: &str) -> Option<&Member> {
        self.members_by_name
            .get(name)
            .and_then(|off| self.members_by_offset.get(off))
    }

    pub fn extract(&self, member: &Member) -> &'a [u8] {
        &self.data[member.offset..member.offset + member.size()]
    }

    /// All member offsets, in archive order — used by `-force_load`
    /// (spec §2 item 4's "force-load-all" policy).
    pub fn all_members(&self) -> impl Iterator<Item = &Member> {
        let mut v: Vec<&Member> = self.members_by_offset.values().collect();
        v.sort_by_key(|m| m.offset);
        v.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_archive(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        for (name, content) in members {
            let mut ident = format!("{name}/");
            ident.truncate(16);
            while ident.len() < 16 {
                ident.push(' ');
            }
            out.extend_from_slice(ident.as_bytes());
            out.extend_from_slice(b"0           "); // timestamp
            out.extend_from_slice(b"0     "); // owner
            out.extend_from_slice(b"0     "); // group
            out.extend_from_slice(b"0       "); // mode
            let size_str = format!("{:<10}", content.len());
            out.extend_from_slice(size_str.as_bytes());
            out.extend_from_slice(&[0x60, 0x0a]);
            out.extend_from_slice(content);
            if content.len() & 1 == 1 {
                out.push(b'\n');
            }
        }
        out
    }

    #[test]
    fn parses_simple_archive() {
        let bytes = build_archive(&[("a.o", b"hello"), ("b.o", b"world!")]);
        let archive = Archive::parse(&bytes).unwrap();
        let a = archive.member_named("a.o/").unwrap();
        assert_eq!(archive.extract(a), b"hello");
        let b = archive.member_named("b.o/").unwrap();
        assert_eq!(archive.extract(b), b"world!");
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = b"not an archive at all!!".to_vec();
        assert!(Archive::parse(&bytes).is_err());
    }
}
