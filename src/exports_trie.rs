//! Exports trie: the compressed byte-string radix tree that `dyld`
//! consults to resolve symbols exported by a final linked image (spec
//! §4.8). Grounded directly on `ExportsTrie.cpp`'s `Node::addSymbol`
//! (prefix-splice insertion), `Node::updateOffset` (fixed-point offset
//! assignment) and `Node::appendToStream` (three node shapes), rewired
//! from raw-pointer nodes onto an arena `Vec<Node>` indexed by `usize`
//! the same way `atom::AtomGraph` indexes atoms.

use crate::tools::{append_uleb128, read_uleb128, uleb128_size};

pub const EXPORT_SYMBOL_FLAGS_KIND_REGULAR: u64 = 0x00;
pub const EXPORT_SYMBOL_FLAGS_KIND_THREAD_LOCAL: u64 = 0x01;
pub const EXPORT_SYMBOL_FLAGS_KIND_ABSOLUTE: u64 = 0x02;
pub const EXPORT_SYMBOL_FLAGS_WEAK_DEFINITION: u64 = 0x04;
pub const EXPORT_SYMBOL_FLAGS_REEXPORT: u64 = 0x08;
pub const EXPORT_SYMBOL_FLAGS_STUB_AND_RESOLVER: u64 = 0x10;

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub offset: u64,
    pub flags: u64,
    pub other: u64,
    pub import_name: Option<String>,
}

impl Export {
    pub fn regular(name: impl Into<String>, offset: u64) -> Self {
        Export { name: name.into(), offset, flags: EXPORT_SYMBOL_FLAGS_KIND_REGULAR, other: 0, import_name: None }
    }

    pub fn weak(name: impl Into<String>, offset: u64) -> Self {
        Export { name: name.into(), offset, flags: EXPORT_SYMBOL_FLAGS_KIND_REGULAR | EXPORT_SYMBOL_FLAGS_WEAK_DEFINITION, other: 0, import_name: None }
    }

    pub fn reexport(name: impl Into<String>, ordinal: u64, import_name: Option<String>) -> Self {
        Export { name: name.into(), offset: 0, flags: EXPORT_SYMBOL_FLAGS_REEXPORT, other: ordinal, import_name }
    }
}

#[derive(Debug, Clone)]
struct Edge {
    partial: String,
    child: usize,
}

#[derive(Debug, Clone)]
struct Node {
    cumulative_len: usize,
    children: Vec<Edge>,
    symbol: Option<Export>,
    trie_offset: u32,
}

pub struct ExportsTrie {
    bytes: Vec<u8>,
}

impl ExportsTrie {
    /// Builds the trie byte stream for `exports`, splicing each name in
    /// one at a time the way the source's `buildTrieBytes` does.
    pub fn build(exports: &[Export]) -> Self {
        let mut nodes = vec![Node { cumulative_len: 0, children: Vec::new(), symbol: None, trie_offset: 0 }];
        for export in exports {
            add_symbol(&mut nodes, 0, export);
        }

        loop {
            let mut cur_offset = 0u32;
            let mut more = false;
            for idx in 0..nodes.len() {
                if update_offset(&mut nodes, idx, &mut cur_offset) {
                    more = true;
                }
            }
            if !more {
                break;
            }
        }

        let mut bytes = Vec::new();
        for idx in 0..nodes.len() {
            append_node(&nodes, idx, &mut bytes);
        }
        while bytes.len() % 8 != 0 {
            bytes.push(0);
        }
        ExportsTrie { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn lookup(&self, name: &str) -> Option<Export> {
        lookup(&self.bytes, name)
    }
}

fn add_symbol(nodes: &mut Vec<Node>, node_idx: usize, export: &Export) {
    let cumulative_len = nodes[node_idx].cumulative_len;
    let tail = export.name[cumulative_len..].to_string();

    let mut matched = None;
    for (edge_idx, edge) in nodes[node_idx].children.iter().enumerate() {
        if edge.partial.as_bytes().first() == tail.as_bytes().first() {
            matched = Some(edge_idx);
            break;
        }
    }

    if let Some(edge_idx) = matched {
        let edge_partial = nodes[node_idx].children[edge_idx].partial.clone();
        let edge_child = nodes[node_idx].children[edge_idx].child;
        if tail.starts_with(&edge_partial) {
            add_symbol(nodes, edge_child, export);
            return;
        }
        let common = common_prefix_len(&edge_partial, &tail);
        debug_assert!(common > 0, "first bytes matched so some prefix must be shared");
        let new_cumulative_len = cumulative_len + common;
        let c_idx = nodes.len();
        nodes.push(Node { cumulative_len: new_cumulative_len, children: Vec::new(), symbol: None, trie_offset: 0 });
        nodes[c_idx].children.push(Edge { partial: edge_partial[common..].to_string(), child: edge_child });
        nodes[node_idx].children[edge_idx].partial = edge_partial[..common].to_string();
        nodes[node_idx].children[edge_idx].child = c_idx;
        add_symbol(nodes, c_idx, export);
        return;
    }

    let new_idx = nodes.len();
    nodes.push(Node { cumulative_len: export.name.len(), children: Vec::new(), symbol: Some(export.clone()), trie_offset: 0 });
    nodes[node_idx].children.push(Edge { partial: tail, child: new_idx });
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Node size in bytes: `length of export info when no export info`
/// (source's comment), plus child-count byte, plus each edge's
/// string/offset pair.
fn update_offset(nodes: &mut [Node], idx: usize, cur_offset: &mut u32) -> bool {
    let symbol = nodes[idx].symbol.clone();
    let children = nodes[idx].children.clone();

    let mut node_size = 1u32;
    if let Some(symbol) = &symbol {
        let mut info_size;
        if symbol.flags & EXPORT_SYMBOL_FLAGS_REEXPORT != 0 {
            info_size = uleb128_size(symbol.flags) as u32 + uleb128_size(symbol.other) as u32;
            if let Some(import_name) = &symbol.import_name {
                info_size += import_name.len() as u32;
            }
            info_size += 1;
        } else {
            info_size = uleb128_size(symbol.flags) as u32 + uleb128_size(symbol.offset) as u32;
            if symbol.flags & EXPORT_SYMBOL_FLAGS_STUB_AND_RESOLVER != 0 {
                info_size += uleb128_size(symbol.other) as u32;
            }
        }
        node_size = info_size + uleb128_size(info_size as u64) as u32;
    }

    node_size += 1;
    for edge in &children {
        node_size += edge.partial.len() as u32 + 1 + uleb128_size(nodes[edge.child].trie_offset as u64) as u32;
    }

    let changed = nodes[idx].trie_offset != *cur_offset;
    nodes[idx].trie_offset = *cur_offset;
    *cur_offset += node_size;
    changed
}

fn append_node(nodes: &[Node], idx: usize, out: &mut Vec<u8>) {
    let node = &nodes[idx];
    match &node.symbol {
        Some(symbol) if symbol.flags & EXPORT_SYMBOL_FLAGS_REEXPORT != 0 => {
            let import_name = symbol.import_name.as_deref().unwrap_or("");
            let node_size = uleb128_size(symbol.flags) + uleb128_size(symbol.other) + import_name.len() + 1;
            out.push(node_size as u8);
            append_uleb128(out, symbol.flags);
            append_uleb128(out, symbol.other);
            out.extend_from_slice(import_name.as_bytes());
            out.push(0);
        }
        Some(symbol) if symbol.flags & EXPORT_SYMBOL_FLAGS_STUB_AND_RESOLVER != 0 => {
            let node_size = uleb128_size(symbol.flags) + uleb128_size(symbol.offset) + uleb128_size(symbol.other);
            out.push(node_size as u8);
            append_uleb128(out, symbol.flags);
            append_uleb128(out, symbol.offset);
            append_uleb128(out, symbol.other);
        }
        Some(symbol) => {
            let node_size = uleb128_size(symbol.flags) + uleb128_size(symbol.offset);
            out.push(node_size as u8);
            append_uleb128(out, symbol.flags);
            append_uleb128(out, symbol.offset);
        }
        None => out.push(0),
    }

    out.push(node.children.len() as u8);
    for edge in &node.children {
        out.extend_from_slice(edge.partial.as_bytes());
        out.push(0);
        append_uleb128(out, nodes[edge.child].trie_offset as u64);
    }
}

/// Walks a serialized trie looking for `name`, the way `dyld` (and the
/// source's `hasExportedSymbol`) resolves a single export.
fn lookup(bytes: &[u8], name: &str) -> Option<Export> {
    let mut offset = 0usize;
    let mut remaining = name.as_bytes();

    loop {
        let (node_size, mut pos) = read_uleb128(bytes, offset)?;
        if remaining.is_empty() {
            if node_size == 0 {
                return None;
            }
            return parse_export_info(bytes, pos, name);
        }
        pos += node_size as usize;

        let child_count = *bytes.get(pos)?;
        pos += 1;
        let mut next = None;
        for _ in 0..child_count {
            let start = pos;
            while *bytes.get(pos)? != 0 {
                pos += 1;
            }
            let edge_str = &bytes[start..pos];
            pos += 1;
            let (child_offset, new_pos) = read_uleb128(bytes, pos)?;
            pos = new_pos;
            if remaining.starts_with(edge_str) {
                remaining = &remaining[edge_str.len()..];
                next = Some(child_offset as usize);
                break;
            }
        }
        offset = next?;
    }
}

fn parse_export_info(bytes: &[u8], mut pos: usize, name: &str) -> Option<Export> {
    let (flags, p) = read_uleb128(bytes, pos)?;
    pos = p;
    if flags & EXPORT_SYMBOL_FLAGS_REEXPORT != 0 {
        let (other, p) = read_uleb128(bytes, pos)?;
        pos = p;
        let start = pos;
        while *bytes.get(pos)? != 0 {
            pos += 1;
        }
        let import_name = if pos > start { Some(String::from_utf8_lossy(&bytes[start..pos]).into_owned()) } else { None };
        Some(Export { name: name.to_string(), offset: 0, flags, other, import_name })
    } else if flags & EXPORT_SYMBOL_FLAGS_STUB_AND_RESOLVER != 0 {
        let (offset, p) = read_uleb128(bytes, pos)?;
        pos = p;
        let (other, _) = read_uleb128(bytes, pos)?;
        Some(Export { name: name.to_string(), offset, flags, other, import_name: None })
    } else {
        let (offset, _) = read_uleb128(bytes, pos)?;
        Some(Export { name: name.to_string(), offset, flags, other: 0, import_name: None })
    }
}
