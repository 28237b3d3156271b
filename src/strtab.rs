//! A byte-offset-indexed string table, used both to read an input
//! object's symbol-name strings and to build the output string pool.
//!
//! Grounded on goblin's `strtab.rs` (`Strtab`, `ctx::StrCtx`-delimited
//! lookups, `get`/`to_vec`). The reading half keeps the same shape;
//! the writing half (`StrtabBuilder`) is new, needed because this
//! crate also *emits* a string pool (spec §6: "string table begins
//! with a space and `\0` so that offsets `0` and `1` name the empty
//! string").

use core::fmt;
use scroll::ctx::StrCtx;
use scroll::Pread;

pub struct Strtab<'a> {
    bytes: &'a [u8],
    delim: StrCtx,
}

impl<'a> Strtab<'a> {
    pub fn new(bytes: &'a [u8], delim: u8) -> Self {
        Strtab {
            bytes,
            delim: StrCtx::Delimiter(delim),
        }
    }

    pub fn get_at(&self, idx: usize) -> Option<&'a str> {
        if idx >= self.bytes.len() {
            return None;
        }
        self.bytes.pread_with::<&str>(idx, self.delim).ok()
    }

    pub fn to_vec(&self) -> Vec<String> {
        let len = self.bytes.len();
        let mut strings = Vec::new();
        let mut i = 0;
        while i < len {
            match self.get_at(i) {
                Some(s) => {
                    i += s.len() + 1;
                    strings.push(s.to_string());
                }
                None => break,
            }
        }
        strings
    }
}

impl<'a> fmt::Debug for Strtab<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Strtab({} bytes)", self.bytes.len())
    }
}

/// Accumulates strings into a single pool for the output file,
/// de-duplicating exact matches and reserving offsets `0`/`1` for the
/// empty string as spec §6 requires (`" \0"` prefix).
#[derive(Debug, Default)]
pub struct StrtabBuilder {
    bytes: Vec<u8>,
    offsets: std::collections::HashMap<String, u32>,
}

impl StrtabBuilder {
    pub fn new() -> Self {
        // byte 0 is a space, byte 1 is the terminating nul: offset 1
        // names the empty string, matching ld64's on-disk convention.
        StrtabBuilder {
            bytes: vec![b' ', 0],
            offsets: std::collections::HashMap::new(),
        }
    }

    /// Interns `name`, returning its byte offset in the pool. The
    /// empty string always returns `1`.
    pub fn intern(&mut self, name: &str) -> u32 {
        if name.is_empty() {
            return 1;
        }
        if let Some(&off) = self.offsets.get(name) {
            return off;
        }
        let off = self.bytes.len() as u32;
        self.bytes.extend_from_slice(name.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(name.to_string(), off);
        off
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        false // always carries the leading " \0"
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_vec_no_final_null() {
        let bytes = b"\0printf\0memmove\0busta";
        let strtab = Strtab::new(bytes, 0);
        let vec = strtab.to_vec();
        assert_eq!(vec, vec!["", "printf", "memmove", "busta"]);
    }

    #[test]
    fn builder_reserves_empty_string_at_offset_one() {
        let mut b = StrtabBuilder::new();
        assert_eq!(b.intern(""), 1);
        let off = b.intern("_main");
        assert!(off >= 2);
        // interning again returns the same offset
        assert_eq!(b.intern("_main"), off);
    }

    #[test]
    fn builder_dedups_distinct_names() {
        let mut b = StrtabBuilder::new();
        let a = b.intern("_foo");
        let c = b.intern("_bar");
        assert_ne!(a, c);
        assert_eq!(b.intern("_foo"), a);
    }
}
