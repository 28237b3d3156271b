//! Error taxonomy for every phase of the link (spec §7).
//!
//! Mirrors the shape of goblin's `error.rs`: a single flat enum with
//! manual `Display`/`std::error::Error` impls rather than a macro or
//! `thiserror` (not a dependency the teacher pulls in).

use core::fmt;
use core::result;

#[derive(Debug)]
pub enum Error {
    // --- Input (§7 "Input") ---
    NotMachO,
    WrongArchitecture { found: String, wanted: String },
    TruncatedLoadCommands,
    UnsupportedSectionType { section: String, reason: String },
    OldDwarfVersion(u16),
    MalformedIndirectTable,
    WrongPlatform { found: String, wanted: String },

    // --- Resolution (§7 "Resolution") ---
    DuplicateSymbol(String),
    UndefinedSymbol(String),
    BadOrdinal { symbol: String, ordinal: i64 },
    SubframeworkLinkage { client: String, dylib: String },

    // --- Layout/fixup (§7 "Layout/fixup") ---
    Rel32OutOfRange { name: String, delta: i64 },
    Branch24OutOfRange { name: String, delta: i64 },
    Branch14OutOfRange { name: String, delta: i64 },
    AbsoluteInSlideable { name: String },
    SegmentOverlap { a: String, b: String },
    ZeroFillNotAtSegmentEnd { section: String, segment: String },
    PointerInReadOnlyInSlideable { name: String },

    // --- Policy (§7 "Policy") ---
    CommonsVsDylib(String),
    WeakMismatch { symbol: String },

    // --- Collaborator failures ---
    Io(std::io::Error),
    Scroll(scroll::Error),
    Malformed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotMachO => write!(f, "input is not a Mach-O object"),
            Error::WrongArchitecture { found, wanted } => {
                write!(f, "wrong architecture: found {found}, wanted {wanted}")
            }
            Error::TruncatedLoadCommands => write!(f, "load command stream is truncated"),
            Error::UnsupportedSectionType { section, reason } => {
                write!(f, "unsupported section type in {section}: {reason}")
            }
            Error::OldDwarfVersion(v) => write!(f, "unsupported DWARF version {v}"),
            Error::MalformedIndirectTable => write!(f, "indirect symbol table is malformed"),
            Error::WrongPlatform { found, wanted } => {
                write!(f, "dylib stub targets platform {found}, wanted {wanted}")
            }
            Error::DuplicateSymbol(name) => write!(f, "duplicate symbol: {name}"),
            Error::UndefinedSymbol(name) => write!(f, "undefined symbol: {name}"),
            Error::BadOrdinal { symbol, ordinal } => {
                write!(f, "symbol {symbol} has unresolvable library ordinal {ordinal}")
            }
            Error::SubframeworkLinkage { client, dylib } => write!(
                f,
                "{client} is not an allowable client of sub-framework {dylib}"
            ),
            Error::Rel32OutOfRange { name, delta } => {
                write!(f, "rel32 out of range at {name}: delta {delta:#x}")
            }
            Error::Branch24OutOfRange { name, delta } => {
                write!(f, "bl out of range (+/-16 MiB) at {name}: delta {delta:#x}")
            }
            Error::Branch14OutOfRange { name, delta } => {
                write!(f, "bc out of range (+/-64 KiB) at {name}: delta {delta:#x}")
            }
            Error::AbsoluteInSlideable { name } => write!(
                f,
                "absolute addressing not allowed in slidable image at {name}"
            ),
            Error::SegmentOverlap { a, b } => write!(f, "segment {a} overlaps segment {b}"),
            Error::ZeroFillNotAtSegmentEnd { section, segment } => write!(
                f,
                "zero-fill section {section} is not at the end of segment {segment}"
            ),
            Error::PointerInReadOnlyInSlideable { name } => write!(
                f,
                "pointer fix-up in read-only section requires run-time rewriting: {name}"
            ),
            Error::CommonsVsDylib(name) => {
                write!(f, "tentative definition {name} conflicts with dylib export")
            }
            Error::WeakMismatch { symbol } => {
                write!(f, "weak-import mismatch for {symbol}")
            }
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Scroll(e) => write!(f, "binary parse error: {e}"),
            Error::Malformed(msg) => write!(f, "malformed input: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Scroll(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<scroll::Error> for Error {
    fn from(e: scroll::Error) -> Self {
        Error::Scroll(e)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Wraps a fatal error with the architecture it occurred under, matching
/// the driver-facing message format of spec §7:
/// `ld failed: <msg> for architecture <arch>`.
pub fn with_arch(err: Error, arch: &str) -> String {
    format!("ld failed: {err} for architecture {arch}")
}
