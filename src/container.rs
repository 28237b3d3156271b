//! Architecture and pointer-width parametrization.
//!
//! Grounded on the `container::Ctx` type goblin's `mach::symbols`
//! module dispatches on (`Container::{Little, Big}` there names 32 vs.
//! 64-bit pointer width, an unfortunately-overloaded name we rename to
//! `Width` here to avoid confusion with endianness).

use scroll::Endian;

/// Pointer width of the container being read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    W32,
    W64,
}

impl Width {
    pub fn pointer_size(self) -> u64 {
        match self {
            Width::W32 => 4,
            Width::W64 => 8,
        }
    }
}

/// One of the ISAs this linker can target. Endianness is carried
/// alongside (most of these are little-endian only in practice, but
/// the data model stays endian-parametric per spec §1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Arm,
    Arm64,
    Ppc,
    Ppc64,
}

impl Arch {
    pub fn width(self) -> Width {
        match self {
            Arch::X86 | Arch::Arm | Arch::Ppc => Width::W32,
            Arch::X86_64 | Arch::Arm64 | Arch::Ppc64 => Width::W64,
        }
    }

    pub fn default_endian(self) -> Endian {
        match self {
            Arch::Ppc | Arch::Ppc64 => Endian::Big,
            _ => Endian::Little,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Arch::X86 => "i386",
            Arch::X86_64 => "x86_64",
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::Ppc => "ppc",
            Arch::Ppc64 => "ppc64",
        }
    }

    /// Whether `branch24`-class relocations on this arch ever need PPC
    /// style long-branch islands (spec §4.5).
    pub fn uses_branch_islands(self) -> bool {
        matches!(self, Arch::Ppc | Arch::Ppc64)
    }

    /// Whether this arch's `__text` can contain a Thumb/ARM mode split
    /// needing branch shims (spec §4.5).
    pub fn uses_mode_shims(self) -> bool {
        matches!(self, Arch::Arm)
    }
}

/// Bundles everything scroll needs to read/write a container-native
/// value: word size plus byte order. Parallels goblin's
/// `container::Ctx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ctx {
    pub arch: Arch,
    pub width: Width,
    pub endian: Endian,
}

impl Ctx {
    pub fn new(arch: Arch) -> Self {
        Ctx {
            arch,
            width: arch.width(),
            endian: arch.default_endian(),
        }
    }

    pub fn with_endian(arch: Arch, endian: Endian) -> Self {
        Ctx {
            arch,
            width: arch.width(),
            endian,
        }
    }

    pub fn is_64(&self) -> bool {
        matches!(self.width, Width::W64)
    }
}
