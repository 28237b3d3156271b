//! `View`: an architecture-parametric, endian-aware view over a
//! memory buffer, with typed accessors for headers, load commands,
//! sections, symbol entries and relocation entries (spec §2.1
//! "BinaryView").
//!
//! Grounded on the header-then-load-command-stream walk in goblin's
//! `mach::mod::MachO::parse`, lifted into a reusable cursor so both
//! `RelocatableReader` and `DylibReader` can share it instead of each
//! re-deriving the walk (the teacher inlines it once, in one format;
//! we need it for two).

use crate::container::{Ctx, Width};
use crate::error::{Error, Result};
use crate::macho::constants::*;
use crate::macho::raw::*;
use scroll::Pread;

pub struct View<'a> {
    pub data: &'a [u8],
    pub ctx: Ctx,
}

impl<'a> View<'a> {
    /// Peeks the magic number to determine word width and endianness,
    /// without committing to a full header parse.
    pub fn peek_ctx(data: &'a [u8], arch: crate::container::Arch) -> Result<Ctx> {
        if data.len() < 4 {
            return Err(Error::Malformed("buffer shorter than a magic number".into()));
        }
        let magic: u32 = data.pread_with(0, scroll::LE)?;
        let endian = match magic {
            MH_MAGIC | MH_MAGIC_64 => scroll::Endian::Little,
            MH_CIGAM | MH_CIGAM_64 => scroll::Endian::Big,
            _ => return Err(Error::NotMachO),
        };
        let width = match magic {
            MH_MAGIC | MH_CIGAM => Width::W32,
            MH_MAGIC_64 | MH_CIGAM_64 => Width::W64,
            _ => return Err(Error::NotMachO),
        };
        Ok(Ctx { arch, width, endian })
    }

    pub fn new(data: &'a [u8], ctx: Ctx) -> Self {
        View { data, ctx }
    }

    pub fn header(&self) -> Result<(Header, usize)> {
        let le = self.ctx.endian;
        if self.ctx.is_64() {
            let header: Header = self.data.pread_with(0, le)?;
            Ok((header, SIZEOF_HEADER_64))
        } else {
            // the 32-bit header omits the trailing `reserved` field
            let magic: u32 = self.data.pread_with(0, le)?;
            let cputype: u32 = self.data.pread_with(4, le)?;
            let cpusubtype: u32 = self.data.pread_with(8, le)?;
            let filetype: u32 = self.data.pread_with(12, le)?;
            let ncmds: u32 = self.data.pread_with(16, le)?;
            let sizeofcmds: u32 = self.data.pread_with(20, le)?;
            let flags: u32 = self.data.pread_with(24, le)?;
            Ok((
                Header {
                    magic,
                    cputype,
                    cpusubtype,
                    filetype,
                    ncmds,
                    sizeofcmds,
                    flags,
                    reserved: 0,
                },
                SIZEOF_HEADER_32,
            ))
        }
    }

    pub fn load_command_header(&self, offset: usize) -> Result<LoadCommandHeader> {
        Ok(self.data.pread_with(offset, self.ctx.endian)?)
    }

    pub fn segment_32(&self, offset: usize) -> Result<SegmentCommand32> {
        Ok(self.data.pread_with(offset, self.ctx.endian)?)
    }

    pub fn segment_64(&self, offset: usize) -> Result<SegmentCommand64> {
        Ok(self.data.pread_with(offset, self.ctx.endian)?)
    }

    pub fn section_32(&self, offset: usize) -> Result<Section32> {
        Ok(self.data.pread_with(offset, self.ctx.endian)?)
    }

    pub fn section_64(&self, offset: usize) -> Result<Section64> {
        Ok(self.data.pread_with(offset, self.ctx.endian)?)
    }

    pub fn symtab_command(&self, offset: usize) -> Result<SymtabCommand> {
        Ok(self.data.pread_with(offset, self.ctx.endian)?)
    }

    pub fn dysymtab_command(&self, offset: usize) -> Result<DysymtabCommand> {
        Ok(self.data.pread_with(offset, self.ctx.endian)?)
    }

    pub fn dylib_command(&self, offset: usize) -> Result<DylibCommand> {
        Ok(self.data.pread_with(offset, self.ctx.endian)?)
    }

    pub fn entry_point_command(&self, offset: usize) -> Result<EntryPointCommand> {
        Ok(self.data.pread_with(offset, self.ctx.endian)?)
    }

    pub fn dyld_info_command(&self, offset: usize) -> Result<DyldInfoCommand> {
        Ok(self.data.pread_with(offset, self.ctx.endian)?)
    }

    pub fn nlist(&self, offset: usize) -> Result<Nlist> {
        Ok(if self.ctx.is_64() {
            self.data.pread_with::<Nlist64>(offset, self.ctx.endian)?.into()
        } else {
            self.data.pread_with::<Nlist32>(offset, self.ctx.endian)?.into()
        })
    }

    pub fn nlist_size(&self) -> usize {
        if self.ctx.is_64() {
            SIZEOF_NLIST_64
        } else {
            SIZEOF_NLIST_32
        }
    }

    pub fn relocation(&self, offset: usize) -> Result<RelocationInfo> {
        Ok(self.data.pread_with(offset, self.ctx.endian)?)
    }

    pub fn cstr(&self, offset: usize) -> Result<&'a str> {
        Ok(self.data.pread(offset)?)
    }

    pub fn fixed_str16(&self, offset: usize) -> Result<&'a str> {
        let bytes = &self.data[offset..offset + 16];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(16);
        std::str::from_utf8(&bytes[..end]).map_err(|_| Error::Malformed("non-utf8 name".into()))
    }

    pub fn u32_at(&self, offset: usize) -> Result<u32> {
        Ok(self.data.pread_with(offset, self.ctx.endian)?)
    }

    pub fn i32_at(&self, offset: usize) -> Result<i32> {
        Ok(self.data.pread_with(offset, self.ctx.endian)?)
    }
}
