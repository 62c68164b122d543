//! ELF64 header definitions used by `exec`.
//!
//! The ELF64 layout doesn't change with the rest of the kernel. Fields are
//! `pub` since `exec.rs` constructs these from raw bytes via
//! `uaccess`-style reads rather than a borrowed inode.

pub const ELF_MAGIC: u32 = 0x464C457F; // "\x7FELF" little endian

pub const ELF_CLASS_64: u8 = 2;
pub const ELF_DATA_LSB: u8 = 1;
pub const ELF_MACHINE_RISCV: u16 = 243;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ElfHeader {
    pub magic: u32,
    pub ident: [u8; 12],
    pub hdr_type: u16,
    pub machine: u16,
    pub version: u32,
    pub entry: u64,
    pub phoff: u64,
    pub shoff: u64,
    pub flags: u32,
    pub ehsize: u16,
    pub phentsize: u16,
    pub phnum: u16,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

impl ElfHeader {
    pub const fn zeroed() -> Self {
        ElfHeader {
            magic: 0,
            ident: [0; 12],
            hdr_type: 0,
            machine: 0,
            version: 0,
            entry: 0,
            phoff: 0,
            shoff: 0,
            flags: 0,
            ehsize: 0,
            phentsize: 0,
            phnum: 0,
            shentsize: 0,
            shnum: 0,
            shstrndx: 0,
        }
    }

    /// Structural validity check (magic, class, endianness, version, machine).
    pub fn is_valid(&self) -> bool {
        self.magic == ELF_MAGIC
            && self.ident.get(4).copied() == Some(ELF_CLASS_64)
            && self.ident.get(5).copied() == Some(ELF_DATA_LSB)
            && self.version == 1
            && self.machine == ELF_MACHINE_RISCV
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct ProgramHeader {
    pub hdr_type: u32,
    pub flags: u32,
    pub off: u64,
    pub vaddr: u64,
    pub paddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

impl ProgramHeader {
    pub const fn zeroed() -> Self {
        ProgramHeader {
            hdr_type: 0,
            flags: 0,
            off: 0,
            vaddr: 0,
            paddr: 0,
            filesz: 0,
            memsz: 0,
            align: 0,
        }
    }
}

pub const ELF_PROG_LOAD: u32 = 1;

pub const ELF_PROG_FLAG_EXEC: u32 = 1;
pub const ELF_PROG_FLAG_WRITE: u32 = 2;
pub const ELF_PROG_FLAG_READ: u32 = 4;
