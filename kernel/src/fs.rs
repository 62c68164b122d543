//! SimpleFS: the on-disk ramdisk format used only to populate the
//! in-memory VFS at boot.
//!
//! Deliberately much flatter than a real inode/log/indirect-block design:
//! one superblock, one fixed 32-entry file table, and raw file data - no
//! inodes, no indirect blocks, no journal. `SuperBlock`/`FileEntry` here are
//! laid out byte-for-byte and are also depended on by `mkfs` (via this
//! crate's `kernel_as_a_lib` feature) so the image writer and the image
//! reader can never disagree about the format.

use crate::errno::{KResult, KernelError};
use crate::param::{SIMPLEFS_BLOCK_SIZE, SIMPLEFS_DATA_START_BLOCK, SIMPLEFS_MAGIC, SIMPLEFS_MAX_FILES};
use crate::vfs::{self, VNodeRef};

pub const BLOCK_SIZE: usize = SIMPLEFS_BLOCK_SIZE;
pub const MAX_FILES: usize = SIMPLEFS_MAX_FILES;

pub const FLAG_EXISTS: u32 = 1 << 0;
pub const FLAG_DIRECTORY: u32 = 1 << 1;

/// Block 0, 512 bytes.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SuperBlock {
    pub magic: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub file_count: u32,
    pub reserved: [u8; 496],
}

impl SuperBlock {
    pub const fn zeroed() -> Self {
        SuperBlock {
            magic: 0,
            total_blocks: 0,
            free_blocks: 0,
            file_count: 0,
            reserved: [0; 496],
        }
    }

    /// Parses a superblock out of the image's first block. Sizes are
    /// little-endian.
    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        if b.len() < BLOCK_SIZE {
            return None;
        }
        let magic = u32::from_le_bytes(b[0..4].try_into().ok()?);
        let total_blocks = u32::from_le_bytes(b[4..8].try_into().ok()?);
        let free_blocks = u32::from_le_bytes(b[8..12].try_into().ok()?);
        let file_count = u32::from_le_bytes(b[12..16].try_into().ok()?);
        let mut reserved = [0u8; 496];
        reserved.copy_from_slice(&b[16..512]);
        Some(SuperBlock {
            magic,
            total_blocks,
            free_blocks,
            file_count,
            reserved,
        })
    }

    pub fn to_bytes(&self) -> [u8; BLOCK_SIZE] {
        let mut out = [0u8; BLOCK_SIZE];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..8].copy_from_slice(&self.total_blocks.to_le_bytes());
        out[8..12].copy_from_slice(&self.free_blocks.to_le_bytes());
        out[12..16].copy_from_slice(&self.file_count.to_le_bytes());
        out[16..512].copy_from_slice(&self.reserved);
        out
    }

    pub fn is_valid(&self) -> bool {
        self.magic == SIMPLEFS_MAGIC
    }
}

/// One 64-byte file-table entry.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FileEntry {
    pub name: [u8; 28],
    pub size: u32,
    pub start_block: u32,
    pub blocks_used: u32,
    pub flags: u32,
    pub reserved: [u8; 20],
}

pub const FILE_ENTRY_SIZE: usize = 64;

impl FileEntry {
    pub const fn empty() -> Self {
        FileEntry {
            name: [0; 28],
            size: 0,
            start_block: 0,
            blocks_used: 0,
            flags: 0,
            reserved: [0; 20],
        }
    }

    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        if b.len() < FILE_ENTRY_SIZE {
            return None;
        }
        let mut name = [0u8; 28];
        name.copy_from_slice(&b[0..28]);
        Some(FileEntry {
            name,
            size: u32::from_le_bytes(b[28..32].try_into().ok()?),
            start_block: u32::from_le_bytes(b[32..36].try_into().ok()?),
            blocks_used: u32::from_le_bytes(b[36..40].try_into().ok()?),
            flags: u32::from_le_bytes(b[40..44].try_into().ok()?),
            reserved: b[44..64].try_into().ok()?,
        })
    }

    pub fn to_bytes(&self) -> [u8; FILE_ENTRY_SIZE] {
        let mut out = [0u8; FILE_ENTRY_SIZE];
        out[0..28].copy_from_slice(&self.name);
        out[28..32].copy_from_slice(&self.size.to_le_bytes());
        out[32..36].copy_from_slice(&self.start_block.to_le_bytes());
        out[36..40].copy_from_slice(&self.blocks_used.to_le_bytes());
        out[40..44].copy_from_slice(&self.flags.to_le_bytes());
        out[44..64].copy_from_slice(&self.reserved);
        out
    }

    pub fn exists(&self) -> bool {
        self.flags & FLAG_EXISTS != 0
    }

    pub fn is_directory(&self) -> bool {
        self.flags & FLAG_DIRECTORY != 0
    }

    /// Name up to the first NUL, or the whole 28-byte field if unterminated.
    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("")
    }
}

/// A borrowed view over a SimpleFS image's bytes, not an owning mount - the
/// image only needs to be read once, at boot.
pub struct Image<'a> {
    bytes: &'a [u8],
    super_block: SuperBlock,
}

impl<'a> Image<'a> {
    /// Validates the magic and returns a reader, or `None` if `bytes` isn't
    /// a SimpleFS image.
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        let sb = SuperBlock::from_bytes(bytes)?;
        if !sb.is_valid() {
            return None;
        }
        Some(Image { bytes, super_block: sb })
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    fn entry_bytes(&self, index: usize) -> Option<&[u8]> {
        let off = BLOCK_SIZE + index * FILE_ENTRY_SIZE;
        self.bytes.get(off..off + FILE_ENTRY_SIZE)
    }

    pub fn entry(&self, index: usize) -> Option<FileEntry> {
        FileEntry::from_bytes(self.entry_bytes(index)?)
    }

    pub fn entries(&self) -> impl Iterator<Item = FileEntry> + '_ {
        (0..MAX_FILES).filter_map(move |i| self.entry(i))
    }

    /// Returns the file's raw content, capped at `size`.
    pub fn file_data(&self, entry: &FileEntry) -> Option<&[u8]> {
        let off = entry.start_block as usize * BLOCK_SIZE;
        let len = entry.size as usize;
        self.bytes.get(off..off + len)
    }
}

/// Mounts `image` by iterating its file table and populating the in-memory
/// VFS: directories first (so later files can resolve their parent), then
/// regular file contents copied into each VNode's backing buffer.
pub fn mount_into_vfs(bytes: &[u8]) -> KResult<()> {
    let Some(image) = Image::parse(bytes) else {
        return Ok(()); // no SimpleFS magic: nothing to mount, not an error.
    };
    let root = vfs::root();

    for entry in image.entries() {
        if !entry.exists() || !entry.is_directory() {
            continue;
        }
        create_path(entry.name_str(), root, true)?;
    }
    for entry in image.entries() {
        if !entry.exists() || entry.is_directory() {
            continue;
        }
        let v = create_path(entry.name_str(), root, false)?;
        if let Some(data) = image.file_data(&entry) {
            vfs::write(v, 0, data)?;
        }
    }
    Ok(())
}

/// Creates `path` (and, for files, nothing past the final component - its
/// parent directories must already exist from the directories-first pass
/// above), tolerating an already-existing entry so repeated boots / `/`
/// itself don't fail with `EEXIST`.
fn create_path(path: &str, root: VNodeRef, is_dir: bool) -> KResult<VNodeRef> {
    if path.is_empty() || path == "/" {
        return Ok(root);
    }
    let result = if is_dir {
        vfs::create_directory(path, root)
    } else {
        vfs::create_file(path, root)
    };
    match result {
        Ok(v) => Ok(v),
        Err(KernelError::Eexist) => vfs::resolve_path(path, root),
        Err(e) => Err(e),
    }
}

#[cfg(all(test, feature = "std-test"))]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    fn build_image(files: &[(&str, &[u8], bool)]) -> Vec<u8> {
        let mut img = alloc::vec![0u8; BLOCK_SIZE * (SIMPLEFS_DATA_START_BLOCK + 4)];
        let mut data_block = SIMPLEFS_DATA_START_BLOCK as u32;
        let mut entries = Vec::new();
        for (i, (name, data, is_dir)) in files.iter().enumerate() {
            let mut entry = FileEntry::empty();
            let nb = name.as_bytes();
            entry.name[..nb.len()].copy_from_slice(nb);
            entry.size = data.len() as u32;
            entry.start_block = data_block;
            entry.blocks_used = ((data.len() + BLOCK_SIZE - 1) / BLOCK_SIZE).max(1) as u32;
            entry.flags = FLAG_EXISTS | if *is_dir { FLAG_DIRECTORY } else { 0 };
            let off = BLOCK_SIZE + i * FILE_ENTRY_SIZE;
            img[off..off + FILE_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
            let data_off = entry.start_block as usize * BLOCK_SIZE;
            img[data_off..data_off + data.len()].copy_from_slice(data);
            data_block += entry.blocks_used;
            entries.push(entry);
        }
        let sb = SuperBlock {
            magic: SIMPLEFS_MAGIC,
            total_blocks: (img.len() / BLOCK_SIZE) as u32,
            free_blocks: 0,
            file_count: files.len() as u32,
            reserved: [0; 496],
        };
        img[0..BLOCK_SIZE].copy_from_slice(&sb.to_bytes());
        img
    }

    #[test]
    fn parse_rejects_wrong_magic() {
        let bytes = [0u8; BLOCK_SIZE];
        assert!(Image::parse(&bytes).is_none());
    }

    #[test]
    fn mount_creates_directories_before_files() {
        vfs::init();
        let img = build_image(&[("etc", &[], true), ("etc/motd", b"Hi\n", false)]);
        mount_into_vfs(&img).unwrap();
        let root = vfs::root();
        let motd = vfs::resolve_path("/etc/motd", root).unwrap();
        let mut buf = [0u8; 8];
        let n = vfs::read(motd, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"Hi\n");
    }
}
