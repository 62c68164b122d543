//! Host-side initrd image builder. Walks a source directory and writes a
//! SimpleFS image `kernel::fs::mount_into_vfs` can read back - superblock,
//! a fixed 32-entry file table, then raw file data.
//!
//! Builds against the kernel's own `fs::{SuperBlock, FileEntry}` types (via
//! the `kernel_as_a_lib` feature) instead of a hand-copied format, so the
//! writer and the reader can never disagree about layout.

use clap::Parser;
use kernel::fs::{FileEntry, SuperBlock, BLOCK_SIZE, FLAG_DIRECTORY, FLAG_EXISTS, MAX_FILES};
use kernel::param::SIMPLEFS_DATA_START_BLOCK;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(about = "Builds a SimpleFS initrd image from a source directory tree")]
struct Args {
    /// Directory whose tree becomes the image's root.
    input: PathBuf,

    /// Path the image is written to.
    output: PathBuf,
}

struct Entry {
    name: String,
    is_dir: bool,
    data: Vec<u8>,
}

/// Walks `root`, depth first, collecting every directory and regular file
/// under it as a path relative to `root` (names are stored without a
/// leading `/`, same as `vfs::resolve_path` expects).
fn walk(root: &Path, dir: &Path, out: &mut Vec<Entry>) -> std::io::Result<()> {
    let mut children: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    children.sort_by_key(|e| e.file_name());

    for child in children {
        let path = child.path();
        let rel = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
        if child.file_type()?.is_dir() {
            out.push(Entry {
                name: rel,
                is_dir: true,
                data: Vec::new(),
            });
            walk(root, &path, out)?;
        } else {
            let data = fs::read(&path)?;
            out.push(Entry {
                name: rel,
                is_dir: false,
                data,
            });
        }
    }
    Ok(())
}

fn main() -> std::io::Result<()> {
    let args = Args::parse();

    let mut entries = Vec::new();
    if args.input.is_dir() {
        walk(&args.input, &args.input, &mut entries)?;
    }

    if entries.len() > MAX_FILES {
        eprintln!(
            "mkfs: {} entries under {:?} exceeds the {}-entry file table",
            entries.len(),
            args.input,
            MAX_FILES
        );
        std::process::exit(1);
    }

    let mut data_blocks: Vec<u8> = Vec::new();
    let mut table = vec![FileEntry::empty(); MAX_FILES];

    for (i, entry) in entries.iter().enumerate() {
        let mut name = [0u8; 28];
        let nb = entry.name.as_bytes();
        if nb.len() > name.len() {
            eprintln!("mkfs: name {:?} longer than 28 bytes", entry.name);
            std::process::exit(1);
        }
        name[..nb.len()].copy_from_slice(nb);

        let start_block = SIMPLEFS_DATA_START_BLOCK as u32 + (data_blocks.len() / BLOCK_SIZE) as u32;
        let blocks_used = ((entry.data.len() + BLOCK_SIZE - 1) / BLOCK_SIZE).max(1) as u32;

        table[i] = FileEntry {
            name,
            size: entry.data.len() as u32,
            start_block,
            blocks_used,
            flags: FLAG_EXISTS | if entry.is_dir { FLAG_DIRECTORY } else { 0 },
            reserved: [0; 20],
        };

        data_blocks.extend_from_slice(&entry.data);
        data_blocks.resize(data_blocks.len() + pad(entry.data.len()), 0);
    }

    let total_blocks = SIMPLEFS_DATA_START_BLOCK as u32 + (data_blocks.len() / BLOCK_SIZE) as u32;
    let sb = SuperBlock {
        magic: kernel::param::SIMPLEFS_MAGIC,
        total_blocks,
        free_blocks: 0,
        file_count: entries.len() as u32,
        reserved: [0; 496],
    };

    let mut image = sb.to_bytes().to_vec();
    for e in &table {
        image.extend_from_slice(&e.to_bytes());
    }
    image.extend_from_slice(&data_blocks);

    let mut f = fs::File::create(&args.output)?;
    f.write_all(&image)?;
    Ok(())
}

/// Padding to round a file's data up to a whole block, same as the
/// `blocks_used` field already accounts for.
fn pad(len: usize) -> usize {
    (BLOCK_SIZE - len % BLOCK_SIZE) % BLOCK_SIZE
}
