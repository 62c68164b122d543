//! Links the kernel binary against `kernel.ld` (the boot contract: loaded
//! at a fixed address, `_entry` first). The `-bin` suffix on the link-arg
//! keeps this from leaking into `mkfs`, which links against this crate's
//! `fs`/`param` types under `kernel_as_a_lib` but never this linker script.
//!
//! Also emits `embed.S`: three `.incbin` spans pulling the already-built
//! `init`/`shell` ELF binaries
//! and the mkfs-produced initrd image into the kernel's `.rodata`, under
//! the symbols `exec.rs`/`main.rs` read back (`_user_init_start/_end`,
//! `_user_shell_start/_end`, `_initrd_start/_end`). This is why the build
//! is two-staged: `user/init` and `user/shell` must be built for
//! `riscv64gc-unknown-none-elf` and `mkfs` run against an initrd source
//! tree first, with their output paths passed through
//! `CLAUDIA_INIT_BIN`/`CLAUDIA_SHELL_BIN`/`CLAUDIA_INITRD_IMG` before the
//! kernel itself builds. Each defaults to a placeholder empty file so a
//! bare `cargo build -p claudia-kernel` still links (with a deliberately
//! inert init/shell/initrd), for working on the kernel in isolation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn placeholder(out_dir: &Path, name: &str) -> PathBuf {
    let p = out_dir.join(name);
    if !p.exists() {
        fs::write(&p, []).expect("build.rs: failed to write placeholder artifact");
    }
    p
}

fn main() {
    let dir = env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set");
    println!("cargo:rerun-if-changed=kernel.ld");
    println!("cargo:rustc-link-arg-bin=claudia-kernel=--script={}/kernel.ld", dir);

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));

    println!("cargo:rerun-if-env-changed=CLAUDIA_INIT_BIN");
    println!("cargo:rerun-if-env-changed=CLAUDIA_SHELL_BIN");
    println!("cargo:rerun-if-env-changed=CLAUDIA_INITRD_IMG");

    let init_bin = env::var("CLAUDIA_INIT_BIN").map(PathBuf::from).unwrap_or_else(|_| placeholder(&out_dir, "init.bin"));
    let shell_bin = env::var("CLAUDIA_SHELL_BIN")
        .map(PathBuf::from)
        .unwrap_or_else(|_| placeholder(&out_dir, "shell.bin"));
    let initrd_img = env::var("CLAUDIA_INITRD_IMG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| placeholder(&out_dir, "initrd.img"));

    println!("cargo:rerun-if-changed={}", init_bin.display());
    println!("cargo:rerun-if-changed={}", shell_bin.display());
    println!("cargo:rerun-if-changed={}", initrd_img.display());

    let embed = format!(
        r#".section .rodata
.global _user_init_start
.global _user_init_end
_user_init_start:
.incbin "{init}"
_user_init_end:

.global _user_shell_start
.global _user_shell_end
_user_shell_start:
.incbin "{shell}"
_user_shell_end:

.global _initrd_start
.global _initrd_end
_initrd_start:
.incbin "{initrd}"
_initrd_end:
"#,
        init = init_bin.display(),
        shell = shell_bin.display(),
        initrd = initrd_img.display(),
    );
    fs::write(out_dir.join("embed.S"), embed).expect("build.rs: failed to write embed.S");
}
