//! Assembly glue: one `global_asm!(include_str!(...))` per concern. There
//! is no M-mode trampoline here - OpenSBI already drops us into S-mode -
//! so `entry.S` goes straight to `kmain`.

use core::arch::global_asm;

global_asm!(include_str!("entry.S"));
global_asm!(include_str!("trampoline.S"));
global_asm!(include_str!("kernelvec.S"));
global_asm!(include_str!("switch.S"));

// Generated by build.rs: `.incbin`s the embedded init/shell/initrd
// artifacts.
global_asm!(include_str!(concat!(env!("OUT_DIR"), "/embed.S")));
