//! Loads `shell` at the fixed user code base address.

fn main() {
    println!("cargo:rustc-link-arg-bin=shell=-Ttext=0x1000");
    println!("cargo:rustc-link-arg-bin=shell=-no-pie");
}
