//! Loads `init` at the fixed user code base address (0x1000).

fn main() {
    println!("cargo:rustc-link-arg-bin=init=-Ttext=0x1000");
    println!("cargo:rustc-link-arg-bin=init=-no-pie");
}
