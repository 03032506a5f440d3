// main.rs
//
// Bootable kernel image: the library's multiboot entry linked with
// linker.ld. Build with `cargo +nightly kimage` from the workspace root.

#![no_std]
#![no_main]

#[cfg(all(target_arch = "x86", target_os = "none"))]
#[used]
static ENTRY: extern "C" fn(u32, u32) -> ! = kestrel::arch::i686::kestrel_main;
