// lib.rs
//
// Kestrel: a small protected-mode kernel for i686. The core is hardware
// independent and runs under `cargo test`; `arch::i686` binds it to the
// machine.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod console;
pub mod context;
pub mod error;
pub mod exec;
pub mod fd;
pub mod file;
pub mod fs;
pub mod interrupt;
pub mod kernel;
pub mod klog;
pub mod memory;
pub mod pit;
pub mod process;
pub mod rtc;
pub mod scheduler;
pub mod sync;
pub mod syscall;
pub mod task;
pub mod terminal;

#[cfg(test)]
pub(crate) mod testing;

pub use arch::Platform;
pub use context::{ResumePoint, SavedContext, Transition, UserFrame};
pub use error::{KResult, KernelError};
pub use fs::{BootImage, FileSystem};
pub use interrupt::{Exception, Interrupt};
pub use kernel::{Kernel, KernelConfig};
pub use syscall::{Syscall, SyscallArgs};
