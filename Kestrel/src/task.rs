// task.rs
//
// Program images and the frames used to enter them.

use crate::context::UserFrame;
use crate::error::{KResult, KernelError};
use crate::memory::{LARGE_PAGE_SIZE, TASK_PHYS_BASE, USER_BASE};
use crate::process::Pid;

pub const MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
pub const ENTRY_OFFSET: usize = 24;
pub const HEADER_LEN: usize = 28;

pub const LOAD_ADDR: u32 = USER_BASE + 0x4_8000;
pub const USER_STACK: u32 = USER_BASE + LARGE_PAGE_SIZE - 4;
/// Largest image that fits between the load address and the stack.
pub const MAX_IMAGE: u32 = USER_STACK - LOAD_ADDR;

pub const USER_CS: u32 = 0x23;
pub const USER_DS: u32 = 0x2B;
pub const KERNEL_DS: u32 = 0x18;
/// IF set, so the timer can preempt user code.
pub const USER_EFLAGS: u32 = 0x202;

pub const KERNEL_STACK_SIZE: u32 = 0x2000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgramHeader {
    pub entry: u32,
}

impl ProgramHeader {
    /// Check the signature and pull out the entry point.
    pub fn parse(header: &[u8]) -> KResult<Self> {
        if header.len() < HEADER_LEN || header[..MAGIC.len()] != MAGIC {
            return Err(KernelError::NotExecutable);
        }
        let e = &header[ENTRY_OFFSET..ENTRY_OFFSET + 4];
        Ok(Self {
            entry: u32::from_le_bytes([e[0], e[1], e[2], e[3]]),
        })
    }
}

/// `iret` frame that starts a freshly loaded program at `entry`.
pub const fn prepare_frame(entry: u32) -> UserFrame {
    UserFrame {
        eip: entry,
        cs: USER_CS,
        eflags: USER_EFLAGS,
        esp: USER_STACK,
        ss: USER_DS,
    }
}

/// Kernel stacks are 8 KiB each, growing down from the top of the kernel
/// region; slot 0 owns the highest one.
pub const fn kernel_stack_top(pid: Pid) -> u32 {
    TASK_PHYS_BASE - KERNEL_STACK_SIZE * pid as u32 - 4
}
