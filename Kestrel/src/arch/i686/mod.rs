// arch/i686/mod.rs
//
// The machine itself: 32-bit protected mode on a PC with a VGA text
// console, PS/2 keyboard, 8259 PICs, PIT and CMOS RTC. Boots from GRUB
// with the filesystem image as the first multiboot module.

mod descriptors;
#[cfg(target_os = "none")]
mod entry;
mod io;
mod keyboard;
mod screen;
mod serial;

use core::arch::asm;
use core::ptr;

use crate::arch::Platform;
use crate::error::{KResult, KernelError};
use crate::memory::{AddressSpace, PAGE_SIZE, USER_BASE, USER_END, VIDMAP_BASE};

#[cfg(target_os = "none")]
pub use entry::{halt_forever, kestrel_main, MachineKernel, TrapFrame};

const CR0_PAGING: u32 = 1 << 31;
const CR4_PSE: u32 = 1 << 4;
const EFLAGS_IF: u32 = 1 << 9;

#[derive(Clone, Copy, Debug, Default)]
pub struct I686;

/// `[vaddr, vaddr + len)` is a range ring 0 may touch on a task's behalf.
fn user_accessible(vaddr: u32, len: usize) -> bool {
    let Some(end) = vaddr.checked_add(len as u32) else {
        return false;
    };
    (vaddr >= USER_BASE && end <= USER_END)
        || (vaddr >= VIDMAP_BASE && end <= VIDMAP_BASE + PAGE_SIZE)
}

impl Platform for I686 {
    fn disable_interrupts(&self) -> bool {
        let flags: u32;
        unsafe { asm!("pushfd", "pop {}", "cli", out(reg) flags, options(nomem)) };
        flags & EFLAGS_IF != 0
    }

    fn restore_interrupts(&self, was_enabled: bool) {
        if was_enabled {
            unsafe { asm!("sti", options(nomem, nostack)) };
        }
    }

    fn wait_for_interrupt(&self) {
        let was_enabled = self.disable_interrupts();
        unsafe { asm!("sti", "hlt", options(nomem, nostack)) };
        if !was_enabled {
            unsafe { asm!("cli", options(nomem, nostack)) };
        }
    }

    fn enable_paging(&self, space: &AddressSpace) {
        let directory = space.directory().physical_address();
        unsafe {
            asm!(
                "mov cr3, {dir}",
                "mov {tmp}, cr4",
                "or {tmp}, {pse}",
                "mov cr4, {tmp}",
                "mov {tmp}, cr0",
                "or {tmp}, {pg}",
                "mov cr0, {tmp}",
                dir = in(reg) directory,
                pse = in(reg) CR4_PSE,
                pg = in(reg) CR0_PAGING,
                tmp = inout(reg) 0u32 => _,
                options(nostack),
            );
        }
    }

    fn flush_tlb(&self, space: &AddressSpace) {
        let directory = space.directory().physical_address();
        unsafe { asm!("mov cr3, {}", in(reg) directory, options(nostack)) };
    }

    fn set_kernel_stack(&self, esp0: u32) {
        descriptors::set_kernel_stack(esp0);
    }

    fn set_rtc_rate(&self, rate: u8) {
        io::set_rtc_rate(rate);
    }

    fn set_timer_divisor(&self, divisor: u16) {
        io::set_timer_divisor(divisor);
    }

    fn put_bytes(&self, terminal: usize, bytes: &[u8]) {
        screen::put_bytes(terminal, bytes);
    }

    fn copy_to_user(&self, vaddr: u32, src: &[u8]) -> KResult<()> {
        if !user_accessible(vaddr, src.len()) {
            return Err(KernelError::InvalidArgument);
        }
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), vaddr as usize as *mut u8, src.len()) };
        Ok(())
    }

    fn copy_from_user(&self, vaddr: u32, dst: &mut [u8]) -> KResult<()> {
        if !user_accessible(vaddr, dst.len()) {
            return Err(KernelError::InvalidArgument);
        }
        unsafe {
            ptr::copy_nonoverlapping(vaddr as usize as *const u8, dst.as_mut_ptr(), dst.len())
        };
        Ok(())
    }
}
