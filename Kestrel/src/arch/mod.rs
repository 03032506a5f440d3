// arch/mod.rs
//
// The hardware seam. Everything the kernel core needs from the CPU and the
// board goes through `Platform`; the bare-metal implementation lives in
// `i686`, tests supply a recording mock.

#[cfg(target_arch = "x86")]
pub mod i686;

use crate::error::KResult;
use crate::memory::AddressSpace;

pub trait Platform: Sync {
    /// Mask interrupts, returning whether they were enabled before.
    fn disable_interrupts(&self) -> bool;

    /// Undo a `disable_interrupts`, re-enabling only if they were enabled.
    fn restore_interrupts(&self, was_enabled: bool);

    /// Idle until the next interrupt has been delivered. Called with
    /// interrupts enabled from busy-wait loops.
    fn wait_for_interrupt(&self);

    /// Install `space` as the translation root and turn paging on with
    /// 4 MiB page support.
    fn enable_paging(&self, space: &AddressSpace);

    /// Drop every cached translation so the CPU sees the current contents
    /// of `space`.
    fn flush_tlb(&self, space: &AddressSpace);

    /// Stack the CPU switches to on the next ring 3 -> ring 0 entry.
    fn set_kernel_stack(&self, esp0: u32);

    /// Program the RTC periodic-interrupt rate divider (register A, low
    /// nibble).
    fn set_rtc_rate(&self, rate: u8);

    /// Program PIT channel 0.
    fn set_timer_divisor(&self, divisor: u16);

    /// Hand bytes to the console driver for `terminal`.
    fn put_bytes(&self, terminal: usize, bytes: &[u8]);

    /// Copy into the currently mapped user address space.
    fn copy_to_user(&self, vaddr: u32, src: &[u8]) -> KResult<()>;

    /// Copy out of the currently mapped user address space.
    fn copy_from_user(&self, vaddr: u32, dst: &mut [u8]) -> KResult<()>;
}
