// memory.rs
//
// Address space manager. One page directory, two page tables, and a fixed
// set of mappings:
//
//   PDE 0   -> low table: only the VGA text page, supervisor only
//   PDE 1   -> 4 MiB kernel page at physical 4 MiB, supervisor only
//   PDE 32  -> 4 MiB user window, physical 8 MiB + 4 MiB * slot
//   PDE 34  -> video table (vidmap), the VGA page again, user accessible
//
// Every other entry is writable-but-not-present.

use x86_64::structures::paging::PageTableFlags;

use crate::arch::Platform;
use crate::klog::kinfo;

/// Page/frame size: 4 KiB
pub const PAGE_SIZE: u32 = 0x1000;
/// Large page size: 4 MiB
pub const LARGE_PAGE_SIZE: u32 = 0x40_0000;
pub const ENTRIES: usize = 1024;

pub const KERNEL_PDE: usize = 1;
pub const KERNEL_PHYS: u32 = 0x40_0000;

pub const USER_PDE: usize = 32;
pub const USER_BASE: u32 = (USER_PDE as u32) * LARGE_PAGE_SIZE;
pub const USER_END: u32 = USER_BASE + LARGE_PAGE_SIZE;
/// Physical base of slot 0's user window.
pub const TASK_PHYS_BASE: u32 = 0x80_0000;

pub const VIDMAP_PDE: usize = 34;
pub const VIDMAP_BASE: u32 = (VIDMAP_PDE as u32) * LARGE_PAGE_SIZE;
pub const VIDEO_PHYS: u32 = 0xB8000;

const FRAME_MASK: u32 = 0xFFFF_F000;
const LARGE_FRAME_MASK: u32 = 0xFFC0_0000;

#[inline]
fn bits(flags: PageTableFlags) -> u32 {
    // 32-bit entries share the low flag bits with the 64-bit format
    flags.bits() as u32
}

#[inline]
fn has(entry: u32, flags: PageTableFlags) -> bool {
    entry & bits(flags) == bits(flags)
}

/// Physical base of the user window belonging to `slot`.
#[inline]
pub const fn task_phys_base(slot: usize) -> u32 {
    TASK_PHYS_BASE + LARGE_PAGE_SIZE * slot as u32
}

#[repr(C, align(4096))]
#[derive(Clone)]
pub struct PageDirectory {
    entries: [u32; ENTRIES],
}

#[repr(C, align(4096))]
#[derive(Clone)]
pub struct PageTable {
    entries: [u32; ENTRIES],
}

impl PageDirectory {
    const fn blank() -> Self {
        Self {
            entries: [PageTableFlags::WRITABLE.bits() as u32; ENTRIES],
        }
    }

    #[inline]
    pub fn entry(&self, index: usize) -> u32 {
        self.entries[index]
    }

    pub fn physical_address(&self) -> u32 {
        self as *const Self as usize as u32
    }
}

impl PageTable {
    const fn blank() -> Self {
        Self {
            entries: [PageTableFlags::WRITABLE.bits() as u32; ENTRIES],
        }
    }

    #[inline]
    pub fn entry(&self, index: usize) -> u32 {
        self.entries[index]
    }

    pub fn physical_address(&self) -> u32 {
        self as *const Self as usize as u32
    }
}

/// The kernel's single address space.
///
/// Table addresses are baked into the directory by `init`; the value must
/// stay where it is from then on.
#[derive(Clone)]
pub struct AddressSpace {
    directory: PageDirectory,
    low_table: PageTable,
    video_table: PageTable,
    user_slot: Option<usize>,
}

impl AddressSpace {
    pub const fn new() -> Self {
        Self {
            directory: PageDirectory::blank(),
            low_table: PageTable::blank(),
            video_table: PageTable::blank(),
            user_slot: None,
        }
    }

    /// Build the fixed low mappings and turn paging on.
    pub fn init<P: Platform + ?Sized>(&mut self, platform: &P) {
        self.directory = PageDirectory::blank();
        self.low_table = PageTable::blank();
        self.video_table = PageTable::blank();
        self.user_slot = None;

        let rw = PageTableFlags::PRESENT | PageTableFlags::WRITABLE;

        self.low_table.entries[(VIDEO_PHYS / PAGE_SIZE) as usize] = VIDEO_PHYS | bits(rw);
        self.directory.entries[0] = (self.low_table.physical_address() & FRAME_MASK) | bits(rw);
        self.directory.entries[KERNEL_PDE] =
            (KERNEL_PHYS & LARGE_FRAME_MASK) | bits(rw | PageTableFlags::HUGE_PAGE);

        platform.enable_paging(self);
        kinfo!(
            "paging on: directory at {:#x}, kernel at {:#x}",
            self.directory.physical_address(),
            KERNEL_PHYS
        );
    }

    /// Point the user window at `slot`'s physical frame.
    ///
    /// The change is not visible to the CPU until `flush`; use `switch_to`
    /// unless several edits are batched.
    pub fn map_task(&mut self, slot: usize) {
        let flags = PageTableFlags::PRESENT
            | PageTableFlags::WRITABLE
            | PageTableFlags::USER_ACCESSIBLE
            | PageTableFlags::HUGE_PAGE;
        self.directory.entries[USER_PDE] = (task_phys_base(slot) & LARGE_FRAME_MASK) | bits(flags);
        self.user_slot = Some(slot);
    }

    pub fn flush<P: Platform + ?Sized>(&self, platform: &P) {
        platform.flush_tlb(self);
    }

    /// `map_task` followed by `flush`.
    pub fn switch_to<P: Platform + ?Sized>(&mut self, slot: usize, platform: &P) {
        self.map_task(slot);
        self.flush(platform);
    }

    /// Alias the VGA page at `VIDMAP_BASE` for user code and return that
    /// address. Flushes.
    pub fn map_video_window<P: Platform + ?Sized>(&mut self, platform: &P) -> u32 {
        let user_rw = PageTableFlags::PRESENT
            | PageTableFlags::WRITABLE
            | PageTableFlags::USER_ACCESSIBLE;
        self.video_table.entries[0] = VIDEO_PHYS | bits(user_rw);
        self.directory.entries[VIDMAP_PDE] =
            (self.video_table.physical_address() & FRAME_MASK) | bits(user_rw);
        self.flush(platform);
        VIDMAP_BASE
    }

    /// Slot whose window is currently mapped.
    pub fn user_slot(&self) -> Option<usize> {
        self.user_slot
    }

    pub fn directory(&self) -> &PageDirectory {
        &self.directory
    }

    /// Walk the tables the way the MMU would. `user` requests a ring 3
    /// access, which needs the user bit at every level.
    pub fn translate(&self, vaddr: u32, user: bool) -> Option<u32> {
        let pde_index = (vaddr >> 22) as usize;
        let pde = self.directory.entries[pde_index];
        if !has(pde, PageTableFlags::PRESENT) {
            return None;
        }
        if user && !has(pde, PageTableFlags::USER_ACCESSIBLE) {
            return None;
        }
        if has(pde, PageTableFlags::HUGE_PAGE) {
            return Some((pde & LARGE_FRAME_MASK) | (vaddr & !LARGE_FRAME_MASK));
        }

        let table = match pde_index {
            0 => &self.low_table,
            VIDMAP_PDE => &self.video_table,
            _ => return None,
        };
        let pte = table.entries[((vaddr >> 12) & 0x3FF) as usize];
        if !has(pte, PageTableFlags::PRESENT) {
            return None;
        }
        if user && !has(pte, PageTableFlags::USER_ACCESSIBLE) {
            return None;
        }
        Some((pte & FRAME_MASK) | (vaddr & !FRAME_MASK))
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, MockPlatform};

    fn space() -> (MockPlatform, std::boxed::Box<AddressSpace>) {
        let platform = MockPlatform::new();
        let mut space = std::boxed::Box::new(AddressSpace::new());
        space.init(&platform);
        (platform, space)
    }

    #[test]
    fn init_maps_kernel_and_video_only() {
        let (platform, space) = space();
        assert_eq!(space.translate(KERNEL_PHYS + 0x1234, false), Some(KERNEL_PHYS + 0x1234));
        assert_eq!(space.translate(VIDEO_PHYS + 8, false), Some(VIDEO_PHYS + 8));
        assert_eq!(space.translate(0, false), None);
        assert_eq!(space.translate(USER_BASE, true), None);
        assert_eq!(space.translate(KERNEL_PHYS, true), None);
        assert_eq!(space.translate(VIDEO_PHYS, true), None);
        assert!(platform.events().contains(&Event::EnablePaging));
    }

    #[test]
    fn user_window_follows_slot() {
        let (_platform, mut space) = space();
        for slot in 0..6 {
            space.map_task(slot);
            assert_eq!(space.user_slot(), Some(slot));
            assert_eq!(
                space.translate(USER_BASE + 0x48000, true),
                Some(task_phys_base(slot) + 0x48000)
            );
            assert_eq!(
                space.translate(USER_END - 1, true),
                Some(task_phys_base(slot) + LARGE_PAGE_SIZE - 1)
            );
        }
        assert_eq!(space.translate(USER_END, true), None);
    }

    #[test]
    fn map_task_needs_flush_to_reach_cpu() {
        let (platform, mut space) = space();
        space.map_task(2);
        assert_eq!(platform.cpu_translate(USER_BASE), None);
        space.flush(&platform);
        assert_eq!(platform.cpu_translate(USER_BASE), Some(task_phys_base(2)));
        space.switch_to(4, &platform);
        assert_eq!(platform.cpu_translate(USER_BASE), Some(task_phys_base(4)));
    }

    #[test]
    fn video_window_is_user_visible() {
        let (platform, mut space) = space();
        assert_eq!(space.map_video_window(&platform), VIDMAP_BASE);
        assert_eq!(space.translate(VIDMAP_BASE + 0x10, true), Some(VIDEO_PHYS + 0x10));
        assert_eq!(space.translate(VIDMAP_BASE + PAGE_SIZE, true), None);
        // the low table keeps the VGA page supervisor-only
        assert_eq!(space.translate(0, true), None);
        assert_eq!(space.translate(VIDEO_PHYS, true), None);
    }
}
