// testing.rs
//
// Host-side stand-ins for the hardware and the boot image.

use std::boxed::Box;
use std::collections::BTreeMap;
use std::vec;
use std::vec::Vec;

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use spin::Mutex;

use crate::arch::Platform;
use crate::error::{KResult, KernelError};
use crate::fs::{
    BootImage, FileKind, BLOCK_SIZE, DENTRY_BASE, DENTRY_SIZE, FILENAME_LEN, INODE_BLOCKS,
};
use crate::kernel::{Kernel, KernelConfig};
use crate::memory::AddressSpace;
use crate::task::{ENTRY_OFFSET, HEADER_LEN, LOAD_ADDR, MAGIC};
use crate::terminal::MAX_TERMINALS;

/// Give up on a busy-wait that nothing is going to end.
const WAIT_LIMIT: usize = 5_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Event {
    EnablePaging,
    Flush,
    KernelStack(u32),
    RtcRate(u8),
    TimerDivisor(u16),
}

/// Records every hardware request and models enough of the machine for the
/// kernel to run against: an interrupt flag, sparse physical memory, and an
/// MMU that only sees page tables as of the last flush.
pub struct MockPlatform {
    interrupts: AtomicBool,
    waits: AtomicUsize,
    events: Mutex<Vec<Event>>,
    mmu: Mutex<Option<Box<AddressSpace>>>,
    memory: Mutex<BTreeMap<u32, u8>>,
    screens: Mutex<Vec<Vec<u8>>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            interrupts: AtomicBool::new(true),
            waits: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
            mmu: Mutex::new(None),
            memory: Mutex::new(BTreeMap::new()),
            screens: Mutex::new(vec![Vec::new(); MAX_TERMINALS]),
        }
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn flush_count(&self) -> usize {
        self.events.lock().iter().filter(|e| **e == Event::Flush).count()
    }

    pub fn last_kernel_stack(&self) -> Option<u32> {
        self.events.lock().iter().rev().find_map(|e| match e {
            Event::KernelStack(top) => Some(*top),
            _ => None,
        })
    }

    pub fn rtc_rate(&self) -> Option<u8> {
        self.events.lock().iter().rev().find_map(|e| match e {
            Event::RtcRate(rate) => Some(*rate),
            _ => None,
        })
    }

    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }

    /// Translate a ring 3 access the way the CPU currently would.
    pub fn cpu_translate(&self, vaddr: u32) -> Option<u32> {
        self.mmu.lock().as_ref().and_then(|space| space.translate(vaddr, true))
    }

    pub fn read_phys(&self, paddr: u32, len: usize) -> Vec<u8> {
        let memory = self.memory.lock();
        (0..len as u32)
            .map(|i| memory.get(&(paddr + i)).copied().unwrap_or(0))
            .collect()
    }

    /// Read through the current user mapping. Panics on an unmapped byte.
    pub fn read_user(&self, vaddr: u32, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.copy_from_user(vaddr, &mut buf).expect("user range not mapped");
        buf
    }

    /// Plant bytes in the current user window, as a running program would.
    pub fn write_user(&self, vaddr: u32, bytes: &[u8]) {
        self.copy_to_user(vaddr, bytes).expect("user range not mapped");
    }

    pub fn screen(&self, terminal: usize) -> Vec<u8> {
        self.screens.lock()[terminal].clone()
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }

    fn snapshot(&self, space: &AddressSpace) {
        *self.mmu.lock() = Some(Box::new(space.clone()));
    }

    fn translate_range(&self, vaddr: u32, len: usize) -> KResult<Vec<u32>> {
        let mmu = self.mmu.lock();
        let space = mmu.as_ref().ok_or(KernelError::InvalidArgument)?;
        (0..len as u32)
            .map(|i| {
                let va = vaddr.checked_add(i).ok_or(KernelError::InvalidArgument)?;
                space.translate(va, true).ok_or(KernelError::InvalidArgument)
            })
            .collect()
    }
}

impl Platform for MockPlatform {
    fn disable_interrupts(&self) -> bool {
        self.interrupts.swap(false, Ordering::SeqCst)
    }

    fn restore_interrupts(&self, was_enabled: bool) {
        if was_enabled {
            self.interrupts.store(true, Ordering::SeqCst);
        }
    }

    fn wait_for_interrupt(&self) {
        let waits = self.waits.fetch_add(1, Ordering::SeqCst);
        assert!(waits < WAIT_LIMIT, "busy-wait never satisfied");
        std::thread::yield_now();
    }

    fn enable_paging(&self, space: &AddressSpace) {
        self.record(Event::EnablePaging);
        self.snapshot(space);
    }

    fn flush_tlb(&self, space: &AddressSpace) {
        self.record(Event::Flush);
        self.snapshot(space);
    }

    fn set_kernel_stack(&self, esp0: u32) {
        self.record(Event::KernelStack(esp0));
    }

    fn set_rtc_rate(&self, rate: u8) {
        self.record(Event::RtcRate(rate));
    }

    fn set_timer_divisor(&self, divisor: u16) {
        self.record(Event::TimerDivisor(divisor));
    }

    fn put_bytes(&self, terminal: usize, bytes: &[u8]) {
        self.screens.lock()[terminal].extend_from_slice(bytes);
    }

    fn copy_to_user(&self, vaddr: u32, src: &[u8]) -> KResult<()> {
        let frames = self.translate_range(vaddr, src.len())?;
        let mut memory = self.memory.lock();
        for (paddr, byte) in frames.into_iter().zip(src) {
            memory.insert(paddr, *byte);
        }
        Ok(())
    }

    fn copy_from_user(&self, vaddr: u32, dst: &mut [u8]) -> KResult<()> {
        let frames = self.translate_range(vaddr, dst.len())?;
        let memory = self.memory.lock();
        for (paddr, byte) in frames.into_iter().zip(dst.iter_mut()) {
            *byte = memory.get(&paddr).copied().unwrap_or(0);
        }
        Ok(())
    }
}

/// Assembles boot images in the on-disk format `BootImage` parses.
#[derive(Default)]
pub struct FsImageBuilder {
    entries: Vec<(Vec<u8>, u32, Vec<u8>)>,
}

impl FsImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directory(self, name: &str) -> Self {
        self.entry(name, FileKind::Directory as u32, &[])
    }

    pub fn device(self, name: &str) -> Self {
        self.entry(name, FileKind::Rtc as u32, &[])
    }

    pub fn file(self, name: &str, contents: &[u8]) -> Self {
        self.entry(name, FileKind::Regular as u32, contents)
    }

    pub fn entry(mut self, name: &str, kind: u32, contents: &[u8]) -> Self {
        assert!(name.len() <= FILENAME_LEN);
        self.entries.push((name.as_bytes().to_vec(), kind, contents.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let files: Vec<&Vec<u8>> = self
            .entries
            .iter()
            .filter(|(_, kind, _)| *kind == FileKind::Regular as u32)
            .map(|(_, _, contents)| contents)
            .collect();
        let inodes = files.len();
        let blocks: usize = files.iter().map(|f| (f.len() + BLOCK_SIZE - 1) / BLOCK_SIZE).sum();

        let mut image = vec![0u8; (1 + inodes + blocks) * BLOCK_SIZE];
        put32(&mut image, 0, self.entries.len() as u32);
        put32(&mut image, 4, inodes as u32);
        put32(&mut image, 8, blocks as u32);

        let mut next_inode = 0u32;
        let mut next_block = 0usize;
        for (i, (name, kind, contents)) in self.entries.iter().enumerate() {
            let base = DENTRY_BASE + i * DENTRY_SIZE;
            image[base..base + name.len()].copy_from_slice(name);
            put32(&mut image, base + 32, *kind);
            if *kind != FileKind::Regular as u32 {
                continue;
            }
            put32(&mut image, base + 36, next_inode);

            let inode = (1 + next_inode as usize) * BLOCK_SIZE;
            put32(&mut image, inode, contents.len() as u32);
            for (n, chunk) in contents.chunks(BLOCK_SIZE).enumerate() {
                assert!(n < INODE_BLOCKS);
                put32(&mut image, inode + 4 + n * 4, next_block as u32);
                let at = (1 + inodes + next_block) * BLOCK_SIZE;
                image[at..at + chunk.len()].copy_from_slice(chunk);
                next_block += 1;
            }
            next_inode += 1;
        }
        image
    }
}

fn put32(image: &mut [u8], at: usize, value: u32) {
    image[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// An executable: the 28-byte header with `entry`, then `body`.
pub fn program(entry: u32, body: &[u8]) -> Vec<u8> {
    let mut image = vec![0u8; HEADER_LEN];
    image[..4].copy_from_slice(&MAGIC);
    image[ENTRY_OFFSET..ENTRY_OFFSET + 4].copy_from_slice(&entry.to_le_bytes());
    image.extend_from_slice(body);
    image
}

pub const SHELL_ENTRY: u32 = LOAD_ADDR + 0x100;
pub const PROG_ENTRY: u32 = LOAD_ADDR + 0x2C0;
pub const FRAME0: &[u8] = b"fish swim in the deep blue sea\n";

pub type TestKernel = Kernel<MockPlatform, BootImage<'static>>;

/// The image every kernel test boots from.
pub fn standard_image() -> &'static [u8] {
    let big: Vec<u8> = (0..9000u32).map(|i| b'a' + (i % 26) as u8).collect();
    let image = FsImageBuilder::new()
        .directory(".")
        .device("rtc")
        .file("shell", &program(SHELL_ENTRY, b"shell body"))
        .file("prog", &program(PROG_ENTRY, b"prog body"))
        .file("frame0.txt", FRAME0)
        .file("notes", b"just some notes, not a program")
        .file("big.txt", &big)
        .file("tiny", &MAGIC)
        .build();
    leak(image)
}

pub fn leak(image: Vec<u8>) -> &'static [u8] {
    Box::leak(image.into_boxed_slice())
}

pub fn kernel_with(config: KernelConfig) -> TestKernel {
    kernel_from(standard_image(), config)
}

pub fn kernel_from(image: &'static [u8], config: KernelConfig) -> TestKernel {
    let fs = BootImage::parse(image).expect("image parses");
    let kernel = Kernel::new(MockPlatform::new(), fs, config);
    kernel.init();
    kernel
}

/// A kernel with a single terminal whose root shell is already running.
pub fn booted() -> TestKernel {
    booted_with(KernelConfig {
        terminals: 1,
        ..KernelConfig::default()
    })
}

pub fn booted_with(config: KernelConfig) -> TestKernel {
    let kernel = kernel_with(config);
    kernel.boot().expect("boot");
    kernel
}
