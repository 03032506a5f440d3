// arch/i686/descriptors.rs
//
// GDT, TSS and IDT. Flat segments; the TSS only exists to give the CPU a
// ring 0 stack on entry from user mode.

use core::arch::asm;
use core::cell::UnsafeCell;
use core::mem::size_of;

use crate::interrupt::SYSCALL_VECTOR;
use crate::task::KERNEL_DS;

pub const KERNEL_CS: u16 = 0x10;
pub const TSS_SELECTOR: u16 = 0x30;

const GDT_ENTRIES: usize = 7;
const IDT_ENTRIES: usize = 256;

/// Present, ring 0, 32-bit interrupt gate.
const INTERRUPT_GATE: u8 = 0x8E;
/// Same, callable from ring 3.
const USER_GATE: u8 = 0xEE;

const TSS_WORDS: usize = 26;
const TSS_ESP0: usize = 1;
const TSS_SS0: usize = 2;
const TSS_IOMAP: usize = 25;

/// Static the CPU reads through physical addresses; written only with
/// interrupts off.
struct Table<T>(UnsafeCell<T>);

unsafe impl<T> Sync for Table<T> {}

impl<T> Table<T> {
    const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    fn get(&self) -> *mut T {
        self.0.get()
    }
}

#[repr(C, align(8))]
struct Gdt([u64; GDT_ENTRIES]);

#[repr(C, align(8))]
struct Idt([u64; IDT_ENTRIES]);

#[repr(C, align(4))]
struct Tss([u32; TSS_WORDS]);

#[repr(C, packed)]
struct DescriptorPointer {
    limit: u16,
    base: u32,
}

static GDT: Table<Gdt> = Table::new(Gdt([0; GDT_ENTRIES]));
static IDT: Table<Idt> = Table::new(Idt([0; IDT_ENTRIES]));
static TSS: Table<Tss> = Table::new(Tss([0; TSS_WORDS]));

const fn segment(base: u32, limit: u32, access: u8, flags: u8) -> u64 {
    (limit & 0xFFFF) as u64
        | ((base & 0xFF_FFFF) as u64) << 16
        | (access as u64) << 40
        | (((limit >> 16) & 0xF) as u64) << 48
        | ((flags & 0xF) as u64) << 52
        | ((base >> 24) as u64) << 56
}

const fn gate(handler: u32, selector: u16, attributes: u8) -> u64 {
    (handler & 0xFFFF) as u64
        | (selector as u64) << 16
        | (attributes as u64) << 40
        | ((handler >> 16) as u64) << 48
}

/// Load the GDT and TSS, reload every segment register.
pub unsafe fn init_gdt() {
    let tss = TSS.get();
    (*tss).0[TSS_SS0] = KERNEL_DS;
    (*tss).0[TSS_IOMAP] = (size_of::<Tss>() as u32) << 16;

    let gdt = &mut *GDT.get();
    // 4 KiB granularity, 32-bit
    gdt.0[2] = segment(0, 0xF_FFFF, 0x9A, 0xC);
    gdt.0[3] = segment(0, 0xF_FFFF, 0x92, 0xC);
    gdt.0[4] = segment(0, 0xF_FFFF, 0xFA, 0xC);
    gdt.0[5] = segment(0, 0xF_FFFF, 0xF2, 0xC);
    gdt.0[6] = segment(tss as u32, size_of::<Tss>() as u32 - 1, 0x89, 0x0);

    let pointer = DescriptorPointer {
        limit: (size_of::<Gdt>() - 1) as u16,
        base: gdt as *const Gdt as u32,
    };
    asm!(
        "lgdt [{ptr}]",
        "push {cs}",
        "lea {tmp}, [2f]",
        "push {tmp}",
        "retf",
        "2:",
        "mov ds, {ds:x}",
        "mov es, {ds:x}",
        "mov fs, {ds:x}",
        "mov gs, {ds:x}",
        "mov ss, {ds:x}",
        "ltr {tss:x}",
        ptr = in(reg) &pointer,
        cs = in(reg) KERNEL_CS as u32,
        ds = in(reg) KERNEL_DS,
        tss = in(reg) TSS_SELECTOR as u32,
        tmp = inout(reg) 0u32 => _,
    );
}

/// Point the gate for every stub in `stubs` at its handler and load the IDT.
pub unsafe fn init_idt(stubs: &[[u32; 2]]) {
    let idt = &mut *IDT.get();
    for &[vector, handler] in stubs {
        let attributes = if vector == SYSCALL_VECTOR as u32 {
            USER_GATE
        } else {
            INTERRUPT_GATE
        };
        idt.0[vector as usize] = gate(handler, KERNEL_CS, attributes);
    }
    let pointer = DescriptorPointer {
        limit: (size_of::<Idt>() - 1) as u16,
        base: idt as *const Idt as u32,
    };
    asm!("lidt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
}

pub fn set_kernel_stack(esp0: u32) {
    unsafe {
        (*TSS.get()).0[TSS_ESP0] = esp0;
    }
}
