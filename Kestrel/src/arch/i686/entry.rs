// arch/i686/entry.rs
//
// Boot entry, trap stubs and the code that carries out a `Transition`.
//
// Every stub pushes (error code, vector), then the general registers and
// data segments, and calls `kestrel_trap` with a pointer to that frame. The
// frame's address is the task's saved context: jumping back to
// `kestrel_trap_return` with esp pointing at it finishes the trap as if
// nothing had happened in between.

use core::arch::{asm, global_asm};
use core::slice;
use spin::Once;

use super::descriptors;
use super::io;
use super::keyboard::{self, Key};
use super::screen;
use super::serial;
use super::I686;
use crate::context::{ResumePoint, SavedContext, Transition, UserFrame};
use crate::fs::BootImage;
use crate::interrupt::{
    Exception, Interrupt, EXCEPTION_VECTORS, IRQ_BASE, KEYBOARD_VECTOR, RTC_VECTOR, SYSCALL_VECTOR,
    TIMER_VECTOR,
};
use crate::kernel::{Kernel, KernelConfig, BOOT_STACK_SIZE};
use crate::klog::{self, kerror, kinfo, kwarn};
use crate::memory::{KERNEL_PHYS, LARGE_PAGE_SIZE};
use crate::syscall::SyscallArgs;

pub type MachineKernel = Kernel<I686, BootImage<'static>>;

/// Fixed address: the page tables inside it are referenced by physical
/// address once `init` has run.
static KERNEL: Once<MachineKernel> = Once::new();

const MULTIBOOT_MAGIC: u32 = 0x2BAD_B002;
const MULTIBOOT_MODS: u32 = 1 << 3;

/// Number of (vector, handler) pairs in `kestrel_trap_table`.
const TRAP_STUBS: usize = 37;

global_asm!(
    r#"
.section .multiboot, "a"
.balign 4
.long 0x1BADB002
.long 0x00000003
.long -(0x1BADB002 + 0x00000003)

.section .bss
.balign 16
kestrel_boot_stack:
.skip {stack_size}
kestrel_boot_stack_top:

.section .text
.global _start
_start:
    mov esp, offset kestrel_boot_stack_top
    push ebx
    push eax
    call kestrel_main
2:
    cli
    hlt
    jmp 2b

.macro TRAP vec
.global kestrel_trap_\vec
kestrel_trap_\vec:
    push 0
    push \vec
    jmp kestrel_trap_common
.endm

.macro TRAP_ERRCODE vec
.global kestrel_trap_\vec
kestrel_trap_\vec:
    push \vec
    jmp kestrel_trap_common
.endm

.irp vec, 0,1,2,3,4,5,6,7,9,15,16,18,19,32,33,34,35,36,37,38,39,40,41,42,43,44,45,46,47,128
TRAP \vec
.endr
.irp vec, 8,10,11,12,13,14,17
TRAP_ERRCODE \vec
.endr

kestrel_trap_common:
    pushad
    push ds
    push es
    push fs
    push gs
    mov ax, 0x18
    mov ds, ax
    mov es, ax
    mov fs, ax
    mov gs, ax
    cld
    push esp
    call kestrel_trap
    add esp, 4
.global kestrel_trap_return
kestrel_trap_return:
    pop gs
    pop fs
    pop es
    pop ds
    popad
    add esp, 8
    iretd

.global kestrel_resume
kestrel_resume:
    mov eax, [esp + 4]
    mov ebp, [esp + 8]
    mov esp, eax
    jmp kestrel_trap_return

.global kestrel_enter_user
kestrel_enter_user:
    mov eax, esp
    mov ecx, [eax + 20]
    mov ds, cx
    mov es, cx
    mov fs, cx
    mov gs, cx
    push ecx
    push dword ptr [eax + 16]
    push dword ptr [eax + 12]
    push dword ptr [eax + 8]
    push dword ptr [eax + 4]
    xor eax, eax
    xor ebx, ebx
    xor ecx, ecx
    xor edx, edx
    xor esi, esi
    xor edi, edi
    xor ebp, ebp
    iretd

.section .rodata
.balign 4
.global kestrel_trap_table
kestrel_trap_table:
.irp vec, 0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17,18,19
    .long \vec, kestrel_trap_\vec
.endr
.irp vec, 32,33,34,35,36,37,38,39,40,41,42,43,44,45,46,47,128
    .long \vec, kestrel_trap_\vec
.endr

.section .text
"#,
    stack_size = const BOOT_STACK_SIZE,
);

extern "C" {
    static kestrel_trap_table: [[u32; 2]; TRAP_STUBS];
    fn kestrel_resume(esp: u32, ebp: u32) -> !;
    fn kestrel_enter_user(eip: u32, cs: u32, eflags: u32, esp: u32, ss: u32) -> !;
}

/// Stack layout built by `kestrel_trap_common`, lowest address first.
#[repr(C)]
pub struct TrapFrame {
    pub gs: u32,
    pub fs: u32,
    pub es: u32,
    pub ds: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub vector: u32,
    pub error: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

pub fn halt_forever() -> ! {
    loop {
        unsafe { asm!("cli", "hlt", options(nomem, nostack)) };
    }
}

fn enter_user(frame: &UserFrame) -> ! {
    unsafe { kestrel_enter_user(frame.eip, frame.cs, frame.eflags, frame.esp, frame.ss) }
}

/// The filesystem image GRUB loaded as the first module. It must sit in the
/// kernel's 4 MiB page to stay reachable once paging is on.
unsafe fn boot_module(magic: u32, info: u32) -> Option<&'static [u8]> {
    if magic != MULTIBOOT_MAGIC {
        return None;
    }
    let info = info as usize as *const u32;
    if *info & MULTIBOOT_MODS == 0 || *info.add(5) == 0 {
        return None;
    }
    let module = *info.add(6) as usize as *const u32;
    let (start, end) = (*module, *module.add(1));
    if start < KERNEL_PHYS || end > KERNEL_PHYS + LARGE_PAGE_SIZE || end < start {
        kerror!("boot module at {:#x}..{:#x} is outside the kernel page", start, end);
        return None;
    }
    Some(slice::from_raw_parts(start as usize as *const u8, (end - start) as usize))
}

/// Called by `_start` with the multiboot magic and info pointer.
#[no_mangle]
pub extern "C" fn kestrel_main(magic: u32, info: u32) -> ! {
    serial::init();
    klog::set_sink(serial::log_sink);
    unsafe {
        descriptors::init_gdt();
        descriptors::init_idt(&kestrel_trap_table);
        io::remap_pic();
        io::enable_rtc_interrupts();
    }

    let Some(image) = (unsafe { boot_module(magic, info) }) else {
        kerror!("no filesystem module");
        halt_forever();
    };
    let fs = match BootImage::parse(image) {
        Ok(fs) => fs,
        Err(err) => {
            kerror!("filesystem: {}", err);
            halt_forever();
        }
    };
    kinfo!("filesystem: {} entries", fs.dentry_count());

    let kernel = KERNEL.call_once(|| Kernel::new(I686, fs, KernelConfig::default()));
    kernel.init();
    screen::show(0);

    match kernel.boot() {
        Ok(transition) => launch(transition),
        Err(err) => {
            kerror!("boot: {}", err);
            halt_forever();
        }
    }
}

fn launch(transition: Transition) -> ! {
    match transition {
        Transition::Enter(frame) | Transition::Switch(ResumePoint::Launch(frame)) => {
            enter_user(&frame)
        }
        other => {
            kerror!("cannot start from {:?}", other);
            halt_forever();
        }
    }
}

#[no_mangle]
extern "C" fn kestrel_trap(frame: *mut TrapFrame) {
    let Some(kernel) = KERNEL.get() else {
        halt_forever();
    };
    let trap = unsafe { &mut *frame };
    let interrupted = SavedContext::new(frame as usize as u32, trap.ebp);
    let Some(interrupt) = decode(kernel, trap) else {
        return;
    };
    let transition = kernel.handle_interrupt(interrupt, interrupted);
    finish(trap, transition);
}

/// Acknowledge the hardware and turn the raw vector into an `Interrupt`.
/// `None` means the trap is already fully handled.
fn decode(kernel: &MachineKernel, trap: &TrapFrame) -> Option<Interrupt> {
    let vector = trap.vector as u8;
    match vector {
        v if v < EXCEPTION_VECTORS => {
            let exception = Exception::try_from(v).ok()?;
            if trap.cs & 3 == 0 {
                kerror!(
                    "{} in kernel at {:#x}, error {:#x}",
                    exception.name(),
                    trap.eip,
                    trap.error
                );
                halt_forever();
            }
            Some(Interrupt::Exception(exception))
        }
        TIMER_VECTOR => {
            io::send_eoi(io::TIMER_IRQ);
            Some(Interrupt::Timer)
        }
        KEYBOARD_VECTOR => {
            let scancode = io::read_scancode();
            io::send_eoi(io::KEYBOARD_IRQ);
            match keyboard::decode(scancode)? {
                Key::Byte(byte) => Some(Interrupt::Keyboard(byte)),
                Key::Terminal(terminal) => {
                    match kernel.set_foreground(terminal) {
                        Ok(()) => screen::show(terminal),
                        Err(err) => kwarn!("terminal {}: {}", terminal, err),
                    }
                    None
                }
            }
        }
        RTC_VECTOR => {
            io::ack_rtc();
            io::send_eoi(io::RTC_IRQ);
            Some(Interrupt::Rtc)
        }
        SYSCALL_VECTOR => Some(Interrupt::Syscall(SyscallArgs::new(
            trap.eax, trap.ebx, trap.ecx, trap.edx,
        ))),
        v if v >= IRQ_BASE && v < IRQ_BASE + 16 => {
            io::send_eoi(v - IRQ_BASE);
            None
        }
        _ => None,
    }
}

fn finish(trap: &mut TrapFrame, transition: Transition) {
    match transition {
        Transition::Continue => {}
        Transition::Return(value) => trap.eax = value as u32,
        Transition::Enter(frame) | Transition::Switch(ResumePoint::Launch(frame)) => {
            enter_user(&frame)
        }
        Transition::Resume { context, value } => unsafe {
            (*(context.esp as usize as *mut TrapFrame)).eax = value as u32;
            kestrel_resume(context.esp, context.ebp)
        },
        Transition::Switch(ResumePoint::Saved(context)) => unsafe {
            kestrel_resume(context.esp, context.ebp)
        },
        Transition::Stop => halt_forever(),
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    kerror!("{}", info);
    halt_forever();
}
