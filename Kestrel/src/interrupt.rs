// interrupt.rs
//
// Vector layout and the single place every trap is routed from.

use num_enum::TryFromPrimitive;

use crate::arch::Platform;
use crate::context::{SavedContext, Transition};
use crate::fs::FileSystem;
use crate::kernel::Kernel;
use crate::syscall::SyscallArgs;

pub const EXCEPTION_VECTORS: u8 = 20;
/// PIC master offset; IRQ n arrives on vector 32 + n.
pub const IRQ_BASE: u8 = 32;
pub const TIMER_VECTOR: u8 = IRQ_BASE;
pub const KEYBOARD_VECTOR: u8 = IRQ_BASE + 1;
pub const RTC_VECTOR: u8 = IRQ_BASE + 8;
pub const SYSCALL_VECTOR: u8 = 0x80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum Exception {
    DivideError = 0,
    DebugException = 1,
    NonMaskable = 2,
    Breakpoint = 3,
    Overflow = 4,
    BoundRange = 5,
    InvalidOpcode = 6,
    DeviceNotAvailable = 7,
    DoubleFault = 8,
    CoprocessorSegmentOverrun = 9,
    InvalidTss = 10,
    SegmentNotPresent = 11,
    StackSegmentFault = 12,
    GeneralProtection = 13,
    PageFault = 14,
    Reserved = 15,
    X87FloatingPoint = 16,
    AlignmentCheck = 17,
    MachineCheck = 18,
    SimdFloatingPoint = 19,
}

impl Exception {
    pub const fn name(self) -> &'static str {
        match self {
            Exception::DivideError => "divide error",
            Exception::DebugException => "debug",
            Exception::NonMaskable => "non-maskable interrupt",
            Exception::Breakpoint => "breakpoint",
            Exception::Overflow => "overflow",
            Exception::BoundRange => "bound range exceeded",
            Exception::InvalidOpcode => "invalid opcode",
            Exception::DeviceNotAvailable => "device not available",
            Exception::DoubleFault => "double fault",
            Exception::CoprocessorSegmentOverrun => "coprocessor segment overrun",
            Exception::InvalidTss => "invalid TSS",
            Exception::SegmentNotPresent => "segment not present",
            Exception::StackSegmentFault => "stack-segment fault",
            Exception::GeneralProtection => "general protection fault",
            Exception::PageFault => "page fault",
            Exception::Reserved => "reserved",
            Exception::X87FloatingPoint => "x87 floating-point exception",
            Exception::AlignmentCheck => "alignment check",
            Exception::MachineCheck => "machine check",
            Exception::SimdFloatingPoint => "SIMD floating-point exception",
        }
    }
}

/// A decoded trap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    Exception(Exception),
    Timer,
    /// A key already translated to a byte by the keyboard driver.
    Keyboard(u8),
    Rtc,
    Syscall(SyscallArgs),
}

impl<P: Platform, F: FileSystem> Kernel<P, F> {
    /// Route one trap. `interrupted` is the kernel stack it arrived on.
    pub fn handle_interrupt(&self, interrupt: Interrupt, interrupted: SavedContext) -> Transition {
        match interrupt {
            Interrupt::Exception(exception) => self.exception(exception),
            Interrupt::Timer => self.timer_tick(interrupted),
            Interrupt::Keyboard(byte) => {
                self.terminals.key(byte, &self.platform);
                Transition::Continue
            }
            Interrupt::Rtc => {
                self.rtc.interrupt();
                Transition::Continue
            }
            Interrupt::Syscall(args) => self.syscall(args, interrupted),
        }
    }
}
