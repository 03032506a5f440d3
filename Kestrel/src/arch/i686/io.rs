// arch/i686/io.rs
//
// Port I/O and the fixed-function chips behind it: the 8259 PIC pair, the
// 8253 PIT and the CMOS RTC.

use core::arch::asm;

use crate::interrupt::IRQ_BASE;

pub const PIC1_COMMAND: u16 = 0x20;
pub const PIC1_DATA: u16 = 0x21;
pub const PIC2_COMMAND: u16 = 0xA0;
pub const PIC2_DATA: u16 = 0xA1;
const EOI: u8 = 0x20;

pub const KEYBOARD_DATA: u16 = 0x60;

const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;
/// Channel 0, lo/hi byte, square wave.
const PIT_MODE: u8 = 0x36;

const CMOS_INDEX: u16 = 0x70;
const CMOS_DATA: u16 = 0x71;
/// Register selects with NMI disabled.
const RTC_REG_A: u8 = 0x8A;
const RTC_REG_B: u8 = 0x8B;
const RTC_REG_C: u8 = 0x0C;

pub const TIMER_IRQ: u8 = 0;
pub const KEYBOARD_IRQ: u8 = 1;
const CASCADE_IRQ: u8 = 2;
pub const RTC_IRQ: u8 = 8;

#[derive(Clone, Copy)]
pub struct Port {
    port: u16,
}

impl Port {
    pub const fn new(port: u16) -> Self {
        Self { port }
    }

    #[inline]
    pub unsafe fn read(&mut self) -> u8 {
        let value: u8;
        asm!(
            "in al, dx",
            out("al") value,
            in("dx") self.port,
            options(nomem, nostack, preserves_flags)
        );
        value
    }

    #[inline]
    pub unsafe fn write(&mut self, value: u8) {
        asm!(
            "out dx, al",
            in("dx") self.port,
            in("al") value,
            options(nomem, nostack, preserves_flags)
        );
    }
}

/// Move the PICs to `IRQ_BASE` and `IRQ_BASE + 8`, leaving only the lines
/// the kernel services unmasked.
pub unsafe fn remap_pic() {
    let mut cmd1 = Port::new(PIC1_COMMAND);
    let mut cmd2 = Port::new(PIC2_COMMAND);
    let mut a1 = Port::new(PIC1_DATA);
    let mut a2 = Port::new(PIC2_DATA);

    // ICW1: init, ICW4 follows
    cmd1.write(0x11);
    cmd2.write(0x11);
    // ICW2: vector offsets
    a1.write(IRQ_BASE);
    a2.write(IRQ_BASE + 8);
    // ICW3: slave on IRQ2, slave identity 2
    a1.write(1 << CASCADE_IRQ);
    a2.write(CASCADE_IRQ);
    // ICW4: 8086 mode
    a1.write(0x01);
    a2.write(0x01);

    a1.write(!(1 << TIMER_IRQ | 1 << KEYBOARD_IRQ | 1 << CASCADE_IRQ));
    a2.write(!(1 << (RTC_IRQ - 8)));
}

pub fn send_eoi(irq: u8) {
    unsafe {
        if irq >= 8 {
            Port::new(PIC2_COMMAND).write(EOI);
        }
        Port::new(PIC1_COMMAND).write(EOI);
    }
}

pub fn set_timer_divisor(divisor: u16) {
    let [lo, hi] = divisor.to_le_bytes();
    unsafe {
        Port::new(PIT_COMMAND).write(PIT_MODE);
        let mut data = Port::new(PIT_CHANNEL0);
        data.write(lo);
        data.write(hi);
    }
}

unsafe fn cmos_read(reg: u8) -> u8 {
    Port::new(CMOS_INDEX).write(reg);
    Port::new(CMOS_DATA).read()
}

unsafe fn cmos_write(reg: u8, value: u8) {
    Port::new(CMOS_INDEX).write(reg);
    Port::new(CMOS_DATA).write(value);
}

/// Turn on the RTC periodic interrupt (register B, bit 6).
pub unsafe fn enable_rtc_interrupts() {
    let prev = cmos_read(RTC_REG_B);
    cmos_write(RTC_REG_B, prev | 0x40);
}

pub fn set_rtc_rate(rate: u8) {
    unsafe {
        let prev = cmos_read(RTC_REG_A);
        cmos_write(RTC_REG_A, (prev & 0xF0) | (rate & 0x0F));
    }
}

/// Reading register C re-arms the RTC for the next interrupt.
pub fn ack_rtc() {
    unsafe {
        cmos_read(RTC_REG_C);
    }
}

pub fn read_scancode() -> u8 {
    unsafe { Port::new(KEYBOARD_DATA).read() }
}
