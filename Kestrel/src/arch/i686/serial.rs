// arch/i686/serial.rs
//
// COM1, 115200 8N1. Only the kernel log writes here.

use core::fmt::{self, Write};
use lazy_static::lazy_static;
use spin::Mutex;

use super::io::Port;
use super::I686;
use crate::arch::Platform;
use crate::klog::Level;

const COM1: u16 = 0x3F8;
const LINE_STATUS: u16 = 5;
const TRANSMIT_EMPTY: u8 = 1 << 5;

pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    const fn new(base: u16) -> Self {
        Self { base }
    }

    fn init(&mut self) {
        let reg = |offset: u16| Port::new(self.base + offset);
        unsafe {
            reg(1).write(0x00); // no UART interrupts
            reg(3).write(0x80); // DLAB on
            reg(0).write(0x01); // divisor 1
            reg(1).write(0x00);
            reg(3).write(0x03); // 8N1, DLAB off
            reg(2).write(0xC7); // FIFO on, cleared
            reg(4).write(0x0B);
        }
    }

    fn send(&mut self, byte: u8) {
        let mut status = Port::new(self.base + LINE_STATUS);
        unsafe {
            while status.read() & TRANSMIT_EMPTY == 0 {
                core::hint::spin_loop();
            }
            Port::new(self.base).write(byte);
        }
    }
}

impl Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.send(b'\r');
            }
            self.send(byte);
        }
        Ok(())
    }
}

lazy_static! {
    static ref SERIAL1: Mutex<SerialPort> = {
        let mut port = SerialPort::new(COM1);
        port.init();
        Mutex::new(port)
    };
}

pub fn init() {
    lazy_static::initialize(&SERIAL1);
}

/// `klog` sink.
pub fn log_sink(level: Level, args: fmt::Arguments) {
    let was_enabled = I686.disable_interrupts();
    {
        let mut port = SERIAL1.lock();
        let _ = writeln!(port, "[{}] {}", level.as_str(), args);
    }
    I686.restore_interrupts(was_enabled);
}
