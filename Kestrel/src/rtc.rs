// rtc.rs
//
// Real-time clock as a character device: reads block until the next
// periodic interrupt, writes set the interrupt frequency.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::arch::Platform;
use crate::error::{KResult, KernelError};
use crate::klog::kdebug;

pub const DEFAULT_HZ: u32 = 2;
pub const MIN_HZ: u32 = 2;
pub const MAX_HZ: u32 = 1024;

/// Register A rate divider for `hz`, if the RTC can produce it.
pub fn rate_for(hz: u32) -> Option<u8> {
    if !(MIN_HZ..=MAX_HZ).contains(&hz) || !hz.is_power_of_two() {
        return None;
    }
    // hz = 32768 >> (rate - 1)
    Some((16 - hz.trailing_zeros()) as u8)
}

pub struct Rtc {
    fired: AtomicBool,
    hz: AtomicU32,
}

impl Rtc {
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            hz: AtomicU32::new(DEFAULT_HZ),
        }
    }

    pub fn frequency(&self) -> u32 {
        self.hz.load(Ordering::SeqCst)
    }

    pub fn set_frequency<P: Platform + ?Sized>(&self, hz: u32, platform: &P) -> KResult<()> {
        let rate = rate_for(hz).ok_or(KernelError::InvalidArgument)?;
        platform.set_rtc_rate(rate);
        self.hz.store(hz, Ordering::SeqCst);
        kdebug!("rtc at {} Hz", hz);
        Ok(())
    }

    pub fn open<P: Platform + ?Sized>(&self, platform: &P) -> KResult<()> {
        self.set_frequency(DEFAULT_HZ, platform)
    }

    /// Block until the next tick.
    pub fn read<P: Platform + ?Sized>(&self, platform: &P) -> KResult<usize> {
        self.fired.store(false, Ordering::SeqCst);
        while !self.fired.load(Ordering::SeqCst) {
            platform.wait_for_interrupt();
        }
        Ok(0)
    }

    /// `buf` is a little-endian u32 frequency.
    pub fn write<P: Platform + ?Sized>(&self, buf: &[u8], platform: &P) -> KResult<usize> {
        let bytes: [u8; 4] = buf.try_into().map_err(|_| KernelError::InvalidArgument)?;
        self.set_frequency(u32::from_le_bytes(bytes), platform)?;
        Ok(buf.len())
    }

    pub fn close(&self) -> KResult<()> {
        Ok(())
    }

    /// Periodic interrupt.
    pub fn interrupt(&self) {
        self.fired.store(true, Ordering::SeqCst);
    }
}

impl Default for Rtc {
    fn default() -> Self {
        Self::new()
    }
}
