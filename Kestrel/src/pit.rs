// pit.rs

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::Platform;
use crate::klog::kinfo;

pub const PIT_FREQ: u32 = 1_193_182; // Hz base
pub const DEFAULT_HZ: u32 = 50;

/// Channel 0 reload value for `hz`, clamped to what 16 bits can hold.
pub fn divisor(hz: u32) -> u16 {
    let hz = hz.clamp(1, PIT_FREQ);
    (PIT_FREQ / hz).clamp(1, u16::MAX as u32) as u16
}

pub struct Pit {
    ticks: AtomicU64,
}

impl Pit {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }

    pub fn init<P: Platform + ?Sized>(&self, hz: u32, platform: &P) {
        let divisor = divisor(hz);
        platform.set_timer_divisor(divisor);
        kinfo!("pit: {} Hz (divisor {})", hz, divisor);
    }

    pub fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

impl Default for Pit {
    fn default() -> Self {
        Self::new()
    }
}
