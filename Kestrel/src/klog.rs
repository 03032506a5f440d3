// klog.rs
//
// Kernel log. Records go to whatever sink the platform registers (serial on
// bare metal); with no sink installed they are dropped.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};
use lazy_static::lazy_static;
use spin::Mutex;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl Level {
    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Warn => "WARN ",
            Level::Info => "INFO ",
            Level::Debug => "DEBUG",
        }
    }
}

pub type Sink = fn(Level, fmt::Arguments);

lazy_static! {
    static ref SINK: Mutex<Option<Sink>> = Mutex::new(None);
}

static MAX_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

pub fn set_sink(sink: Sink) {
    *SINK.lock() = Some(sink);
}

pub fn set_max_level(level: Level) {
    MAX_LEVEL.store(level as u8, Ordering::SeqCst);
}

#[inline]
pub fn enabled(level: Level) -> bool {
    level as u8 <= MAX_LEVEL.load(Ordering::SeqCst)
}

pub fn log_impl(level: Level, args: fmt::Arguments) {
    if !enabled(level) {
        return;
    }
    // copy the sink out so it never runs under the lock
    let sink = *SINK.lock();
    if let Some(sink) = sink {
        sink(level, args);
    }
}

macro_rules! kerror {
    ($($arg:tt)*) => ($crate::klog::log_impl($crate::klog::Level::Error, format_args!($($arg)*)));
}
macro_rules! kwarn {
    ($($arg:tt)*) => ($crate::klog::log_impl($crate::klog::Level::Warn, format_args!($($arg)*)));
}
macro_rules! kinfo {
    ($($arg:tt)*) => ($crate::klog::log_impl($crate::klog::Level::Info, format_args!($($arg)*)));
}
macro_rules! kdebug {
    ($($arg:tt)*) => ($crate::klog::log_impl($crate::klog::Level::Debug, format_args!($($arg)*)));
}
pub(crate) use kdebug;
pub(crate) use kerror;
pub(crate) use kinfo;
pub(crate) use kwarn;
