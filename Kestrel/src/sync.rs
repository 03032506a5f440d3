// sync.rs

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use spin::{Mutex, MutexGuard};

use crate::arch::Platform;

/// A spin lock that is only ever held with interrupts masked.
///
/// On a single core this is the whole critical-section story: once
/// interrupts are off nothing else can run, and the inner spin lock only
/// catches re-entry bugs. Interrupts are restored after the lock is released
/// so a handler can never spin on a lock its own CPU holds.
pub struct IrqLock<T> {
    inner: Mutex<T>,
}

pub struct IrqGuard<'a, T, P: Platform + ?Sized> {
    guard: ManuallyDrop<MutexGuard<'a, T>>,
    platform: &'a P,
    was_enabled: bool,
}

impl<T> IrqLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn lock<'a, P: Platform + ?Sized>(&'a self, platform: &'a P) -> IrqGuard<'a, T, P> {
        let was_enabled = platform.disable_interrupts();
        IrqGuard {
            guard: ManuallyDrop::new(self.inner.lock()),
            platform,
            was_enabled,
        }
    }
}

impl<T, P: Platform + ?Sized> Deref for IrqGuard<'_, T, P> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, P: Platform + ?Sized> DerefMut for IrqGuard<'_, T, P> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T, P: Platform + ?Sized> Drop for IrqGuard<'_, T, P> {
    fn drop(&mut self) {
        // SAFETY: the guard is never touched again after this point.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        self.platform.restore_interrupts(self.was_enabled);
    }
}
