// kernel.rs
//
// The kernel object: hardware seam, boot filesystem, device state, and the
// task/address-space state every entry point works on.

use crate::arch::Platform;
use crate::error::{KResult, KernelError};
use crate::fs::FileSystem;
use crate::klog::{self, kinfo, Level};
use crate::memory::AddressSpace;
use crate::pit::{Pit, DEFAULT_HZ};
use crate::process::{Pcb, Pid, TaskTable, MAX_TASKS};
use crate::rtc::Rtc;
use crate::sync::{IrqGuard, IrqLock};
use crate::terminal::{Terminals, MAX_TERMINALS};

#[derive(Clone, Debug)]
pub struct KernelConfig {
    /// Program every terminal starts, and restarts when it exits.
    pub shell: &'static str,
    /// Terminals with a root shell, 1..=3.
    pub terminals: usize,
    /// Round-robin between tasks on timer ticks.
    pub preemptive: bool,
    pub timer_hz: u32,
    pub log_level: Level,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            shell: "shell",
            terminals: MAX_TERMINALS,
            preemptive: true,
            timer_hz: DEFAULT_HZ,
            log_level: Level::Info,
        }
    }
}

/// Stack the bare-metal entry runs on until the first task starts. The
/// kernel object is built by value on it before landing in its static, so
/// it must hold several copies.
pub const BOOT_STACK_SIZE: usize = 0x2_0000;

/// Everything guarded by the kernel lock.
pub struct KernelState {
    pub tasks: TaskTable,
    pub space: AddressSpace,
    /// Task whose window is mapped and whose syscalls are being served.
    pub current: Option<Pid>,
}

impl KernelState {
    pub const fn new() -> Self {
        Self {
            tasks: TaskTable::new(),
            space: AddressSpace::new(),
            current: None,
        }
    }

    pub fn current_pcb(&self) -> KResult<&Pcb> {
        self.tasks.lookup(self.current.ok_or(KernelError::NoTask)?)
    }

    pub fn current_pcb_mut(&mut self) -> KResult<&mut Pcb> {
        let pid = self.current.ok_or(KernelError::NoTask)?;
        self.tasks.lookup_mut(pid)
    }
}

impl Default for KernelState {
    fn default() -> Self {
        Self::new()
    }
}

/// Page tables live inside the kernel object, so on hardware it must sit at
/// a fixed address (a static) before `init` runs.
pub struct Kernel<P: Platform, F: FileSystem> {
    pub(crate) platform: P,
    pub(crate) fs: F,
    pub(crate) config: KernelConfig,
    pub(crate) state: IrqLock<KernelState>,
    pub(crate) rtc: Rtc,
    pub(crate) terminals: Terminals,
    pub(crate) pit: Pit,
}

impl<P: Platform, F: FileSystem> Kernel<P, F> {
    pub fn new(platform: P, fs: F, mut config: KernelConfig) -> Self {
        config.terminals = config.terminals.clamp(1, MAX_TERMINALS);
        Self {
            platform,
            fs,
            config,
            state: IrqLock::new(KernelState::new()),
            rtc: Rtc::new(),
            terminals: Terminals::new(),
            pit: Pit::new(),
        }
    }

    /// Paging on, timer and RTC programmed. Runs once, before `boot`.
    pub fn init(&self) {
        klog::set_max_level(self.config.log_level);
        self.lock().space.init(&self.platform);
        self.pit.init(self.config.timer_hz, &self.platform);
        if let Err(err) = self.rtc.open(&self.platform) {
            klog::kwarn!("rtc: {}", err);
        }
        kinfo!(
            "kernel up: {} terminal(s), shell {:?}, preemption {}",
            self.config.terminals,
            self.config.shell,
            if self.config.preemptive { "on" } else { "off" }
        );
    }

    pub(crate) fn lock(&self) -> IrqGuard<'_, KernelState, P> {
        self.state.lock(&self.platform)
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn rtc(&self) -> &Rtc {
        &self.rtc
    }

    pub fn terminals(&self) -> &Terminals {
        &self.terminals
    }

    pub fn ticks(&self) -> u64 {
        self.pit.ticks()
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.lock().current
    }

    /// Copy of a live task's control block.
    pub fn task(&self, pid: Pid) -> Option<Pcb> {
        self.lock().tasks.lookup(pid).ok().cloned()
    }

    pub fn task_bitmap(&self) -> [bool; MAX_TASKS] {
        self.lock().tasks.bitmap()
    }

    pub fn running_count(&self) -> usize {
        self.lock().tasks.running_count()
    }

    /// Slot whose user window the address space currently maps.
    pub fn mapped_slot(&self) -> Option<usize> {
        self.lock().space.user_slot()
    }

    pub fn set_foreground(&self, terminal: usize) -> KResult<()> {
        if terminal >= self.config.terminals {
            return Err(KernelError::InvalidArgument);
        }
        self.terminals.set_foreground(terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{kernel_with, Event};

    #[test]
    fn terminal_count_is_clamped() {
        let k = kernel_with(KernelConfig {
            terminals: 9,
            ..KernelConfig::default()
        });
        assert_eq!(k.config().terminals, MAX_TERMINALS);
        let k = kernel_with(KernelConfig {
            terminals: 0,
            ..KernelConfig::default()
        });
        assert_eq!(k.config().terminals, 1);
        assert_eq!(k.set_foreground(1), Err(KernelError::InvalidArgument));
        assert_eq!(k.set_foreground(0), Ok(()));
    }

    #[test]
    fn init_programs_hardware() {
        let k = kernel_with(KernelConfig::default());
        let events = k.platform().events();
        assert_eq!(events[0], Event::EnablePaging);
        assert!(events.contains(&Event::TimerDivisor(23_863)));
        assert_eq!(k.platform().rtc_rate(), Some(15));
        assert_eq!(k.current_pid(), None);
        assert_eq!(k.running_count(), 0);
    }

    #[test]
    fn boot_stack_holds_the_kernel_object() {
        let size = core::mem::size_of::<crate::testing::TestKernel>();
        assert!(size > 16 * 1024, "{size}");
        assert!(4 * size <= BOOT_STACK_SIZE, "{size}");
    }
}
