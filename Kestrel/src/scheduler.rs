// scheduler.rs
//
// Timer-driven round robin. A tick saves the interrupted task's kernel
// stack, maps the next runnable task's window and tells the entry code
// where to continue.

use crate::arch::Platform;
use crate::context::{ResumePoint, SavedContext, Transition};
use crate::fs::FileSystem;
use crate::kernel::Kernel;
use crate::klog::kdebug;
use crate::process::{Pid, TaskTable, MAX_TASKS};
use crate::task::kernel_stack_top;

/// The next runnable task after `current`, wrapping around. `None` when
/// there is nothing else to switch to.
pub fn next_runnable(tasks: &TaskTable, current: Pid) -> Option<Pid> {
    if tasks.running_count() < 2 {
        return None;
    }
    (1..MAX_TASKS)
        .map(|step| (current + step) % MAX_TASKS)
        .find(|&pid| tasks.is_runnable(pid))
}

impl<P: Platform, F: FileSystem> Kernel<P, F> {
    /// Timer interrupt. `interrupted` is the kernel stack the tick arrived
    /// on.
    pub fn timer_tick(&self, interrupted: SavedContext) -> Transition {
        self.pit.tick();
        if !self.config.preemptive {
            return Transition::Continue;
        }

        let mut state = self.lock();
        let Some(current) = state.current else {
            return Transition::Continue;
        };
        let Some(next) = next_runnable(&state.tasks, current) else {
            return Transition::Continue;
        };

        let resume = match state.tasks.lookup_mut(next) {
            Ok(pcb) => match pcb.pending_launch.take() {
                Some(frame) => ResumePoint::Launch(frame),
                None => ResumePoint::Saved(pcb.context),
            },
            Err(_) => return Transition::Continue,
        };
        if let Ok(pcb) = state.tasks.lookup_mut(current) {
            pcb.context = interrupted;
        }

        state.space.switch_to(next, &self.platform);
        self.platform.set_kernel_stack(kernel_stack_top(next));
        state.current = Some(next);
        kdebug!("switch {} -> {}", current, next);
        Transition::Switch(resume)
    }
}
