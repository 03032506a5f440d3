// context.rs
//
// Execution contexts the kernel hands back to the low-level entry code. The
// kernel core never switches stacks itself: it decides *where* the CPU goes
// next and returns that decision as a `Transition`.

/// Kernel stack position captured at a suspension point (syscall or
/// interrupt entry). Exactly these two registers must survive a switch;
/// everything else lives on the stack they point into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SavedContext {
    pub esp: u32,
    pub ebp: u32,
}

impl SavedContext {
    pub const fn new(esp: u32, ebp: u32) -> Self {
        Self { esp, ebp }
    }

    /// Context of an empty kernel stack whose top is `top`.
    pub const fn stack_top(top: u32) -> Self {
        Self { esp: top, ebp: top }
    }
}

/// The frame `iret` consumes to drop from ring 0 into ring 3.
///
/// The data segments are loaded with `ss` before the frame is pushed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserFrame {
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub esp: u32,
    pub ss: u32,
}

/// Where an incoming task picks up after a scheduler switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumePoint {
    /// The task was preempted before; restore its saved kernel stack.
    Saved(SavedContext),
    /// The task was loaded but has never run; enter it from scratch.
    Launch(UserFrame),
}

/// What the entry code must do once the kernel has serviced an interrupt,
/// exception or syscall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Return to the interrupted code untouched.
    Continue,
    /// Return to the caller with `eax` set to the value.
    Return(i32),
    /// Privilege-drop into a freshly loaded program.
    Enter(UserFrame),
    /// Unwind onto a parent's kernel stack as if its `execute` returned
    /// `value`.
    Resume { context: SavedContext, value: i32 },
    /// Continue another task.
    Switch(ResumePoint),
    /// Nothing is left to run.
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_top_sets_both_registers() {
        let ctx = SavedContext::stack_top(0x7F_DFFC);
        assert_eq!(ctx.esp, ctx.ebp);
        assert_eq!(ctx, SavedContext::new(0x7F_DFFC, 0x7F_DFFC));
    }
}
