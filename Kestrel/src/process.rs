// process.rs
//
// Fixed pool of process control blocks. A task's id is its slot index; the
// slot also picks its physical window and kernel stack.

use crate::context::{SavedContext, UserFrame};
use crate::error::{KResult, KernelError};
use crate::fd::FdTable;

pub const MAX_TASKS: usize = 6;
/// Argument buffer size, terminator included.
pub const ARG_LEN: usize = 128;

pub type Pid = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgBuffer {
    bytes: [u8; ARG_LEN],
    len: usize,
}

impl ArgBuffer {
    pub const fn new() -> Self {
        Self {
            bytes: [0; ARG_LEN],
            len: 0,
        }
    }

    pub fn set(&mut self, args: &[u8]) -> KResult<()> {
        if args.len() >= ARG_LEN {
            return Err(KernelError::InvalidArgument);
        }
        self.bytes = [0; ARG_LEN];
        self.bytes[..args.len()].copy_from_slice(args);
        self.len = args.len();
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Clone, Debug)]
pub struct Pcb {
    pub pid: Pid,
    /// `None` for the root shell of a terminal.
    pub parent: Option<Pid>,
    /// Parent's kernel stack at the moment it called `execute`.
    pub parent_context: SavedContext,
    /// Own kernel stack at the last preemption.
    pub context: SavedContext,
    /// Set for a loaded task that has not run yet.
    pub pending_launch: Option<UserFrame>,
    pub running: bool,
    /// Child this task is blocked in `execute` on.
    pub waiting_on: Option<Pid>,
    pub terminal: usize,
    pub entry: u32,
    pub files: FdTable,
    pub args: ArgBuffer,
}

impl Pcb {
    pub const fn empty() -> Self {
        Self {
            pid: 0,
            parent: None,
            parent_context: SavedContext::new(0, 0),
            context: SavedContext::new(0, 0),
            pending_launch: None,
            running: false,
            waiting_on: None,
            terminal: 0,
            entry: 0,
            files: FdTable::new(),
            args: ArgBuffer::new(),
        }
    }
}

pub struct TaskTable {
    slots: [Pcb; MAX_TASKS],
    bitmap: [bool; MAX_TASKS],
    running: usize,
}

impl TaskTable {
    pub const fn new() -> Self {
        const EMPTY: Pcb = Pcb::empty();
        Self {
            slots: [EMPTY; MAX_TASKS],
            bitmap: [false; MAX_TASKS],
            running: 0,
        }
    }

    /// Claim the lowest free slot.
    pub fn allocate(&mut self) -> KResult<Pid> {
        let pid = self
            .bitmap
            .iter()
            .position(|used| !used)
            .ok_or(KernelError::ResourceExhausted)?;
        self.bitmap[pid] = true;
        self.slots[pid] = Pcb::empty();
        self.slots[pid].pid = pid;
        self.slots[pid].running = true;
        self.running += 1;
        Ok(pid)
    }

    /// Zero the slot and mark it free.
    pub fn release(&mut self, pid: Pid) {
        if pid >= MAX_TASKS || !self.bitmap[pid] {
            return;
        }
        self.slots[pid] = Pcb::empty();
        self.bitmap[pid] = false;
        self.running -= 1;
    }

    pub fn lookup(&self, pid: Pid) -> KResult<&Pcb> {
        if pid < MAX_TASKS && self.bitmap[pid] {
            Ok(&self.slots[pid])
        } else {
            Err(KernelError::NoTask)
        }
    }

    pub fn lookup_mut(&mut self, pid: Pid) -> KResult<&mut Pcb> {
        if pid < MAX_TASKS && self.bitmap[pid] {
            Ok(&mut self.slots[pid])
        } else {
            Err(KernelError::NoTask)
        }
    }

    pub fn running_count(&self) -> usize {
        self.running
    }

    pub fn is_full(&self) -> bool {
        self.running == MAX_TASKS
    }

    pub fn bitmap(&self) -> [bool; MAX_TASKS] {
        self.bitmap
    }

    /// Running and not parked behind a child.
    pub fn is_runnable(&self, pid: Pid) -> bool {
        self.lookup(pid)
            .map(|pcb| pcb.running && pcb.waiting_on.is_none())
            .unwrap_or(false)
    }

    /// Running flags agree with the bitmap and the count matches both.
    pub fn consistent(&self) -> bool {
        let flags_match = self
            .slots
            .iter()
            .zip(self.bitmap.iter())
            .all(|(pcb, used)| pcb.running == *used);
        flags_match && self.bitmap.iter().filter(|used| **used).count() == self.running
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}
