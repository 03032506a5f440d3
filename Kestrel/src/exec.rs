// exec.rs
//
// execute/halt. `execute` validates a command, claims a slot, maps and loads
// the image and hands back the frame to enter it with. `halt` tears the
// task down and unwinds onto the parent's kernel stack, or restarts the
// shell when the task is a terminal's root.

use crate::arch::Platform;
use crate::context::{SavedContext, Transition, UserFrame};
use crate::error::{KResult, KernelError};
use crate::fs::{Dentry, FileKind, FileSystem};
use crate::interrupt::Exception;
use crate::kernel::{Kernel, KernelState};
use crate::klog::{kdebug, kerror, kinfo, kwarn};
use crate::process::{Pid, ARG_LEN};
use crate::task::{kernel_stack_top, prepare_frame, ProgramHeader, HEADER_LEN, LOAD_ADDR, MAX_IMAGE};

/// Exit status reported to the parent when its child dies on an exception.
pub const EXCEPTION_STATUS: u32 = 256;

const LOAD_CHUNK: usize = 1024;

/// A command line split into program name and argument string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command<'a> {
    pub name: &'a [u8],
    pub args: &'a [u8],
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != b' ').unwrap_or(bytes.len());
    &bytes[start..]
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a [u8]) -> KResult<Self> {
        let line = trim_start(line);
        let end = line.iter().position(|&b| b == b' ').unwrap_or(line.len());
        if end == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let args = trim_start(&line[end..]);
        if args.len() >= ARG_LEN {
            return Err(KernelError::InvalidArgument);
        }
        Ok(Self {
            name: &line[..end],
            args,
        })
    }
}

/// A program that passed validation and is ready to load.
#[derive(Clone, Copy, Debug)]
struct Program {
    dentry: Dentry,
    header: ProgramHeader,
    len: u32,
}

impl<P: Platform, F: FileSystem> Kernel<P, F> {
    /// Run `command` as a child of the current task. `caller` is the
    /// current task's kernel stack at the syscall, where its `execute`
    /// resumes once the child halts.
    ///
    /// Fails without touching any state unless the image load itself goes
    /// wrong, in which case the claimed slot is given back.
    pub fn execute(&self, command: &[u8], caller: SavedContext) -> KResult<UserFrame> {
        let command = Command::parse(command)?;
        if self.lock().tasks.is_full() {
            return Err(KernelError::ResourceExhausted);
        }
        let program = self.validate(command.name)?;

        let mut state = self.lock();
        let parent = state.current.ok_or(KernelError::NoTask)?;
        let terminal = state.tasks.lookup(parent)?.terminal;
        let (pid, frame) =
            self.spawn(&mut state, &command, &program, Some((parent, caller)), terminal)?;

        state.tasks.lookup_mut(parent)?.waiting_on = Some(pid);
        state.current = Some(pid);
        self.platform.set_kernel_stack(kernel_stack_top(pid));
        Ok(frame)
    }

    /// Load one root shell per terminal and enter the first. The others
    /// start the first time the scheduler picks them.
    pub fn boot(&self) -> KResult<Transition> {
        let command = Command::parse(self.config.shell.as_bytes())?;
        let program = self.validate(command.name)?;

        let mut state = self.lock();
        let mut first = None;
        for terminal in 0..self.config.terminals {
            let (pid, frame) = self.spawn(&mut state, &command, &program, None, terminal)?;
            if first.is_none() {
                first = Some((pid, frame));
            } else {
                state.tasks.lookup_mut(pid)?.pending_launch = Some(frame);
            }
        }
        let (pid, frame) = first.ok_or(KernelError::NoTask)?;

        state.space.switch_to(pid, &self.platform);
        self.platform.set_kernel_stack(kernel_stack_top(pid));
        state.current = Some(pid);
        Ok(Transition::Enter(frame))
    }

    /// `halt` with an 8-bit user status.
    pub fn halt(&self, status: u8) -> Transition {
        self.halt_with(status as u32)
    }

    /// Tear down the current task and resume its parent with `status`.
    pub fn halt_with(&self, status: u32) -> Transition {
        let mut state = self.lock();
        let Some(pid) = state.current else {
            kerror!("halt with no task running");
            return Transition::Stop;
        };
        let (parent, context, dropped) = match state.tasks.lookup_mut(pid) {
            Ok(pcb) => (pcb.parent, pcb.parent_context, pcb.files.clear_user()),
            Err(_) => {
                kerror!("halt from dead task {}", pid);
                return Transition::Stop;
            }
        };

        let Some(parent) = parent else {
            return self.restart_shell(&mut state, pid);
        };

        if dropped > 0 {
            kdebug!("task {}: dropped {} open descriptor(s)", pid, dropped);
        }
        state.tasks.release(pid);
        if let Ok(pcb) = state.tasks.lookup_mut(parent) {
            pcb.waiting_on = None;
        }
        state.space.switch_to(parent, &self.platform);
        self.platform.set_kernel_stack(kernel_stack_top(parent));
        state.current = Some(parent);

        kinfo!("task {} halted with status {}, back to task {}", pid, status, parent);
        Transition::Resume {
            context,
            value: status as i32,
        }
    }

    /// CPU exception raised by the current task.
    pub fn exception(&self, exception: Exception) -> Transition {
        match self.current_pid() {
            Some(pid) => {
                kerror!("{} in task {}", exception.name(), pid);
                self.halt_with(EXCEPTION_STATUS)
            }
            None => {
                kerror!("{} in kernel", exception.name());
                Transition::Stop
            }
        }
    }

    /// Look up a program and check its header.
    fn validate(&self, name: &[u8]) -> KResult<Program> {
        let dentry = self.fs.lookup(name)?;
        if !matches!(FileKind::try_from(dentry.kind), Ok(FileKind::Regular)) {
            return Err(KernelError::NotExecutable);
        }
        let mut header = [0u8; HEADER_LEN];
        let n = self.fs.read(dentry.inode, 0, &mut header)?;
        let header = ProgramHeader::parse(&header[..n])?;
        let len = self.fs.file_len(dentry.inode)?;
        if len > MAX_IMAGE {
            return Err(KernelError::NotExecutable);
        }
        Ok(Program { dentry, header, len })
    }

    /// Claim a slot, map it and load `program` into it. On a load failure
    /// the slot is released and the previous window mapped back.
    fn spawn(
        &self,
        state: &mut KernelState,
        command: &Command,
        program: &Program,
        parent: Option<(Pid, SavedContext)>,
        terminal: usize,
    ) -> KResult<(Pid, UserFrame)> {
        let pid = state.tasks.allocate()?;
        state.space.switch_to(pid, &self.platform);

        if let Err(err) = self.load(program) {
            state.tasks.release(pid);
            if let Some(prev) = state.current {
                state.space.switch_to(prev, &self.platform);
            }
            kerror!("loading {:?} into slot {} failed: {}", program.dentry.name, pid, err);
            return Err(KernelError::Device);
        }

        let pcb = state.tasks.lookup_mut(pid)?;
        pcb.parent = parent.map(|(p, _)| p);
        if let Some((_, context)) = parent {
            pcb.parent_context = context;
        }
        pcb.terminal = terminal;
        pcb.entry = program.header.entry;
        pcb.files.bind_std();
        pcb.args.set(command.args)?;

        kinfo!(
            "task {} started: {:?} on terminal {}, parent {:?}",
            pid,
            program.dentry.name,
            terminal,
            pcb.parent
        );
        kdebug!(
            "task {}: entry {:#x}, parent context {:#x}/{:#x}, kernel stack {:#x}",
            pid,
            pcb.entry,
            pcb.parent_context.esp,
            pcb.parent_context.ebp,
            kernel_stack_top(pid)
        );
        Ok((pid, prepare_frame(program.header.entry)))
    }

    /// Copy the image to the load address of the mapped window.
    fn load(&self, program: &Program) -> KResult<()> {
        let mut chunk = [0u8; LOAD_CHUNK];
        let mut offset = 0u32;
        while offset < program.len {
            let n = self.fs.read(program.dentry.inode, offset, &mut chunk)?;
            if n == 0 {
                return Err(KernelError::Device);
            }
            self.platform.copy_to_user(LOAD_ADDR + offset, &chunk[..n])?;
            offset += n as u32;
        }
        Ok(())
    }

    /// A root shell exited: load a fresh copy into the same slot and enter
    /// it again.
    fn restart_shell(&self, state: &mut KernelState, pid: Pid) -> Transition {
        let fresh = Command::parse(self.config.shell.as_bytes())
            .and_then(|command| self.validate(command.name))
            .and_then(|program| {
                state.space.switch_to(pid, &self.platform);
                self.load(&program)?;
                Ok(program)
            });
        let program = match fresh {
            Ok(program) => program,
            Err(err) => {
                kerror!("cannot restart shell in slot {}: {}", pid, err);
                return Transition::Stop;
            }
        };

        let Ok(pcb) = state.tasks.lookup_mut(pid) else {
            return Transition::Stop;
        };
        pcb.args.clear();
        pcb.entry = program.header.entry;
        pcb.pending_launch = None;
        self.platform.set_kernel_stack(kernel_stack_top(pid));
        kwarn!("root shell on terminal {} exited, restarting", pcb.terminal);
        Transition::Enter(prepare_frame(program.header.entry))
    }
}
