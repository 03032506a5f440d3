// syscall.rs
//
// int 0x80 entry. Arguments arrive in ebx/ecx/edx as raw user values; every
// pointer is checked against the user window before it is touched, and any
// failure reaches user space as -1.

use num_enum::TryFromPrimitive;

use crate::arch::Platform;
use crate::context::{SavedContext, Transition};
use crate::error::{KResult, KernelError};
use crate::fs::{FileSystem, FILENAME_LEN};
use crate::kernel::Kernel;
use crate::klog::kwarn;
use crate::memory::{USER_BASE, USER_END};
use crate::process::ARG_LEN;

#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum Syscall {
    Halt = 1,
    Execute = 2,
    Read = 3,
    Write = 4,
    Open = 5,
    Close = 6,
    GetArgs = 7,
    Vidmap = 8,
    SetHandler = 9,
    SigReturn = 10,
}

/// eax and the three argument registers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyscallArgs {
    pub number: u32,
    pub arg1: u32,
    pub arg2: u32,
    pub arg3: u32,
}

impl SyscallArgs {
    pub const fn new(number: u32, arg1: u32, arg2: u32, arg3: u32) -> Self {
        Self {
            number,
            arg1,
            arg2,
            arg3,
        }
    }
}

/// Longest command line `execute` accepts, terminator included.
pub const COMMAND_LEN: usize = FILENAME_LEN + 1 + ARG_LEN;

/// Bounce buffer for read/write.
const CHUNK: usize = 256;

/// `[ptr, ptr + len)` lies inside the user window.
pub fn check_user_range(ptr: u32, len: usize) -> KResult<()> {
    let len = u32::try_from(len).map_err(|_| KernelError::InvalidArgument)?;
    let end = ptr.checked_add(len).ok_or(KernelError::InvalidArgument)?;
    if ptr < USER_BASE || end > USER_END {
        return Err(KernelError::InvalidArgument);
    }
    Ok(())
}

fn returned(result: KResult<usize>) -> Transition {
    match result {
        Ok(n) => Transition::Return(n as i32),
        Err(err) => Transition::Return(err.errno()),
    }
}

impl<P: Platform, F: FileSystem> Kernel<P, F> {
    /// Service a system call from the current task. `caller` is the kernel
    /// stack the call arrived on.
    pub fn syscall(&self, args: SyscallArgs, caller: SavedContext) -> Transition {
        let Ok(call) = Syscall::try_from(args.number) else {
            kwarn!("unknown syscall {}", args.number);
            return Transition::Return(KernelError::Unsupported.errno());
        };
        match call {
            Syscall::Halt => self.halt(args.arg1 as u8),
            Syscall::Execute => match self.sys_execute(args.arg1, caller) {
                Ok(t) => t,
                Err(err) => Transition::Return(err.errno()),
            },
            Syscall::Read => {
                returned(self.sys_read(args.arg1 as i32, args.arg2, args.arg3 as usize))
            }
            Syscall::Write => {
                returned(self.sys_write(args.arg1 as i32, args.arg2, args.arg3 as usize))
            }
            Syscall::Open => returned(self.sys_open(args.arg1)),
            Syscall::Close => returned(self.close(args.arg1 as i32).map(|_| 0)),
            Syscall::GetArgs => returned(self.sys_getargs(args.arg1, args.arg2 as usize)),
            Syscall::Vidmap => returned(self.vidmap(args.arg1).map(|addr| addr as usize)),
            Syscall::SetHandler | Syscall::SigReturn => {
                Transition::Return(KernelError::Unsupported.errno())
            }
        }
    }

    /// Copy a NUL-terminated string out of user space into `buf`.
    fn user_str<'b>(&self, ptr: u32, buf: &'b mut [u8]) -> KResult<&'b [u8]> {
        for i in 0..buf.len() {
            let at = ptr.checked_add(i as u32).ok_or(KernelError::InvalidArgument)?;
            check_user_range(at, 1)?;
            self.platform.copy_from_user(at, &mut buf[i..=i])?;
            if buf[i] == 0 {
                return Ok(&buf[..i]);
            }
        }
        Err(KernelError::InvalidArgument)
    }

    fn sys_execute(&self, ptr: u32, caller: SavedContext) -> KResult<Transition> {
        let mut line = [0u8; COMMAND_LEN];
        let command = self.user_str(ptr, &mut line)?;
        Ok(Transition::Enter(self.execute(command, caller)?))
    }

    fn sys_open(&self, ptr: u32) -> KResult<usize> {
        let mut name = [0u8; FILENAME_LEN + 1];
        let name = self.user_str(ptr, &mut name)?;
        Ok(self.open(name)? as usize)
    }

    fn sys_read(&self, fd: i32, ptr: u32, len: usize) -> KResult<usize> {
        check_user_range(ptr, len)?;
        let mut chunk = [0u8; CHUNK];
        let mut done = 0;
        // only regular files fill a whole chunk and come back for more
        while done < len {
            let want = CHUNK.min(len - done);
            let n = self.read(fd, &mut chunk[..want])?;
            self.platform.copy_to_user(ptr + done as u32, &chunk[..n])?;
            done += n;
            if n < want {
                break;
            }
        }
        Ok(done)
    }

    fn sys_write(&self, fd: i32, ptr: u32, len: usize) -> KResult<usize> {
        check_user_range(ptr, len)?;
        let mut chunk = [0u8; CHUNK];
        let mut done = 0;
        while done < len {
            let n = CHUNK.min(len - done);
            self.platform.copy_from_user(ptr + done as u32, &mut chunk[..n])?;
            done += self.write(fd, &chunk[..n])?;
        }
        Ok(done)
    }

    fn sys_getargs(&self, ptr: u32, len: usize) -> KResult<usize> {
        check_user_range(ptr, len)?;
        let mut buf = [0u8; ARG_LEN];
        let n = self.getargs(&mut buf[..len.min(ARG_LEN)])?;
        self.platform.copy_to_user(ptr, &buf[..n])?;
        Ok(0)
    }

    /// Copy the current task's argument string and a terminator into `buf`.
    /// Returns the bytes written. Fails if there are no arguments or they do
    /// not fit.
    pub fn getargs(&self, buf: &mut [u8]) -> KResult<usize> {
        let state = self.lock();
        let args = &state.current_pcb()?.args;
        if args.is_empty() || args.as_bytes().len() + 1 > buf.len() {
            return Err(KernelError::InvalidArgument);
        }
        let n = args.as_bytes().len();
        buf[..n].copy_from_slice(args.as_bytes());
        buf[n] = 0;
        Ok(n + 1)
    }

    /// Map video memory into the current task and store the user address at
    /// `out`, which must itself point into the user window.
    pub fn vidmap(&self, out: u32) -> KResult<u32> {
        check_user_range(out, 4)?;
        let mut state = self.lock();
        state.current_pcb()?;
        let addr = state.space.map_video_window(&self.platform);
        self.platform.copy_to_user(out, &addr.to_le_bytes())?;
        Ok(addr)
    }
}
