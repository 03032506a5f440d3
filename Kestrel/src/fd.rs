// fd.rs
//
// Per-task descriptor table. A descriptor names one of a closed set of file
// kinds; the kind decides which operations exist.

use crate::error::{KResult, KernelError};
use crate::fs::{FileKind, FileName};

pub const MAX_FILES: usize = 8;
pub const STDIN: i32 = 0;
pub const STDOUT: i32 = 1;
/// First descriptor `open` may hand out.
pub const FIRST_FREE: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Read,
    Write,
}

/// Operation table selected by file kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileOps {
    Stdin,
    Stdout,
    Rtc,
    Directory,
    RegularFile,
}

impl FileOps {
    pub const fn supports(self, op: Op) -> bool {
        matches!(
            (self, op),
            (FileOps::Stdin, Op::Read)
                | (FileOps::Stdout, Op::Write)
                | (FileOps::Rtc, _)
                | (FileOps::Directory, Op::Read)
                | (FileOps::RegularFile, Op::Read)
        )
    }
}

impl From<FileKind> for FileOps {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::Rtc => FileOps::Rtc,
            FileKind::Directory => FileOps::Directory,
            FileKind::Regular => FileOps::RegularFile,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileDescriptor {
    pub ops: FileOps,
    pub inode: u32,
    /// Byte offset for regular files, entry index for directories.
    pub position: u32,
}

impl FileDescriptor {
    pub const fn new(ops: FileOps, inode: u32) -> Self {
        Self {
            ops,
            inode,
            position: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FdTable {
    entries: [Option<FileDescriptor>; MAX_FILES],
    names: [FileName; MAX_FILES],
    open_count: usize,
}

fn index(fd: i32) -> KResult<usize> {
    usize::try_from(fd)
        .ok()
        .filter(|&i| i < MAX_FILES)
        .ok_or(KernelError::BadDescriptor)
}

impl FdTable {
    pub const fn new() -> Self {
        Self {
            entries: [None; MAX_FILES],
            names: [FileName::empty(); MAX_FILES],
            open_count: 0,
        }
    }

    /// Pre-bind terminal input and output to descriptors 0 and 1 and clear
    /// everything else.
    pub fn bind_std(&mut self) {
        *self = Self::new();
        self.entries[STDIN as usize] = Some(FileDescriptor::new(FileOps::Stdin, 0));
        self.entries[STDOUT as usize] = Some(FileDescriptor::new(FileOps::Stdout, 0));
        self.open_count = 2;
    }

    /// Place `desc` in the lowest free descriptor at or above 2.
    pub fn install(&mut self, desc: FileDescriptor, name: FileName) -> KResult<i32> {
        let slot = (FIRST_FREE..MAX_FILES)
            .find(|&i| self.entries[i].is_none())
            .ok_or(KernelError::ResourceExhausted)?;
        self.entries[slot] = Some(desc);
        self.names[slot] = name;
        self.open_count += 1;
        Ok(slot as i32)
    }

    pub fn get(&self, fd: i32) -> KResult<FileDescriptor> {
        self.entries[index(fd)?].ok_or(KernelError::BadDescriptor)
    }

    pub fn set_position(&mut self, fd: i32, position: u32) -> KResult<()> {
        let entry = self.entries[index(fd)?].as_mut().ok_or(KernelError::BadDescriptor)?;
        entry.position = position;
        Ok(())
    }

    /// Free a descriptor opened with `install`. 0 and 1 can never be removed.
    pub fn remove(&mut self, fd: i32) -> KResult<FileDescriptor> {
        let i = index(fd)?;
        if i < FIRST_FREE {
            return Err(KernelError::BadDescriptor);
        }
        let desc = self.entries[i].take().ok_or(KernelError::BadDescriptor)?;
        self.names[i] = FileName::empty();
        self.open_count -= 1;
        Ok(desc)
    }

    /// Drop every descriptor above the standard pair without closing them.
    /// Returns how many were dropped.
    pub fn clear_user(&mut self) -> usize {
        let mut dropped = 0;
        for i in FIRST_FREE..MAX_FILES {
            if self.entries[i].take().is_some() {
                dropped += 1;
            }
            self.names[i] = FileName::empty();
        }
        self.open_count -= dropped;
        dropped
    }

    pub fn name(&self, fd: i32) -> KResult<FileName> {
        let i = index(fd)?;
        self.entries[i].ok_or(KernelError::BadDescriptor)?;
        Ok(self.names[i])
    }

    /// Every descriptor a task may open is taken.
    pub fn is_full(&self) -> bool {
        self.entries[FIRST_FREE..].iter().all(Option::is_some)
    }

    pub fn open_count(&self) -> usize {
        self.open_count
    }

    pub fn in_use(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}
