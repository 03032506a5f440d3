// file.rs
//
// open/read/write/close on the current task's descriptors. Device reads
// that block run with the kernel lock released.

use crate::arch::Platform;
use crate::error::{KResult, KernelError};
use crate::fd::{FileDescriptor, FileOps, Op, STDIN, STDOUT};
use crate::fs::{FileKind, FileSystem};
use crate::kernel::Kernel;
use crate::klog::kdebug;

impl<P: Platform, F: FileSystem> Kernel<P, F> {
    pub fn open(&self, name: &[u8]) -> KResult<i32> {
        match name {
            b"stdin" => return Ok(STDIN),
            b"stdout" => return Ok(STDOUT),
            _ => {}
        }
        let dentry = self.fs.lookup(name)?;
        let kind = FileKind::try_from(dentry.kind).map_err(|_| KernelError::Unsupported)?;
        let ops = FileOps::from(kind);

        if self.lock().current_pcb()?.files.is_full() {
            return Err(KernelError::ResourceExhausted);
        }
        // the device is ready before a descriptor can reach it
        if ops == FileOps::Rtc {
            self.rtc.open(&self.platform)?;
        }
        let fd = {
            let mut state = self.lock();
            let pcb = state.current_pcb_mut()?;
            pcb.files.install(FileDescriptor::new(ops, dentry.inode), dentry.name)?
        };
        kdebug!("open {:?} -> fd {}", dentry.name, fd);
        Ok(fd)
    }

    pub fn read(&self, fd: i32, buf: &mut [u8]) -> KResult<usize> {
        let mut state = self.lock();
        let pcb = state.current_pcb_mut()?;
        let desc = pcb.files.get(fd)?;
        if !desc.ops.supports(Op::Read) {
            return Err(KernelError::Unsupported);
        }
        match desc.ops {
            FileOps::Stdin => {
                let terminal = pcb.terminal;
                drop(state);
                self.terminals.read(terminal, buf, &self.platform)
            }
            FileOps::Rtc => {
                drop(state);
                self.rtc.read(&self.platform)
            }
            FileOps::Directory => {
                if buf.is_empty() {
                    return Ok(0);
                }
                // one name per read; past the last entry, report 0 and rewind
                let Some(dentry) = self.fs.dentry_at(desc.position as usize) else {
                    pcb.files.set_position(fd, 0)?;
                    return Ok(0);
                };
                let name = dentry.name.as_bytes();
                let n = name.len().min(buf.len());
                buf[..n].copy_from_slice(&name[..n]);
                pcb.files.set_position(fd, desc.position + 1)?;
                Ok(n)
            }
            FileOps::RegularFile => {
                let n = self.fs.read(desc.inode, desc.position, buf)?;
                pcb.files.set_position(fd, desc.position + n as u32)?;
                Ok(n)
            }
            FileOps::Stdout => Err(KernelError::Unsupported),
        }
    }

    pub fn write(&self, fd: i32, buf: &[u8]) -> KResult<usize> {
        let (desc, terminal) = {
            let state = self.lock();
            let pcb = state.current_pcb()?;
            (pcb.files.get(fd)?, pcb.terminal)
        };
        if !desc.ops.supports(Op::Write) {
            return Err(KernelError::Unsupported);
        }
        match desc.ops {
            FileOps::Stdout => self.terminals.write(terminal, buf, &self.platform),
            FileOps::Rtc => self.rtc.write(buf, &self.platform),
            _ => Err(KernelError::Unsupported),
        }
    }

    pub fn close(&self, fd: i32) -> KResult<()> {
        let desc = {
            let state = self.lock();
            state.current_pcb()?.files.get(fd)?
        };
        if desc.ops == FileOps::Rtc {
            self.rtc.close()?;
        }
        let mut state = self.lock();
        state.current_pcb_mut()?.files.remove(fd)?;
        kdebug!("close fd {}", fd);
        Ok(())
    }

    /// Descriptors in use by the current task.
    pub fn open_count(&self) -> KResult<usize> {
        Ok(self.lock().current_pcb()?.files.open_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SavedContext;
    use crate::fd::MAX_FILES;
    use crate::testing::{booted, FRAME0};
    use core::sync::atomic::{AtomicBool, Ordering};
    use std::vec::Vec;

    #[test]
    fn open_never_hands_out_std_descriptors() {
        let k = booted();
        assert_eq!(k.open(b"stdin"), Ok(0));
        assert_eq!(k.open(b"stdout"), Ok(1));
        for name in [&b"frame0.txt"[..], b".", b"rtc", b"big.txt", b"notes", b"shell"] {
            let fd = k.open(name).unwrap();
            assert!(fd >= 2, "{fd}");
        }
        // table is full now
        assert_eq!(k.open(b"prog"), Err(KernelError::ResourceExhausted));
        assert_eq!(k.open_count(), Ok(MAX_FILES));
        assert_eq!(k.open(b"nosuch"), Err(KernelError::NotFound));
    }

    #[test]
    fn std_descriptors_cannot_be_closed() {
        let k = booted();
        assert_eq!(k.close(0), Err(KernelError::BadDescriptor));
        assert_eq!(k.close(1), Err(KernelError::BadDescriptor));
        assert_eq!(k.close(2), Err(KernelError::BadDescriptor));
        assert_eq!(k.close(-3), Err(KernelError::BadDescriptor));
        assert_eq!(k.close(8), Err(KernelError::BadDescriptor));
        assert_eq!(k.open_count(), Ok(2));
    }

    #[test]
    fn open_close_pair_restores_open_count() {
        let k = booted();
        for name in [&b"frame0.txt"[..], b".", b"rtc"] {
            let before = k.open_count().unwrap();
            let fd = k.open(name).unwrap();
            assert_eq!(k.open_count().unwrap(), before + 1);
            k.close(fd).unwrap();
            assert_eq!(k.open_count().unwrap(), before);
            assert_eq!(k.close(fd), Err(KernelError::BadDescriptor));
        }
    }

    #[test]
    fn regular_file_reads_advance() {
        let k = booted();
        let fd = k.open(b"frame0.txt").unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(k.read(fd, &mut buf), Ok(10));
        assert_eq!(&buf, &FRAME0[..10]);

        let mut rest = Vec::new();
        loop {
            let n = k.read(fd, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            rest.extend_from_slice(&buf[..n]);
        }
        assert_eq!(rest, FRAME0[10..].to_vec());
        assert_eq!(k.write(fd, b"x"), Err(KernelError::Unsupported));
    }

    #[test]
    fn directory_listing_restarts() {
        let k = booted();
        let fd = k.open(b".").unwrap();
        let mut buf = [0u8; 32];
        let mut first = Vec::new();
        loop {
            let n = k.read(fd, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            first.push(buf[..n].to_vec());
        }
        assert_eq!(first.len(), 8);
        assert_eq!(first[0], b".".to_vec());
        assert_eq!(first[2], b"shell".to_vec());

        // the read after the end starts a fresh listing
        let n = k.read(fd, &mut buf).unwrap();
        assert_eq!(&buf[..n], b".");
        assert_eq!(k.write(fd, b"x"), Err(KernelError::Unsupported));
    }

    #[test]
    fn empty_directory_read_keeps_the_position() {
        let k = booted();
        let fd = k.open(b".").unwrap();
        assert_eq!(k.read(fd, &mut []), Ok(0));
        let mut buf = [0u8; 32];
        let n = k.read(fd, &mut buf).unwrap();
        assert_eq!(&buf[..n], b".");
        let n = k.read(fd, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"rtc");
    }

    #[test]
    fn rtc_open_on_a_full_table_changes_nothing() {
        let k = booted();
        let fd = k.open(b"rtc").unwrap();
        k.write(fd, &512u32.to_le_bytes()).unwrap();
        while k.open(b"frame0.txt").is_ok() {}
        let count = k.open_count().unwrap();

        assert_eq!(k.open(b"rtc"), Err(KernelError::ResourceExhausted));
        assert_eq!(k.open_count(), Ok(count));
        assert_eq!(k.rtc().frequency(), 512);
    }

    #[test]
    fn std_streams_only_go_one_way() {
        let k = booted();
        let mut buf = [0u8; 4];
        assert_eq!(k.read(1, &mut buf), Err(KernelError::Unsupported));
        assert_eq!(k.write(0, b"hi"), Err(KernelError::Unsupported));
        assert_eq!(k.write(1, b"hi\n"), Ok(3));
        assert_eq!(k.platform().screen(0), b"hi\n".to_vec());
        assert_eq!(k.read(5, &mut buf), Err(KernelError::BadDescriptor));
    }

    #[test]
    fn stdin_reads_the_task_terminal() {
        let k = booted();
        for &b in b"echo hi\n" {
            k.terminals().key(b, k.platform());
        }
        let mut buf = [0u8; 64];
        assert_eq!(k.read(0, &mut buf), Ok(8));
        assert_eq!(&buf[..8], b"echo hi\n");
    }

    #[test]
    fn rtc_descriptor() {
        let k = booted();
        let fd = k.open(b"rtc").unwrap();
        assert_eq!(k.rtc().frequency(), 2);
        assert_eq!(k.write(fd, &512u32.to_le_bytes()), Ok(4));
        assert_eq!(k.rtc().frequency(), 512);
        assert_eq!(k.write(fd, &500u32.to_le_bytes()), Err(KernelError::InvalidArgument));
        assert_eq!(k.rtc().frequency(), 512);

        let done = AtomicBool::new(false);
        std::thread::scope(|s| {
            s.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    k.rtc().interrupt();
                    std::thread::yield_now();
                }
            });
            let mut buf = [0u8; 4];
            assert_eq!(k.read(fd, &mut buf), Ok(0));
            done.store(true, Ordering::SeqCst);
        });
    }

    #[test]
    fn descriptors_are_per_task() {
        let k = booted();
        let fd = k.open(b"frame0.txt").unwrap();
        k.execute(b"prog", SavedContext::new(0x7F_FF00, 0x7F_FF00)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(k.read(fd, &mut buf), Err(KernelError::BadDescriptor));
        assert_eq!(k.open(b"big.txt"), Ok(2));
        k.halt(0);
        // the parent's descriptor survived, untouched
        assert_eq!(k.read(fd, &mut buf), Ok(4));
        assert_eq!(&buf, &FRAME0[..4]);
    }
}
