// terminal.rs
//
// Line discipline for the text terminals. The keyboard driver hands over
// already-translated bytes; they are echoed and collected into a line, and
// a newline moves the line into the terminal's input queue where `read`
// picks it up.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::arch::Platform;
use crate::error::{KResult, KernelError};
use crate::sync::IrqLock;

pub const MAX_TERMINALS: usize = 3;
/// Longest line, newline included.
pub const LINE_LEN: usize = 128;
const QUEUE_LEN: usize = 1024;

pub const BACKSPACE: u8 = 0x08;

struct InputQueue {
    buf: [u8; QUEUE_LEN],
    head: usize,
    tail: usize,
    /// Complete lines waiting in the queue.
    lines: usize,
}

impl InputQueue {
    const fn new() -> Self {
        Self {
            buf: [0; QUEUE_LEN],
            head: 0,
            tail: 0,
            lines: 0,
        }
    }

    fn free(&self) -> usize {
        QUEUE_LEN - 1 - (self.head + QUEUE_LEN - self.tail) % QUEUE_LEN
    }

    fn push(&mut self, b: u8) {
        self.buf[self.head] = b;
        self.head = (self.head + 1) % QUEUE_LEN;
    }

    fn pop(&mut self) -> Option<u8> {
        if self.tail == self.head {
            return None;
        }
        let b = self.buf[self.tail];
        self.tail = (self.tail + 1) % QUEUE_LEN;
        Some(b)
    }

    /// Queue a whole line, or drop it if it does not fit.
    fn push_line(&mut self, line: &[u8]) -> bool {
        if line.len() > self.free() {
            return false;
        }
        for &b in line {
            self.push(b);
        }
        self.lines += 1;
        true
    }

    /// Move up to `out.len()` bytes of the oldest line into `out`, stopping
    /// after its newline. Whatever does not fit stays queued.
    fn read_line(&mut self, out: &mut [u8]) -> usize {
        let mut n = 0;
        while n < out.len() {
            let Some(b) = self.pop() else { break };
            out[n] = b;
            n += 1;
            if b == b'\n' {
                self.lines -= 1;
                break;
            }
        }
        n
    }
}

struct TerminalState {
    edit: [u8; LINE_LEN],
    edit_len: usize,
    input: InputQueue,
}

impl TerminalState {
    const fn new() -> Self {
        Self {
            edit: [0; LINE_LEN],
            edit_len: 0,
            input: InputQueue::new(),
        }
    }
}

pub struct Terminals {
    terminals: [IrqLock<TerminalState>; MAX_TERMINALS],
    foreground: AtomicUsize,
}

fn check(terminal: usize) -> KResult<usize> {
    if terminal < MAX_TERMINALS {
        Ok(terminal)
    } else {
        Err(KernelError::InvalidArgument)
    }
}

impl Terminals {
    pub const fn new() -> Self {
        const IDLE: IrqLock<TerminalState> = IrqLock::new(TerminalState::new());
        Self {
            terminals: [IDLE; MAX_TERMINALS],
            foreground: AtomicUsize::new(0),
        }
    }

    pub fn foreground(&self) -> usize {
        self.foreground.load(Ordering::SeqCst)
    }

    pub fn set_foreground(&self, terminal: usize) -> KResult<()> {
        self.foreground.store(check(terminal)?, Ordering::SeqCst);
        Ok(())
    }

    /// A translated key press on the foreground terminal.
    pub fn key<P: Platform + ?Sized>(&self, byte: u8, platform: &P) {
        let t = self.foreground();
        let mut state = self.terminals[t].lock(platform);
        match byte {
            b'\n' | b'\r' => {
                let len = state.edit_len;
                state.edit[len] = b'\n';
                let line = state.edit;
                state.input.push_line(&line[..=len]);
                state.edit_len = 0;
                platform.put_bytes(t, b"\n");
            }
            BACKSPACE => {
                if state.edit_len > 0 {
                    state.edit_len -= 1;
                    platform.put_bytes(t, &[BACKSPACE]);
                }
            }
            _ => {
                // leave room for the newline
                if state.edit_len < LINE_LEN - 1 {
                    let len = state.edit_len;
                    state.edit[len] = byte;
                    state.edit_len += 1;
                    platform.put_bytes(t, &[byte]);
                }
            }
        }
    }

    /// Block until `terminal` has a complete line, then hand back as much of
    /// it as fits in `buf`.
    pub fn read<P: Platform + ?Sized>(
        &self,
        terminal: usize,
        buf: &mut [u8],
        platform: &P,
    ) -> KResult<usize> {
        let t = check(terminal)?;
        loop {
            {
                let mut state = self.terminals[t].lock(platform);
                if state.input.lines > 0 {
                    return Ok(state.input.read_line(buf));
                }
            }
            platform.wait_for_interrupt();
        }
    }

    pub fn write<P: Platform + ?Sized>(
        &self,
        terminal: usize,
        buf: &[u8],
        platform: &P,
    ) -> KResult<usize> {
        platform.put_bytes(check(terminal)?, buf);
        Ok(buf.len())
    }
}

impl Default for Terminals {
    fn default() -> Self {
        Self::new()
    }
}
