// error.rs

use core::fmt;

/// Everything a kernel operation can fail with.
///
/// The syscall boundary flattens all of these into `-1`; inside the kernel
/// they stay distinct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelError {
    /// Malformed argument: empty command, bad user pointer, bad length.
    InvalidArgument,
    /// Descriptor out of range, not in use, or reserved.
    BadDescriptor,
    /// No directory entry with the requested name.
    NotFound,
    /// The file exists but does not carry the executable signature.
    NotExecutable,
    /// The descriptor's file kind has no such operation.
    Unsupported,
    /// No free task slot or descriptor.
    ResourceExhausted,
    /// The backing device reported a bad block or I/O fault.
    Device,
    /// No task is active to service the request.
    NoTask,
}

impl KernelError {
    /// Value handed back to user space in `eax`.
    pub const fn errno(self) -> i32 {
        -1
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            KernelError::InvalidArgument => "invalid argument",
            KernelError::BadDescriptor => "bad file descriptor",
            KernelError::NotFound => "no such file",
            KernelError::NotExecutable => "not an executable",
            KernelError::Unsupported => "operation not supported",
            KernelError::ResourceExhausted => "resource exhausted",
            KernelError::Device => "device failure",
            KernelError::NoTask => "no active task",
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type KResult<T> = Result<T, KernelError>;
