// fs.rs
//
// Read-only boot image filesystem and the lookup/read interface the rest of
// the kernel consumes.
//
// Image layout, all fields little-endian u32:
//
//   block 0          boot block: dentry count, inode count, data-block count,
//                    52 reserved bytes, then 63 dentries of 64 bytes each
//                    (32-byte name, kind, inode, 24 reserved bytes)
//   block 1..=N      inodes: byte length, then data-block indices
//   block N+1..      data blocks
//
// Every block is 4 KiB.

use num_enum::TryFromPrimitive;

use crate::error::{KResult, KernelError};

pub const BLOCK_SIZE: usize = 4096;
pub const FILENAME_LEN: usize = 32;
pub const DENTRY_SIZE: usize = 64;
pub const MAX_DENTRIES: usize = 63;
/// Offset of the first dentry inside the boot block.
pub const DENTRY_BASE: usize = 64;
/// Data-block slots in one inode.
pub const INODE_BLOCKS: usize = BLOCK_SIZE / 4 - 1;

const KIND_OFFSET: usize = 32;
const INODE_OFFSET: usize = 36;

/// The file-kind tag stored in a dentry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum FileKind {
    /// Real-time clock character device.
    Rtc = 0,
    Directory = 1,
    Regular = 2,
}

/// A file name of at most 32 bytes. Names of exactly 32 bytes carry no
/// terminator on disk.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FileName {
    bytes: [u8; FILENAME_LEN],
    len: u8,
}

impl FileName {
    pub const fn empty() -> Self {
        Self {
            bytes: [0; FILENAME_LEN],
            len: 0,
        }
    }

    pub fn new(name: &[u8]) -> KResult<Self> {
        if name.is_empty() || name.len() > FILENAME_LEN || name.contains(&0) {
            return Err(KernelError::NotFound);
        }
        let mut bytes = [0; FILENAME_LEN];
        bytes[..name.len()].copy_from_slice(name);
        Ok(Self {
            bytes,
            len: name.len() as u8,
        })
    }

    /// Decode an on-disk name field, stopping at the first NUL.
    fn from_field(field: &[u8]) -> Self {
        let len = field.iter().position(|&b| b == 0).unwrap_or(FILENAME_LEN.min(field.len()));
        let mut bytes = [0; FILENAME_LEN];
        bytes[..len].copy_from_slice(&field[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl core::fmt::Debug for FileName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match core::str::from_utf8(self.as_bytes()) {
            Ok(s) => write!(f, "{:?}", s),
            Err(_) => write!(f, "{:?}", self.as_bytes()),
        }
    }
}

/// Directory entry as handed out by a lookup. `kind` is the raw tag; the
/// descriptor layer decides what to make of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dentry {
    pub name: FileName,
    pub kind: u32,
    pub inode: u32,
}

/// What the kernel needs from a filesystem.
pub trait FileSystem: Sync {
    /// Find the entry called `name`.
    fn lookup(&self, name: &[u8]) -> KResult<Dentry>;

    /// The `index`th directory entry, in directory order.
    fn dentry_at(&self, index: usize) -> Option<Dentry>;

    /// Read from `inode` starting at `offset`. Returns 0 at end of file.
    fn read(&self, inode: u32, offset: u32, buf: &mut [u8]) -> KResult<usize>;

    /// Length of `inode` in bytes.
    fn file_len(&self, inode: u32) -> KResult<u32>;
}

/// A filesystem image sitting in memory (a boot module on real hardware).
pub struct BootImage<'a> {
    image: &'a [u8],
    dentries: usize,
    inodes: usize,
    data_blocks: usize,
}

fn le32(bytes: &[u8], at: usize) -> KResult<u32> {
    let field = bytes.get(at..at + 4).ok_or(KernelError::Device)?;
    Ok(u32::from_le_bytes([field[0], field[1], field[2], field[3]]))
}

impl<'a> BootImage<'a> {
    pub fn parse(image: &'a [u8]) -> KResult<Self> {
        if image.len() < BLOCK_SIZE {
            return Err(KernelError::Device);
        }
        let dentries = le32(image, 0)? as usize;
        let inodes = le32(image, 4)? as usize;
        let data_blocks = le32(image, 8)? as usize;
        let needed = inodes
            .checked_add(data_blocks)
            .and_then(|blocks| blocks.checked_add(1))
            .and_then(|blocks| blocks.checked_mul(BLOCK_SIZE))
            .ok_or(KernelError::Device)?;
        if dentries > MAX_DENTRIES || image.len() < needed {
            return Err(KernelError::Device);
        }
        Ok(Self {
            image,
            dentries,
            inodes,
            data_blocks,
        })
    }

    pub fn dentry_count(&self) -> usize {
        self.dentries
    }

    fn inode_base(&self, inode: u32) -> KResult<usize> {
        let inode = inode as usize;
        if inode >= self.inodes {
            return Err(KernelError::InvalidArgument);
        }
        Ok((1 + inode) * BLOCK_SIZE)
    }

    fn data_block(&self, index: u32) -> KResult<&'a [u8]> {
        let index = index as usize;
        if index >= self.data_blocks {
            return Err(KernelError::Device);
        }
        let start = (1 + self.inodes + index) * BLOCK_SIZE;
        self.image.get(start..start + BLOCK_SIZE).ok_or(KernelError::Device)
    }

    fn raw_dentry(&self, index: usize) -> KResult<Dentry> {
        let base = DENTRY_BASE + index * DENTRY_SIZE;
        Ok(Dentry {
            name: FileName::from_field(&self.image[base..base + FILENAME_LEN]),
            kind: le32(self.image, base + KIND_OFFSET)?,
            inode: le32(self.image, base + INODE_OFFSET)?,
        })
    }
}

impl FileSystem for BootImage<'_> {
    fn lookup(&self, name: &[u8]) -> KResult<Dentry> {
        let wanted = FileName::new(name)?;
        (0..self.dentries)
            .filter_map(|i| self.raw_dentry(i).ok())
            .find(|d| d.name == wanted)
            .ok_or(KernelError::NotFound)
    }

    fn dentry_at(&self, index: usize) -> Option<Dentry> {
        if index >= self.dentries {
            return None;
        }
        self.raw_dentry(index).ok()
    }

    fn read(&self, inode: u32, offset: u32, buf: &mut [u8]) -> KResult<usize> {
        let base = self.inode_base(inode)?;
        let length = le32(self.image, base)? as usize;
        let offset = offset as usize;
        if offset >= length {
            return Ok(0);
        }

        let want = buf.len().min(length - offset);
        let mut done = 0;
        while done < want {
            let pos = offset + done;
            let nth = pos / BLOCK_SIZE;
            if nth >= INODE_BLOCKS {
                return Err(KernelError::Device);
            }
            let block = self.data_block(le32(self.image, base + 4 + nth * 4)?)?;
            let within = pos % BLOCK_SIZE;
            let n = (BLOCK_SIZE - within).min(want - done);
            buf[done..done + n].copy_from_slice(&block[within..within + n]);
            done += n;
        }
        Ok(done)
    }

    fn file_len(&self, inode: u32) -> KResult<u32> {
        le32(self.image, self.inode_base(inode)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FsImageBuilder;
    use std::vec;
    use std::vec::Vec;

    fn sample() -> Vec<u8> {
        let big: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        FsImageBuilder::new()
            .directory(".")
            .device("rtc")
            .file("frame0.txt", b"fish fish fish\n")
            .file("verylargetextwithverylongname.tx", &big)
            .build()
    }

    #[test]
    fn lookup_by_name() {
        let image = sample();
        let fs = BootImage::parse(&image).unwrap();
        assert_eq!(fs.dentry_count(), 4);

        let d = fs.lookup(b"frame0.txt").unwrap();
        assert_eq!(d.kind, FileKind::Regular as u32);
        assert_eq!(fs.file_len(d.inode).unwrap(), 15);

        assert_eq!(fs.lookup(b"rtc").unwrap().kind, FileKind::Rtc as u32);
        assert_eq!(fs.lookup(b"frame0"), Err(KernelError::NotFound));
        assert_eq!(fs.lookup(b""), Err(KernelError::NotFound));
    }

    #[test]
    fn full_length_names_have_no_terminator() {
        let image = sample();
        let fs = BootImage::parse(&image).unwrap();
        let d = fs.lookup(b"verylargetextwithverylongname.tx").unwrap();
        assert_eq!(d.name.as_bytes().len(), FILENAME_LEN);
        // one byte over the limit never matches
        assert_eq!(fs.lookup(b"verylargetextwithverylongname.txt"), Err(KernelError::NotFound));
    }

    #[test]
    fn read_crosses_block_boundaries() {
        let image = sample();
        let fs = BootImage::parse(&image).unwrap();
        let d = fs.lookup(b"verylargetextwithverylongname.tx").unwrap();

        let mut buf = vec![0u8; 300];
        let n = fs.read(d.inode, 4000, &mut buf).unwrap();
        assert_eq!(n, 300);
        for (i, b) in buf.iter().enumerate() {
            assert_eq!(*b, ((4000 + i) % 251) as u8);
        }

        // short read at the tail, then EOF
        let n = fs.read(d.inode, 9_990, &mut buf).unwrap();
        assert_eq!(n, 10);
        assert_eq!(fs.read(d.inode, 10_000, &mut buf).unwrap(), 0);
    }

    #[test]
    fn bad_inode_and_bad_block() {
        let mut image = sample();
        let fs = BootImage::parse(&image).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(fs.read(99, 0, &mut buf), Err(KernelError::InvalidArgument));

        // corrupt the first data-block index of frame0.txt
        let inode = fs.lookup(b"frame0.txt").unwrap().inode as usize;
        let at = (1 + inode) * BLOCK_SIZE + 4;
        image[at..at + 4].copy_from_slice(&0xFFFFu32.to_le_bytes());
        let fs = BootImage::parse(&image).unwrap();
        assert_eq!(fs.read(inode as u32, 0, &mut buf), Err(KernelError::Device));
    }

    #[test]
    fn dentries_in_directory_order() {
        let image = sample();
        let fs = BootImage::parse(&image).unwrap();
        let names: Vec<Vec<u8>> = (0..)
            .map_while(|i| fs.dentry_at(i))
            .map(|d| d.name.as_bytes().to_vec())
            .collect();
        assert_eq!(names[0], b".".to_vec());
        assert_eq!(names[2], b"frame0.txt".to_vec());
        assert_eq!(names.len(), 4);
    }

    #[test]
    fn truncated_image_is_rejected() {
        let image = sample();
        assert!(BootImage::parse(&image[..BLOCK_SIZE - 1]).is_err());
        assert!(BootImage::parse(&image[..image.len() - 1]).is_err());
    }

    #[test]
    fn absurd_block_counts_are_rejected() {
        let mut image = sample();
        image[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        image[8..12].copy_from_slice(&u32::MAX.to_le_bytes());
        assert_eq!(BootImage::parse(&image).err(), Some(KernelError::Device));
    }

    #[test]
    fn file_kind_tags() {
        assert_eq!(FileKind::try_from(0u32).unwrap(), FileKind::Rtc);
        assert_eq!(FileKind::try_from(2u32).unwrap(), FileKind::Regular);
        assert!(FileKind::try_from(3u32).is_err());
    }
}
