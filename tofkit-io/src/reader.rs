//! Memory-mapped file reading and little-endian decoding.
//!

use crate::{Error, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A memory-mapped file reader.
///
/// Uses memmap2 to access file contents without copying the whole file into
/// memory first.
pub struct MappedFileReader {
    mmap: Mmap,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and callers hold a `FileLock` while
        // writers may be active, so it is not modified while mapped.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap[..]
    }

    /// Path the reader was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Returns true if the file starts with `magic`.
    #[must_use]
    pub fn has_magic(&self, magic: &[u8]) -> bool {
        self.mmap.starts_with(magic)
    }
}

/// Sequential little-endian decoder over a byte slice.
pub(crate) struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                Error::InvalidFormat(format!(
                    "truncated file: needed {len} bytes at offset {}, file has {}",
                    self.pos,
                    self.bytes.len()
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn expect_magic(&mut self, magic: &[u8; 8]) -> Result<()> {
        let found = self.take(magic.len())?;
        if found != magic {
            return Err(Error::InvalidFormat(format!(
                "bad magic {:?}, expected {:?}",
                String::from_utf8_lossy(found),
                String::from_utf8_lossy(magic)
            )));
        }
        Ok(())
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub(crate) fn read_len(&mut self) -> Result<usize> {
        let value = self.read_u64()?;
        usize::try_from(value)
            .map_err(|_| Error::InvalidFormat(format!("length {value} does not fit in memory")))
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub(crate) fn read_f64s(&mut self, count: usize) -> Result<Vec<f64>> {
        let len = count
            .checked_mul(8)
            .ok_or_else(|| Error::InvalidFormat(format!("array of {count} values is too large")))?;
        Ok(self
            .take(len)?
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                f64::from_le_bytes(buf)
            })
            .collect())
    }

    pub(crate) fn finish(&self) -> Result<()> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(Error::InvalidFormat(format!(
                "{} trailing bytes",
                self.bytes.len() - self.pos
            )))
        }
    }
}
