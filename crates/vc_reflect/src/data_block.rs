use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

// -----------------------------------------------------------------------------
// DataBlock

/// An opaque, possibly large, byte blob.
///
/// The bytes either live in shared memory or in a region of a file.
/// File-backed blocks are produced when decoding straight from a file, so
/// the payload is only read when [`open`](Self::open) is called.
///
/// # Examples
///
/// ```
/// use std::io::Read;
/// use vc_reflect::DataBlock;
///
/// let block = DataBlock::from_bytes(vec![1_u8, 2, 3]);
/// assert_eq!(block.len(), 3);
///
/// let mut bytes = Vec::new();
/// block.open().unwrap().read_to_end(&mut bytes).unwrap();
/// assert_eq!(bytes, [1, 2, 3]);
/// ```
#[derive(Clone, Default)]
pub struct DataBlock {
    source: Source,
}

#[derive(Clone)]
enum Source {
    Memory(Arc<[u8]>),
    File {
        path: Arc<Path>,
        offset: u64,
        len: u64,
    },
}

impl Default for Source {
    #[inline]
    fn default() -> Self {
        Self::Memory(Arc::from([]))
    }
}

impl DataBlock {
    /// Creates a memory-backed block.
    #[inline]
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            source: Source::Memory(bytes.into()),
        }
    }

    /// Creates a block referring to `len` bytes at `offset` in the file at `path`.
    #[inline]
    pub fn from_file_region(path: impl Into<Arc<Path>>, offset: u64, len: u64) -> Self {
        Self {
            source: Source::File {
                path: path.into(),
                offset,
                len,
            },
        }
    }

    /// Returns the byte length.
    ///
    /// Encoders that write a 32-bit length prefix must check it fits.
    #[inline]
    pub fn len(&self) -> u64 {
        match &self.source {
            Source::Memory(bytes) => bytes.len() as u64,
            Source::File { len, .. } => *len,
        }
    }

    /// Returns `true` if the block holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the bytes are read lazily from a file.
    #[inline]
    pub fn is_file_backed(&self) -> bool {
        matches!(self.source, Source::File { .. })
    }

    /// Returns the bytes of a memory-backed block.
    #[inline]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.source {
            Source::Memory(bytes) => Some(bytes),
            Source::File { .. } => None,
        }
    }

    /// Opens a reader over the block's bytes.
    pub fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        match &self.source {
            Source::Memory(bytes) => Ok(Box::new(Cursor::new(&bytes[..]))),
            Source::File { path, offset, len } => {
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(*offset))?;
                Ok(Box::new(file.take(*len)))
            }
        }
    }

    /// Reads the whole block into memory.
    pub fn to_vec(&self) -> io::Result<Vec<u8>> {
        if let Source::Memory(bytes) = &self.source {
            return Ok(bytes.to_vec());
        }
        let len = usize::try_from(self.len())
            .map_err(|_| io::Error::from(io::ErrorKind::OutOfMemory))?;
        let mut out = Vec::with_capacity(len);
        self.open()?.read_to_end(&mut out)?;
        if out.len() != len {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
        }
        Ok(out)
    }

    /// Returns a memory-backed copy, reading file-backed blocks.
    pub fn to_memory(&self) -> io::Result<Self> {
        match &self.source {
            Source::Memory(_) => Ok(self.clone()),
            Source::File { .. } => Ok(Self::from_bytes(self.to_vec()?)),
        }
    }
}

impl From<Vec<u8>> for DataBlock {
    #[inline]
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl PartialEq for DataBlock {
    /// Blocks are equal when their contents are.
    ///
    /// File regions that cannot be read compare unequal.
    fn eq(&self, other: &Self) -> bool {
        match (&self.source, &other.source) {
            (Source::Memory(a), Source::Memory(b)) => a == b,
            _ if self.len() != other.len() => false,
            _ => match (self.to_vec(), other.to_vec()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Debug for DataBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Source::Memory(bytes) => f.debug_tuple("DataBlock").field(&bytes.len()).finish(),
            Source::File { path, offset, len } => f
                .debug_struct("DataBlock")
                .field("path", path)
                .field("offset", offset)
                .field("len", len)
                .finish(),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::DataBlock;

    #[test]
    fn file_region_reads_only_its_window() {
        let path = std::env::temp_dir().join(format!(
            "vc_reflect_data_block_{}.bin",
            std::process::id()
        ));
        std::fs::File::create(&path)
            .and_then(|mut file| file.write_all(b"headerPAYLOADtrailer"))
            .unwrap();

        let block = DataBlock::from_file_region(path.as_path(), 6, 7);
        assert!(block.is_file_backed());
        assert_eq!(block.to_vec().unwrap(), b"PAYLOAD");
        assert_eq!(block, DataBlock::from_bytes(b"PAYLOAD".to_vec()));

        let memory = block.to_memory().unwrap();
        assert!(!memory.is_file_backed());
        assert_eq!(memory.as_bytes(), Some(&b"PAYLOAD"[..]));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn file_regions_keep_lengths_past_u32() {
        let len = u64::from(u32::MAX) + 2;
        let block = DataBlock::from_file_region(std::path::Path::new("missing.bin"), 0, len);
        assert_eq!(block.len(), len);
        assert!(!block.is_empty());
    }

    #[test]
    fn default_block_is_empty() {
        let block = DataBlock::default();
        assert!(block.is_empty());
        assert_eq!(block, DataBlock::from(Vec::new()));
    }
}
