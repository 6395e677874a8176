use alloc::vec::Vec;
use core::fmt;
use core::mem;
use std::io;

use crate::StreamError;

/// A finite output buffer handed back to the caller whenever it fills up.
///
/// The callback receives the filled region and returns the buffer to
/// continue with, typically the same allocation after its content was
/// written elsewhere. Returning `None`, or a buffer without capacity, aborts
/// the write with [`StreamError::FlushRefused`].
///
/// # Examples
///
/// ```
/// use std::io::Write;
/// use vc_serial::binary::FlushBuffer;
///
/// let mut chunks = Vec::new();
/// let mut buffer = FlushBuffer::with_capacity(4, |full: Vec<u8>| {
///     chunks.push(full.clone());
///     Some(full)
/// });
///
/// buffer.write_all(b"abcdefghij").unwrap();
/// assert_eq!(buffer.finish().unwrap(), 10);
/// assert_eq!(chunks, [b"abcd".to_vec(), b"efgh".to_vec(), b"ij".to_vec()]);
/// ```
pub struct FlushBuffer<F> {
    buffer: Vec<u8>,
    flush: F,
    written: u64,
}

impl<F> FlushBuffer<F>
where
    F: FnMut(Vec<u8>) -> Option<Vec<u8>>,
{
    /// Uses `buffer`'s spare capacity as the window.
    #[inline]
    pub fn new(mut buffer: Vec<u8>, flush: F) -> Self {
        buffer.clear();
        Self {
            buffer,
            flush,
            written: 0,
        }
    }

    #[inline]
    pub fn with_capacity(capacity: usize, flush: F) -> Self {
        Self::new(Vec::with_capacity(capacity), flush)
    }

    /// Total number of bytes accepted so far.
    #[inline]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Hands the remaining bytes to the callback and returns the total count.
    ///
    /// The buffer returned by this last call is dropped, `None` is accepted.
    pub fn finish(mut self) -> Result<u64, StreamError> {
        if !self.buffer.is_empty() {
            let rest = mem::take(&mut self.buffer);
            drop((self.flush)(rest));
        }
        Ok(self.written)
    }

    fn swap_buffer(&mut self) -> Result<(), StreamError> {
        let full = mem::take(&mut self.buffer);
        match (self.flush)(full) {
            Some(mut next) if next.capacity() > 0 => {
                next.clear();
                self.buffer = next;
                Ok(())
            }
            _ => Err(StreamError::FlushRefused),
        }
    }
}

impl<F> io::Write for FlushBuffer<F>
where
    F: FnMut(Vec<u8>) -> Option<Vec<u8>>,
{
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        if self.buffer.len() == self.buffer.capacity() {
            self.swap_buffer().map_err(io::Error::other)?;
        }
        let count = data.len().min(self.buffer.capacity() - self.buffer.len());
        self.buffer.extend_from_slice(&data[..count]);
        self.written += count as u64;
        Ok(count)
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<F> fmt::Debug for FlushBuffer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushBuffer")
            .field("len", &self.buffer.len())
            .field("capacity", &self.buffer.capacity())
            .field("written", &self.written)
            .finish_non_exhaustive()
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::FlushBuffer;
    use crate::StreamError;

    #[test]
    fn refusing_callback_aborts() {
        let mut calls = 0;
        let mut buffer = FlushBuffer::with_capacity(2, |_| {
            calls += 1;
            None
        });
        let err = buffer.write_all(b"abc").unwrap_err();
        assert!(matches!(StreamError::from(err), StreamError::FlushRefused));
        drop(buffer);
        assert_eq!(calls, 1);
    }

    #[test]
    fn empty_replacement_aborts() {
        let mut buffer = FlushBuffer::with_capacity(1, |_| Some(Vec::new()));
        assert!(buffer.write_all(b"ab").is_err());
    }

    #[test]
    fn zero_capacity_refuses_first_write() {
        let mut buffer = FlushBuffer::new(Vec::new(), |_| None);
        assert!(buffer.write_all(b"a").is_err());
        assert_eq!(buffer.written(), 0);
    }
}
