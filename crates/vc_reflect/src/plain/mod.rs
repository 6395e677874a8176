//! Byte-copyable field payloads.
//!
//! A plain value has either a static encoded size (at most 255 bytes) or a
//! dynamic one. Dynamic payloads start with a little-endian `u32` holding the
//! total payload size, prefix included, so a reader that does not know the
//! type can still skip them.
//!
//! # Examples
//!
//! ```
//! use vc_reflect::plain::PlainType;
//!
//! let mut out = Vec::new();
//! String::from("hi").write_plain(&mut out);
//! assert_eq!(out, [6, 0, 0, 0, b'h', b'i']);
//!
//! assert_eq!(String::read_plain(&out).unwrap(), "hi");
//! assert_eq!(String::payload_len(&out).unwrap(), 6);
//! ```

// -----------------------------------------------------------------------------
// Modules

mod impls;

use alloc::vec::Vec;

use crate::FieldError;

// -----------------------------------------------------------------------------
// PlainType

/// A value stored as raw bytes in a plain field.
pub trait PlainType: Sized + Send + Sync + 'static {
    /// Encoded size if it never varies, `None` for dynamic payloads.
    const STATIC_SIZE: Option<u8>;

    /// Encoded size of this value, including the size prefix if dynamic.
    fn encoded_size(&self) -> u32;

    /// Appends the encoded value to `out`.
    fn write_plain(&self, out: &mut Vec<u8>);

    /// Decodes a value from the start of `bytes`.
    ///
    /// Trailing bytes past the value are ignored.
    fn read_plain(bytes: &[u8]) -> Result<Self, FieldError>;

    /// Returns the encoded size of the value at the start of `bytes`.
    #[inline]
    fn payload_len(bytes: &[u8]) -> Result<usize, FieldError> {
        match Self::STATIC_SIZE {
            Some(size) => Ok(size as usize),
            None => Ok(read_size_prefix(bytes)? as usize),
        }
    }
}

// -----------------------------------------------------------------------------
// Helpers

/// Size of the length prefix of dynamic payloads.
pub const SIZE_PREFIX_LEN: usize = 4;

/// Reads the `u32` total-size prefix of a dynamic payload.
///
/// Fails if `bytes` is shorter than the prefix, or than the size it announces,
/// or if the announced size cannot even hold the prefix.
pub fn read_size_prefix(bytes: &[u8]) -> Result<u32, FieldError> {
    let prefix = take::<SIZE_PREFIX_LEN>(bytes)?;
    let size = u32::from_le_bytes(prefix);
    if (size as usize) < SIZE_PREFIX_LEN {
        return Err(FieldError::InvalidPayload("size prefix smaller than itself"));
    }
    if bytes.len() < size as usize {
        return Err(FieldError::Truncated {
            needed: size as usize,
            available: bytes.len(),
        });
    }
    Ok(size)
}

/// Writes a placeholder size prefix and returns its position.
#[inline]
pub fn begin_dynamic(out: &mut Vec<u8>) -> usize {
    let start = out.len();
    out.extend_from_slice(&[0; SIZE_PREFIX_LEN]);
    start
}

/// Patches the size prefix written by [`begin_dynamic`].
#[inline]
pub fn end_dynamic(out: &mut [u8], start: usize) {
    let size = (out.len() - start) as u32;
    out[start..start + SIZE_PREFIX_LEN].copy_from_slice(&size.to_le_bytes());
}

/// Copies the first `N` bytes of `bytes`.
#[inline]
pub(crate) fn take<const N: usize>(bytes: &[u8]) -> Result<[u8; N], FieldError> {
    match bytes.first_chunk::<N>() {
        Some(chunk) => Ok(*chunk),
        None => Err(FieldError::Truncated {
            needed: N,
            available: bytes.len(),
        }),
    }
}
