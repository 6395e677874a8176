use alloc::string::String;
use alloc::vec::Vec;
use core::mem::size_of;

use super::{PlainType, SIZE_PREFIX_LEN, begin_dynamic, end_dynamic, read_size_prefix, take};
use crate::FieldError;

#[inline]
fn tail(bytes: &[u8], offset: usize) -> Result<&[u8], FieldError> {
    bytes.get(offset..).ok_or(FieldError::Truncated {
        needed: offset,
        available: bytes.len(),
    })
}

/// Splits the next encoded `T` off the front of `bytes`.
#[inline]
fn next<T: PlainType>(bytes: &[u8]) -> Result<(T, &[u8]), FieldError> {
    let len = T::payload_len(bytes)?;
    let head = bytes.get(..len).ok_or(FieldError::Truncated {
        needed: len,
        available: bytes.len(),
    })?;
    Ok((T::read_plain(head)?, tail(bytes, len)?))
}

/// Returns the body of a dynamic payload, without its prefix.
#[inline]
fn dynamic_body(bytes: &[u8]) -> Result<&[u8], FieldError> {
    let size = read_size_prefix(bytes)? as usize;
    Ok(&bytes[SIZE_PREFIX_LEN..size])
}

// -----------------------------------------------------------------------------
// Numbers

macro_rules! impl_plain_number {
    ($($ty:ty),* $(,)?) => {$(
        impl PlainType for $ty {
            const STATIC_SIZE: Option<u8> = Some(size_of::<$ty>() as u8);

            #[inline]
            fn encoded_size(&self) -> u32 {
                size_of::<$ty>() as u32
            }

            #[inline]
            fn write_plain(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn read_plain(bytes: &[u8]) -> Result<Self, FieldError> {
                Ok(<$ty>::from_le_bytes(take::<{ size_of::<$ty>() }>(bytes)?))
            }
        }
    )*};
}

impl_plain_number!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

impl PlainType for bool {
    const STATIC_SIZE: Option<u8> = Some(1);

    #[inline]
    fn encoded_size(&self) -> u32 {
        1
    }

    #[inline]
    fn write_plain(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn read_plain(bytes: &[u8]) -> Result<Self, FieldError> {
        match take::<1>(bytes)? {
            [0] => Ok(false),
            [1] => Ok(true),
            _ => Err(FieldError::InvalidPayload("bool byte is neither 0 nor 1")),
        }
    }
}

impl PlainType for char {
    const STATIC_SIZE: Option<u8> = Some(4);

    #[inline]
    fn encoded_size(&self) -> u32 {
        4
    }

    #[inline]
    fn write_plain(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&u32::from(*self).to_le_bytes());
    }

    fn read_plain(bytes: &[u8]) -> Result<Self, FieldError> {
        let code = u32::from_le_bytes(take::<4>(bytes)?);
        char::from_u32(code).ok_or(FieldError::InvalidPayload("not a unicode scalar value"))
    }
}

// -----------------------------------------------------------------------------
// Strings and containers

impl PlainType for String {
    const STATIC_SIZE: Option<u8> = None;

    #[inline]
    fn encoded_size(&self) -> u32 {
        (SIZE_PREFIX_LEN + self.len()) as u32
    }

    fn write_plain(&self, out: &mut Vec<u8>) {
        let start = begin_dynamic(out);
        out.extend_from_slice(self.as_bytes());
        end_dynamic(out, start);
    }

    fn read_plain(bytes: &[u8]) -> Result<Self, FieldError> {
        let body = dynamic_body(bytes)?;
        core::str::from_utf8(body)
            .map(String::from)
            .map_err(|_| FieldError::InvalidPayload("string is not valid utf-8"))
    }
}

impl<T: PlainType> PlainType for Vec<T> {
    const STATIC_SIZE: Option<u8> = None;

    fn encoded_size(&self) -> u32 {
        let items: u32 = self.iter().map(PlainType::encoded_size).sum();
        (SIZE_PREFIX_LEN + 4) as u32 + items
    }

    fn write_plain(&self, out: &mut Vec<u8>) {
        let start = begin_dynamic(out);
        out.extend_from_slice(&(self.len() as u32).to_le_bytes());
        for item in self {
            item.write_plain(out);
        }
        end_dynamic(out, start);
    }

    fn read_plain(bytes: &[u8]) -> Result<Self, FieldError> {
        let body = dynamic_body(bytes)?;
        let count = u32::from_le_bytes(take::<4>(body)?) as usize;
        let mut rest = tail(body, 4)?;
        // A count larger than the body is corrupt, don't trust it for allocation.
        let mut items = Vec::with_capacity(count.min(rest.len()));
        for _ in 0..count {
            let (item, remaining) = next::<T>(rest)?;
            items.push(item);
            rest = remaining;
        }
        Ok(items)
    }
}

impl<T: PlainType> PlainType for Option<T> {
    const STATIC_SIZE: Option<u8> = None;

    fn encoded_size(&self) -> u32 {
        let value = self.as_ref().map_or(0, PlainType::encoded_size);
        (SIZE_PREFIX_LEN + 1) as u32 + value
    }

    fn write_plain(&self, out: &mut Vec<u8>) {
        let start = begin_dynamic(out);
        match self {
            Some(value) => {
                out.push(1);
                value.write_plain(out);
            }
            None => out.push(0),
        }
        end_dynamic(out, start);
    }

    fn read_plain(bytes: &[u8]) -> Result<Self, FieldError> {
        let body = dynamic_body(bytes)?;
        match take::<1>(body)? {
            [0] => Ok(None),
            [1] => Ok(Some(next::<T>(tail(body, 1)?)?.0)),
            _ => Err(FieldError::InvalidPayload("option tag is neither 0 nor 1")),
        }
    }
}

impl<A: PlainType, B: PlainType> PlainType for (A, B) {
    const STATIC_SIZE: Option<u8> = match (A::STATIC_SIZE, B::STATIC_SIZE) {
        (Some(a), Some(b)) => a.checked_add(b),
        _ => None,
    };

    fn encoded_size(&self) -> u32 {
        let items = self.0.encoded_size() + self.1.encoded_size();
        match Self::STATIC_SIZE {
            Some(_) => items,
            None => SIZE_PREFIX_LEN as u32 + items,
        }
    }

    fn write_plain(&self, out: &mut Vec<u8>) {
        if Self::STATIC_SIZE.is_some() {
            self.0.write_plain(out);
            self.1.write_plain(out);
        } else {
            let start = begin_dynamic(out);
            self.0.write_plain(out);
            self.1.write_plain(out);
            end_dynamic(out, start);
        }
    }

    fn read_plain(bytes: &[u8]) -> Result<Self, FieldError> {
        let body = match Self::STATIC_SIZE {
            Some(_) => bytes,
            None => dynamic_body(bytes)?,
        };
        let (a, rest) = next::<A>(body)?;
        let (b, _) = next::<B>(rest)?;
        Ok((a, b))
    }
}

impl<T: PlainType, const N: usize> PlainType for [T; N] {
    const STATIC_SIZE: Option<u8> = match T::STATIC_SIZE {
        Some(size) if N > 0 && (size as usize) * N <= u8::MAX as usize => {
            Some((size as usize * N) as u8)
        }
        _ => None,
    };

    fn encoded_size(&self) -> u32 {
        let items: u32 = self.iter().map(PlainType::encoded_size).sum();
        match Self::STATIC_SIZE {
            Some(_) => items,
            None => SIZE_PREFIX_LEN as u32 + items,
        }
    }

    fn write_plain(&self, out: &mut Vec<u8>) {
        if Self::STATIC_SIZE.is_some() {
            self.iter().for_each(|item| item.write_plain(out));
        } else {
            let start = begin_dynamic(out);
            self.iter().for_each(|item| item.write_plain(out));
            end_dynamic(out, start);
        }
    }

    fn read_plain(bytes: &[u8]) -> Result<Self, FieldError> {
        let mut rest = match Self::STATIC_SIZE {
            Some(_) => bytes,
            None => dynamic_body(bytes)?,
        };
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            let (item, remaining) = next::<T>(rest)?;
            items.push(item);
            rest = remaining;
        }
        items
            .try_into()
            .map_err(|_| FieldError::InvalidPayload("array length mismatch"))
    }
}

// -----------------------------------------------------------------------------
// Tests
