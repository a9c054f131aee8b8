//! A length-bounded, little-endian read/write cursor over a byte vector.
//!
//! This is the only place in the crate that touches wire endianness or
//! enforces the 1 MiB size ceiling; handlers and the session read loop work
//! exclusively through [`ByteBuffer`].

use crate::errors::BufferError;
use bytes::{Buf, BufMut, BytesMut};

/// Maximum size of a buffer, and of any single string field within it.
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// A growable byte buffer with a monotonic read cursor.
#[derive(Debug, Clone, Default)]
pub struct ByteBuffer {
    data: BytesMut,
    read_pos: usize,
}

macro_rules! write_int {
    ($name:ident, $ty:ty, $put:ident) => {
        pub fn $name(&mut self, v: $ty) -> Result<(), BufferError> {
            self.reserve(std::mem::size_of::<$ty>())?;
            self.data.$put(v);
            Ok(())
        }
    };
}

macro_rules! read_int {
    ($name:ident, $ty:ty, $get:ident) => {
        pub fn $name(&mut self) -> Result<$ty, BufferError> {
            let size = std::mem::size_of::<$ty>();
            if self.remaining() < size {
                return Err(BufferError::Underflow);
            }
            Ok((&self.data[self.read_pos..]).$get())
        }
    };
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        ByteBuffer {
            data: BytesMut::from(&data[..]),
            read_pos: 0,
        }
    }

    fn reserve(&mut self, extra: usize) -> Result<(), BufferError> {
        if self.data.len() + extra > MAX_BUFFER_SIZE {
            return Err(BufferError::Overflow);
        }
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> Result<(), BufferError> {
        self.reserve(1)?;
        self.data.put_u8(v);
        Ok(())
    }

    pub fn write_i8(&mut self, v: i8) -> Result<(), BufferError> {
        self.write_u8(v as u8)
    }

    write_int!(write_u16, u16, put_u16_le);
    write_int!(write_u32, u32, put_u32_le);
    write_int!(write_u64, u64, put_u64_le);
    write_int!(write_i16, i16, put_i16_le);
    write_int!(write_i32, i32, put_i32_le);
    write_int!(write_i64, i64, put_i64_le);
    write_int!(write_f32, f32, put_f32_le);
    write_int!(write_f64, f64, put_f64_le);

    pub fn write_bool(&mut self, v: bool) -> Result<(), BufferError> {
        self.write_u8(if v { 1 } else { 0 })
    }

    /// Writes `u32 LE length` followed by the raw UTF-8 bytes of `s`.
    pub fn write_string(&mut self, s: &str) -> Result<(), BufferError> {
        let bytes = s.as_bytes();
        if bytes.len() > MAX_BUFFER_SIZE - 4 {
            return Err(BufferError::Overflow);
        }
        self.write_u32(bytes.len() as u32)?;
        self.write(bytes)
    }

    /// Raw append; fails `Overflow` if the total buffer would exceed 1 MiB.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        self.reserve(bytes.len())?;
        self.data.put_slice(bytes);
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        if self.remaining() < 1 {
            return Err(BufferError::Underflow);
        }
        let v = self.data[self.read_pos];
        self.read_pos += 1;
        Ok(v)
    }

    pub fn read_i8(&mut self) -> Result<i8, BufferError> {
        self.read_u8().map(|v| v as i8)
    }

    read_int!(read_u16, u16, get_u16_le);
    read_int!(read_u32, u32, get_u32_le);
    read_int!(read_u64, u64, get_u64_le);
    read_int!(read_i16, i16, get_i16_le);
    read_int!(read_i32, i32, get_i32_le);
    read_int!(read_i64, i64, get_i64_le);
    read_int!(read_f32, f32, get_f32_le);
    read_int!(read_f64, f64, get_f64_le);

    pub fn read_bool(&mut self) -> Result<bool, BufferError> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads `u32 LE length` then that many bytes, returned as a `String`.
    /// The bytes must pass through unmodified — invalid UTF-8 is rejected
    /// rather than rewritten, since callers persist these bytes verbatim
    /// (e.g. usernames land in the account store as given).
    pub fn read_string(&mut self) -> Result<String, BufferError> {
        let len = self.read_u32()? as usize;
        if len > MAX_BUFFER_SIZE {
            return Err(BufferError::Overflow);
        }
        if self.remaining() < len {
            return Err(BufferError::Underflow);
        }
        let start = self.read_pos;
        self.read_pos += len;
        String::from_utf8(self.data[start..self.read_pos].to_vec()).map_err(|_| BufferError::InvalidUtf8)
    }

    /// Reads exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, BufferError> {
        if self.remaining() < n {
            return Err(BufferError::Underflow);
        }
        let start = self.read_pos;
        self.read_pos += n;
        Ok(self.data[start..self.read_pos].to_vec())
    }

    /// Appends the unread portion of `other`, leaving `other`'s cursor alone.
    pub fn append(&mut self, other: &ByteBuffer) -> Result<(), BufferError> {
        self.write(&other.data[other.read_pos..])
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
    }

    pub fn rewind(&mut self) {
        self.read_pos = 0;
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.read_pos
    }

    pub fn empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_round_trip() {
        let mut b = ByteBuffer::new();
        b.write_u32(0xDEADBEEF).unwrap();
        b.write_i16(-42).unwrap();
        assert_eq!(b.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(b.read_i16().unwrap(), -42);
    }

    #[test]
    fn string_symmetry() {
        let mut b = ByteBuffer::new();
        b.write_string("hello, BNCS").unwrap();
        assert_eq!(b.read_string().unwrap(), "hello, BNCS");
    }

    #[test]
    fn underflow_on_short_read() {
        let mut b = ByteBuffer::new();
        b.write_u8(1).unwrap();
        let _ = b.read_u8().unwrap();
        assert_eq!(b.read_u8(), Err(BufferError::Underflow));
        assert_eq!(b.read_u32(), Err(BufferError::Underflow));
    }

    #[test]
    fn overflow_on_oversize_write() {
        let mut b = ByteBuffer::new();
        let chunk = vec![0u8; MAX_BUFFER_SIZE];
        assert!(b.write(&chunk).is_ok());
        assert_eq!(b.write(&[1]), Err(BufferError::Overflow));
    }

    #[test]
    fn invalid_utf8_is_rejected_not_rewritten() {
        let mut b = ByteBuffer::new();
        b.write_u32(2).unwrap();
        b.write(&[0xFF, 0xFE]).unwrap();
        assert_eq!(b.read_string(), Err(BufferError::InvalidUtf8));
    }

    #[test]
    fn little_endian_on_wire() {
        let mut b = ByteBuffer::new();
        b.write_u32(1).unwrap();
        assert_eq!(b.as_slice(), &[1, 0, 0, 0]);
    }
}
