use std::{
    io,
    io::{Read, Seek, SeekFrom},
};

use binrw::BinResult;
use zerocopy::{ByteOrder, LittleEndian};

use crate::error::{DecodeError, DecodeResult};

/// Sequential little-endian reader over a fully loaded buffer.
///
/// Implements [`Read`] and [`Seek`] so `binrw` records can be parsed straight
/// out of it with [`ByteCursor::parse`].
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

macro_rules! le_reader {
    ($name:ident, $ty:ty, $size:literal, $conv:path) => {
        #[inline]
        pub fn $name(&mut self) -> DecodeResult<$ty> {
            let bytes = self.read_exact($size)?;
            Ok($conv(bytes) as $ty)
        }
    };
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self { Self { data, pos: 0 } }

    #[inline]
    pub fn position(&self) -> u64 { self.pos as u64 }

    #[inline]
    pub fn len(&self) -> usize { self.data.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    #[inline]
    pub fn remaining(&self) -> usize { self.data.len().saturating_sub(self.pos) }

    #[inline]
    pub fn is_at_end(&self) -> bool { self.remaining() == 0 }

    /// Borrows the next `n` bytes and advances past them.
    pub fn read_exact(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        let bytes = self.peek(n)?;
        self.pos += n;
        Ok(bytes)
    }

    /// Borrows the next `n` bytes without advancing.
    pub fn peek(&self, n: usize) -> DecodeResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(DecodeError::UnexpectedEof { offset: self.position() });
        }
        Ok(&self.data[self.pos..self.pos + n])
    }

    pub fn read_array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }

    /// Discards `n` bytes of opaque data.
    pub fn skip(&mut self, n: usize) -> DecodeResult<()> {
        self.read_exact(n)?;
        Ok(())
    }

    #[inline]
    pub fn read_u8(&mut self) -> DecodeResult<u8> { Ok(self.read_exact(1)?[0]) }

    #[inline]
    pub fn read_i8(&mut self) -> DecodeResult<i8> { Ok(self.read_u8()? as i8) }

    le_reader!(read_u16, u16, 2, LittleEndian::read_u16);
    le_reader!(read_u32, u32, 4, LittleEndian::read_u32);
    le_reader!(read_u64, u64, 8, LittleEndian::read_u64);
    le_reader!(read_i16, i16, 2, LittleEndian::read_i16);
    le_reader!(read_i32, i32, 4, LittleEndian::read_i32);
    le_reader!(read_i64, i64, 8, LittleEndian::read_i64);
    le_reader!(read_f32, f32, 4, LittleEndian::read_f32);
    le_reader!(read_f64, f64, 8, LittleEndian::read_f64);

    /// Reads an unsigned integer `width` bytes wide (1, 2, 4 or 8).
    pub fn read_uint(&mut self, width: usize) -> DecodeResult<u64> {
        match width {
            1 => self.read_u8().map(u64::from),
            2 => self.read_u16().map(u64::from),
            4 => self.read_u32().map(u64::from),
            8 => self.read_u64(),
            _ => Err(DecodeError::Binary {
                offset: self.position(),
                message: format!("unsupported integer width {width}"),
            }),
        }
    }

    /// Runs a `binrw` read at the current position, translating its error.
    pub fn parse<T, F>(&mut self, f: F) -> DecodeResult<T>
    where F: FnOnce(&mut Self) -> BinResult<T> {
        let start = self.position();
        f(self).map_err(|e| DecodeError::from_binrw(e, start))
    }

    /// Upper bound for preallocating `count` records of `size` bytes each.
    #[inline]
    pub fn capacity_for(&self, count: usize, size: usize) -> usize {
        count.min(self.remaining() / size.max(1))
    }

    /// Reads `count` consecutive records, each at least `min_size` bytes.
    pub fn read_vec<T, F>(
        &mut self,
        count: usize,
        min_size: usize,
        mut read: F,
    ) -> DecodeResult<Vec<T>>
    where F: FnMut(&mut Self) -> DecodeResult<T> {
        let mut out = Vec::with_capacity(self.capacity_for(count, min_size));
        for _ in 0..count {
            out.push(read(self)?);
        }
        Ok(out)
    }
}

impl Read for ByteCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.remaining());
        if n == 0 {
            return Ok(0);
        }
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Seek for ByteCursor<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match pos {
            SeekFrom::Start(n) => (0i128, n as i128),
            SeekFrom::End(n) => (self.data.len() as i128, n as i128),
            SeekFrom::Current(n) => (self.pos as i128, n as i128),
        };
        let target = base + offset;
        if target < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before start of buffer"));
        }
        self.pos = usize::try_from(target).unwrap_or(usize::MAX);
        Ok(self.pos as u64)
    }

    fn stream_position(&mut self) -> io::Result<u64> { Ok(self.position()) }
}
