//! Bounded read/seek window over a parent stream.
//!
//! A [`Subfile`] starts at the parent's position when it is created and covers
//! a fixed number of bytes from there. Reads never run past the window, seeks
//! outside `[0, len]` fail, and [`Subfile::tell`] is relative to the window
//! start. Reading advances the parent stream as a side effect.

use super::package::{DocError, Result};
use crate::common::binary::{read_i16_le, read_u16_le, read_u32_le};
use std::io::{self, Read, Seek, SeekFrom};

/// A length-limited view of a parent stream.
#[derive(Debug)]
pub struct Subfile<R> {
    parent: R,
    /// Absolute parent position of the window start
    start: u64,
    len: u64,
    pos: u64,
}

impl<R: Read + Seek> Subfile<R> {
    /// Window of `len` bytes starting at the parent's current position.
    pub fn new(mut parent: R, len: u64) -> Result<Self> {
        let start = parent.stream_position()?;
        Ok(Self {
            parent,
            start,
            len,
            pos: 0,
        })
    }

    /// Window of `len` bytes starting at absolute parent offset `offset`.
    pub fn at(mut parent: R, offset: u64, len: u64) -> Result<Self> {
        parent.seek(SeekFrom::Start(offset))?;
        Self::new(parent, len)
    }

    /// Window length in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Position relative to the window start.
    #[inline]
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Bytes left before the window end.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.len - self.pos
    }

    /// Absolute parent offset of the window start.
    #[inline]
    pub fn base(&self) -> u64 {
        self.start
    }

    /// Fill `buf` completely or fail with [`DocError::Truncated`].
    pub fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let expected = buf.len() as u64;
        if expected > self.remaining() {
            return Err(DocError::Truncated {
                expected,
                available: self.remaining(),
            });
        }
        read_full(&mut self.parent, buf)?;
        self.pos += expected;
        Ok(())
    }

    /// Read exactly `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_exact_into(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact_into(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact_into(&mut buf)?;
        Ok(read_u16_le(&buf, 0)?)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let mut buf = [0u8; 2];
        self.read_exact_into(&mut buf)?;
        Ok(read_i16_le(&buf, 0)?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact_into(&mut buf)?;
        Ok(read_u32_le(&buf, 0)?)
    }

    /// Move forward `n` bytes without reading them.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        if n > self.remaining() {
            return Err(DocError::Truncated {
                expected: n,
                available: self.remaining(),
            });
        }
        self.seek(SeekFrom::Current(n as i64))?;
        Ok(())
    }

    /// Give back the parent stream, positioned wherever the window left it.
    pub fn into_inner(self) -> R {
        self.parent
    }
}

impl<R: Read + Seek> Read for Subfile<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = (buf.len() as u64).min(self.remaining()) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.parent.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for Subfile<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };

        match target {
            Some(target) if target <= self.len => {
                self.parent.seek(SeekFrom::Start(self.start + target))?;
                self.pos = target;
                Ok(target)
            },
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek outside window of {} bytes", self.len),
            )),
        }
    }
}

/// Fill `buf` from an unbounded stream, reporting how much was available on EOF.
pub(crate) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(DocError::Truncated {
                    expected: buf.len() as u64,
                    available: filled as u64,
                });
            },
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parent() -> Cursor<Vec<u8>> {
        Cursor::new((0u8..32).collect())
    }

    #[test]
    fn test_window_starts_at_parent_position() {
        let mut parent = parent();
        parent.seek(SeekFrom::Start(4)).unwrap();
        let mut window = Subfile::new(&mut parent, 8).unwrap();

        assert_eq!(window.read_u8().unwrap(), 4);
        assert_eq!(window.tell(), 1);
        assert_eq!(window.read_u16().unwrap(), u16::from_le_bytes([5, 6]));
        assert_eq!(window.remaining(), 5);
        assert_eq!(window.base(), 4);

        drop(window);
        assert_eq!(parent.position(), 7);
    }

    #[test]
    fn test_typed_little_endian_reads() {
        let bytes = vec![0x7F, 0x34, 0x12, 0xFE, 0xFF, 0x78, 0x56, 0x34, 0x12];
        let mut stream = Cursor::new(bytes);
        let mut window = Subfile::new(&mut stream, 9).unwrap();
        assert_eq!(window.read_u8().unwrap(), 0x7F);
        assert_eq!(window.read_u16().unwrap(), 0x1234);
        assert_eq!(window.read_i16().unwrap(), -2);
        assert_eq!(window.read_u32().unwrap(), 0x1234_5678);
        assert_eq!(window.remaining(), 0);
        assert!(matches!(window.read_u16(), Err(DocError::Truncated { .. })));
    }

    #[test]
    fn test_exact_read_past_end_is_truncation() {
        let mut window = Subfile::at(parent(), 28, 8).unwrap();
        // The window claims 8 bytes but the parent only has 4 left
        assert!(matches!(
            window.read_bytes(6),
            Err(DocError::Truncated {
                expected: 6,
                available: 4
            })
        ));

        let mut window = Subfile::at(parent(), 0, 3).unwrap();
        assert!(matches!(
            window.read_u32(),
            Err(DocError::Truncated {
                expected: 4,
                available: 3
            })
        ));
    }

    #[test]
    fn test_plain_read_is_capped() {
        let mut window = Subfile::at(parent(), 10, 4).unwrap();
        let mut out = Vec::new();
        window.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![10, 11, 12, 13]);
        assert_eq!(window.read(&mut [0u8; 4]).unwrap(), 0);
    }

    #[test]
    fn test_seek_origins_and_bounds() {
        let mut window = Subfile::at(parent(), 8, 10).unwrap();

        assert_eq!(window.seek(SeekFrom::End(-2)).unwrap(), 8);
        assert_eq!(window.read_u8().unwrap(), 16);
        assert_eq!(window.seek(SeekFrom::Current(-9)).unwrap(), 0);
        assert_eq!(window.seek(SeekFrom::Start(10)).unwrap(), 10);

        assert!(window.seek(SeekFrom::Start(11)).is_err());
        assert!(window.seek(SeekFrom::Current(-11)).is_err());
        assert!(window.seek(SeekFrom::End(1)).is_err());
        // A failed seek leaves the position alone
        assert_eq!(window.tell(), 10);
    }

    #[test]
    fn test_skip() {
        let mut window = Subfile::at(parent(), 0, 6).unwrap();
        window.skip(4).unwrap();
        assert_eq!(window.read_u8().unwrap(), 4);
        assert!(matches!(
            window.skip(2),
            Err(DocError::Truncated {
                expected: 2,
                available: 1
            })
        ));
        assert_eq!(window.into_inner().position(), 5);
    }
}
