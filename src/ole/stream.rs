//! Streaming access to a single OLE stream.
//!
//! Only the stream's sector chain is held in memory. Every read seeks the
//! shared file handle to the sector that holds the current position, so a
//! stream of any size costs one `Vec<u32>` of sector ids.

use std::cell::RefCell;
use std::io::{self, Read, Seek, SeekFrom};
use std::rc::Rc;

/// Where the sectors of a stream physically live.
#[derive(Debug)]
enum Backing<R> {
    /// Regular sectors addressed through the FAT
    File {
        reader: Rc<RefCell<R>>,
        sector_size: u64,
    },
    /// Mini sectors inside the root entry's mini stream
    Mini(Box<OleStream<R>>),
}

/// A `Read + Seek` view of one stream inside an OLE file.
#[derive(Debug)]
pub struct OleStream<R> {
    backing: Backing<R>,
    /// Sector ids in stream order
    chain: Vec<u32>,
    /// Size of one chain unit (sector or mini sector)
    unit: u64,
    /// Stream length in bytes
    size: u64,
    /// Current position
    pos: u64,
}

impl<R: Read + Seek> OleStream<R> {
    /// Stream stored in regular FAT sectors.
    pub(crate) fn regular(
        reader: Rc<RefCell<R>>,
        sector_size: usize,
        chain: Vec<u32>,
        size: u64,
    ) -> Self {
        let sector_size = sector_size as u64;
        Self {
            backing: Backing::File {
                reader,
                sector_size,
            },
            chain,
            unit: sector_size,
            size,
            pos: 0,
        }
    }

    /// Stream stored in mini sectors of `ministream`.
    pub(crate) fn mini(
        ministream: OleStream<R>,
        mini_sector_size: usize,
        chain: Vec<u32>,
        size: u64,
    ) -> Self {
        Self {
            backing: Backing::Mini(Box::new(ministream)),
            chain,
            unit: mini_sector_size as u64,
            size,
            pos: 0,
        }
    }

    /// Stream length in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl<R: Read + Seek> Read for OleStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.size {
            return Ok(0);
        }

        let index = (self.pos / self.unit) as usize;
        let within = self.pos % self.unit;
        let sector = *self.chain.get(index).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("sector chain ends before stream position {}", self.pos),
            )
        })? as u64;

        let want = (self.unit - within)
            .min(self.size - self.pos)
            .min(buf.len() as u64) as usize;

        let n = match &mut self.backing {
            Backing::File {
                reader,
                sector_size,
            } => {
                let mut reader = reader.borrow_mut();
                // Sector 0 starts right after the header, which occupies one sector
                reader.seek(SeekFrom::Start((sector + 1) * *sector_size + within))?;
                reader.read(&mut buf[..want])?
            },
            Backing::Mini(ministream) => {
                ministream.seek(SeekFrom::Start(sector * self.unit + within))?;
                ministream.read(&mut buf[..want])?
            },
        };

        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for OleStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };

        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            },
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}
