/// Paragraph property bin table (PlcBtePapx).
///
/// The first level of the paragraph index. It splits the WordDocument stream
/// into contiguous byte ranges ("buckets") and names the PAPX FKP page that
/// describes the paragraphs ending in each range:
///
/// - aFC: `n + 1` FCs (4 bytes each)
/// - aPnBtePapx: `n` page numbers (4 bytes each, low 22 bits significant)
///
/// Bucket `i` covers `[aFC[i], aFC[i + 1])`, so neighbouring buckets share a
/// boundary by construction. Entries are read on demand.
///
/// References:
/// - [MS-DOC] 2.8.6 PlcBtePapx
/// - [MS-DOC] 2.9.182 PnFkpPapx
use super::super::package::{DocError, Result};
use super::super::subfile::{Subfile, read_full};
use super::fib::FcLcb;
use crate::common::binary::read_u32_le;
use std::io::{Read, Seek, SeekFrom};
use tracing::debug;

/// Page number bits of a PnFkpPapx
const PN_MASK: u32 = (1 << 22) - 1;

/// A byte range of the WordDocument stream and the page describing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    pub start: u32,
    pub end: u32,
    /// PAPX FKP page number
    pub page: u32,
}

impl Bucket {
    #[inline]
    pub fn contains(&self, fc: u32) -> bool {
        self.start <= fc && fc < self.end
    }
}

/// Lazily indexed PlcBtePapx.
#[derive(Debug, Clone, Copy)]
pub struct PapBinTable {
    first_fc: u32,
    count: u32,
    /// Absolute table stream offset of aFC
    fc_base: u64,
    /// Absolute table stream offset of aPnBtePapx
    pn_base: u64,
}

impl PapBinTable {
    /// Parse the PlcBtePapx header located by the FIB.
    pub fn parse<R: Read + Seek>(table: &mut R, location: FcLcb) -> Result<Self> {
        let lcb = u64::from(location.length);
        if lcb <= 4 || (lcb - 4) % 8 != 0 {
            return Err(DocError::Format(format!(
                "PlcBtePapx size {} is not 4 + 8n with n > 0",
                lcb
            )));
        }

        let count = (lcb - 4) / 8;
        let fc_base = u64::from(location.offset);
        let mut window = Subfile::at(&mut *table, fc_base, lcb)?;
        let first_fc = window.read_u32()?;

        debug!(buckets = count, first_fc, "parsed paragraph bin table");

        Ok(Self {
            first_fc,
            count: count as u32,
            fc_base,
            pn_base: fc_base + 4 * (count + 1),
        })
    }

    /// Number of buckets.
    #[inline]
    pub fn len(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Where the first bucket starts.
    #[inline]
    pub fn start(&self) -> u32 {
        self.first_fc
    }

    /// Read bucket `index`.
    pub fn bucket<R: Read + Seek>(&self, table: &mut R, index: u32) -> Result<Bucket> {
        if index >= self.count {
            return Err(DocError::Format(format!(
                "bucket {} out of range (table has {})",
                index, self.count
            )));
        }

        let mut fcs = [0u8; 8];
        table.seek(SeekFrom::Start(self.fc_base + 4 * u64::from(index)))?;
        read_full(table, &mut fcs)?;
        let start = read_u32_le(&fcs, 0)?;
        let end = read_u32_le(&fcs, 4)?;
        if end <= start {
            return Err(DocError::Format(format!(
                "bucket {} boundaries not increasing ({} -> {})",
                index, start, end
            )));
        }

        let mut pn = [0u8; 4];
        table.seek(SeekFrom::Start(self.pn_base + 4 * u64::from(index)))?;
        read_full(table, &mut pn)?;

        Ok(Bucket {
            start,
            end,
            page: read_u32_le(&pn, 0)? & PN_MASK,
        })
    }

    /// Iterate the buckets in order.
    pub fn buckets<'t, R: Read + Seek>(&self, table: &'t mut R) -> Buckets<'t, R> {
        Buckets {
            bins: *self,
            table,
            next: 0,
        }
    }

    /// The bucket containing `fc` with its index.
    ///
    /// `None` when `fc` precedes the first bucket or follows the last.
    pub fn locate<R: Read + Seek>(&self, table: &mut R, fc: u32) -> Result<Option<(u32, Bucket)>> {
        if fc < self.first_fc {
            return Ok(None);
        }
        for (index, bucket) in (0..self.count).zip(self.buckets(table)) {
            let bucket = bucket?;
            if bucket.end > fc {
                return Ok(Some((index, bucket)));
            }
        }
        Ok(None)
    }
}

/// Iterator over buckets, reading each on demand.
pub struct Buckets<'t, R> {
    bins: PapBinTable,
    table: &'t mut R,
    next: u32,
}

impl<R: Read + Seek> Iterator for Buckets<'_, R> {
    type Item = Result<Bucket>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.bins.count {
            return None;
        }
        let bucket = self.bins.bucket(&mut *self.table, self.next);
        self.next += 1;
        Some(bucket)
    }
}
