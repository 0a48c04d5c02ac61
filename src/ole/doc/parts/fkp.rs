/// PAPX FKP (Formatted Disk Page) parser for DOC files.
///
/// A PAPX FKP is a 512-byte page of the WordDocument stream:
/// - rgfc: `cpara + 1` FCs (4 bytes each); entry `i + 1` is where paragraph
///   `i` ends
/// - rgbx: `cpara` 13-byte BxPap entries whose first byte is the word offset
///   of the paragraph's PAPX (0 = no properties)
/// - PAPX data at the end of the page
/// - cpara at byte 511
///
/// References:
/// - [MS-DOC] 2.9.176 PapxFkp
/// - [MS-DOC] 2.9.23 BxPap
use super::super::package::{DocError, Result};
use super::super::subfile::read_full;
use super::pap::{OverflowSource, ParagraphFlags, decode_papx};
use crate::common::binary::read_u32_le;
use std::io::{Read, Seek, SeekFrom};

/// Size of an FKP page in bytes (always 512)
pub const FKP_PAGE_SIZE: usize = 512;

/// Page bytes before the count byte
const FKP_DATA_END: usize = FKP_PAGE_SIZE - 1;

/// Size of a BxPap entry
const BX_SIZE: usize = 13;

/// One PAPX FKP page, held in full.
#[derive(Debug, Clone)]
pub struct PapxFkp {
    page: Box<[u8; FKP_PAGE_SIZE]>,
    count: usize,
}

impl PapxFkp {
    /// Read page `pn` of the WordDocument stream.
    pub fn read<R: Read + Seek>(document: &mut R, pn: u32) -> Result<Self> {
        let mut page = Box::new([0u8; FKP_PAGE_SIZE]);
        document.seek(SeekFrom::Start(u64::from(pn) * FKP_PAGE_SIZE as u64))?;
        read_full(document, &mut page[..])?;
        Self::from_page(page)
    }

    /// Validate a page already in memory.
    pub fn from_page(page: Box<[u8; FKP_PAGE_SIZE]>) -> Result<Self> {
        let count = page[FKP_DATA_END] as usize;
        if (count + 1) * 4 + count * BX_SIZE > FKP_DATA_END {
            return Err(DocError::Format(format!(
                "PAPX FKP claims {} paragraphs, more than a page holds",
                count
            )));
        }

        let fkp = Self { page, count };
        for i in 0..count {
            if fkp.fc(i + 1)? < fkp.fc(i)? {
                return Err(DocError::Format(format!(
                    "PAPX FKP offsets decrease at entry {}",
                    i + 1
                )));
            }
        }
        Ok(fkp)
    }

    /// Number of paragraphs ending on this page.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Entry `index` of rgfc, `0..=count`.
    pub fn fc(&self, index: usize) -> Result<u32> {
        if index > self.count {
            return Err(DocError::Format(format!(
                "rgfc index {} out of range",
                index
            )));
        }
        Ok(read_u32_le(&self.page[..], index * 4)?)
    }

    /// Offset where the page's first paragraph starts.
    #[inline]
    pub fn first_fc(&self) -> Result<u32> {
        self.fc(0)
    }

    /// Offset where the page's last paragraph ends.
    #[inline]
    pub fn last_fc(&self) -> Result<u32> {
        self.fc(self.count)
    }

    /// The PAPX of paragraph `index`, or `None` when it has no properties.
    pub fn papx(&self, index: usize) -> Result<Option<&[u8]>> {
        if index >= self.count {
            return Err(DocError::Format(format!(
                "BxPap index {} out of range",
                index
            )));
        }

        let bx = self.page[(self.count + 1) * 4 + index * BX_SIZE] as usize;
        if bx == 0 {
            return Ok(None);
        }

        let at = bx * 2;
        let byte = |offset: usize| {
            self.page[..FKP_DATA_END]
                .get(offset)
                .copied()
                .ok_or_else(|| DocError::Format(format!("PAPX {} starts past the page", index)))
        };
        let (start, len) = match byte(at)? {
            0 => (at + 2, 2 * byte(at + 1)? as usize),
            cb => (at + 1, 2 * cb as usize - 1),
        };
        if start + len > FKP_DATA_END {
            return Err(DocError::Format(format!(
                "PAPX {} runs past the page ({} bytes at {})",
                index, len, start
            )));
        }
        Ok(Some(&self.page[start..start + len]))
    }

    /// Table flags of paragraph `index`; defaults when it has no PAPX.
    pub fn paragraph_flags<O: OverflowSource + ?Sized>(
        &self,
        index: usize,
        overflow: &mut O,
    ) -> Result<ParagraphFlags> {
        match self.papx(index)? {
            Some(papx) => decode_papx(papx, overflow),
            None => Ok(ParagraphFlags::default()),
        }
    }
}
