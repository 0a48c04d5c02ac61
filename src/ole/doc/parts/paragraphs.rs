//! Forward walk over paragraph ends.
//!
//! Combines the bin table and its FKP pages into one restartable sequence:
//! a [`ParagraphCursor`] is seeded at a byte offset and then yields every
//! later paragraph end in order, moving to the next bucket's page when the
//! current page runs out. Only one page is resident at a time.

use super::super::package::{DocError, Result};
use super::fkp::PapxFkp;
use super::pap::{OverflowSource, ParagraphFlags};
use super::pap_bin_table::{Bucket, PapBinTable};
use std::io::{Read, Seek};
use tracing::trace;

/// Where a paragraph ends and how it relates to tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParagraphEnd {
    /// Offset just past the paragraph mark in the WordDocument stream
    pub fc: u32,
    pub flags: ParagraphFlags,
}

/// Position in the two-level paragraph index.
#[derive(Debug, Clone)]
pub struct ParagraphCursor {
    bins: PapBinTable,
    bucket_index: u32,
    bucket: Bucket,
    page: PapxFkp,
    /// Next entry of `page` to yield
    entry: usize,
}

impl PapBinTable {
    /// Cursor at the first paragraph ending after `target`.
    ///
    /// Returns `None` when no bucket contains `target`.
    pub fn paragraphs_after<T, D>(
        &self,
        table: &mut T,
        document: &mut D,
        target: u32,
    ) -> Result<Option<ParagraphCursor>>
    where
        T: Read + Seek,
        D: Read + Seek,
    {
        let Some((bucket_index, bucket)) = self.locate(table, target)? else {
            return Ok(None);
        };
        let page = load_page(document, &bucket)?;

        // The bucket's last page entry ends past `target`, so this finds one
        let mut entry = 0;
        while page.fc(entry + 1)? <= target {
            entry += 1;
        }

        trace!(target, bucket = bucket_index, page = bucket.page, entry, "seeded paragraph cursor");

        Ok(Some(ParagraphCursor {
            bins: *self,
            bucket_index,
            bucket,
            page,
            entry,
        }))
    }
}

impl ParagraphCursor {
    /// The next paragraph end, or `None` past the last bucket.
    pub fn next_paragraph<T, D, O>(
        &mut self,
        table: &mut T,
        document: &mut D,
        overflow: &mut O,
    ) -> Result<Option<ParagraphEnd>>
    where
        T: Read + Seek,
        D: Read + Seek,
        O: OverflowSource + ?Sized,
    {
        while self.entry >= self.page.count() {
            let next = self.bucket_index + 1;
            if next >= self.bins.len() {
                return Ok(None);
            }
            self.bucket = self.bins.bucket(table, next)?;
            self.bucket_index = next;
            self.page = load_page(document, &self.bucket)?;
            self.entry = 0;
        }

        let fc = self.page.fc(self.entry + 1)?;
        let flags = self.page.paragraph_flags(self.entry, overflow)?;
        self.entry += 1;
        Ok(Some(ParagraphEnd { fc, flags }))
    }

    /// The bucket the cursor is in.
    #[inline]
    pub fn bucket(&self) -> Bucket {
        self.bucket
    }
}

/// Read a bucket's page and check that it covers exactly the bucket.
fn load_page<D: Read + Seek>(document: &mut D, bucket: &Bucket) -> Result<PapxFkp> {
    let page = PapxFkp::read(document, bucket.page)?;
    let (first, last) = (page.first_fc()?, page.last_fc()?);
    if first != bucket.start || last != bucket.end {
        return Err(DocError::Format(format!(
            "page {} covers {}..{} but its bucket is {}..{}",
            bucket.page, first, last, bucket.start, bucket.end
        )));
    }
    Ok(page)
}
