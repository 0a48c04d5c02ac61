/// Piece table parser for DOC files.
///
/// The piece table maps character positions (CP) to byte offsets in the
/// WordDocument stream. It lives in the Clx structure of the table stream:
///
/// - RgPrc: zero or more property blocks (tag 0x01 + i16 size), skipped
/// - Pcdt: tag 0x02, u32 lcb, then a PlcPcd of `n + 1` CPs and `n` 8-byte
///   piece descriptors
///
/// Only the two array base offsets are kept. Entries are read on demand by
/// [`PieceTable::piece`], so the table never materializes every descriptor.
use super::super::package::{DocError, Result};
use super::super::subfile::{Subfile, read_full};
use super::fib::FcLcb;
use super::text::{PieceReader, TextEncoding};
use crate::common::binary::read_u32_le;
use std::io::{Read, Seek, SeekFrom};
use tracing::debug;
use zerocopy::{FromBytes, LE, U16, U32};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// Clx tag of a Prc block
const CLX_PRC: u8 = 0x01;
/// Clx tag of the Pcdt
const CLX_PCDT: u8 = 0x02;

/// Size of a CP entry
const CP_SIZE: u64 = 4;
/// Size of a piece descriptor (Pcd)
const PCD_SIZE: u64 = 8;

/// fCompressed bit of the stored fc
const FC_COMPRESSED: u32 = 1 << 30;
/// The stored fc without the compression flag
const FC_MASK: u32 = FC_COMPRESSED - 1;

/// Piece descriptor as stored.
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawPcd {
    flags: U16<LE>,
    fc: U32<LE>,
    prm: U16<LE>,
}

/// Lazily indexed piece table.
#[derive(Debug, Clone, Copy)]
pub struct PieceTable {
    /// Number of pieces
    count: u32,
    /// Absolute table stream offset of the CP array
    cp_base: u64,
    /// Absolute table stream offset of the Pcd array
    pcd_base: u64,
}

impl PieceTable {
    /// Parse the Clx header located by the FIB.
    ///
    /// Leaves `table` positioned somewhere inside the Clx.
    pub fn parse<R: Read + Seek>(table: &mut R, clx: FcLcb) -> Result<Self> {
        let mut window = Subfile::at(&mut *table, u64::from(clx.offset), u64::from(clx.length))?;

        loop {
            match window.read_u8()? {
                CLX_PRC => {
                    let size = window.read_i16()?;
                    if size < 0 {
                        return Err(DocError::Format(format!(
                            "negative Prc size {} in Clx",
                            size
                        )));
                    }
                    window.skip(size as u64)?;
                },
                CLX_PCDT => break,
                tag => {
                    return Err(DocError::Format(format!(
                        "unexpected Clx tag 0x{:02X}",
                        tag
                    )));
                },
            }
        }

        let lcb = window.read_u32()?;
        if lcb < 4 || (u64::from(lcb) - CP_SIZE) % (CP_SIZE + PCD_SIZE) != 0 {
            return Err(DocError::Format(format!(
                "PlcPcd size {} is not 4 + 12n",
                lcb
            )));
        }
        if u64::from(lcb) > window.remaining() {
            return Err(DocError::Truncated {
                expected: u64::from(lcb),
                available: window.remaining(),
            });
        }

        let count = (u64::from(lcb) - CP_SIZE) / (CP_SIZE + PCD_SIZE);
        let cp_base = window.base() + window.tell();
        let pcd_base = cp_base + CP_SIZE * (count + 1);

        debug!(pieces = count, cp_base, pcd_base, "parsed piece table");

        Ok(Self {
            count: count as u32,
            cp_base,
            pcd_base,
        })
    }

    /// Number of pieces.
    #[inline]
    pub fn len(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Read piece `index` from the table stream.
    pub fn piece<R: Read + Seek>(&self, table: &mut R, index: u32) -> Result<Piece> {
        if index >= self.count {
            return Err(DocError::Format(format!(
                "piece {} out of range (table has {})",
                index, self.count
            )));
        }

        let mut cps = [0u8; 8];
        table.seek(SeekFrom::Start(self.cp_base + CP_SIZE * u64::from(index)))?;
        read_full(table, &mut cps)?;
        let start = read_u32_le(&cps, 0)?;
        let end = read_u32_le(&cps, 4)?;
        if end <= start {
            return Err(DocError::Format(format!(
                "piece {} CPs not increasing ({} -> {})",
                index, start, end
            )));
        }

        let mut pcd = [0u8; PCD_SIZE as usize];
        table.seek(SeekFrom::Start(self.pcd_base + PCD_SIZE * u64::from(index)))?;
        read_full(table, &mut pcd)?;
        let pcd = RawPcd::read_from_bytes(&pcd[..])
            .map_err(|_| DocError::format("Failed to parse Pcd"))?;
        if pcd.prm.get() != 0 {
            return Err(DocError::Format(format!(
                "piece {} carries property modifier 0x{:04X}",
                index,
                pcd.prm.get()
            )));
        }

        let piece = Piece::from_descriptor(index, end - start, pcd.fc.get())?;
        debug!(
            index,
            cp = start,
            chars = piece.char_count,
            offset = piece.byte_offset,
            encoding = ?piece.encoding,
            flags = pcd.flags.get(),
            "piece"
        );
        Ok(piece)
    }

    /// Total text length in characters: last CP minus first CP.
    pub fn text_len<R: Read + Seek>(&self, table: &mut R) -> Result<u32> {
        let mut buf = [0u8; 4];
        table.seek(SeekFrom::Start(self.cp_base))?;
        read_full(table, &mut buf)?;
        let first = read_u32_le(&buf, 0)?;
        table.seek(SeekFrom::Start(self.cp_base + CP_SIZE * u64::from(self.count)))?;
        read_full(table, &mut buf)?;
        let last = read_u32_le(&buf, 0)?;
        last.checked_sub(first)
            .ok_or_else(|| DocError::format("last CP precedes first CP"))
    }
}

/// A contiguous run of characters with one encoding.
///
/// Reading through [`Piece::reader`] advances the piece; it never reads past
/// its declared length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    index: u32,
    char_count: u32,
    encoding: TextEncoding,
    /// Next unread byte in the WordDocument stream
    byte_offset: u32,
    bytes_remaining: u32,
}

impl Piece {
    /// Decode a stored fc into offset and encoding.
    ///
    /// Compressed pieces store twice their byte offset.
    pub fn from_descriptor(index: u32, char_count: u32, fc: u32) -> Result<Self> {
        let raw = fc & FC_MASK;
        let (encoding, byte_offset) = if fc & FC_COMPRESSED != 0 {
            if raw % 2 != 0 {
                return Err(DocError::Format(format!(
                    "compressed piece {} has odd fc 0x{:08X}",
                    index, raw
                )));
            }
            (TextEncoding::Compressed, raw / 2)
        } else {
            (TextEncoding::Utf16, raw)
        };

        let bytes_remaining = char_count
            .checked_mul(encoding.unit())
            .ok_or_else(|| DocError::Format(format!("piece {} is too long", index)))?;
        if byte_offset.checked_add(bytes_remaining).is_none() {
            return Err(DocError::Format(format!(
                "piece {} runs past the largest stream offset ({} bytes at 0x{:08X})",
                index, bytes_remaining, byte_offset
            )));
        }

        Ok(Self {
            index,
            char_count,
            encoding,
            byte_offset,
            bytes_remaining,
        })
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Characters in the whole piece.
    #[inline]
    pub fn char_count(&self) -> u32 {
        self.char_count
    }

    #[inline]
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    /// Bytes per character.
    #[inline]
    pub fn unit(&self) -> u32 {
        self.encoding.unit()
    }

    /// Offset of the next unread byte.
    #[inline]
    pub fn byte_offset(&self) -> u32 {
        self.byte_offset
    }

    #[inline]
    pub fn bytes_remaining(&self) -> u32 {
        self.bytes_remaining
    }

    /// Whether every byte has been handed out.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.bytes_remaining == 0
    }

    /// Decoder over the next `size` bytes (all remaining bytes for `None`).
    ///
    /// The piece advances past those bytes immediately, so consecutive calls
    /// yield consecutive ranges.
    pub fn reader<'a, R: Read + Seek>(
        &mut self,
        document: &'a mut R,
        size: Option<u32>,
    ) -> Result<PieceReader<'a, R>> {
        let size = size.unwrap_or(self.bytes_remaining);
        if size % self.unit() != 0 {
            return Err(DocError::Format(format!(
                "{} bytes is not a whole number of characters in piece {}",
                size, self.index
            )));
        }
        if size > self.bytes_remaining {
            return Err(DocError::Format(format!(
                "read of {} bytes past the end of piece {} ({} left)",
                size, self.index, self.bytes_remaining
            )));
        }

        document.seek(SeekFrom::Start(u64::from(self.byte_offset)))?;
        let window = Subfile::new(document, u64::from(size))?;
        self.byte_offset += size;
        self.bytes_remaining -= size;
        Ok(PieceReader::new(window, self.encoding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    /// Table stream with `junk` leading bytes and a Clx holding the given
    /// Prc sizes, CPs and stored fcs.
    fn clx_stream(junk: usize, prcs: &[usize], cps: &[u32], fcs: &[u32]) -> (Vec<u8>, FcLcb) {
        let mut data = vec![0xEEu8; junk];
        for &size in prcs {
            data.push(CLX_PRC);
            data.extend_from_slice(&(size as i16).to_le_bytes());
            data.extend(std::iter::repeat_n(0x55, size));
        }
        data.push(CLX_PCDT);
        let lcb = 4 * cps.len() + 8 * fcs.len();
        data.extend_from_slice(&(lcb as u32).to_le_bytes());
        for cp in cps {
            data.extend_from_slice(&cp.to_le_bytes());
        }
        for fc in fcs {
            data.extend_from_slice(&0u16.to_le_bytes());
            data.extend_from_slice(&fc.to_le_bytes());
            data.extend_from_slice(&0u16.to_le_bytes());
        }
        let clx = FcLcb {
            offset: junk as u32,
            length: (data.len() - junk) as u32,
        };
        (data, clx)
    }

    #[test]
    fn test_parse_skips_prc_blocks() {
        let (data, clx) = clx_stream(7, &[3, 0], &[0, 5, 9], &[0x4000_0800, 0x1000]);
        let mut table = Cursor::new(data);
        let pieces = PieceTable::parse(&mut table, clx).unwrap();
        assert_eq!(pieces.len(), 2);
        assert!(!pieces.is_empty());
        assert_eq!(pieces.text_len(&mut table).unwrap(), 9);

        let first = pieces.piece(&mut table, 0).unwrap();
        assert_eq!(first.char_count(), 5);
        assert_eq!(first.encoding(), TextEncoding::Compressed);
        assert_eq!(first.byte_offset(), 0x400);
        assert_eq!(first.bytes_remaining(), 5);

        let second = pieces.piece(&mut table, 1).unwrap();
        assert_eq!(second.char_count(), 4);
        assert_eq!(second.encoding(), TextEncoding::Utf16);
        assert_eq!(second.byte_offset(), 0x1000);
        assert_eq!(second.bytes_remaining(), 8);

        assert!(pieces.piece(&mut table, 2).is_err());
    }

    #[test]
    fn test_parse_rejects_bad_layouts() {
        // Unknown tag
        let (mut data, clx) = clx_stream(0, &[], &[0, 1], &[0]);
        data[0] = 0x03;
        let result = PieceTable::parse(&mut Cursor::new(data), clx);
        assert!(matches!(result, Err(DocError::Format(_))));

        // Negative Prc size
        let (mut data, clx) = clx_stream(0, &[2], &[0, 1], &[0]);
        data[1..3].copy_from_slice(&(-2i16).to_le_bytes());
        let result = PieceTable::parse(&mut Cursor::new(data), clx);
        assert!(matches!(result, Err(DocError::Format(_))));

        // lcb that is not 4 + 12n
        let (mut data, clx) = clx_stream(0, &[], &[0, 1], &[0]);
        data[1..5].copy_from_slice(&17u32.to_le_bytes());
        let result = PieceTable::parse(&mut Cursor::new(data), clx);
        assert!(matches!(result, Err(DocError::Format(_))));

        // PlcPcd running past the Clx
        let (data, mut clx) = clx_stream(0, &[], &[0, 1], &[0]);
        clx.length -= 1;
        let result = PieceTable::parse(&mut Cursor::new(data), clx);
        assert!(matches!(result, Err(DocError::Truncated { .. })));
    }

    #[test]
    fn test_piece_rejects_equal_cps() {
        let (data, clx) = clx_stream(0, &[], &[0, 4, 4], &[0, 0]);
        let mut table = Cursor::new(data);
        let pieces = PieceTable::parse(&mut table, clx).unwrap();
        assert!(pieces.piece(&mut table, 0).is_ok());
        assert!(matches!(
            pieces.piece(&mut table, 1),
            Err(DocError::Format(_))
        ));
    }

    #[test]
    fn test_compressed_fc_must_be_even() {
        let result = Piece::from_descriptor(0, 3, FC_COMPRESSED | 0x801);
        assert!(matches!(result, Err(DocError::Format(_))));
        // The high bit is not part of the offset
        let piece = Piece::from_descriptor(0, 3, 0x8000_0000 | 0x200).unwrap();
        assert_eq!(piece.byte_offset(), 0x200);
    }

    #[test]
    fn test_piece_must_fit_in_offset_range() {
        let result = Piece::from_descriptor(0, u32::MAX - 0x1000, FC_COMPRESSED | 0x3FFF_FFFE);
        assert!(matches!(result, Err(DocError::Format(_))));

        let result = Piece::from_descriptor(1, 0x7000_0000, 0x3FFF_FF00);
        assert!(matches!(result, Err(DocError::Format(_))));

        // Ending just below the top of the range is fine
        let piece = Piece::from_descriptor(2, 0x6000_0000, 0x3FFF_FFFE).unwrap();
        assert_eq!(piece.bytes_remaining(), 0xC000_0000);
        assert_eq!(
            u64::from(piece.byte_offset()) + u64::from(piece.bytes_remaining()),
            0xFFFF_FFFE
        );
    }

    #[test]
    fn test_piece_rejects_property_modifier() {
        let (mut data, clx) = clx_stream(0, &[], &[0, 3, 5], &[0x1000, 0x2000]);
        // prm of the second Pcd: tag, lcb, 3 CPs, one Pcd, then flags and fc
        let prm = 1 + 4 + 12 + 8 + 6;
        data[prm..prm + 2].copy_from_slice(&0x0A01u16.to_le_bytes());
        let mut table = Cursor::new(data);
        let pieces = PieceTable::parse(&mut table, clx).unwrap();
        assert!(pieces.piece(&mut table, 0).is_ok());
        assert!(matches!(
            pieces.piece(&mut table, 1),
            Err(DocError::Format(_))
        ));
    }

    #[test]
    fn test_reader_consumes_consecutive_ranges() {
        let mut document = Cursor::new(b"....abcdef".to_vec());
        let mut piece = Piece::from_descriptor(0, 6, FC_COMPRESSED | 8).unwrap();

        let text = piece
            .reader(&mut document, Some(2))
            .unwrap()
            .read_to_string()
            .unwrap();
        assert_eq!(text, "ab");
        assert_eq!(piece.byte_offset(), 6);
        assert_eq!(piece.bytes_remaining(), 4);

        assert!(piece.reader(&mut document, Some(5)).is_err());

        let text = piece
            .reader(&mut document, None)
            .unwrap()
            .read_to_string()
            .unwrap();
        assert_eq!(text, "cdef");
        assert!(piece.is_exhausted());
    }

    #[test]
    fn test_reader_rejects_partial_characters() {
        let mut document = Cursor::new(vec![0u8; 16]);
        let mut piece = Piece::from_descriptor(0, 4, 0).unwrap();
        assert!(matches!(
            piece.reader(&mut document, Some(3)),
            Err(DocError::Format(_))
        ));
        // Nothing was consumed by the failed call
        assert_eq!(piece.bytes_remaining(), 8);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_piece_lengths_sum_to_text_len(
            first in 0u32..1000,
            lengths in prop::collection::vec(1u32..500, 1..24),
            prcs in prop::collection::vec(0usize..40, 0..3),
        ) {
            let mut cps = vec![first];
            for length in &lengths {
                cps.push(cps[cps.len() - 1] + length);
            }
            let fcs: Vec<u32> = (0..lengths.len() as u32).map(|i| i * 0x1000).collect();
            let (data, clx) = clx_stream(3, &prcs, &cps, &fcs);
            let mut table = Cursor::new(data);

            let pieces = PieceTable::parse(&mut table, clx).unwrap();
            prop_assert_eq!(pieces.len() as usize, lengths.len());

            let mut sum = 0;
            for i in 0..pieces.len() {
                sum += pieces.piece(&mut table, i).unwrap().char_count();
            }
            prop_assert_eq!(sum, pieces.text_len(&mut table).unwrap());
        }
    }
}
