/// Paragraph property (PAPX) decoding for DOC files.
///
/// Only two paragraph properties matter for text reconstruction: whether
/// the paragraph sits inside a table and whether it is a table terminator
/// row (TTP). Every other SPRM is skipped by its operand size, which is
/// known from the size class or an explicit length prefix and never by
/// scanning.
use super::super::package::{DocError, Result};
use super::super::subfile::{Subfile, read_full};
use crate::common::binary::{read_u8, read_u16_le, read_u32_le};
use crate::ole::sprm::{SGC_PARAGRAPH, SGC_TABLE, Sprm, SprmOperation};
use std::borrow::Cow;
use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, trace};

/// sprmPFInTable
pub const SPRM_P_F_IN_TABLE: u16 = 0x0416;
/// sprmPFTtp
pub const SPRM_P_F_TTP: u16 = 0x0417;
/// sprmPChgTabs
pub const SPRM_P_CHG_TABS: u16 = 0x0615;
/// sprmPHugePapx
pub const SPRM_P_HUGE_PAPX: u16 = 0x0646;
/// sprmTDefTable
pub const SPRM_T_DEF_TABLE: u16 = 0x1608;

/// Length byte of sprmPChgTabs announcing the irregular operand layout
const CHG_TABS_IRREGULAR: u8 = 255;

/// Table membership of a paragraph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParagraphFlags {
    /// The paragraph is part of a table
    pub in_table: bool,
    /// The paragraph is a table terminator row
    pub is_table_terminator: bool,
}

/// Provides the stream that holds oversized property lists.
///
/// The stream is only requested when a sprmPHugePapx is met.
pub trait OverflowSource {
    type Stream: Read + Seek;

    fn overflow_stream(&mut self) -> Result<&mut Self::Stream>;
}

/// Decode a PAPX blob: a 2-byte style index followed by SPRMs.
pub fn decode_papx<O: OverflowSource + ?Sized>(
    papx: &[u8],
    overflow: &mut O,
) -> Result<ParagraphFlags> {
    let istd = read_u16_le(papx, 0)?;
    trace!(istd, len = papx.len(), "decoding PAPX");
    decode_grpprl(Cow::Borrowed(&papx[2..]), overflow)
}

/// Decode a bare SPRM list.
///
/// A sprmPHugePapx replaces the rest of the list with the one stored in the
/// overflow stream; parsing continues there and never comes back.
pub fn decode_grpprl<O: OverflowSource + ?Sized>(
    grpprl: Cow<'_, [u8]>,
    overflow: &mut O,
) -> Result<ParagraphFlags> {
    let mut grpprl = grpprl;
    let mut flags = ParagraphFlags::default();
    let mut pos = 0;

    while pos < grpprl.len() {
        let raw = read_u16_le(&grpprl, pos)?;
        pos += 2;

        let sprm = Sprm::from_raw(raw);
        if sprm.group != SGC_PARAGRAPH && sprm.group != SGC_TABLE {
            return Err(DocError::Format(format!(
                "SPRM 0x{:04X} is neither a paragraph nor a table modifier",
                raw
            )));
        }

        match (sprm.opcode, sprm.operation) {
            (SPRM_P_F_IN_TABLE, _) => flags.in_table = read_flag(&grpprl, &mut pos, raw)?,
            (SPRM_P_F_TTP, _) => flags.is_table_terminator = read_flag(&grpprl, &mut pos, raw)?,
            (SPRM_P_HUGE_PAPX, operation) => {
                if operation != SprmOperation::DWord {
                    return Err(DocError::Format(format!(
                        "sprmPHugePapx with size class {}",
                        operation.size_code()
                    )));
                }
                if pos + 4 != grpprl.len() {
                    return Err(DocError::Format(
                        "sprmPHugePapx operand is not the end of the property list".to_string(),
                    ));
                }
                let offset = read_u32_le(&grpprl, pos)?;
                grpprl = Cow::Owned(read_huge_papx(overflow, offset)?);
                pos = 0;
            },
            (SPRM_T_DEF_TABLE, SprmOperation::Variable) => {
                let cb = read_u16_le(&grpprl, pos)? as usize;
                if cb <= 1 {
                    return Err(DocError::Format(format!(
                        "sprmTDefTable length {} too small",
                        cb
                    )));
                }
                pos += 2 + cb - 1;
            },
            (opcode, SprmOperation::Variable) => {
                let cb = read_u8(&grpprl, pos)?;
                pos += 1;
                if opcode == SPRM_P_CHG_TABS && cb == CHG_TABS_IRREGULAR {
                    // PChgTabsDelClose: 2-byte positions and close positions
                    let deleted = read_u8(&grpprl, pos)? as usize;
                    pos += 1 + 4 * deleted;
                    // PChgTabsAdd: 2-byte positions and 1-byte descriptors
                    let added = read_u8(&grpprl, pos)? as usize;
                    pos += 1 + 3 * added;
                } else {
                    pos += cb as usize;
                }
            },
            (_, operation) => {
                pos += operation.fixed_operand_size().unwrap_or(0);
            },
        }

        if pos > grpprl.len() {
            return Err(DocError::Truncated {
                expected: pos as u64,
                available: grpprl.len() as u64,
            });
        }
    }

    Ok(flags)
}

/// A 1-byte boolean operand.
fn read_flag(grpprl: &[u8], pos: &mut usize, raw: u16) -> Result<bool> {
    if Sprm::from_raw(raw).operation != SprmOperation::Byte {
        return Err(DocError::Format(format!(
            "SPRM 0x{:04X} should carry a 1-byte operand",
            raw
        )));
    }
    let value = read_u8(grpprl, *pos)?;
    *pos += 1;
    match value {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(DocError::Format(format!(
            "SPRM 0x{:04X} has non-boolean operand {}",
            raw, value
        ))),
    }
}

/// Read the length-prefixed property list at `offset` in the overflow stream.
fn read_huge_papx<O: OverflowSource + ?Sized>(overflow: &mut O, offset: u32) -> Result<Vec<u8>> {
    let data = overflow.overflow_stream()?;
    data.seek(SeekFrom::Start(u64::from(offset)))?;
    let mut len = [0u8; 2];
    read_full(data, &mut len)?;
    let len = read_u16_le(&len, 0)?;
    debug!(offset, len, "following sprmPHugePapx");
    Subfile::new(data, u64::from(len))?.read_bytes(len as usize)
}
