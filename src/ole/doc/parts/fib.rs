/// File Information Block (FIB) parser for DOC files.
///
/// The FIB is located at the beginning of the WordDocument stream and contains
/// the information needed to find the document's structure:
/// - File format identification (wIdent)
/// - Which table stream to use (0Table or 1Table)
/// - Offsets of the paragraph bin table and the piece table (Clx)
///   inside the table stream
use super::super::package::{DocError, Result};
use super::super::subfile::read_full;
use crate::common::binary::read_u16_le;
use std::io::{Read, Seek, SeekFrom};
use tracing::debug;
use zerocopy::{FromBytes, LE, U16, U32};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// wIdent of a Word binary file
pub const WORD_BINARY_FILE: u16 = 0xA5EC;

/// Size of the base FIB structure
const FIB_BASE_SIZE: usize = 32;

/// Bytes of FibRgFcLcb97 needed to reach fcClx/lcbClx
const FC_LCB_97_PREFIX_SIZE: usize = 272;

/// fEncrypted (bit 8 of the flag word at offset 0x0A)
const F_ENCRYPTED: u16 = 0x0100;
/// fWhichTblStm (bit 9 of the flag word at offset 0x0A)
const F_WHICH_TBL_STM: u16 = 0x0200;

/// FibBase, the fixed 32-byte prefix.
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawFibBase {
    w_ident: U16<LE>,
    n_fib: U16<LE>,
    unused: U16<LE>,
    lid: U16<LE>,
    pn_next: U16<LE>,
    flags: U16<LE>,
    n_fib_back: U16<LE>,
    l_key: U32<LE>,
    envr: u8,
    flags2: u8,
    reserved: [u8; 12],
}

/// The part of FibRgFcLcb97 that locates paragraph properties and pieces.
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawFcLcb97Prefix {
    before_bte_papx: [u8; 104],
    fc_plcf_bte_papx: U32<LE>,
    lcb_plcf_bte_papx: U32<LE>,
    before_clx: [u8; 152],
    fc_clx: U32<LE>,
    lcb_clx: U32<LE>,
}

/// An (offset, length) pair locating a structure in the table stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FcLcb {
    pub offset: u32,
    pub length: u32,
}

/// File Information Block.
///
/// Immutable once parsed; one per decode run.
#[derive(Debug, Clone)]
pub struct FileInformationBlock {
    /// File format version
    nfib: u16,
    /// Language ID
    lid: u16,
    /// Whether to use 1Table (true) or 0Table (false)
    which_table_stream: bool,
    /// PlcBtePapx: paragraph property bin table
    plcf_bte_papx: FcLcb,
    /// Clx: piece table container
    clx: FcLcb,
}

impl FileInformationBlock {
    /// Parse a FIB from the WordDocument stream positioned at offset 0.
    ///
    /// # Arguments
    ///
    /// * `word_document` - The WordDocument stream
    ///
    /// # Returns
    ///
    /// A parsed FIB or an error if the magic does not match or the stream
    /// is too short.
    pub fn read<R: Read + Seek>(word_document: &mut R) -> Result<Self> {
        let mut base = [0u8; FIB_BASE_SIZE];
        read_full(word_document, &mut base)?;
        let base = RawFibBase::read_from_bytes(&base[..])
            .map_err(|_| DocError::format("Failed to parse FibBase"))?;

        let magic = base.w_ident.get();
        if magic != WORD_BINARY_FILE {
            return Err(DocError::Format(format!(
                "Invalid FIB magic number: 0x{:04X}",
                magic
            )));
        }

        let flags = base.flags.get();
        if flags & F_ENCRYPTED != 0 {
            return Err(DocError::format("Encrypted documents are not supported"));
        }

        // FibRgW97 and FibRgLw97 are counted arrays we have no use for
        let csw = read_u16(word_document)?;
        word_document.seek(SeekFrom::Current(i64::from(csw) * 2))?;
        let cslw = read_u16(word_document)?;
        word_document.seek(SeekFrom::Current(i64::from(cslw) * 4))?;

        let cb_rg_fc_lcb = read_u16(word_document)? as usize * 8;
        if cb_rg_fc_lcb < FC_LCB_97_PREFIX_SIZE {
            return Err(DocError::Format(format!(
                "FibRgFcLcb is {} bytes, need at least {}",
                cb_rg_fc_lcb, FC_LCB_97_PREFIX_SIZE
            )));
        }

        let mut fc_lcb = [0u8; FC_LCB_97_PREFIX_SIZE];
        read_full(word_document, &mut fc_lcb)?;
        let fc_lcb = RawFcLcb97Prefix::read_from_bytes(&fc_lcb[..])
            .map_err(|_| DocError::format("Failed to parse FibRgFcLcb97"))?;

        let fib = Self {
            nfib: base.n_fib.get(),
            lid: base.lid.get(),
            which_table_stream: flags & F_WHICH_TBL_STM != 0,
            plcf_bte_papx: FcLcb {
                offset: fc_lcb.fc_plcf_bte_papx.get(),
                length: fc_lcb.lcb_plcf_bte_papx.get(),
            },
            clx: FcLcb {
                offset: fc_lcb.fc_clx.get(),
                length: fc_lcb.lcb_clx.get(),
            },
        };

        debug!(
            nfib = fib.nfib,
            table = fib.table_stream_name(),
            clx = ?fib.clx,
            plcf_bte_papx = ?fib.plcf_bte_papx,
            "parsed FIB"
        );

        Ok(fib)
    }

    /// Get the file format version.
    ///
    /// Common values:
    /// - 0x00C1 (193): Word 97 through Word 2003
    /// - 0x0101 (257): Word 2007
    /// - 0x0112 (274): Word 2010+
    #[inline]
    pub fn version(&self) -> u16 {
        self.nfib
    }

    /// Get the language ID.
    #[inline]
    pub fn language_id(&self) -> u16 {
        self.lid
    }

    /// Get which table stream to use.
    ///
    /// Returns `true` for "1Table", `false` for "0Table".
    #[inline]
    pub fn which_table_stream(&self) -> bool {
        self.which_table_stream
    }

    /// Name of the table stream holding the structures below.
    #[inline]
    pub fn table_stream_name(&self) -> &'static str {
        if self.which_table_stream {
            "1Table"
        } else {
            "0Table"
        }
    }

    /// Location of the paragraph property bin table.
    #[inline]
    pub fn plcf_bte_papx(&self) -> FcLcb {
        self.plcf_bte_papx
    }

    /// Location of the piece table container.
    #[inline]
    pub fn clx(&self) -> FcLcb {
        self.clx
    }
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    read_full(reader, &mut buf)?;
    Ok(read_u16_le(&buf, 0)?)
}
