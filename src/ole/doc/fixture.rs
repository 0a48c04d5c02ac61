//! Synthetic Word documents for tests.
//!
//! [`DocBuilder`] lays out pieces in a WordDocument stream, derives the
//! paragraph ends from the marks in their text, and writes the FIB, Clx,
//! bin table and FKP pages that describe them.

use super::extractor::{DATA_STREAM, WORD_DOCUMENT_STREAM};
use super::parts::fkp::FKP_PAGE_SIZE;
use super::parts::text::TextEncoding;
use crate::ole::MemoryContainer;
use crate::ole::consts::{ENDOFCHAIN, FATSECT, FREESECT, MAGIC, NOSTREAM};
use encoding_rs::WINDOWS_1252;

/// Where text is placed when no offset is given
const TEXT_START: u32 = 0x400;

/// Paragraph properties a test can ask for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum Props {
    /// No PAPX at all
    #[default]
    Plain,
    InTable,
    /// In a table and a terminator row
    Terminator,
    /// In a table, stated through sprmPHugePapx and the Data stream
    HugeInTable,
}

#[derive(Debug, Clone)]
struct PieceSpec {
    bytes: Vec<u8>,
    encoding: TextEncoding,
    offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub(crate) struct DocBuilder {
    pieces: Vec<PieceSpec>,
    props: Vec<Props>,
    extra_ends: Vec<u32>,
    index_from: Option<u32>,
    entries_per_page: usize,
    table_stream: &'static str,
}

impl DocBuilder {
    pub fn new() -> Self {
        Self {
            pieces: Vec::new(),
            props: Vec::new(),
            extra_ends: Vec::new(),
            index_from: None,
            entries_per_page: 16,
            table_stream: "0Table",
        }
    }

    /// Append a piece placed after the previous ones.
    pub fn piece(self, text: &str, encoding: TextEncoding) -> Self {
        self.raw_piece_at(encode(text, encoding), encoding, None)
    }

    /// Append a piece at a fixed WordDocument offset.
    pub fn piece_at(self, text: &str, encoding: TextEncoding, offset: u32) -> Self {
        self.raw_piece_at(encode(text, encoding), encoding, Some(offset))
    }

    /// Append a piece from already encoded bytes.
    pub fn raw_piece(self, bytes: &[u8], encoding: TextEncoding) -> Self {
        self.raw_piece_at(bytes.to_vec(), encoding, None)
    }

    fn raw_piece_at(mut self, bytes: Vec<u8>, encoding: TextEncoding, offset: Option<u32>) -> Self {
        self.pieces.push(PieceSpec {
            bytes,
            encoding,
            offset,
        });
        self
    }

    /// Properties of the paragraphs in document order; the rest are plain.
    pub fn props(mut self, props: &[Props]) -> Self {
        self.props = props.to_vec();
        self
    }

    /// Claim an extra paragraph end that no mark backs.
    pub fn extra_end(mut self, fc: u32) -> Self {
        self.extra_ends.push(fc);
        self
    }

    /// Start the paragraph index here instead of at the lowest piece.
    pub fn index_from(mut self, fc: u32) -> Self {
        self.index_from = Some(fc);
        self
    }

    pub fn entries_per_page(mut self, count: usize) -> Self {
        self.entries_per_page = count;
        self
    }

    pub fn table_stream(mut self, name: &'static str) -> Self {
        self.table_stream = name;
        self
    }

    pub fn build(&self) -> MemoryContainer {
        let mut container = MemoryContainer::new();
        for (name, data) in self.streams() {
            container.insert(name, data);
        }
        container
    }

    /// The document as a compound file with the given mini stream cutoff.
    pub fn build_file(&self, mini_cutoff: u32) -> Vec<u8> {
        compound_file(&self.streams(), mini_cutoff)
    }

    pub fn streams(&self) -> Vec<(&'static str, Vec<u8>)> {
        let mut word = Vec::new();
        let mut data = Vec::new();

        // Text
        let mut next = TEXT_START;
        let mut placed = Vec::new();
        let mut ends = Vec::new();
        for spec in &self.pieces {
            let offset = spec.offset.unwrap_or((next + 1) & !1);
            put(&mut word, offset as usize, &spec.bytes);
            next = next.max(offset + spec.bytes.len() as u32);

            let unit = spec.encoding.unit() as usize;
            for (i, code) in spec.bytes.chunks(unit).enumerate() {
                let code = match *code {
                    [b] => u16::from(b),
                    [lo, hi] => u16::from_le_bytes([lo, hi]),
                    _ => continue,
                };
                if matches!(code, 0x0D | 0x0C | 0x07) {
                    let props = self.props.get(ends.len()).copied().unwrap_or_default();
                    ends.push((offset + ((i + 1) * unit) as u32, props));
                }
            }
            placed.push((offset, spec));
        }
        ends.extend(self.extra_ends.iter().map(|&fc| (fc, Props::Plain)));

        let index_start = self
            .index_from
            .or_else(|| placed.iter().map(|(offset, _)| *offset).min())
            .unwrap_or(TEXT_START);
        ends.retain(|(fc, _)| *fc > index_start);
        ends.sort_by_key(|(fc, _)| *fc);

        // FKP pages, one per bucket
        let mut page_no = (next as usize).div_ceil(FKP_PAGE_SIZE).max(1) as u32;
        let mut bucket_fcs = vec![index_start];
        let mut bucket_pns = Vec::new();
        for chunk in ends.chunks(self.entries_per_page.max(1)) {
            let start = bucket_fcs[bucket_fcs.len() - 1];
            let page = fkp_page(start, chunk, &mut data);
            put(&mut word, page_no as usize * FKP_PAGE_SIZE, &page);
            bucket_fcs.push(chunk[chunk.len() - 1].0);
            bucket_pns.push(page_no);
            page_no += 1;
        }

        // Table stream: Clx, then PlcBtePapx
        let mut table = vec![0x01, 0x02, 0x00, 0xAB, 0xCD];
        table.push(0x02);
        let lcb = 4 + 12 * placed.len();
        table.extend_from_slice(&(lcb as u32).to_le_bytes());
        let mut cp = 0u32;
        table.extend_from_slice(&cp.to_le_bytes());
        for (_, spec) in &placed {
            cp += (spec.bytes.len() / spec.encoding.unit() as usize) as u32;
            table.extend_from_slice(&cp.to_le_bytes());
        }
        for (offset, spec) in &placed {
            let fc = match spec.encoding {
                TextEncoding::Compressed => (offset * 2) | (1 << 30),
                TextEncoding::Utf16 => *offset,
            };
            table.extend_from_slice(&0u16.to_le_bytes());
            table.extend_from_slice(&fc.to_le_bytes());
            table.extend_from_slice(&0u16.to_le_bytes());
        }
        let clx = (0u32, table.len() as u32);

        let plcf_offset = table.len() as u32;
        for fc in &bucket_fcs {
            table.extend_from_slice(&fc.to_le_bytes());
        }
        for pn in &bucket_pns {
            table.extend_from_slice(&pn.to_le_bytes());
        }
        let plcf = (plcf_offset, table.len() as u32 - plcf_offset);

        put(&mut word, 0, &fib(self.table_stream == "1Table", plcf, clx));

        let mut streams = vec![(WORD_DOCUMENT_STREAM, word), (self.table_stream, table)];
        if !data.is_empty() {
            streams.push((DATA_STREAM, data));
        }
        streams
    }
}

fn encode(text: &str, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Compressed => {
            let (bytes, _, unmappable) = WINDOWS_1252.encode(text);
            assert!(!unmappable, "{:?} is not Windows-1252", text);
            bytes.into_owned()
        },
        TextEncoding::Utf16 => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
    }
}

fn put(buffer: &mut Vec<u8>, at: usize, bytes: &[u8]) {
    if buffer.len() < at + bytes.len() {
        buffer.resize(at + bytes.len(), 0);
    }
    buffer[at..at + bytes.len()].copy_from_slice(bytes);
}

/// The PAPX (style index + SPRMs) for `props`; may append to `data`.
fn papx(props: Props, data: &mut Vec<u8>) -> Option<Vec<u8>> {
    let mut blob = vec![0x00, 0x00];
    match props {
        Props::Plain => return None,
        Props::InTable => blob.extend_from_slice(&[0x16, 0x24, 0x01]),
        Props::Terminator => blob.extend_from_slice(&[0x16, 0x24, 0x01, 0x17, 0x24, 0x01]),
        Props::HugeInTable => {
            let offset = data.len() as u32;
            data.extend_from_slice(&3u16.to_le_bytes());
            data.extend_from_slice(&[0x16, 0x24, 0x01]);
            blob.extend_from_slice(&[0x46, 0x66]);
            blob.extend_from_slice(&offset.to_le_bytes());
        },
    }
    Some(blob)
}

fn fkp_page(start: u32, ends: &[(u32, Props)], data: &mut Vec<u8>) -> Vec<u8> {
    let mut page = vec![0u8; FKP_PAGE_SIZE];
    let count = ends.len();
    page[FKP_PAGE_SIZE - 1] = count as u8;
    page[0..4].copy_from_slice(&start.to_le_bytes());

    let bx_base = (count + 1) * 4;
    let mut top = FKP_PAGE_SIZE - 1;
    let mut stored: Vec<(Props, u8)> = Vec::new();
    for (i, (fc, props)) in ends.iter().enumerate() {
        page[(i + 1) * 4..(i + 2) * 4].copy_from_slice(&fc.to_le_bytes());

        let reusable = *props != Props::HugeInTable;
        let bx = match stored.iter().find(|(p, _)| reusable && p == props) {
            Some((_, bx)) => *bx,
            None => match papx(*props, data) {
                None => 0,
                Some(blob) => {
                    let mut encoded = if blob.len() % 2 == 1 {
                        vec![blob.len().div_ceil(2) as u8]
                    } else {
                        vec![0, (blob.len() / 2) as u8]
                    };
                    encoded.extend_from_slice(&blob);
                    top = (top - encoded.len()) & !1;
                    assert!(top >= bx_base + count * 13, "FKP page overflow");
                    page[top..top + encoded.len()].copy_from_slice(&encoded);
                    let bx = (top / 2) as u8;
                    stored.push((*props, bx));
                    bx
                },
            },
        };
        page[bx_base + i * 13] = bx;
    }
    page
}

/// A FIB with Word 97 sized arrays and the two locations filled in.
fn fib(table_one: bool, plcf: (u32, u32), clx: (u32, u32)) -> Vec<u8> {
    let mut data = vec![0u8; 32];
    data[0..2].copy_from_slice(&0xA5ECu16.to_le_bytes());
    data[2..4].copy_from_slice(&0x00C1u16.to_le_bytes());
    data[6..8].copy_from_slice(&0x0409u16.to_le_bytes());
    let flags: u16 = if table_one { 0x0200 } else { 0 };
    data[10..12].copy_from_slice(&flags.to_le_bytes());

    data.extend_from_slice(&14u16.to_le_bytes());
    data.extend_from_slice(&[0u8; 28]);
    data.extend_from_slice(&22u16.to_le_bytes());
    data.extend_from_slice(&[0u8; 88]);
    data.extend_from_slice(&93u16.to_le_bytes());

    let mut fc_lcb = vec![0u8; 93 * 8];
    fc_lcb[104..108].copy_from_slice(&plcf.0.to_le_bytes());
    fc_lcb[108..112].copy_from_slice(&plcf.1.to_le_bytes());
    fc_lcb[264..268].copy_from_slice(&clx.0.to_le_bytes());
    fc_lcb[268..272].copy_from_slice(&clx.1.to_le_bytes());
    data.extend(fc_lcb);
    data
}

const SECTOR: usize = 512;
const MINI_SECTOR: usize = 64;

/// Write a version 3 compound file holding `streams` under the root.
///
/// Streams shorter than `mini_cutoff` go to the mini stream. Sectors are
/// laid out as FAT, directory, MiniFAT, mini stream, then regular streams.
pub(crate) fn compound_file(streams: &[(&str, Vec<u8>)], mini_cutoff: u32) -> Vec<u8> {
    let is_mini = |data: &[u8]| !data.is_empty() && (data.len() as u64) < u64::from(mini_cutoff);

    // Mini stream and MiniFAT
    let mut ministream = Vec::new();
    let mut minifat: Vec<u32> = Vec::new();
    let mut mini_starts = Vec::new();
    for (_, data) in streams {
        if !is_mini(data) {
            mini_starts.push(None);
            continue;
        }
        let first = minifat.len() as u32;
        let count = data.len().div_ceil(MINI_SECTOR) as u32;
        minifat.extend((first + 1..first + count).chain([ENDOFCHAIN]));
        ministream.extend_from_slice(data);
        ministream.resize(minifat.len() * MINI_SECTOR, 0);
        mini_starts.push(Some(first));
    }

    let sectors_for = |len: usize| len.div_ceil(SECTOR);
    let dir_sectors = sectors_for((streams.len() + 1) * 128);
    let minifat_sectors = sectors_for(minifat.len() * 4);
    let ministream_sectors = sectors_for(ministream.len());
    let regular_sectors: usize = streams
        .iter()
        .filter(|(_, data)| !is_mini(data))
        .map(|(_, data)| sectors_for(data.len()))
        .sum();
    let payload = dir_sectors + minifat_sectors + ministream_sectors + regular_sectors;
    let mut fat_sectors = 1;
    while fat_sectors * (SECTOR / 4) < fat_sectors + payload {
        fat_sectors += 1;
    }
    assert!(fat_sectors <= 109, "fixture too large for the header DIFAT");

    let mut fat = vec![FREESECT; fat_sectors * (SECTOR / 4)];
    fat[..fat_sectors].fill(FATSECT);
    let mut next = fat_sectors as u32;
    let mut allocate = |fat: &mut Vec<u32>, count: usize| -> u32 {
        if count == 0 {
            return ENDOFCHAIN;
        }
        let first = next;
        let last = first + count as u32 - 1;
        for sector in first..last {
            fat[sector as usize] = sector + 1;
        }
        fat[last as usize] = ENDOFCHAIN;
        next = last + 1;
        first
    };
    let dir_start = allocate(&mut fat, dir_sectors);
    let minifat_start = allocate(&mut fat, minifat_sectors);
    let ministream_start = allocate(&mut fat, ministream_sectors);
    let starts: Vec<u32> = streams
        .iter()
        .zip(&mini_starts)
        .map(|((_, data), mini)| match mini {
            Some(first) => *first,
            None => allocate(&mut fat, sectors_for(data.len())),
        })
        .collect();

    // Header
    let mut file = vec![0u8; SECTOR];
    file[0..8].copy_from_slice(MAGIC);
    file[24..26].copy_from_slice(&0x003Eu16.to_le_bytes());
    file[26..28].copy_from_slice(&3u16.to_le_bytes());
    file[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
    file[30..32].copy_from_slice(&9u16.to_le_bytes());
    file[32..34].copy_from_slice(&6u16.to_le_bytes());
    file[44..48].copy_from_slice(&(fat_sectors as u32).to_le_bytes());
    file[48..52].copy_from_slice(&dir_start.to_le_bytes());
    file[56..60].copy_from_slice(&mini_cutoff.to_le_bytes());
    file[60..64].copy_from_slice(&minifat_start.to_le_bytes());
    file[64..68].copy_from_slice(&(minifat_sectors as u32).to_le_bytes());
    file[68..72].copy_from_slice(&ENDOFCHAIN.to_le_bytes());
    for i in 0..109 {
        let sector = if i < fat_sectors { i as u32 } else { FREESECT };
        file[76 + i * 4..80 + i * 4].copy_from_slice(&sector.to_le_bytes());
    }

    let fat_bytes: Vec<u8> = fat.iter().flat_map(|v| v.to_le_bytes()).collect();
    append(&mut file, &fat_bytes);

    let mut directory = dir_entry("Root Entry", 5, 1, ministream_start, ministream.len());
    for (i, ((name, data), start)) in streams.iter().zip(&starts).enumerate() {
        let mut entry = dir_entry(name, 2, NOSTREAM, *start, data.len());
        let right = if i + 1 < streams.len() { i as u32 + 2 } else { NOSTREAM };
        entry[72..76].copy_from_slice(&right.to_le_bytes());
        directory.extend(entry);
    }
    if streams.is_empty() {
        directory[76..80].copy_from_slice(&NOSTREAM.to_le_bytes());
    }
    append(&mut file, &directory);

    let minifat_bytes: Vec<u8> = minifat
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .chain(std::iter::repeat(0xFF))
        .take(minifat_sectors * SECTOR)
        .collect();
    append(&mut file, &minifat_bytes);
    append(&mut file, &ministream);
    for (_, data) in streams.iter().filter(|(_, data)| !is_mini(data)) {
        append(&mut file, data);
    }
    file
}

/// Append `bytes` padded to whole sectors.
fn append(file: &mut Vec<u8>, bytes: &[u8]) {
    file.extend_from_slice(bytes);
    file.resize(file.len().div_ceil(SECTOR) * SECTOR, 0);
}

fn dir_entry(name: &str, kind: u8, child: u32, start: u32, size: usize) -> Vec<u8> {
    let mut entry = vec![0u8; 128];
    let units: Vec<u16> = name.encode_utf16().collect();
    for (i, unit) in units.iter().enumerate() {
        entry[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    entry[64..66].copy_from_slice(&(((units.len() + 1) * 2) as u16).to_le_bytes());
    entry[66] = kind;
    entry[67] = 1;
    entry[68..72].copy_from_slice(&NOSTREAM.to_le_bytes());
    entry[72..76].copy_from_slice(&NOSTREAM.to_le_bytes());
    entry[76..80].copy_from_slice(&child.to_le_bytes());
    let start = if size == 0 && kind == 2 { ENDOFCHAIN } else { start };
    entry[116..120].copy_from_slice(&start.to_le_bytes());
    entry[120..128].copy_from_slice(&(size as u64).to_le_bytes());
    entry
}
