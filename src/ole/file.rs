use super::consts::*;
use super::source::{ContainerIssue, IssueKind, StreamSource};
use super::stream::OleStream;
use fixedbitset::FixedBitSet;
use std::cell::RefCell;
use std::io::{self, Read, Seek, SeekFrom};
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};
use zerocopy::{FromBytes, LE, U16, U32, U64};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// Raw compound file header (512 bytes)
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawHeader {
    magic: [u8; 8],
    clsid: [u8; 16],
    minor_version: U16<LE>,
    dll_version: U16<LE>,
    byte_order: U16<LE>,
    sector_shift: U16<LE>,
    mini_sector_shift: U16<LE>,
    reserved: [u8; 6],
    num_dir_sectors: U32<LE>,
    num_fat_sectors: U32<LE>,
    first_dir_sector: U32<LE>,
    transaction_signature: U32<LE>,
    mini_stream_cutoff: U32<LE>,
    first_minifat_sector: U32<LE>,
    num_minifat_sectors: U32<LE>,
    first_difat_sector: U32<LE>,
    num_difat_sectors: U32<LE>,
    /// First 109 FAT sector ids
    difat: [U32<LE>; HEADER_DIFAT_ENTRIES],
}

/// Raw OLE directory entry structure (128 bytes)
///
/// This represents the on-disk format of a directory entry.
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawDirectoryEntry {
    /// Entry name in UTF-16LE (64 bytes, null-padded)
    name: [u8; 64],
    /// Length of name in bytes (including null terminator)
    name_len: U16<LE>,
    /// Entry type (1 = storage, 2 = stream, 5 = root)
    entry_type: u8,
    /// Node color (0 = red, 1 = black)
    node_color: u8,
    /// Left sibling SID
    sid_left: U32<LE>,
    /// Right sibling SID
    sid_right: U32<LE>,
    /// Child SID
    sid_child: U32<LE>,
    /// CLSID (16 bytes)
    clsid: [u8; 16],
    /// State bits
    state_bits: U32<LE>,
    /// Creation time (FILETIME)
    creation_time: U64<LE>,
    /// Modified time (FILETIME)
    modified_time: U64<LE>,
    /// Starting sector
    start_sector: U32<LE>,
    /// Stream size
    stream_size: U64<LE>,
}

/// Represents an OLE directory entry (stream or storage)
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// Storage ID (index in directory)
    pub sid: u32,
    /// Entry name (UTF-16 decoded to UTF-8)
    pub name: String,
    /// Entry type (stream, storage, root, etc.)
    pub entry_type: u8,
    /// Index of left sibling in red-black tree
    pub sid_left: u32,
    /// Index of right sibling in red-black tree
    pub sid_right: u32,
    /// Index of child node in red-black tree
    pub sid_child: u32,
    /// First sector of the stream
    pub start_sector: u32,
    /// Size of the stream in bytes
    pub size: u64,
    /// Whether this stream is in MiniFAT
    pub is_minifat: bool,
}

/// Error types for OLE file parsing
#[derive(Error, Debug)]
pub enum OleError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Missing or wrong signature
    #[error("Not an OLE file")]
    NotOleFile,

    /// Header values the reader cannot work with
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Allocation tables or directory are inconsistent
    #[error("Corrupted file: {0}")]
    CorruptedFile(String),

    /// No top-level entry with the requested name
    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    /// The entry exists but is a storage
    #[error("Not a stream: {0}")]
    NotAStream(String),
}

/// Main OLE file parser structure
///
/// This struct represents an OLE2 structured storage file and hands out
/// streaming views of its top-level streams.
#[derive(Debug)]
pub struct OleFile<R: Read + Seek> {
    /// File handle shared with every open stream
    reader: Rc<RefCell<R>>,
    /// Total file size in bytes
    file_size: u64,
    /// Sector size (512 or 4096 bytes)
    sector_size: usize,
    /// Mini sector size (typically 64 bytes)
    mini_sector_size: usize,
    /// Mini stream cutoff size (typically 4096 bytes)
    mini_stream_cutoff: u32,
    /// File Allocation Table - maps sector to next sector in chain
    fat: Vec<u32>,
    /// Mini FAT - for streams smaller than cutoff size
    minifat: Vec<u32>,
    /// Root directory entry
    root: DirectoryEntry,
    /// Entries reachable from the root storage, in tree order
    children: Vec<DirectoryEntry>,
    /// Non-fatal anomalies noticed so far
    issues: Vec<ContainerIssue>,
}

impl<R: Read + Seek> OleFile<R> {
    /// Open and parse an OLE file from a reader
    ///
    /// # Arguments
    /// * `reader` - A reader that implements Read + Seek
    ///
    /// # Returns
    /// * `Result<OleFile<R>, OleError>` - The parsed OLE file or an error
    pub fn open(mut reader: R) -> Result<Self, OleError> {
        // Get file size
        let file_size = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        // Check minimum size
        if file_size < MINIMAL_OLEFILE_SIZE as u64 {
            return Err(OleError::NotOleFile);
        }

        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;
        let header = RawHeader::read_from_bytes(&header_bytes[..])
            .map_err(|_| OleError::InvalidFormat("Failed to parse header".to_string()))?;

        if &header.magic != MAGIC {
            return Err(OleError::NotOleFile);
        }
        if header.byte_order.get() != BYTE_ORDER_LE {
            return Err(OleError::InvalidFormat("Invalid byte order".to_string()));
        }

        let mut issues = Vec::new();

        let sector_shift = header.sector_shift.get();
        let sector_size = match sector_shift {
            9 => SECTOR_SIZE_V3,
            12 => SECTOR_SIZE_V4,
            other => {
                return Err(OleError::InvalidFormat(format!(
                    "Unsupported sector shift {}",
                    other
                )));
            },
        };
        if header.mini_sector_shift.get() != MINI_SECTOR_SHIFT {
            return Err(OleError::InvalidFormat(format!(
                "Unsupported mini sector shift {}",
                header.mini_sector_shift.get()
            )));
        }
        let mini_sector_size = 1usize << MINI_SECTOR_SHIFT;

        let dll_version = header.dll_version.get();
        match dll_version {
            3 | 4 => {
                if (dll_version == 3) != (sector_size == SECTOR_SIZE_V3) {
                    issues.push(ContainerIssue::new(
                        IssueKind::NonStandardLayout,
                        format!(
                            "DLL version {} with {}-byte sectors",
                            dll_version, sector_size
                        ),
                    ));
                }
            },
            other => issues.push(ContainerIssue::new(
                IssueKind::UnexpectedVersion,
                format!("DLL version {}, expected 3 or 4", other),
            )),
        }
        if header.minor_version.get() != MINOR_VERSION {
            issues.push(ContainerIssue::new(
                IssueKind::UnexpectedVersion,
                format!(
                    "minor version 0x{:04X}, expected 0x{:04X}",
                    header.minor_version.get(),
                    MINOR_VERSION
                ),
            ));
        }

        let mini_stream_cutoff = header.mini_stream_cutoff.get();
        if mini_stream_cutoff != MINI_STREAM_CUTOFF {
            issues.push(ContainerIssue::new(
                IssueKind::NonStandardLayout,
                format!(
                    "mini stream cutoff is {} bytes, expected {}",
                    mini_stream_cutoff, MINI_STREAM_CUTOFF
                ),
            ));
        }

        let placeholder_root = DirectoryEntry {
            sid: 0,
            name: String::new(),
            entry_type: STGTY_ROOT,
            sid_left: NOSTREAM,
            sid_right: NOSTREAM,
            sid_child: NOSTREAM,
            start_sector: ENDOFCHAIN,
            size: 0,
            is_minifat: false,
        };

        let mut ole = OleFile {
            reader: Rc::new(RefCell::new(reader)),
            file_size,
            sector_size,
            mini_sector_size,
            mini_stream_cutoff,
            fat: Vec::new(),
            minifat: Vec::new(),
            root: placeholder_root,
            children: Vec::new(),
            issues,
        };

        // Load FAT (File Allocation Table)
        ole.load_fat(
            &header,
            header.first_difat_sector.get(),
            header.num_difat_sectors.get(),
        )?;

        // Load directory
        ole.load_directory(header.first_dir_sector.get())?;

        // Load MiniFAT if needed
        if header.num_minifat_sectors.get() > 0 {
            ole.load_minifat(header.first_minifat_sector.get())?;
        }

        for issue in &ole.issues {
            warn!(%issue, "container anomaly");
        }
        debug!(
            sector_size,
            fat_entries = ole.fat.len(),
            minifat_entries = ole.minifat.len(),
            streams = ole.children.len(),
            "opened OLE container"
        );

        Ok(ole)
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Non-fatal anomalies noticed while parsing the container and opening streams.
    pub fn issues(&self) -> &[ContainerIssue] {
        &self.issues
    }

    /// Load the File Allocation Table (FAT)
    ///
    /// The FAT maps each sector to the next sector in the chain.
    /// First 109 FAT sector indexes are stored in the header, additional
    /// indexes are stored in DIFAT sectors.
    fn load_fat(
        &mut self,
        header: &RawHeader,
        first_difat_sector: u32,
        num_difat_sectors: u32,
    ) -> Result<(), OleError> {
        let mut fat_sectors: Vec<u32> = header
            .difat
            .iter()
            .map(|v| v.get())
            .take_while(|&sector| sector != FREESECT && sector != ENDOFCHAIN)
            .collect();

        // Load additional FAT sectors from DIFAT if needed
        if num_difat_sectors > 0 {
            let mut difat_sector = first_difat_sector;
            let entries_per_sector = (self.sector_size / 4) - 1; // -1 for next DIFAT pointer

            for _ in 0..num_difat_sectors {
                if difat_sector == ENDOFCHAIN || difat_sector == FREESECT {
                    break;
                }
                let sector_data = self.read_sector(difat_sector)?;
                let entries = sector_ids(&sector_data);

                fat_sectors.extend(
                    entries[..entries_per_sector]
                        .iter()
                        .copied()
                        .take_while(|&sector| sector != FREESECT && sector != ENDOFCHAIN),
                );

                // Get next DIFAT sector
                difat_sector = entries[entries_per_sector];
            }
        }

        // Now read all FAT sectors and build the FAT table
        let entries_per_sector = self.sector_size / 4;
        self.fat.reserve(fat_sectors.len() * entries_per_sector);

        for &sector_id in &fat_sectors {
            let sector_data = self.read_sector(sector_id)?;
            self.fat.extend(sector_ids(&sector_data));
        }

        Ok(())
    }

    /// Load the Mini FAT (for small streams)
    fn load_minifat(&mut self, first_minifat_sector: u32) -> Result<(), OleError> {
        let chain = self.follow_chain(first_minifat_sector, false)?;
        for sector_id in chain {
            let sector_data = self.read_sector(sector_id)?;
            self.minifat.extend(sector_ids(&sector_data));
        }
        Ok(())
    }

    /// Load directory entries reachable from the root storage
    fn load_directory(&mut self, first_dir_sector: u32) -> Result<(), OleError> {
        let chain = self.follow_chain(first_dir_sector, false)?;
        let mut dir_data = Vec::with_capacity(chain.len() * self.sector_size);
        for sector_id in chain {
            dir_data.extend_from_slice(&self.read_sector(sector_id)?);
        }

        // Each directory entry is 128 bytes
        let num_entries = dir_data.len() / DIRENTRY_SIZE;
        if num_entries == 0 {
            return Err(OleError::CorruptedFile("Empty directory".to_string()));
        }

        self.root = self.parse_directory_entry(&dir_data[..DIRENTRY_SIZE], 0)?;
        if self.root.entry_type != STGTY_ROOT {
            return Err(OleError::CorruptedFile(
                "First directory entry is not the root storage".to_string(),
            ));
        }

        // Walk the root's red-black tree in order
        let mut visited = FixedBitSet::with_capacity(num_entries);
        visited.insert(0);
        let mut pending = vec![(self.root.sid_child, false)];
        let mut children = Vec::new();
        while let Some((sid, expanded)) = pending.pop() {
            if sid == NOSTREAM {
                continue;
            }
            if expanded {
                let offset = sid as usize * DIRENTRY_SIZE;
                let entry =
                    self.parse_directory_entry(&dir_data[offset..offset + DIRENTRY_SIZE], sid)?;
                pending.push((entry.sid_right, false));
                children.push(entry);
                continue;
            }
            if sid > MAXREGSID || sid as usize >= num_entries {
                self.issues.push(ContainerIssue::new(
                    IssueKind::BrokenDirectory,
                    format!("reference to missing directory entry {}", sid),
                ));
                continue;
            }
            if visited.put(sid as usize) {
                self.issues.push(ContainerIssue::new(
                    IssueKind::BrokenDirectory,
                    format!("directory entry {} is referenced more than once", sid),
                ));
                continue;
            }
            let offset = sid as usize * DIRENTRY_SIZE;
            let raw = RawDirectoryEntry::read_from_bytes(&dir_data[offset..offset + DIRENTRY_SIZE])
                .map_err(|_| {
                    OleError::InvalidFormat("Failed to parse directory entry".to_string())
                })?;
            pending.push((sid, true));
            pending.push((raw.sid_left.get(), false));
        }

        self.children = children;
        Ok(())
    }

    /// Parse a single directory entry from 128 bytes
    fn parse_directory_entry(&self, data: &[u8], sid: u32) -> Result<DirectoryEntry, OleError> {
        // Parse the raw directory entry
        let raw = RawDirectoryEntry::read_from_bytes(data)
            .map_err(|_| OleError::InvalidFormat("Failed to parse directory entry".to_string()))?;

        // Decode name from UTF-16LE
        let name_len = raw.name_len.get() as usize;
        let name_bytes = &raw.name[0..name_len.saturating_sub(2).min(64)];
        let name = decode_utf16le(name_bytes);

        // Handle size based on sector size (512-byte sectors only use low 32 bits)
        let size = if self.sector_size == SECTOR_SIZE_V3 {
            raw.stream_size.get() & 0xFFFFFFFF
        } else {
            raw.stream_size.get()
        };

        // Determine if stream should use MiniFAT
        let is_minifat = size < self.mini_stream_cutoff as u64 && raw.entry_type == STGTY_STREAM;

        Ok(DirectoryEntry {
            sid,
            name,
            entry_type: raw.entry_type,
            sid_left: raw.sid_left.get(),
            sid_right: raw.sid_right.get(),
            sid_child: raw.sid_child.get(),
            start_sector: raw.start_sector.get(),
            size,
            is_minifat,
        })
    }

    /// Read a single sector from the file
    fn read_sector(&self, sector_id: u32) -> Result<Vec<u8>, OleError> {
        if sector_id > MAXREGSECT {
            return Err(OleError::CorruptedFile(format!(
                "Special sector id 0x{:08X} used as data sector",
                sector_id
            )));
        }

        // Sector position in file: (sector_id + 1) * sector_size
        let position = ((sector_id as u64) + 1) * (self.sector_size as u64);
        if position + self.sector_size as u64 > self.file_size {
            return Err(OleError::CorruptedFile(format!(
                "Sector {} lies beyond the end of the file",
                sector_id
            )));
        }

        let mut reader = self.reader.borrow_mut();
        reader.seek(SeekFrom::Start(position))?;

        let mut buffer = vec![0u8; self.sector_size];
        reader.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Collect the sector ids of a chain in the FAT or MiniFAT
    fn follow_chain(&self, start_sector: u32, mini: bool) -> Result<Vec<u32>, OleError> {
        let table = if mini { &self.minifat } else { &self.fat };
        let mut chain = Vec::new();
        let mut sector = start_sector;

        while sector != ENDOFCHAIN {
            if sector as usize >= table.len() {
                return Err(OleError::CorruptedFile(format!(
                    "Invalid sector index {} in {}",
                    sector,
                    if mini { "MiniFAT" } else { "FAT" }
                )));
            }
            // A chain longer than the table can only be a cycle
            if chain.len() >= table.len() {
                return Err(OleError::CorruptedFile(
                    "Sector chain loops back on itself".to_string(),
                ));
            }
            chain.push(sector);
            sector = table[sector as usize];
        }

        Ok(chain)
    }

    /// Open the root entry's mini stream
    fn ministream(&self) -> Result<OleStream<R>, OleError> {
        let chain = self.follow_chain(self.root.start_sector, false)?;
        let capacity = (chain.len() * self.sector_size) as u64;
        Ok(OleStream::regular(
            Rc::clone(&self.reader),
            self.sector_size,
            chain,
            self.root.size.min(capacity),
        ))
    }

    /// List the names of all top-level streams
    pub fn list_streams(&self) -> Vec<String> {
        self.children
            .iter()
            .filter(|entry| entry.entry_type == STGTY_STREAM)
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Find a top-level entry by name (case-insensitive)
    fn find_entry(&self, name: &str) -> Option<&DirectoryEntry> {
        // Case-insensitive comparison
        let name = name.to_lowercase();
        self.children
            .iter()
            .find(|entry| entry.name.to_lowercase() == name)
    }

    /// Check if a top-level stream exists
    pub fn exists(&self, name: &str) -> bool {
        self.find_entry(name)
            .is_some_and(|entry| entry.entry_type == STGTY_STREAM)
    }

    /// Open a top-level stream for streaming reads
    pub fn open_stream(&mut self, name: &str) -> Result<OleStream<R>, OleError> {
        let entry = self
            .find_entry(name)
            .cloned()
            .ok_or_else(|| OleError::StreamNotFound(name.to_string()))?;

        // Ensure it's a stream
        if entry.entry_type != STGTY_STREAM {
            return Err(OleError::NotAStream(name.to_string()));
        }

        let (chain, unit) = if entry.size == 0 {
            (Vec::new(), self.sector_size)
        } else if entry.is_minifat {
            (
                self.follow_chain(entry.start_sector, true)?,
                self.mini_sector_size,
            )
        } else {
            (
                self.follow_chain(entry.start_sector, false)?,
                self.sector_size,
            )
        };

        let capacity = (chain.len() * unit) as u64;
        let mut size = entry.size;
        if capacity < size {
            let issue = ContainerIssue::new(
                IssueKind::TruncatedChain,
                format!(
                    "stream '{}' declares {} bytes but its sector chain holds {}",
                    entry.name, entry.size, capacity
                ),
            );
            warn!(%issue, "container anomaly");
            self.issues.push(issue);
            size = capacity;
        }

        debug!(
            stream = %entry.name,
            size,
            sectors = chain.len(),
            mini = entry.is_minifat,
            "opened stream"
        );

        if entry.is_minifat {
            let ministream = self.ministream()?;
            Ok(OleStream::mini(ministream, unit, chain, size))
        } else {
            Ok(OleStream::regular(
                Rc::clone(&self.reader),
                self.sector_size,
                chain,
                size,
            ))
        }
    }
}

impl<R: Read + Seek> StreamSource for OleFile<R> {
    type Stream = OleStream<R>;

    fn open_stream(&mut self, name: &str) -> Result<Self::Stream, OleError> {
        OleFile::open_stream(self, name)
    }

    fn issues(&self) -> &[ContainerIssue] {
        &self.issues
    }
}

/// Split a sector into its little-endian u32 entries
fn sector_ids(sector: &[u8]) -> Vec<u32> {
    sector
        .chunks_exact(4)
        .map(|chunk| {
            U32::<LE>::read_from_bytes(chunk)
                .map(|v| v.get())
                .unwrap_or(FREESECT)
        })
        .collect()
}

/// Decode UTF-16LE bytes to String
fn decode_utf16le(bytes: &[u8]) -> String {
    let utf16_chars: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|chunk| {
            U16::<LE>::read_from_bytes(chunk)
                .map(|v| v.get())
                .unwrap_or(0)
        })
        .collect();

    // Decode UTF-16 to String, replacing invalid sequences
    String::from_utf16_lossy(&utf16_chars)
        .trim_end_matches('\0')
        .to_string()
}

/// Check if a file/data is an OLE file by checking magic bytes
pub fn is_ole_file(data: &[u8]) -> bool {
    data.len() >= MINIMAL_OLEFILE_SIZE && &data[0..8] == MAGIC
}
