//! Text reconstruction.
//!
//! The extractor walks the piece table and the paragraph index together in
//! a single forward pass. Each paragraph's text is streamed straight from its
//! piece to the output, followed by a glyph for its mark. A paragraph whose
//! end lies beyond the current piece is bridged: the rest of the piece is
//! held for that paragraph and the walk moves on to the next piece until the
//! end falls inside one.
//!
//! The held text is the only buffer that grows with the document: it can
//! reach the bridged part of one paragraph, never more. It cannot be written
//! early because the paragraph's table flags, and so the table marker that
//! must come before its text, are only known once its end is found. It is
//! cleared after every paragraph.

use super::glyphs::{CELL_MARK, TABLE_TERMINATOR, boundary_glyph, table_transition};
use super::package::{DocError, Result};
use super::parts::paragraphs::{ParagraphCursor, ParagraphEnd};
use super::parts::pap_bin_table::PapBinTable;
use super::parts::piece_table::{Piece, PieceTable};
use super::streams::DocStreams;
use crate::ole::StreamSource;
use std::io::Write;
use tracing::{debug, info, trace};

/// Name of the main document stream
pub const WORD_DOCUMENT_STREAM: &str = "WordDocument";
/// Name of the stream holding oversized property lists
pub const DATA_STREAM: &str = "Data";

/// Options for text extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Append the container's non-fatal issues after the text
    pub container_diagnostics: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            container_diagnostics: true,
        }
    }
}

impl ExtractOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the trailing container diagnostics.
    pub fn with_container_diagnostics(mut self, enabled: bool) -> Self {
        self.container_diagnostics = enabled;
        self
    }
}

/// Counts gathered during one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Pieces visited
    pub pieces: u32,
    /// Paragraphs written
    pub paragraphs: u64,
    /// Table regions opened
    pub tables: u64,
    /// Characters decoded, paragraph marks included
    pub chars: u64,
}

/// Where the walk stands between two steps.
#[derive(Debug)]
enum State {
    /// The next paragraph end has to be pulled from the cursor
    AwaitingParagraph { bridged_chars: u64 },
    /// The paragraph continues past the current piece
    BridgingPieces { bridged_chars: u64 },
    /// The paragraph ends `relative` bytes into the current piece
    EmittingText {
        end: ParagraphEnd,
        relative: u32,
        bridged_chars: u64,
    },
    Done,
}

/// One-shot decoder from a container to marked-up text.
pub struct Extractor<'c, C: StreamSource> {
    streams: DocStreams<'c, C>,
    pieces: PieceTable,
    bins: PapBinTable,
    options: ExtractOptions,
}

impl<'c, C: StreamSource> Extractor<'c, C> {
    /// Read the FIB and the headers of the piece table and paragraph index.
    pub fn new(container: &'c mut C, options: ExtractOptions) -> Result<Self> {
        let (mut streams, fib) = DocStreams::open(container)?;
        debug!(
            nfib = fib.version(),
            lid = fib.language_id(),
            "reading Word document"
        );
        let pieces = PieceTable::parse(&mut streams.table, fib.clx())?;
        let bins = PapBinTable::parse(&mut streams.table, fib.plcf_bte_papx())?;
        Ok(Self {
            streams,
            pieces,
            bins,
            options,
        })
    }

    /// Write the document to `out`.
    ///
    /// Output is produced paragraph by paragraph; on error, whatever was
    /// written so far stays written.
    pub fn run<W: Write + ?Sized>(mut self, out: &mut W) -> Result<ExtractSummary> {
        if self.pieces.is_empty() {
            return Err(DocError::format("piece table is empty"));
        }

        let mut summary = ExtractSummary::default();
        let mut piece = self.pieces.piece(&mut self.streams.table, 0)?;
        summary.pieces = 1;
        let mut cursor = self.seed(&piece)?.ok_or_else(|| {
            DocError::Format(format!(
                "first piece at offset {} has no paragraph information",
                piece.byte_offset()
            ))
        })?;

        // Bridged text of the current paragraph only
        let mut bridged = String::new();
        let mut in_table = false;
        let mut state = State::AwaitingParagraph { bridged_chars: 0 };

        loop {
            state = match state {
                State::AwaitingParagraph { bridged_chars } => {
                    let end = self.next_paragraph(&mut cursor, &piece)?;
                    let relative = end.fc.checked_sub(piece.byte_offset()).ok_or_else(|| {
                        DocError::Format(format!(
                            "paragraph end {} precedes piece {} position {}",
                            end.fc,
                            piece.index(),
                            piece.byte_offset()
                        ))
                    })?;
                    if relative > piece.bytes_remaining() {
                        State::BridgingPieces { bridged_chars }
                    } else {
                        State::EmittingText {
                            end,
                            relative,
                            bridged_chars,
                        }
                    }
                },

                State::BridgingPieces { mut bridged_chars } => {
                    bridged_chars += u64::from(piece.bytes_remaining() / piece.unit());
                    piece
                        .reader(&mut self.streams.word, None)?
                        .append_to(&mut bridged)?;

                    piece = self.advance(&piece).ok_or_else(|| {
                        DocError::Format(format!(
                            "paragraph runs past the last piece ({})",
                            piece.index()
                        ))
                    })??;
                    summary.pieces += 1;

                    match self.seed(&piece)? {
                        Some(next) => {
                            cursor = next;
                            State::AwaitingParagraph { bridged_chars }
                        },
                        None => State::BridgingPieces { bridged_chars },
                    }
                },

                State::EmittingText {
                    end,
                    relative,
                    bridged_chars,
                } => {
                    let unit = piece.unit();
                    if relative % unit != 0 {
                        return Err(DocError::Format(format!(
                            "paragraph end {} splits a character of piece {}",
                            end.fc,
                            piece.index()
                        )));
                    }

                    if let Some(marker) = table_transition(in_table, end.flags.in_table) {
                        write!(out, "{}", marker)?;
                        if end.flags.in_table {
                            summary.tables += 1;
                        }
                    }

                    let glyph = if end.flags.is_table_terminator {
                        if bridged_chars != 0 || relative != unit {
                            return Err(DocError::Format(format!(
                                "table terminator row ending at {} is not a single character",
                                end.fc
                            )));
                        }
                        let mark = piece
                            .reader(&mut self.streams.word, Some(relative))?
                            .read_to_string()?;
                        if mark.chars().ne(std::iter::once(CELL_MARK)) {
                            return Err(DocError::Format(format!(
                                "table terminator row holds {:?} instead of a cell mark",
                                mark
                            )));
                        }
                        TABLE_TERMINATOR
                    } else {
                        if relative == 0 {
                            return Err(DocError::Format(format!(
                                "empty paragraph ending at {}",
                                end.fc
                            )));
                        }
                        out.write_all(bridged.as_bytes())?;
                        piece
                            .reader(&mut self.streams.word, Some(relative - unit))?
                            .write_to(out)?;
                        let mark = piece
                            .reader(&mut self.streams.word, Some(unit))?
                            .read_to_string()?;
                        boundary_glyph(&mark).ok_or_else(|| {
                            DocError::Format(format!(
                                "unexpected paragraph mark {:?} at {}",
                                mark,
                                end.fc - unit
                            ))
                        })?
                    };
                    writeln!(out, "{}", glyph)?;

                    trace!(
                        end = end.fc,
                        in_table = end.flags.in_table,
                        terminator = end.flags.is_table_terminator,
                        bridged_chars,
                        "paragraph"
                    );
                    in_table = end.flags.in_table;
                    bridged.clear();
                    summary.paragraphs += 1;
                    summary.chars += bridged_chars + u64::from(relative / unit);

                    if !piece.is_exhausted() {
                        State::AwaitingParagraph { bridged_chars: 0 }
                    } else {
                        match self.advance(&piece) {
                            None => State::Done,
                            Some(next) => {
                                piece = next?;
                                summary.pieces += 1;
                                match self.seed(&piece)? {
                                    Some(next) => {
                                        cursor = next;
                                        State::AwaitingParagraph { bridged_chars: 0 }
                                    },
                                    None => State::BridgingPieces { bridged_chars: 0 },
                                }
                            },
                        }
                    }
                },

                State::Done => break,
            };
        }

        if in_table {
            return Err(DocError::format("document ends inside a table"));
        }

        if self.options.container_diagnostics {
            for issue in self.streams.data.container().issues() {
                writeln!(out, "{}", issue)?;
            }
        }
        out.flush()?;

        info!(
            pieces = summary.pieces,
            paragraphs = summary.paragraphs,
            tables = summary.tables,
            chars = summary.chars,
            data_stream = self.streams.data.is_open(),
            "extracted document text"
        );
        Ok(summary)
    }

    /// Paragraph cursor at the first paragraph ending inside `piece`.
    fn seed(&mut self, piece: &Piece) -> Result<Option<ParagraphCursor>> {
        let cursor = self.bins.paragraphs_after(
            &mut self.streams.table,
            &mut self.streams.word,
            piece.byte_offset(),
        )?;
        if cursor.is_none() {
            debug!(
                piece = piece.index(),
                offset = piece.byte_offset(),
                "piece has no paragraph information"
            );
        }
        Ok(cursor)
    }

    /// The piece after `piece`, `None` after the last one.
    fn advance(&mut self, piece: &Piece) -> Option<Result<Piece>> {
        let next = piece.index() + 1;
        (next < self.pieces.len()).then(|| self.pieces.piece(&mut self.streams.table, next))
    }

    fn next_paragraph(&mut self, cursor: &mut ParagraphCursor, piece: &Piece) -> Result<ParagraphEnd> {
        cursor
            .next_paragraph(
                &mut self.streams.table,
                &mut self.streams.word,
                &mut self.streams.data,
            )?
            .ok_or_else(|| {
                DocError::Format(format!(
                    "paragraph index ends inside piece {} ({} bytes left)",
                    piece.index(),
                    piece.bytes_remaining()
                ))
            })
    }
}
