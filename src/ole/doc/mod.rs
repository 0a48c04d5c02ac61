/// Word (.doc) text reconstruction.
///
/// This module reconstructs paragraph-structured text from Microsoft Word
/// documents in the legacy binary format (.doc files, Word 97 and later),
/// which uses OLE2 structured storage.
///
/// # Architecture
///
/// - `Package`: the .doc file package (OLE container)
/// - `Extractor`: one streaming pass from the container to marked-up text
/// - `parts`: the binary structures the pass reads
///
/// # DOC File Structure
///
/// A .doc file is an OLE2 structured storage containing several streams:
/// - **WordDocument**: Main document stream containing the FIB, the text and
///   the paragraph property pages
/// - **1Table** or **0Table**: Piece table and paragraph bin table
/// - **Data**: Oversized paragraph property lists, among other things
///
/// # Output
///
/// Paragraph marks become `¶` (paragraph end), `§` (page break) or `¤`
/// (cell or row end), each followed by a newline. A table terminator row
/// is written as `╜`. `╤` opens and `╚` closes a run of table paragraphs.
///
/// # Example
///
/// ```rust,no_run
/// use doctext::doc::{ExtractOptions, Package};
///
/// let mut package = Package::open("document.doc")?;
/// let text = package.extract_text(&ExtractOptions::default())?;
/// print!("{}", text);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
mod extractor;
pub mod glyphs;
mod package;
pub mod parts;
mod streams;
mod subfile;

#[cfg(test)]
mod fixture;

pub use extractor::{DATA_STREAM, ExtractOptions, ExtractSummary, Extractor, WORD_DOCUMENT_STREAM};
pub use package::{DocError, Package, Result};
pub use streams::{DataStream, DocStreams};
pub use subfile::Subfile;
