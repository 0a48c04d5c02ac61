//! doctext - plain text with paragraph and table markup from legacy Word files
//!
//! This library reconstructs the text of Word 97-2003 binary documents
//! (.doc) in one forward pass, without loading the document into memory.
//! Paragraph marks, page breaks and table structure are written as glyphs.
//!
//! # Features
//!
//! - **OLE2 Parser**: Streaming access to the named streams of a compound file
//! - **DOC Reader**: Piece table, paragraph index and property decoding
//! - **Diagnostics**: Non-fatal container anomalies are collected and reported
//!
//! # Example - Reading a DOC file
//!
//! ```no_run
//! use doctext::doc::{ExtractOptions, Package};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pkg = Package::open("document.doc")?;
//!
//! // Stream the marked-up text to stdout
//! let stdout = std::io::stdout();
//! let summary = pkg.extract_to(&mut stdout.lock(), &ExtractOptions::default())?;
//! eprintln!("{} paragraphs", summary.paragraphs);
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Low-level OLE access
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::Read;
//! use doctext::ole::OleFile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::open("document.doc")?;
//! let mut ole = OleFile::open(file)?;
//!
//! // List all streams
//! for stream in ole.list_streams() {
//!     println!("Stream: {}", stream);
//! }
//!
//! // Read a specific stream
//! let mut data = Vec::new();
//! ole.open_stream("WordDocument")?.read_to_end(&mut data)?;
//! println!("Stream size: {} bytes", data.len());
//! # Ok(())
//! # }
//! ```

/// Shared low-level helpers
pub mod common;

/// OLE2 (Object Linking and Embedding) file format parser
///
/// This module provides functionality to parse OLE2 structured storage files,
/// which are used by legacy Microsoft Office formats.
///
/// The `ole` module also contains the `doc` submodule for legacy Word
/// documents, since .doc files are OLE2-based.
pub mod ole;

// Re-export commonly used types for convenience
pub use ole::doc;
pub use ole::doc::{DocError, ExtractOptions, ExtractSummary, Package};
pub use ole::{ContainerIssue, IssueKind, OleError, OleFile, StreamSource};
