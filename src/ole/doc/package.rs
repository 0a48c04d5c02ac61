//! Package implementation for legacy Word documents (.doc).

use super::super::{ContainerIssue, OleError, OleFile, StreamSource};
use super::extractor::{ExtractOptions, ExtractSummary, Extractor, WORD_DOCUMENT_STREAM};
use crate::common::BinaryError;
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::Path;
use thiserror::Error;

/// Error types for DOC file decoding.
#[derive(Error, Debug)]
pub enum DocError {
    /// The container could not open, read or seek a stream
    #[error("Container error: {0}")]
    Container(#[from] OleError),

    /// IO error on a decoded stream or the output
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A structural invariant of the document does not hold
    #[error("Invalid format: {0}")]
    Format(String),

    /// A bounded read could not be satisfied
    #[error("Truncated data: expected {expected} bytes, {available} available")]
    Truncated { expected: u64, available: u64 },
}

impl DocError {
    pub(crate) fn format(message: impl Into<String>) -> Self {
        DocError::Format(message.into())
    }

    /// Whether the document itself is malformed (as opposed to an I/O failure).
    pub fn is_format_error(&self) -> bool {
        matches!(self, DocError::Format(_) | DocError::Truncated { .. })
    }
}

impl From<BinaryError> for DocError {
    fn from(err: BinaryError) -> Self {
        match err {
            BinaryError::InsufficientData {
                expected,
                available,
            } => DocError::Truncated {
                expected: expected as u64,
                available: available as u64,
            },
            BinaryError::ParseError(message) => DocError::Format(message),
        }
    }
}

/// Result type for DOC operations.
pub type Result<T> = std::result::Result<T, DocError>;

/// A Word (.doc) package.
///
/// This is the main entry point for working with legacy Word documents.
/// It wraps an OLE file and reconstructs the document text from it.
///
/// # Examples
///
/// ```rust,no_run
/// use doctext::doc::{ExtractOptions, Package};
///
/// let mut pkg = Package::open("document.doc")?;
/// let stdout = std::io::stdout();
/// pkg.extract_to(&mut stdout.lock(), &ExtractOptions::default())?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Package<R: Read + Seek = File> {
    /// The underlying OLE file
    ole: OleFile<R>,
}

impl Package<File> {
    /// Open a .doc package from a file path.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the .doc file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Package::from_reader(file)
    }
}

impl<R: Read + Seek> Package<R> {
    /// Create a Package from any reader that implements Read + Seek.
    ///
    /// # Arguments
    ///
    /// * `reader` - A reader containing the .doc file data
    pub fn from_reader(reader: R) -> Result<Self> {
        let ole = OleFile::open(reader)?;
        Package::from_ole_file(ole)
    }

    /// Create a Package from an already-parsed OLE file.
    pub fn from_ole_file(ole: OleFile<R>) -> Result<Self> {
        // Verify it's a Word document by checking for the WordDocument stream
        if !ole.exists(WORD_DOCUMENT_STREAM) {
            return Err(DocError::Format(
                "Not a valid Word document: WordDocument stream not found".to_string(),
            ));
        }

        Ok(Self { ole })
    }

    /// Stream the marked-up document text into `out`.
    ///
    /// Container anomalies are appended after the text when
    /// [`ExtractOptions::container_diagnostics`] is set.
    pub fn extract_to<W: Write>(
        &mut self,
        out: &mut W,
        options: &ExtractOptions,
    ) -> Result<ExtractSummary> {
        Extractor::new(&mut self.ole, options.clone())?.run(out)
    }

    /// Decode the whole document into a string.
    pub fn extract_text(&mut self, options: &ExtractOptions) -> Result<String> {
        let mut buffer = Vec::new();
        self.extract_to(&mut buffer, options)?;
        String::from_utf8(buffer)
            .map_err(|e| DocError::Format(format!("decoded text is not UTF-8: {}", e)))
    }

    /// Non-fatal anomalies reported by the container so far.
    pub fn container_issues(&self) -> &[ContainerIssue] {
        StreamSource::issues(&self.ole)
    }

    /// Get the underlying OLE file.
    pub fn ole_file(&self) -> &OleFile<R> {
        &self.ole
    }
}
