/// Constants for OLE file format
pub mod consts;

/// Main OLE file parsing implementation
mod file;

/// Streaming views of individual OLE streams
mod stream;

/// Container boundary used by the document decoder
pub mod source;

/// Shared SPRM (property modifier) opcode layout
pub mod sprm;

/// Legacy Word document (.doc) text reconstruction
///
/// This module reconstructs paragraph-structured text from Microsoft Word
/// documents in the legacy binary format (.doc files), which are OLE2-based.
pub mod doc;

// Re-export public types for convenient access
pub use file::{DirectoryEntry, OleError, OleFile, is_ole_file};
pub use source::{ContainerIssue, IssueKind, MemoryContainer, StreamSource};
pub use stream::OleStream;
