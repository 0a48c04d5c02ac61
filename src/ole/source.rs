//! The boundary between the document decoder and its container.
//!
//! The decoder only ever asks for named streams and, at the end of a run, for
//! the list of non-fatal anomalies the container noticed while opening them.

use super::file::OleError;
use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read, Seek};

/// Category of a non-fatal container anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    /// Header version fields hold values no known writer produces
    UnexpectedVersion,
    /// Layout parameters differ from the standard ones but remain usable
    NonStandardLayout,
    /// Directory tree references entries that do not exist or repeat
    BrokenDirectory,
    /// A sector chain holds fewer bytes than its stream declares
    TruncatedChain,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::UnexpectedVersion => "UnexpectedVersion",
            IssueKind::NonStandardLayout => "NonStandardLayout",
            IssueKind::BrokenDirectory => "BrokenDirectory",
            IssueKind::TruncatedChain => "TruncatedChain",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structural anomaly that did not stop the container from being read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerIssue {
    pub kind: IssueKind,
    pub message: String,
}

impl ContainerIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ContainerIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Anything that can hand out named, seekable sub-streams.
pub trait StreamSource {
    /// Stream type handed out by this source
    type Stream: Read + Seek;

    /// Open a top-level stream by name.
    fn open_stream(&mut self, name: &str) -> Result<Self::Stream, OleError>;

    /// Non-fatal anomalies collected so far.
    fn issues(&self) -> &[ContainerIssue] {
        &[]
    }
}

/// A container whose streams are already in memory.
///
/// Useful when the streams were extracted by other means, and as a fixture.
#[derive(Debug, Clone, Default)]
pub struct MemoryContainer {
    streams: HashMap<String, Vec<u8>>,
    issues: Vec<ContainerIssue>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a stream.
    pub fn insert(&mut self, name: impl Into<String>, data: Vec<u8>) -> &mut Self {
        self.streams.insert(name.into(), data);
        self
    }

    /// Record an anomaly to be reported alongside the decoded text.
    pub fn push_issue(&mut self, issue: ContainerIssue) -> &mut Self {
        self.issues.push(issue);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.streams.contains_key(name)
    }
}

impl StreamSource for MemoryContainer {
    type Stream = Cursor<Vec<u8>>;

    fn open_stream(&mut self, name: &str) -> Result<Self::Stream, OleError> {
        self.streams
            .get(name)
            .map(|data| Cursor::new(data.clone()))
            .ok_or_else(|| OleError::StreamNotFound(name.to_string()))
    }

    fn issues(&self) -> &[ContainerIssue] {
        &self.issues
    }
}
