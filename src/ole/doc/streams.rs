//! The container streams one decode run works on.

use super::extractor::{DATA_STREAM, WORD_DOCUMENT_STREAM};
use super::package::Result;
use super::parts::fib::FileInformationBlock;
use super::parts::pap::OverflowSource;
use crate::ole::StreamSource;
use tracing::debug;

/// WordDocument and table streams, plus the Data stream on demand.
///
/// The fields are separate so the main and table streams can be borrowed
/// alongside the overflow source.
pub struct DocStreams<'c, C: StreamSource> {
    pub word: C::Stream,
    pub table: C::Stream,
    pub data: DataStream<'c, C>,
}

impl<'c, C: StreamSource> DocStreams<'c, C> {
    /// Open the WordDocument stream, read its FIB and open the table stream
    /// the FIB selects.
    pub fn open(container: &'c mut C) -> Result<(Self, FileInformationBlock)> {
        let mut word = container.open_stream(WORD_DOCUMENT_STREAM)?;
        let fib = FileInformationBlock::read(&mut word)?;
        let table = container.open_stream(fib.table_stream_name())?;
        debug!(table = fib.table_stream_name(), "opened document streams");
        Ok((
            Self {
                word,
                table,
                data: DataStream::new(container),
            },
            fib,
        ))
    }
}

/// Lazily opened Data stream holding oversized property lists.
pub struct DataStream<'c, C: StreamSource> {
    container: &'c mut C,
    stream: Option<C::Stream>,
}

impl<'c, C: StreamSource> DataStream<'c, C> {
    pub fn new(container: &'c mut C) -> Self {
        Self {
            container,
            stream: None,
        }
    }

    /// Whether the stream has been needed so far.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// The container, for its diagnostics.
    #[inline]
    pub fn container(&self) -> &C {
        &*self.container
    }
}

impl<C: StreamSource> OverflowSource for DataStream<'_, C> {
    type Stream = C::Stream;

    fn overflow_stream(&mut self) -> Result<&mut Self::Stream> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                debug!("opening {} stream", DATA_STREAM);
                self.container.open_stream(DATA_STREAM)?
            },
        };
        Ok(self.stream.insert(stream))
    }
}
