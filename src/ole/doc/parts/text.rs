//! Decoding of text runs.
//!
//! A piece stores its characters either "compressed" (one Windows-1252 byte
//! per character) or as UTF-16LE. [`PieceReader`] streams a byte range of one
//! piece through an `encoding_rs` decoder in fixed-size chunks, so only one
//! chunk of text is ever resident.

use super::super::package::{DocError, Result};
use super::super::subfile::Subfile;
use encoding_rs::{Decoder, DecoderResult, Encoding, UTF_16LE, WINDOWS_1252};
use std::io::{Read, Seek, Write};

/// Raw bytes per decode step; a multiple of every unit width.
const CHUNK_SIZE: usize = 4096;

/// Bytes that never appear in compressed text of this format generation.
const RESERVED_COMPRESSED: [u8; 3] = [0x80, 0x8E, 0x9E];

/// Bytes Windows-1252 leaves undefined.
const UNDEFINED_COMPRESSED: [u8; 5] = [0x81, 0x8D, 0x8F, 0x90, 0x9D];

/// How a piece stores its characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// One Windows-1252 byte per character
    Compressed,
    /// Two UTF-16LE bytes per character
    Utf16,
}

impl TextEncoding {
    /// Bytes per character.
    #[inline]
    pub fn unit(self) -> u32 {
        match self {
            TextEncoding::Compressed => 1,
            TextEncoding::Utf16 => 2,
        }
    }

    #[inline]
    pub fn encoding(self) -> &'static Encoding {
        match self {
            TextEncoding::Compressed => WINDOWS_1252,
            TextEncoding::Utf16 => UTF_16LE,
        }
    }

    /// Reject raw bytes that cannot belong to text in this encoding.
    fn check(self, raw: &[u8]) -> Result<()> {
        if self == TextEncoding::Compressed {
            let [a, b, c] = RESERVED_COMPRESSED;
            if let Some(index) = memchr::memchr3(a, b, c, raw) {
                return Err(DocError::Format(format!(
                    "reserved byte 0x{:02X} in single-byte text",
                    raw[index]
                )));
            }
            let [a, b, c, d, e] = UNDEFINED_COMPRESSED;
            let undefined = [memchr::memchr3(a, b, c, raw), memchr::memchr2(d, e, raw)];
            if let Some(index) = undefined.into_iter().flatten().min() {
                return Err(DocError::Format(format!(
                    "byte 0x{:02X} is undefined in Windows-1252",
                    raw[index]
                )));
            }
        }
        Ok(())
    }
}

/// Streams decoded characters from a byte range of one piece.
pub struct PieceReader<'a, R> {
    window: Subfile<&'a mut R>,
    encoding: TextEncoding,
    decoder: Decoder,
}

impl<'a, R: Read + Seek> PieceReader<'a, R> {
    pub(crate) fn new(window: Subfile<&'a mut R>, encoding: TextEncoding) -> Self {
        Self {
            window,
            encoding,
            decoder: encoding.encoding().new_decoder_without_bom_handling(),
        }
    }

    /// Bytes not yet decoded.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.window.remaining()
    }

    /// Decode everything and write it to `out` as UTF-8.
    pub fn write_to<W: Write + ?Sized>(self, out: &mut W) -> Result<()> {
        self.drain(|text| out.write_all(text.as_bytes()).map_err(DocError::from))
    }

    /// Decode everything and append it to `buffer`.
    pub fn append_to(self, buffer: &mut String) -> Result<()> {
        self.drain(|text| {
            buffer.push_str(text);
            Ok(())
        })
    }

    /// Decode everything into a new string.
    pub fn read_to_string(self) -> Result<String> {
        let mut text = String::new();
        self.append_to(&mut text)?;
        Ok(text)
    }

    fn drain(mut self, mut sink: impl FnMut(&str) -> Result<()>) -> Result<()> {
        let mut raw = [0u8; CHUNK_SIZE];
        let mut text = String::new();
        loop {
            let want = self.window.remaining().min(CHUNK_SIZE as u64) as usize;
            let last = want as u64 == self.window.remaining();
            self.window.read_exact_into(&mut raw[..want])?;
            self.encoding.check(&raw[..want])?;

            text.clear();
            decode_into(&mut self.decoder, &raw[..want], &mut text, last)?;
            if !text.is_empty() {
                sink(&text)?;
            }
            if last {
                return Ok(());
            }
        }
    }
}

/// Decode `src` into `dst`, failing on the first malformed sequence.
fn decode_into(decoder: &mut Decoder, mut src: &[u8], dst: &mut String, last: bool) -> Result<()> {
    loop {
        let needed = decoder
            .max_utf8_buffer_length_without_replacement(src.len())
            .unwrap_or(src.len() * 3 + 16);
        dst.reserve(needed);
        let (result, read) = decoder.decode_to_string_without_replacement(src, dst, last);
        src = &src[read..];
        match result {
            DecoderResult::InputEmpty => return Ok(()),
            DecoderResult::OutputFull => continue,
            DecoderResult::Malformed(length, _) => {
                return Err(DocError::Format(format!(
                    "malformed {} sequence of {} bytes",
                    decoder.encoding().name(),
                    length
                )));
            },
        }
    }
}
