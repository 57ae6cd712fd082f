//! Peek-then-replay readers.
//!
//! Thin convenience wrapper around standard library I/O primitives
//! ([`Read::take`], [`Cursor`], [`Chain`]) for sniffing a stream's head
//! without losing it.

use crate::Compression;
use crate::construct::MAGIC_LEN;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::{Chain, Cursor, Read};

/// A resumable [`Read`]er for peek-decide-stream workflows.
///
/// Read enough (decompressed) data to inspect, e.g. the 132 bytes needed to
/// find a DICOM `DICM` marker, then hand the whole stream onward via
/// [`into_reader`](Self::into_reader) or [`skip_head`](Self::skip_head).
pub struct PeekableReader<R> {
    inner: R,
    buffer: Vec<u8>,
}

impl<R: Read> PeekableReader<R> {
    /// Wrap any reader for peeking.
    pub fn new(inner: R) -> Self {
        Self { inner, buffer: Vec::new() }
    }

    /// Read up to `limit` bytes of content.
    ///
    /// Successive calls do not accumulate: `peek(8)` followed by `peek(4)`
    /// returns the first 4 bytes without reading anything.
    pub fn peek(&mut self, limit: usize) -> Result<&[u8]> {
        if self.buffer.len() >= limit {
            return Ok(&self.buffer[..limit]);
        }
        let needed = (limit - self.buffer.len()) as u64;
        (&mut self.inner).take(needed).read_to_end(&mut self.buffer).or_raise(|| ErrorKind::InvalidData)?;
        Ok(&self.buffer[..self.buffer.len().min(limit)])
    }

    /// Replay the buffered head, then stream the rest.
    pub fn into_reader(self) -> Chain<Cursor<Vec<u8>>, R> {
        Cursor::new(self.buffer).chain(self.inner)
    }

    /// Drop the first `count` buffered bytes and stream everything after them.
    ///
    /// Used to step over a fixed-size preamble that was only needed for
    /// detection.
    pub fn skip_head(mut self, count: usize) -> Chain<Cursor<Vec<u8>>, R> {
        let count = count.min(self.buffer.len());
        self.buffer.drain(..count);
        self.into_reader()
    }
}

impl Compression {
    /// Detect the stream's codec from its magic bytes and decompress it.
    ///
    /// Uncompressed input is passed through with its head replayed, so the
    /// result always reads as the plain content.
    ///
    /// # Example
    ///
    /// ```
    /// use hoist_compress::Compression;
    /// use std::io::Read;
    ///
    /// let mut reader = Compression::sniff_reader(&b"DICM"[..]).unwrap();
    /// let mut plain = Vec::new();
    /// reader.read_to_end(&mut plain).unwrap();
    /// assert_eq!(plain, b"DICM");
    /// ```
    pub fn sniff_reader<'a, R: Read + Send + 'a>(reader: R) -> Result<Box<dyn Read + Send + 'a>> {
        let mut peekable = PeekableReader::new(reader);
        let format = Compression::from_magic_bytes(peekable.peek(MAGIC_LEN)?);
        format.wrap_reader(peekable.into_reader())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::encode;
    use rstest::rstest;

    fn preambled() -> Vec<u8> {
        let mut data = vec![0u8; 128];
        data.extend_from_slice(b"DICM");
        data.extend_from_slice(b"rest of the file");
        data
    }

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Gzip)]
    #[case(Compression::Bzip2)]
    fn test_peek_then_replay(#[case] format: Compression) {
        let original = preambled();
        let decoded = format.wrap_reader(Cursor::new(encode(format, &original))).unwrap();
        let mut peekable = PeekableReader::new(decoded);
        assert_eq!(&peekable.peek(132).unwrap()[128..], b"DICM");
        let mut output = Vec::new();
        std::io::copy(&mut peekable.into_reader(), &mut output).unwrap();
        assert_eq!(output, original);
    }

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Gzip)]
    #[case(Compression::Bzip2)]
    fn test_sniff_reader_detects_codec(#[case] format: Compression) {
        let original = preambled();
        let mut output = Vec::new();
        Compression::sniff_reader(Cursor::new(encode(format, &original)))
            .unwrap()
            .read_to_end(&mut output)
            .unwrap();
        assert_eq!(output, original);
    }

    #[test]
    fn test_skip_head() {
        let mut peekable = PeekableReader::new(Cursor::new(preambled()));
        peekable.peek(132).unwrap();
        let mut output = Vec::new();
        peekable.skip_head(128).read_to_end(&mut output).unwrap();
        assert!(output.starts_with(b"DICMrest"));
    }

    #[test]
    fn test_peek_short_stream() {
        let mut peekable = PeekableReader::new(Cursor::new(b"tiny".to_vec()));
        assert_eq!(peekable.peek(132).unwrap(), b"tiny");
        assert_eq!(peekable.peek(2).unwrap(), b"ti");
        let mut output = Vec::new();
        peekable.into_reader().read_to_end(&mut output).unwrap();
        assert_eq!(output, b"tiny");
    }
}
