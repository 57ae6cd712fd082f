//! Compression Operations

use crate::Compression;
use crate::error::Result;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::io::Read;

impl Compression {
    /// Wrap a reader with the appropriate decompression layer.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::{Cursor, Read};
    /// use hoist_compress::Compression;
    ///
    /// let mut reader = Compression::None.wrap_reader(Cursor::new(b"Hello, world!")).unwrap();
    /// let mut plain = String::new();
    /// reader.read_to_string(&mut plain).unwrap();
    /// assert_eq!(plain, "Hello, world!");
    /// ```
    pub fn wrap_reader<'a, R: Read + Send + 'a>(&self, reader: R) -> Result<Box<dyn Read + Send + 'a>> {
        Ok(match self {
            Compression::None => Box::new(reader),
            Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
        })
    }
}

/// Encode `input` in memory, for building compressed fixtures.
#[cfg(test)]
pub(crate) fn encode(format: Compression, input: &[u8]) -> Vec<u8> {
    use std::io::Write;

    let mut output = Vec::new();
    match format {
        Compression::None => output.extend_from_slice(input),
        Compression::Bzip2 => {
            let mut encoder = bzip2::write::BzEncoder::new(&mut output, bzip2::Compression::default());
            encoder.write_all(input).unwrap();
            encoder.finish().unwrap();
        },
        Compression::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(&mut output, flate2::Compression::default());
            encoder.write_all(input).unwrap();
            encoder.finish().unwrap();
        },
    }
    output
}

#[cfg(test)]
mod tests {
    use super::encode;
    use crate::Compression;
    use rstest::rstest;
    use std::io::{Cursor, Read};

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Bzip2)]
    #[case(Compression::Gzip)]
    fn test_wrap_reader_recovers_input(#[case] format: Compression) {
        let original = b"\x00\x01 binary-ish payload \xff".repeat(20);
        let mut reader = format.wrap_reader(Cursor::new(encode(format, &original))).unwrap();
        let mut output = Vec::new();
        reader.read_to_end(&mut output).unwrap();
        assert_eq!(output, original);
    }

    #[rstest]
    #[case(Compression::Bzip2)]
    #[case(Compression::Gzip)]
    fn test_invalid_compressed_data(#[case] format: Compression) {
        let mut reader = format.wrap_reader(&b"This is not compressed data"[..]).unwrap();
        assert!(reader.read_to_end(&mut Vec::new()).is_err());
    }
}
