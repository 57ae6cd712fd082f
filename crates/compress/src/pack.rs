//! Zip packfile writer.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::{Read, Seek, Write};
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

/// Deflate level for packfile members.
///
/// Threaded through explicitly so that two packfiles built in the same
/// process can use different levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PackLevel {
    /// No compression (`ZIP_STORED`).
    Store,
    /// Whatever the deflate implementation considers its default.
    #[default]
    Default,
    /// An explicit deflate level between 1 and 9.
    Level(u8),
}

impl PackLevel {
    /// Map a zlib-style level (`-1` default, `0` store, `1..=9`) to a [`PackLevel`].
    ///
    /// ```
    /// use hoist_compress::PackLevel;
    ///
    /// assert_eq!(PackLevel::from_zlib(-1).unwrap(), PackLevel::Default);
    /// assert_eq!(PackLevel::from_zlib(0).unwrap(), PackLevel::Store);
    /// assert_eq!(PackLevel::from_zlib(6).unwrap(), PackLevel::Level(6));
    /// assert!(PackLevel::from_zlib(10).is_err());
    /// ```
    pub fn from_zlib(level: i32) -> Result<Self> {
        match level {
            -1 => Ok(PackLevel::Default),
            0 => Ok(PackLevel::Store),
            1..=9 => Ok(PackLevel::Level(level as u8)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(format!("deflate level {level}"))),
        }
    }

    fn options(&self) -> SimpleFileOptions {
        let options = SimpleFileOptions::default().large_file(true);
        match self {
            PackLevel::Store => options.compression_method(CompressionMethod::Stored),
            PackLevel::Default => options.compression_method(CompressionMethod::Deflated),
            PackLevel::Level(level) => {
                options.compression_method(CompressionMethod::Deflated).compression_level(Some(i64::from(*level)))
            },
        }
    }
}

/// Streams files into a zip archive.
///
/// ```
/// use hoist_compress::{PackLevel, PackWriter};
/// use std::io::Cursor;
///
/// let mut pack = PackWriter::new(Cursor::new(Vec::new()), PackLevel::Level(1));
/// pack.add_bytes("one/a.txt", b"first").unwrap();
/// pack.add_reader("b.txt", &mut &b"second"[..]).unwrap();
/// assert_eq!(pack.members(), 2);
/// let archive = pack.finish().unwrap().into_inner();
/// assert!(archive.starts_with(b"PK"));
/// ```
pub struct PackWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: SimpleFileOptions,
    members: usize,
}

impl<W: Write + Seek> PackWriter<W> {
    pub fn new(destination: W, level: PackLevel) -> Self {
        Self {
            zip: ZipWriter::new(destination),
            options: level.options(),
            members: 0,
        }
    }

    /// Number of members written so far.
    pub fn members(&self) -> usize {
        self.members
    }

    /// Copy a stream into a new member without buffering it, returning the
    /// number of bytes copied.
    pub fn add_reader(&mut self, name: &str, source: &mut dyn Read) -> Result<u64> {
        self.start(name)?;
        let copied = std::io::copy(source, &mut self.zip).or_raise(|| ErrorKind::Io)?;
        self.members += 1;
        Ok(copied)
    }

    /// Write an in-memory buffer as a new member.
    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<u64> {
        self.start(name)?;
        self.zip.write_all(data).or_raise(|| ErrorKind::Io)?;
        self.members += 1;
        Ok(data.len() as u64)
    }

    /// Write the central directory and hand back the destination.
    pub fn finish(self) -> Result<W> {
        self.zip.finish().or_raise(|| ErrorKind::Pack("finishing archive".to_string()))
    }

    fn start(&mut self, name: &str) -> Result<()> {
        let name = name.trim_start_matches('/');
        self.zip.start_file(name, self.options).or_raise(|| ErrorKind::Pack(name.to_string()))
    }
}
