// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! A packed map file: a sequence of named, optionally compressed sections.
//!
//! Layout: the 4-byte [MAGIC], followed by sections until EOF. Each section is
//! a big-endian `u32` header size, the header itself (`u8` name length, name,
//! `u8` [Compression], big-endian `u32` raw size), a big-endian `u32` data size
//! and the (compressed) data.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

pub(crate) mod payload;

/// First bytes of every container.
pub const MAGIC: [u8; 4] = *b"WPMC";

/// Max permitted size for a serialized section header - 64 KiB.
const MAX_HEADER_SIZE: u32 = 64 * 1024;

/// Max permitted size for a decompressed section - 32 MiB.
const MAX_SECTION_SIZE: u32 = 32 * 1024 * 1024;

/// Error which can occur when reading or writing a [Container].
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] Arc<io::Error>),

    #[error("not a map container: bad magic {0:?}")]
    BadMagic([u8; 4]),

    #[error("section header too large: {0} > {MAX_HEADER_SIZE}")]
    HeaderTooLarge(u32),

    #[error("section header is malformed")]
    MalformedHeader,

    #[error("section {name:?} too large: {size} > {MAX_SECTION_SIZE}")]
    SectionTooLarge { name: String, size: u64 },

    #[error("section {name:?}: decompressed to {got} bytes, expected {expected}")]
    SizeMismatch {
        name: String,
        got: usize,
        expected: u32,
    },

    #[error("unsupported compression: {0}")]
    UnsupportedCompression(u8),

    #[error("invalid section name: {0:?}")]
    InvalidName(String),

    #[error("duplicate section: {0:?}")]
    DuplicateSection(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

/// How a section's data is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Raw,
    Zlib,
    Bzip2,
}

impl Compression {
    fn from_u8(v: u8) -> Result<Self, Error> {
        match v {
            0 => Ok(Self::Raw),
            1 => Ok(Self::Zlib),
            2 => Ok(Self::Bzip2),
            other => Err(Error::UnsupportedCompression(other)),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Raw => 0,
            Self::Zlib => 1,
            Self::Bzip2 => 2,
        }
    }
}

/// Anything sections can be read from.
pub trait SectionSource {
    /// Returns the decompressed contents of the section called `name`,
    /// or `Ok(None)` if there's no such section.
    fn read_section(&self, name: &str) -> Result<Option<Vec<u8>>, Error>;
}

#[derive(Debug, Clone, PartialEq)]
struct Section {
    compression: Compression,
    raw_size: u32,
    data: Vec<u8>,
}

/// An in-memory map container.
///
/// Sections are kept compressed and decompressed on every
/// [read](SectionSource::read_section).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container(BTreeMap<String, Section>);

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a container from a stream. The stream is consumed until EOF.
    pub fn from_io<R: Read>(mut reader: R) -> Result<Self, Error> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }

        let mut c = Self::default();
        while let Some(header_size) = read_header_size(&mut reader)? {
            let (name, compression, raw_size) = read_header(&mut reader, header_size)?;
            if raw_size > MAX_SECTION_SIZE {
                return Err(Error::SectionTooLarge {
                    name,
                    size: raw_size.into(),
                });
            }

            let data_size = read_u32(&mut reader)?;
            if data_size > MAX_SECTION_SIZE {
                return Err(Error::SectionTooLarge {
                    name,
                    size: data_size.into(),
                });
            }
            let mut data = vec![0u8; data_size as usize];
            reader.read_exact(&mut data)?;

            if c.0.contains_key(&name) {
                return Err(Error::DuplicateSection(name));
            }
            c.0.insert(
                name,
                Section {
                    compression,
                    raw_size,
                    data,
                },
            );
        }

        Ok(c)
    }

    /// Reads a container from a file at the provided path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let f = File::open(path)?;
        Self::from_io(io::BufReader::new(f))
    }

    /// Reads a container from a static buffer.
    pub fn from_buffer(data: &[u8]) -> Result<Self, Error> {
        Self::from_io(data)
    }

    /// Adds (or replaces) a section, compressing `data` as requested.
    ///
    /// Both the raw and the compressed size must fit within the section size
    /// limit, so that the written file can be read back.
    pub fn insert(&mut self, name: &str, data: &[u8], compression: Compression) -> Result<(), Error> {
        self.insert_limited(name, data, compression, MAX_SECTION_SIZE as usize)
    }

    fn insert_limited(
        &mut self,
        name: &str,
        data: &[u8],
        compression: Compression,
        limit: usize,
    ) -> Result<(), Error> {
        if name.is_empty() || name.len() > u8::MAX as usize {
            return Err(Error::InvalidName(name.to_string()));
        }
        check_size(name, data.len(), limit)?;

        let compressed = match compression {
            Compression::Raw => data.to_vec(),
            Compression::Zlib => {
                let mut e = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                e.write_all(data)?;
                e.finish()?
            }
            Compression::Bzip2 => {
                let mut e = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
                e.write_all(data)?;
                e.finish()?
            }
        };
        check_size(name, compressed.len(), limit)?;

        self.0.insert(
            name.to_string(),
            Section {
                compression,
                raw_size: data.len() as u32,
                data: compressed,
            },
        );
        Ok(())
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Returns the names of all sections, in lexicographic order.
    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Serializes the container into a stream.
    pub fn write_to<W: Write>(&self, mut w: W) -> Result<(), Error> {
        w.write_all(&MAGIC)?;
        for (name, section) in &self.0 {
            let mut header = Vec::with_capacity(name.len() + 6);
            header.push(name.len() as u8);
            header.extend_from_slice(name.as_bytes());
            header.push(section.compression.as_u8());
            header.extend_from_slice(&section.raw_size.to_be_bytes());

            w.write_all(&(header.len() as u32).to_be_bytes())?;
            w.write_all(&header)?;
            w.write_all(&(section.data.len() as u32).to_be_bytes())?;
            w.write_all(&section.data)?;
        }
        w.flush()?;
        Ok(())
    }

    /// Serializes the container into a file at the provided path.
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let f = File::create(path)?;
        self.write_to(io::BufWriter::new(f))
    }
}

impl SectionSource for Container {
    fn read_section(&self, name: &str) -> Result<Option<Vec<u8>>, Error> {
        let Some(section) = self.0.get(name) else {
            return Ok(None);
        };

        let data = match section.compression {
            Compression::Raw => section.data.clone(),
            Compression::Zlib => {
                let d = flate2::read::ZlibDecoder::new(&section.data[..]);
                read_limited(d, name, section.raw_size)?
            }
            Compression::Bzip2 => {
                let d = bzip2::read::BzDecoder::new(&section.data[..]);
                read_limited(d, name, section.raw_size)?
            }
        };

        if data.len() != section.raw_size as usize {
            return Err(Error::SizeMismatch {
                name: name.to_string(),
                got: data.len(),
                expected: section.raw_size,
            });
        }
        Ok(Some(data))
    }
}

/// Decompresses at most one byte over `raw_size`, so that lying headers
/// can't trigger huge allocations.
fn read_limited<R: Read>(r: R, name: &str, raw_size: u32) -> Result<Vec<u8>, Error> {
    let mut decompressed = Vec::with_capacity(raw_size as usize);
    r.take(raw_size as u64 + 1).read_to_end(&mut decompressed)?;
    if decompressed.len() > raw_size as usize {
        return Err(Error::SizeMismatch {
            name: name.to_string(),
            got: decompressed.len(),
            expected: raw_size,
        });
    }
    Ok(decompressed)
}

fn check_size(name: &str, size: usize, limit: usize) -> Result<(), Error> {
    if size > limit {
        return Err(Error::SectionTooLarge {
            name: name.to_string(),
            size: size as u64,
        });
    }
    Ok(())
}

/// Reads the next 4 bytes to read the size of the subsequent section header.
///
/// Returns `Ok(Some(_))` on success, `Ok(None)` on a clean EOF, or an [Error].
fn read_header_size<R: Read>(r: &mut R) -> Result<Option<u32>, Error> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None), // no more sections
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let size = u32::from_be_bytes(buf);
    if size > MAX_HEADER_SIZE {
        return Err(Error::HeaderTooLarge(size));
    }
    Ok(Some(size))
}

/// Reads and parses a section header of a given size.
fn read_header<R: Read>(r: &mut R, size: u32) -> Result<(String, Compression, u32), Error> {
    let mut buf = vec![0u8; size as usize];
    r.read_exact(&mut buf)?;

    let (&name_len, rest) = buf.split_first().ok_or(Error::MalformedHeader)?;
    let name_len = name_len as usize;
    if rest.len() != name_len + 5 {
        return Err(Error::MalformedHeader);
    }

    let name = std::str::from_utf8(&rest[..name_len])
        .map_err(|_| Error::MalformedHeader)?
        .to_string();
    if name.is_empty() {
        return Err(Error::InvalidName(name));
    }

    let compression = Compression::from_u8(rest[name_len])?;
    let mut raw_size = [0u8; 4];
    raw_size.copy_from_slice(&rest[name_len + 1..]);
    Ok((name, compression, u32::from_be_bytes(raw_size)))
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, Error> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Container {
        let mut c = Container::new();
        c.insert("raw", b"hello", Compression::Raw).unwrap();
        c.insert("zlib", &[7u8; 1000], Compression::Zlib).unwrap();
        c.insert("bz2", &[1, 2, 3, 4, 5], Compression::Bzip2).unwrap();
        c
    }

    #[test]
    fn read_sections() {
        let c = sample();
        assert_eq!(c.read_section("raw").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(c.read_section("zlib").unwrap(), Some(vec![7u8; 1000]));
        assert_eq!(c.read_section("bz2").unwrap(), Some(vec![1, 2, 3, 4, 5]));
        assert_eq!(c.read_section("missing").unwrap(), None);
        assert_eq!(c.section_names().collect::<Vec<_>>(), vec!["bz2", "raw", "zlib"]);
    }

    #[test]
    fn serialized_container() {
        let c = sample();
        let mut buf = Vec::new();
        c.write_to(&mut buf).unwrap();
        assert_eq!(&buf[..4], b"WPMC");

        let parsed = Container::from_buffer(&buf).unwrap();
        assert_eq!(parsed, c);
        assert_eq!(parsed.read_section("zlib").unwrap(), Some(vec![7u8; 1000]));
    }

    #[test]
    fn file_container() {
        let path = std::env::temp_dir().join(format!("waypath-container-{}.wpmc", std::process::id()));
        sample().write_file(&path).unwrap();
        let parsed = Container::from_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(parsed.unwrap().has_section("bz2"));
    }

    #[test]
    fn bad_magic() {
        assert!(matches!(
            Container::from_buffer(b"NOPE"),
            Err(Error::BadMagic(m)) if &m == b"NOPE"
        ));
    }

    #[test]
    fn truncated_container() {
        let mut buf = Vec::new();
        sample().write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(matches!(Container::from_buffer(&buf), Err(Error::Io(_))));

        // Cut inside the header size
        let mut buf = Vec::new();
        sample().write_to(&mut buf).unwrap();
        buf.truncate(6);
        assert!(matches!(Container::from_buffer(&buf), Err(Error::Io(_))));
    }

    #[test]
    fn unsupported_compression() {
        let mut buf = MAGIC.to_vec();
        let header = [1u8, b'x', 9, 0, 0, 0, 1];
        buf.extend_from_slice(&(header.len() as u32).to_be_bytes());
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.push(0);
        assert!(matches!(
            Container::from_buffer(&buf),
            Err(Error::UnsupportedCompression(9))
        ));
    }

    #[test]
    fn invalid_names() {
        let mut c = Container::new();
        assert!(matches!(c.insert("", b"", Compression::Raw), Err(Error::InvalidName(_))));
        let long = "x".repeat(300);
        assert!(matches!(c.insert(&long, b"", Compression::Raw), Err(Error::InvalidName(_))));
    }

    #[test]
    fn oversized_sections() {
        let mut c = Container::new();
        let data = vec![0u8; MAX_SECTION_SIZE as usize + 1];
        assert!(matches!(
            c.insert("big", &data, Compression::Raw),
            Err(Error::SectionTooLarge { size, .. }) if size == MAX_SECTION_SIZE as u64 + 1
        ));
        assert!(!c.has_section("big"));
    }

    #[test]
    fn compressed_size_is_limited() {
        // Pseudo-random bytes grow when deflated
        let mut state = 0x2545_f491u32;
        let data = (0..1000)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect::<Vec<_>>();

        let mut c = Container::new();
        assert!(matches!(
            c.insert_limited("noise", &data, Compression::Zlib, data.len()),
            Err(Error::SectionTooLarge { size, .. }) if size > 1000
        ));
        assert!(!c.has_section("noise"));

        c.insert_limited("noise", &data, Compression::Raw, data.len())
            .unwrap();
        assert!(c.has_section("noise"));
    }
}
