//! Source fingerprints: CRC32 plus byte count.
//!
//! A grain may be assembled from several source fragments. Fingerprints of the
//! fragments compose so that the result equals the fingerprint of the
//! concatenated bytes, whether the fragments were read in one pass or several.

use std::fmt;
use std::io::{self, Read};

use crc32fast::Hasher;

/// CRC32 and byte count of a grain's source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// CRC32 of the bytes read so far.
    pub crc32: u32,
    /// Number of bytes read so far.
    pub length: u64,
}

impl Fingerprint {
    /// Creates a fingerprint from raw parts (e.g. values read back from the catalog).
    #[must_use]
    pub const fn new(crc32: u32, length: u64) -> Self {
        Self { crc32, length }
    }

    /// Computes the fingerprint of an in-memory buffer.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(bytes);
        Self {
            crc32: hasher.finalize(),
            length: bytes.len() as u64,
        }
    }

    /// Appends `next`, computed independently, after `self`.
    #[must_use]
    pub fn combine(self, next: Self) -> Self {
        let mut hasher = Hasher::new_with_initial_len(self.crc32, self.length);
        hasher.combine(&Hasher::new_with_initial_len(next.crc32, next.length));
        Self {
            crc32: hasher.finalize(),
            length: self.length + next.length,
        }
    }

    /// Returns the checksum as eight upper-case hex digits.
    #[must_use]
    pub fn checksum_hex(&self) -> String {
        format!("{:08X}", self.crc32)
    }

    /// Parses eight hex digits as written by [`Fingerprint::checksum_hex`].
    #[must_use]
    pub fn parse_checksum(hex: &str) -> Option<u32> {
        u32::from_str_radix(hex.trim(), 16).ok()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:08X}", self.length, self.crc32)
    }
}

/// A reader that computes a [`Fingerprint`] of everything read through it.
pub struct ChecksumReader<R> {
    inner: R,
    hasher: Hasher,
    length: u64,
}

impl<R: Read> ChecksumReader<R> {
    /// Wraps `inner` starting from an empty fingerprint.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            length: 0,
        }
    }

    /// Wraps `inner`, continuing from the fingerprint of preceding fragments.
    pub fn chained(inner: R, previous: Fingerprint) -> Self {
        Self {
            inner,
            hasher: Hasher::new_with_initial_len(previous.crc32, previous.length),
            length: previous.length,
        }
    }

    /// Returns the fingerprint of all bytes read so far, including chained ones.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            crc32: self.hasher.clone().finalize(),
            length: self.length,
        }
    }

    /// Reads the remaining input and returns the final fingerprint.
    pub fn finish(mut self) -> io::Result<Fingerprint> {
        io::copy(&mut self, &mut io::sink())?;
        Ok(self.fingerprint())
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.length += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST: &[u8] = b"create grain a version '1.0';\n";
    const SECOND: &[u8] = b"create table t1 (id int not null primary key);\n";

    #[test]
    fn test_reader_matches_buffer() {
        let reader = ChecksumReader::new(FIRST);
        assert_eq!(reader.finish().unwrap(), Fingerprint::of(FIRST));
    }

    #[test]
    fn test_chained_reader_equals_concatenation() {
        let first = ChecksumReader::new(FIRST).finish().unwrap();
        let both = ChecksumReader::chained(SECOND, first).finish().unwrap();
        assert_eq!(both, Fingerprint::of(&[FIRST, SECOND].concat()));
        assert_eq!(both.length, (FIRST.len() + SECOND.len()) as u64);
    }

    #[test]
    fn test_combine_equals_concatenation() {
        let combined = Fingerprint::of(FIRST).combine(Fingerprint::of(SECOND));
        assert_eq!(combined, Fingerprint::of(&[FIRST, SECOND].concat()));
    }

    #[test]
    fn test_combine_with_empty() {
        let fp = Fingerprint::of(FIRST);
        assert_eq!(Fingerprint::default().combine(fp), fp);
        assert_eq!(fp.combine(Fingerprint::default()), fp);
    }

    #[test]
    fn test_checksum_hex_round_trip() {
        let fp = Fingerprint::new(0x00AB_CDEF, 3);
        assert_eq!(fp.checksum_hex(), "00ABCDEF");
        assert_eq!(Fingerprint::parse_checksum("00ABCDEF"), Some(0x00AB_CDEF));
        assert_eq!(fp.to_string(), "3/00ABCDEF");
    }
}
