//! Content identifiers for tracked files

use md5::{Digest, Md5};
use std::fmt::{self, Write as _};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::Result;

/// Read buffer size for streaming hashes
const HASH_BUF_SIZE: usize = 64 * 1024;

/// Textual content identifier of a tracked file.
///
/// The on-wire form concatenates the decimal rendering of every byte of the
/// file's MD5 digest: a digest starting `d4 1d 8c ...` becomes the string
/// `"21229140..."`. This exact form is what manifests carry, so it is
/// preserved verbatim. Comparison is case-insensitive string equality;
/// identifiers are normalized to lowercase on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentId(String);

impl ContentId {
    /// Wrap an identifier string taken from a manifest
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    /// Build the textual identifier from a raw digest
    pub fn from_digest(digest: &[u8]) -> Self {
        let mut text = String::with_capacity(digest.len() * 3);
        for byte in digest {
            let _ = write!(text, "{byte}");
        }
        Self(text)
    }

    /// Compute the identifier of an in-memory buffer
    pub fn from_data(data: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(data);
        Self::from_digest(&hasher.finalize())
    }

    /// The identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty (no hash recorded)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hash a file on disk into its manifest identifier.
///
/// The file is opened in shared-read mode and streamed sequentially; it is
/// never memory-mapped. An error means the identifier is unavailable and
/// callers treat the file as not intact.
pub fn hash_file(path: &Path) -> Result<ContentId> {
    let mut file = File::open(path)?;
    hash_reader(&mut file)
}

/// Hash an arbitrary reader into a manifest identifier
pub fn hash_reader<R: Read>(reader: &mut R) -> Result<ContentId> {
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; HASH_BUF_SIZE];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(ContentId::from_digest(&hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_digest_textual_form() {
        // MD5("") = d41d8cd98f00b204e9800998ecf8427e
        let id = ContentId::from_data(b"");
        assert_eq!(
            id.as_str(),
            "2122914021714301784233128915223624866126"
        );
    }

    #[test]
    fn known_digest_textual_form() {
        // MD5("Hello, World!") = 65a8e27d8879283831b664bd8b7f0ad4
        let expected: String = [
            0x65u8, 0xa8, 0xe2, 0x7d, 0x88, 0x79, 0x28, 0x38, 0x31, 0xb6, 0x64, 0xbd, 0x8b, 0x7f,
            0x0a, 0xd4,
        ]
        .iter()
        .map(|b| b.to_string())
        .collect();
        assert_eq!(ContentId::from_data(b"Hello, World!").as_str(), expected);
    }

    #[test]
    fn comparison_is_case_insensitive() {
        let a = ContentId::new("ABCdef123");
        let b = ContentId::new("abcDEF123");
        assert_eq!(a, b);
    }

    #[test]
    fn file_and_buffer_hashes_agree() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"some tracked file contents").expect("write");
        let from_file = hash_file(file.path()).expect("hash");
        assert_eq!(from_file, ContentId::from_data(b"some tracked file contents"));
    }

    #[test]
    fn missing_file_reports_unavailable() {
        assert!(hash_file(Path::new("definitely/not/here.dat")).is_err());
    }
}
