//! Decoder for the framed LZMA archives served by update mirrors
//!
//! Archived files use the LZMA-alone framing the manifest archiver
//! produces: 5 bytes of coder properties, 8 little-endian bytes holding
//! the plaintext length, then the compressed stream. The declared length
//! is not trusted blindly: a stream that ends before producing it is an
//! error, while trailing bytes after the stream are ignored.

#![warn(missing_docs)]

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, trace};

/// Length of the archive framing: 5 properties bytes + u64-LE plaintext length
pub const HEADER_LEN: u64 = 13;

/// Error types for archive decoding
#[derive(Error, Debug)]
pub enum Error {
    /// IO error while reading the archive or writing the plaintext
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The archive framing or compressed stream is invalid
    #[error("invalid archive: {reason}")]
    Format {
        /// What the decoder rejected
        reason: String,
    },

    /// The operation was cancelled through its probe
    #[error("decompression cancelled")]
    Cancelled,
}

/// Result type for archive decoding
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn format(reason: impl Into<String>) -> Self {
        Self::Format {
            reason: reason.into(),
        }
    }
}

/// Reader adapter that fails once the cancel probe trips, aborting the
/// surrounding decode. The error kind must not be `Interrupted`, which
/// `read_exact`-style loops silently retry.
struct CancelAwareReader<'a, R> {
    inner: R,
    is_cancelled: &'a dyn Fn() -> bool,
}

impl<R: Read> Read for CancelAwareReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if (self.is_cancelled)() {
            return Err(io::Error::other("cancelled"));
        }
        self.inner.read(buf)
    }
}

/// Decompress a framed archive file into a plaintext file.
///
/// On any failure, including cancellation, the partial output is removed
/// before the error is returned. Returns the plaintext size in bytes.
pub fn decompress_file(
    source: &Path,
    destination: &Path,
    is_cancelled: &dyn Fn() -> bool,
) -> Result<u64> {
    debug!(
        "decompressing {} -> {}",
        source.display(),
        destination.display()
    );

    let result = decompress_inner(source, destination, is_cancelled);
    if let Err(e) = &result {
        trace!("decompression failed ({e}), removing partial output");
        let _ = std::fs::remove_file(destination);
    }
    result
}

fn decompress_inner(
    source: &Path,
    destination: &Path,
    is_cancelled: &dyn Fn() -> bool,
) -> Result<u64> {
    let archive = File::open(source)?;
    if archive.metadata()?.len() < HEADER_LEN {
        return Err(Error::format("shorter than the 13-byte framing"));
    }

    let mut reader = BufReader::new(CancelAwareReader {
        inner: archive,
        is_cancelled,
    });
    let mut writer = BufWriter::new(File::create(destination)?);

    lzma_rs::lzma_decompress(&mut reader, &mut writer).map_err(|e| {
        if is_cancelled() {
            return Error::Cancelled;
        }
        match e {
            lzma_rs::error::Error::IoError(io_err) => Error::Io(io_err),
            lzma_rs::error::Error::HeaderTooShort(io_err) => {
                Error::format(format!("header too short: {io_err}"))
            }
            lzma_rs::error::Error::LzmaError(reason) | lzma_rs::error::Error::XzError(reason) => {
                Error::format(reason)
            }
        }
    })?;

    writer.flush()?;
    drop(writer);

    let plaintext_len = std::fs::metadata(destination)?.len();
    debug!("decompressed {plaintext_len} plaintext bytes");
    Ok(plaintext_len)
}
