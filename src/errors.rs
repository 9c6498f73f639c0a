//! Errors specific to reading, writing or modifying a PE image.

use std::io::Error as IOError;

/// Error that can occur when reading and parsing bytes.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ReadError(pub String);

/// Errors that can occur when reading from a blob.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("range out of bounds: {offset:#x}+{size:#x} > {length:#x}")]
    OutOfRange { offset: u64, size: u64, length: u64 },
    #[error("io error: {0}")]
    IOError(IOError),
}
impl From<IOError> for BlobError {
    fn from(error: IOError) -> Self { BlobError::IOError(error) }
}

/// Errors that can occur when reading a PE image.
#[derive(Debug, thiserror::Error)]
pub enum ImageReadError {
    #[error("invalid bytes: {0}")]
    InvalidBytes(ReadError),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("invalid section: {0}")]
    InvalidSection(String),
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
    #[error("invalid data directory: {0}")]
    InvalidDirectory(String),
    #[error("incorrect checksum: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("image truncated: {offset:#x}+{size:#x} > {length:#x}")]
    OutOfRange { offset: u64, size: u64, length: u64 },
    #[error("io error: {0}")]
    IOError(IOError),
}
impl From<ReadError> for ImageReadError {
    fn from(error: ReadError) -> Self { ImageReadError::InvalidBytes(error) }
}
impl From<IOError> for ImageReadError {
    fn from(error: IOError) -> Self { ImageReadError::IOError(error) }
}
impl From<BlobError> for ImageReadError {
    fn from(error: BlobError) -> Self {
        match error {
            BlobError::OutOfRange {
                offset,
                size,
                length,
            } => ImageReadError::OutOfRange {
                offset,
                size,
                length,
            },
            BlobError::IOError(error) => ImageReadError::IOError(error),
        }
    }
}

/// Errors that can occur when modifying data directories or the trailer of a PE image.
#[derive(Debug, thiserror::Error)]
pub enum ImageEditError {
    #[error("data directory {0} is not associated with a section")]
    MissingSection(usize),
    #[error("data directory {0} shares its section with data directory {1}")]
    AmbiguousDirectory(usize, usize),
    #[error("signature is not at the end of the file")]
    SignatureNotAtEnd,
    #[error("signature is not contained in the trailer")]
    SignatureOutsideTrailer,
    #[error("directory size does not fit the address space: {0:#x}")]
    SizeOverflow(u64),
}

/// Errors that can occur when writing a PE image.
#[derive(Debug, thiserror::Error)]
pub enum ImageWriteError {
    #[error("invalid layout: {0}")]
    InvalidLayout(String),
    #[error("section data out of bounds: {offset:#x}+{size:#x} > {length:#x}")]
    OutOfRange { offset: u64, size: u64, length: u64 },
    #[error("io error: {0}")]
    IOError(IOError),
}
impl From<IOError> for ImageWriteError {
    fn from(error: IOError) -> Self { ImageWriteError::IOError(error) }
}
impl From<BlobError> for ImageWriteError {
    fn from(error: BlobError) -> Self {
        match error {
            BlobError::OutOfRange {
                offset,
                size,
                length,
            } => ImageWriteError::OutOfRange {
                offset,
                size,
                length,
            },
            BlobError::IOError(error) => ImageWriteError::IOError(error),
        }
    }
}
