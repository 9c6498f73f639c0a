//! Lazy, structurally shared byte ranges.
//!
//! A [`Blob`] is an immutable view of a byte range. Blobs can be backed by memory, by a seekable
//! reader, or be virtual runs of a fill byte, and can be sliced and concatenated without copying
//! the underlying bytes. Edits to a large image are expressed as new blob trees that reference the
//! untouched regions of the original input and only materialize the replaced parts.
//!
//! Concatenations are always flat: joining a concatenation with other blobs splices its children
//! into the new sequence, so reads stay linear in the number of children. Slicing a slice composes
//! the offsets into a single indirection.

use std::{
    cell::RefCell,
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    ops::{Bound, RangeBounds},
    path::Path,
    rc::Rc,
};

use debug_ignore::DebugIgnore;
use log::trace;

use crate::{constants::WRITE_CHUNK_SIZE, errors::*};

/// Random-access source backing an I/O blob.
pub trait Source: Read + Seek {}
impl<T: Read + Seek> Source for T {}

#[derive(Debug)]
enum Inner {
    Bytes(Box<[u8]>),
    Io {
        source: DebugIgnore<Rc<RefCell<Box<dyn Source>>>>,
        length: u64,
    },
    Pad {
        size: u64,
        fill: u8,
    },
    Concat {
        parts:   Vec<Blob>,
        offsets: Vec<u64>,
        length:  u64,
    },
    Sub {
        parent: Blob,
        start:  u64,
        size:   u64,
    },
}

/// Immutable byte range.
///
/// Cloning a blob is cheap and shares the underlying data.
#[derive(Debug, Clone)]
pub struct Blob {
    inner: Rc<Inner>,
}

impl Default for Blob {
    fn default() -> Self { Self::empty() }
}

impl Blob {
    fn new(inner: Inner) -> Self {
        Self {
            inner: Rc::new(inner),
        }
    }

    /// Returns an empty blob.
    pub fn empty() -> Self { Self::new(Inner::Bytes(Box::default())) }

    /// Create a blob reading `length` bytes from the start of a seekable source.
    ///
    /// The source is only read when bytes of the blob are requested.
    pub fn from_reader<S: Source + 'static>(source: S, length: u64) -> Self {
        Self::new(Inner::Io {
            source: DebugIgnore(Rc::new(RefCell::new(Box::new(source)))),
            length,
        })
    }

    /// Create a blob covering a whole seekable source, measuring its length by seeking to the end.
    pub fn from_source<S: Source + 'static>(mut source: S) -> Result<Self, BlobError> {
        let length = source.seek(SeekFrom::End(0))?;
        Ok(Self::from_reader(source, length))
    }

    /// Create a blob lazily backed by the file at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BlobError> {
        Self::from_source(File::open(path)?)
    }

    /// Create a blob consisting of `size` copies of `fill`, without backing storage.
    pub fn pad(size: u64, fill: u8) -> Self {
        if size == 0 {
            return Self::empty();
        }
        Self::new(Inner::Pad { size, fill })
    }

    /// Create a blob consisting of `size` zero bytes.
    pub fn zeroed(size: u64) -> Self { Self::pad(size, 0) }

    /// Returns the length of the blob in bytes.
    pub fn len(&self) -> u64 {
        match &*self.inner {
            Inner::Bytes(bytes) => bytes.len() as u64,
            Inner::Io { length, .. } => *length,
            Inner::Pad { size, .. } => *size,
            Inner::Concat { length, .. } => *length,
            Inner::Sub { size, .. } => *size,
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Returns the children of the blob if it is a concatenation.
    pub fn parts(&self) -> Option<&[Blob]> {
        match &*self.inner {
            Inner::Concat { parts, .. } => Some(parts),
            _ => None,
        }
    }

    fn check_range(&self, offset: u64, size: u64) -> Result<(), BlobError> {
        let length = self.len();
        match offset.checked_add(size) {
            Some(end) if end <= length => Ok(()),
            _ => Err(BlobError::OutOfRange {
                offset,
                size,
                length,
            }),
        }
    }

    /// Read `size` bytes at `offset`.
    ///
    /// # Returns
    /// Returns an error if the range exceeds the blob or the backing source could not be read.
    pub fn read(&self, offset: u64, size: usize) -> Result<Vec<u8>, BlobError> {
        self.check_range(offset, size as u64)?;
        let mut data = vec![0; size];
        self.read_unchecked(offset, &mut data)?;
        Ok(data)
    }

    /// Read bytes at `offset` into the buffer, filling it completely.
    pub fn read_into(&self, offset: u64, buffer: &mut [u8]) -> Result<(), BlobError> {
        self.check_range(offset, buffer.len() as u64)?;
        self.read_unchecked(offset, buffer)
    }

    /// Read a single byte at `offset`.
    pub fn read_byte(&self, offset: u64) -> Result<u8, BlobError> {
        let mut byte = [0; 1];
        self.read_into(offset, &mut byte)?;
        Ok(byte[0])
    }

    /// Materialize the whole blob into memory.
    pub fn to_vec(&self) -> Result<Vec<u8>, BlobError> {
        let length = usize::try_from(self.len()).map_err(|_| BlobError::OutOfRange {
            offset: 0,
            size:   self.len(),
            length: usize::MAX as u64,
        })?;
        self.read(0, length)
    }

    fn read_unchecked(&self, offset: u64, buffer: &mut [u8]) -> Result<(), BlobError> {
        if buffer.is_empty() {
            return Ok(());
        }
        match &*self.inner {
            Inner::Bytes(bytes) => {
                let start = offset as usize;
                buffer.copy_from_slice(&bytes[start..start + buffer.len()]);
            }
            Inner::Pad { fill, .. } => buffer.fill(*fill),
            Inner::Io { source, .. } => {
                let mut source = source.borrow_mut();
                source.seek(SeekFrom::Start(offset))?;
                let mut filled = 0;
                while filled < buffer.len() {
                    let read = source.read(&mut buffer[filled..])?;
                    if read == 0 {
                        return Err(BlobError::IOError(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!(
                                "failed to read blob from stream: {:#x} of {:#x} bytes at {:#x}",
                                filled,
                                buffer.len(),
                                offset
                            ),
                        )));
                    }
                    filled += read;
                }
            }
            Inner::Concat { parts, offsets, .. } => {
                // index of the last part starting at or before the offset
                let first = offsets.partition_point(|&start| start <= offset) - 1;
                let mut position = offset;
                let mut filled = 0;
                for (part, &start) in parts[first..].iter().zip(&offsets[first..]) {
                    if filled == buffer.len() {
                        break;
                    }
                    let local = position - start;
                    let count = (part.len() - local).min((buffer.len() - filled) as u64) as usize;
                    part.read_unchecked(local, &mut buffer[filled..filled + count])?;
                    filled += count;
                    position += count as u64;
                }
            }
            Inner::Sub { parent, start, .. } => parent.read_unchecked(start + offset, buffer)?,
        }
        Ok(())
    }

    /// Returns a view of the given range of the blob.
    ///
    /// Slicing a slice composes the offsets instead of nesting views, slicing padding yields
    /// smaller padding, and slicing the full range returns the blob itself.
    ///
    /// # Returns
    /// Returns an error if the range exceeds the blob.
    pub fn slice<R: RangeBounds<u64>>(&self, range: R) -> Result<Self, BlobError> {
        let length = self.len();
        let start = match range.start_bound() {
            Bound::Included(&start) => start,
            Bound::Excluded(&start) => start.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&end) => end.saturating_add(1),
            Bound::Excluded(&end) => end,
            Bound::Unbounded => length,
        };
        if start > end || end > length {
            return Err(BlobError::OutOfRange {
                offset: start,
                size: end.saturating_sub(start),
                length,
            });
        }

        let size = end - start;
        if size == 0 {
            return Ok(Self::empty());
        }
        if size == length {
            return Ok(self.clone());
        }
        Ok(match &*self.inner {
            Inner::Pad { fill, .. } => Self::pad(size, *fill),
            Inner::Sub {
                parent,
                start: parent_start,
                ..
            } => Self::new(Inner::Sub {
                parent: parent.clone(),
                start: parent_start + start,
                size,
            }),
            _ => Self::new(Inner::Sub {
                parent: self.clone(),
                start,
                size,
            }),
        })
    }

    /// Returns the concatenation of this blob and another blob.
    pub fn concat(&self, other: &Blob) -> Self { join([self.clone(), other.clone()]) }

    /// Returns a cursor reading the blob through [`std::io::Read`] and [`std::io::Seek`].
    pub fn reader(&self) -> BlobReader { BlobReader::new(self.clone()) }

    /// Write the blob to a writer in bounded chunks without materializing it as a whole.
    ///
    /// # Returns
    /// Returns the number of bytes written, or an error if the blob could not be read or the writer could not be written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<u64, BlobError> {
        let length = self.len();
        let mut chunk = vec![0; (length as usize).min(WRITE_CHUNK_SIZE)];
        let mut offset = 0;
        while offset < length {
            let count = ((length - offset) as usize).min(chunk.len());
            self.read_unchecked(offset, &mut chunk[..count])?;
            writer.write_all(&chunk[..count])?;
            trace!("wrote blob chunk {:#x}+{:#x}", offset, count);
            offset += count as u64;
        }
        Ok(length)
    }
}

/// Join blobs into a single blob.
///
/// Empty blobs are dropped. Returns an empty blob for no input, the blob itself for a single
/// input, and otherwise a flat concatenation in which the children of concatenated inputs are
/// spliced in place.
pub fn join<I: IntoIterator<Item = Blob>>(blobs: I) -> Blob {
    let mut parts = Vec::new();
    for blob in blobs {
        if blob.is_empty() {
            continue;
        }
        match blob.parts() {
            Some(children) => parts.extend(children.iter().cloned()),
            None => parts.push(blob),
        }
    }
    match parts.len() {
        0 => Blob::empty(),
        1 => parts.remove(0),
        _ => {
            let mut offsets = Vec::with_capacity(parts.len());
            let mut length = 0;
            for part in parts.iter() {
                offsets.push(length);
                length += part.len();
            }
            Blob::new(Inner::Concat {
                parts,
                offsets,
                length,
            })
        }
    }
}

impl From<Vec<u8>> for Blob {
    fn from(data: Vec<u8>) -> Self { Self::new(Inner::Bytes(data.into_boxed_slice())) }
}
impl From<Box<[u8]>> for Blob {
    fn from(data: Box<[u8]>) -> Self { Self::new(Inner::Bytes(data)) }
}
impl From<&[u8]> for Blob {
    fn from(data: &[u8]) -> Self { Self::from(data.to_vec()) }
}
impl<const N: usize> From<&[u8; N]> for Blob {
    fn from(data: &[u8; N]) -> Self { Self::from(data.to_vec()) }
}
impl From<&Vec<u8>> for Blob {
    fn from(data: &Vec<u8>) -> Self { Self::from(data.clone()) }
}
impl From<&str> for Blob {
    fn from(data: &str) -> Self { Self::from(data.as_bytes()) }
}

/// Cursor over a blob implementing [`std::io::Read`] and [`std::io::Seek`].
#[derive(Debug, Clone)]
pub struct BlobReader {
    blob:     Blob,
    position: u64,
}
impl BlobReader {
    pub fn new(blob: Blob) -> Self { Self { blob, position: 0 } }

    /// Returns the current position of the cursor.
    pub fn position(&self) -> u64 { self.position }

    pub fn into_inner(self) -> Blob { self.blob }
}
impl Read for BlobReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.blob.len().saturating_sub(self.position);
        let count = (buf.len() as u64).min(remaining) as usize;
        if count == 0 {
            return Ok(0);
        }
        self.blob.read_into(self.position, &mut buf[..count]).map_err(|error| match error {
            BlobError::IOError(error) => error,
            error => io::Error::new(io::ErrorKind::InvalidInput, error.to_string()),
        })?;
        self.position += count as u64;
        Ok(count)
    }
}
impl Seek for BlobReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let position = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(offset) => self.blob.len().checked_add_signed(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
        };
        match position {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}
