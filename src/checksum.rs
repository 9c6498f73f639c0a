//! PE image checksum calculation.
//!
//! The image is summed as little-endian 16-bit words, the carries are folded back into the low
//! 16 bits, and the length of the image is added to the result.

use crate::{blob::Blob, constants::CHECKSUM_CHUNK_SIZE, errors::*};

/// Calculate the checksum of an image.
///
/// The checksum field of the image has to be zeroed in the given blob.
/// The blob is read in chunks and never materialized as a whole.
/// A trailing odd byte is summed as the low byte of a word.
pub fn checksum(image: &Blob) -> Result<u32, BlobError> {
    let length = image.len();
    let mut sum: u64 = 0;

    let mut chunk = vec![0; CHECKSUM_CHUNK_SIZE];
    let mut offset = 0;
    while offset < length {
        let count = ((length - offset) as usize).min(CHECKSUM_CHUNK_SIZE);
        image.read_into(offset, &mut chunk[..count])?;
        let mut words = chunk[..count].chunks_exact(2);
        for word in words.by_ref() {
            sum += u16::from_le_bytes([word[0], word[1]]) as u64;
        }
        if let [byte] = words.remainder() {
            sum += *byte as u64;
        }
        offset += count as u64;
    }

    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    Ok((sum as u32).wrapping_add(length as u32))
}
