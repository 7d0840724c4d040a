// compression.rs -- gzip-wrapped map files
//
// Maps may ship gzip-compressed. The gzip trailer's ISIZE field is the
// declared uncompressed size and must match the decoded output exactly.

use std::borrow::Cow;
use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// gzip member magic.
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Smallest possible gzip member: 10-byte header, empty deflate block, 8-byte trailer.
const GZIP_MIN_LEN: usize = 20;

/// Upper bound on a declared uncompressed size, to refuse decompression bombs.
pub const MAX_DECOMPRESS_SIZE: usize = 256 * 1024 * 1024;

#[inline]
pub fn is_gzip(data: &[u8]) -> bool {
    data.len() >= GZIP_MAGIC.len() && data[..2] == GZIP_MAGIC
}

/// Uncompressed size recorded in the gzip trailer (modulo 2^32).
pub fn gzip_declared_size(data: &[u8]) -> Option<usize> {
    if !is_gzip(data) || data.len() < GZIP_MIN_LEN {
        return None;
    }
    let tail = &data[data.len() - 4..];
    Some(u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]]) as usize)
}

/// Return the map bytes, inflating them first when they are gzip-wrapped.
///
/// Uncompressed input is borrowed unchanged.
///
/// # Returns
/// * `Ok(Cow)` - The raw map bytes
/// * `Err(String)` - The stream is corrupt or its size disagrees with the trailer
pub fn decompress_map(data: &[u8]) -> Result<Cow<'_, [u8]>, String> {
    if !is_gzip(data) {
        return Ok(Cow::Borrowed(data));
    }

    let declared = gzip_declared_size(data)
        .ok_or_else(|| format!("truncated gzip stream ({} bytes)", data.len()))?;
    if declared > MAX_DECOMPRESS_SIZE {
        return Err(format!(
            "declared size {} exceeds maximum {}",
            declared, MAX_DECOMPRESS_SIZE
        ));
    }

    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::with_capacity(declared);
    decoder
        .by_ref()
        .take(MAX_DECOMPRESS_SIZE as u64 + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| format!("decompression failed: {}", e))?;

    if decompressed.len() != declared {
        return Err(format!(
            "size mismatch: expected {}, got {}",
            declared,
            decompressed.len()
        ));
    }

    Ok(Cow::Owned(decompressed))
}

/// gzip-compress `data`. Used by tooling and tests that produce packed maps.
pub fn compress_map(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| format!("compression failed: {}", e))?;
    encoder
        .finish()
        .map_err(|e| format!("compression failed: {}", e))
}
