//! Concatenated gzip streams.
//!
//! APK indexes and packages are several gzip members back to back. The
//! signature covers the raw compressed bytes of the members that follow
//! it, so members have to be split without re-encoding.

use std::io::{self, Read};

use flate2::bufread::GzDecoder;

/// Decompress the first gzip member of `data`.
///
/// Returns the decompressed bytes and the compressed length of the member,
/// so `&data[len..]` is the remainder.
///
/// # Errors
///
/// Invalid gzip data.
pub fn split_first(data: &[u8]) -> io::Result<(Vec<u8>, usize)> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    let rest = decoder.into_inner();
    Ok((out, data.len() - rest.len()))
}

/// Compressed byte ranges of every member, in order.
///
/// # Errors
///
/// Invalid gzip data, or a member that consumes no input.
pub fn members(data: &[u8]) -> io::Result<Vec<std::ops::Range<usize>>> {
    let mut ranges = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let (_, len) = split_first(&data[offset..])?;
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "empty gzip member",
            ));
        }
        ranges.push(offset..offset + len);
        offset += len;
    }
    Ok(ranges)
}
