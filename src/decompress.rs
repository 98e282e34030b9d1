//! Decompression backends for UBIFS data and inode payloads.
//!
//! UBIFS stores at most one of three compression types per node. Both
//! compressed forms carry no length prefix of their own, so every call site
//! must already know the expected output length (the node's declared `size`
//! field) before decompressing.

use crate::error::{UbifsError, UbifsResult};

/// UBIFS compression type, as stored in the low byte of a data/inode node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Lzo,
    Zlib,
}

impl TryFrom<u8> for CompressionType {
    type Error = UbifsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lzo),
            2 => Ok(CompressionType::Zlib),
            other => Err(UbifsError::Decompress(format!(
                "unknown compression type {other}"
            ))),
        }
    }
}

/// Decompress `data`, which was compressed with `compr_type`, into a buffer
/// of exactly `expected_len` bytes. Returns an error if the decompressed
/// length does not match `expected_len`.
pub fn decompress(data: &[u8], expected_len: usize, compr_type: CompressionType) -> UbifsResult<Vec<u8>> {
    let out = match compr_type {
        CompressionType::None => data.to_vec(),
        CompressionType::Lzo => lzo_decompress(data, expected_len)?,
        CompressionType::Zlib => deflate_decompress(data, expected_len)?,
    };

    if out.len() != expected_len {
        return Err(UbifsError::DataSizeMismatch {
            want: expected_len as u32,
            got: out.len(),
        });
    }

    Ok(out)
}

/// Raw, headerless LZO1X block decompression. The UBIFS on-disk format does
/// not prefix the block with its uncompressed length, so the caller (the
/// node's declared `size` field) must supply it.
fn lzo_decompress(data: &[u8], expected_len: usize) -> UbifsResult<Vec<u8>> {
    let lzo = minilzo_rs::LZO::init().map_err(|e| UbifsError::Decompress(format!("lzo init: {e:?}")))?;
    lzo.decompress_safe(data, expected_len)
        .map_err(|e| UbifsError::Decompress(format!("lzo: {e:?}")))
}

/// compr_type 2 ("zlib" in the on-disk naming, despite the format): a raw
/// DEFLATE stream with no zlib header or adler32 trailer, matching the
/// kernel's negative-window-bits deflate compressor. A plain `ZlibDecoder`
/// would reject every real node here looking for a header that was never
/// written.
///
/// The Python original this was ported from passes the *declared* length to
/// its `zlib.decompress` call where the *compressed bytes* belong -- clearly
/// a bug, since that call takes only one positional buffer argument. We do
/// the obviously-intended thing instead: feed the compressed bytes in and
/// check the output length against what the node declared.
fn deflate_decompress(data: &[u8], expected_len: usize) -> UbifsResult<Vec<u8>> {
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    let mut decoder = DeflateDecoder::new(data);
    let mut out = Vec::with_capacity(expected_len);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| UbifsError::Decompress(format!("deflate: {e}")))?;
    Ok(out)
}
