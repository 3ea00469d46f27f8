//! Fixed-width binary encode/decode for block framing.
//!
//! All integers are little-endian. Strings are length-prefixed with a
//! `u32` byte count. The payload codec never sees anything in this
//! module: block metadata and the header are always written in this
//! format, so the framing is identical whichever codec is plugged in.

use std::io::{Read, Write};

use blocklog_core::{BlockKind, RefId, Version};

use crate::error::LogError;
use crate::header::{Header, TypeRegistration};
use crate::metadata::{Block, BlockMetadata, METADATA_LEN};

// ── Primitive writers ───────────────────────────────────────────

/// Write a little-endian u32.
pub fn write_u32_le<W: Write + ?Sized>(w: &mut W, v: u32) -> Result<(), LogError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian i32.
pub fn write_i32_le<W: Write + ?Sized>(w: &mut W, v: i32) -> Result<(), LogError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a little-endian i64.
pub fn write_i64_le<W: Write + ?Sized>(w: &mut W, v: i64) -> Result<(), LogError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

/// Write a length-prefixed UTF-8 string (u32 length + bytes).
pub fn write_length_prefixed_str<W: Write + ?Sized>(w: &mut W, s: &str) -> Result<(), LogError> {
    let len = u32::try_from(s.len())
        .map_err(|_| LogError::malformed(format!("string of {} bytes is too long", s.len())))?;
    write_u32_le(w, len)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a little-endian u32.
pub fn read_u32_le<R: Read + ?Sized>(r: &mut R) -> Result<u32, LogError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a little-endian i32.
pub fn read_i32_le<R: Read + ?Sized>(r: &mut R) -> Result<i32, LogError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Read a little-endian i64.
pub fn read_i64_le<R: Read + ?Sized>(r: &mut R) -> Result<i64, LogError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

/// Read exactly `len` bytes, growing the buffer as data arrives rather
/// than reserving `len` up front.
pub fn read_exact_vec<R: Read + ?Sized>(r: &mut R, len: usize) -> Result<Vec<u8>, LogError> {
    let mut buf = Vec::with_capacity(len.min(64 * 1024));
    let got = Read::take(&mut *r, len as u64).read_to_end(&mut buf)?;
    if got != len {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    Ok(buf)
}

/// Read a length-prefixed UTF-8 string.
pub fn read_length_prefixed_str<R: Read + ?Sized>(r: &mut R) -> Result<String, LogError> {
    let len = read_u32_le(r)? as usize;
    let buf = read_exact_vec(r, len)?;
    String::from_utf8(buf).map_err(|e| LogError::malformed(format!("invalid UTF-8 string: {e}")))
}

// ── Block encode/decode ─────────────────────────────────────────

/// Frame one block: metadata length, metadata, then the raw payload.
///
/// `metadata.block_size` must equal `payload.len()`.
pub fn encode_block<W: Write + ?Sized>(
    w: &mut W,
    metadata: &BlockMetadata,
    payload: &[u8],
) -> Result<(), LogError> {
    if usize::try_from(metadata.block_size).ok() != Some(payload.len()) {
        return Err(LogError::malformed(format!(
            "block_size {} does not match payload of {} bytes",
            metadata.block_size,
            payload.len()
        )));
    }
    write_i32_le(w, METADATA_LEN)?;
    encode_metadata(w, metadata)?;
    w.write_all(payload)?;
    Ok(())
}

/// Decode one framed block.
///
/// A stream that ends inside the block is an I/O `UnexpectedEof`; a
/// metadata length other than [`METADATA_LEN`] or a negative block size
/// is malformed.
pub fn decode_block<R: Read + ?Sized>(r: &mut R) -> Result<Block, LogError> {
    let metadata_len = read_i32_le(r)?;
    if metadata_len != METADATA_LEN {
        return Err(LogError::malformed(format!(
            "metadata length {metadata_len}, expected {METADATA_LEN}"
        )));
    }
    let metadata = decode_metadata(r)?;
    let payload = read_exact_vec(r, metadata.payload_len())?;
    Ok(Block { metadata, payload })
}

/// Encode the fixed 20-byte metadata record.
pub fn encode_metadata<W: Write + ?Sized>(
    w: &mut W,
    metadata: &BlockMetadata,
) -> Result<(), LogError> {
    write_i32_le(w, metadata.type_id.0)?;
    write_i64_le(w, metadata.timestamp)?;
    write_i32_le(w, metadata.block_size)?;
    write_u32_le(w, metadata.kind.bits())?;
    Ok(())
}

/// Decode the fixed 20-byte metadata record.
pub fn decode_metadata<R: Read + ?Sized>(r: &mut R) -> Result<BlockMetadata, LogError> {
    let type_id = RefId(read_i32_le(r)?);
    let timestamp = read_i64_le(r)?;
    let block_size = read_i32_le(r)?;
    if block_size < 0 {
        return Err(LogError::malformed(format!("negative block size {block_size}")));
    }
    let bits = read_u32_le(r)?;
    let kind = BlockKind::from_bits(bits)
        .ok_or_else(|| LogError::malformed(format!("unknown block kind bits {bits:#x}")))?;
    Ok(BlockMetadata {
        type_id,
        timestamp,
        block_size,
        kind,
    })
}

// ── Header encode/decode ────────────────────────────────────────

/// Encode a header as the payload of a `HEADER` block.
pub fn encode_header(header: &Header) -> Result<Vec<u8>, LogError> {
    let mut buf = Vec::new();
    let version = header.version();
    write_u32_le(&mut buf, version.major)?;
    write_u32_le(&mut buf, version.minor)?;
    write_u32_le(&mut buf, version.revision)?;

    let count = u32::try_from(header.len())
        .map_err(|_| LogError::malformed("too many registrations"))?;
    write_u32_le(&mut buf, count)?;
    for reg in header.registrations() {
        write_i32_le(&mut buf, reg.ref_id().0)?;
        write_length_prefixed_str(&mut buf, reg.type_name())?;
        write_u32_le(&mut buf, reg.output().bits())?;
    }
    Ok(buf)
}

/// Decode a header from the payload of a `HEADER` block.
///
/// Registrations must be dense and zero-based. The returned header's
/// reverse index is empty until
/// [`reset_registration_ids`](Header::reset_registration_ids) is called.
pub fn decode_header(mut bytes: &[u8]) -> Result<Header, LogError> {
    let r = &mut bytes;
    let version = Version::new(read_u32_le(r)?, read_u32_le(r)?, read_u32_le(r)?);
    let count = read_u32_le(r)? as usize;

    // Each registration takes at least 12 bytes.
    if count > r.len() / 12 {
        return Err(LogError::malformed(format!(
            "header claims {count} registrations in {} bytes",
            r.len()
        )));
    }

    let mut registrations = Vec::with_capacity(count);
    for expected in 0..count {
        let ref_id = RefId(read_i32_le(r)?);
        if ref_id.0 as i64 != expected as i64 {
            return Err(LogError::malformed(format!(
                "registration {expected} carries id {ref_id}"
            )));
        }
        let type_name = read_length_prefixed_str(r)?;
        let bits = read_u32_le(r)?;
        let output = BlockKind::from_bits(bits).ok_or_else(|| {
            LogError::malformed(format!("unknown output mask bits {bits:#x} for `{type_name}`"))
        })?;
        registrations.push(TypeRegistration::new(ref_id, type_name, output));
    }

    if !bytes.is_empty() {
        return Err(LogError::malformed(format!(
            "{} trailing bytes after header",
            bytes.len()
        )));
    }
    Ok(Header::from_parts(version, registrations))
}
