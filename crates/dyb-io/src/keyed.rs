//! Keyed binary container modelled on ROOT files.
//!
//! ```text
//! header:  "DYBKEYED" | version u16 | key count u32
//! key:     name length u16 | name (dir/sub/obj) | ndim u8 | dims u64 * ndim
//!          | object length u32 | stored length u32 | blocks
//! block:   "ZL" | method u8 | compressed size u24 | uncompressed size u24 | zlib payload
//! ```
//!
//! All integers are little-endian. Object bytes are the `f64` values in row-major
//! order, split into blocks of at most [`MAX_BLOCK`] uncompressed bytes.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use bytes::{Buf, BufMut, BytesMut};
use dyb_core::{Array, PathKey};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::sanitize::{from_slash_name, to_slash_name};
use crate::{FormatError, malformed};

const MAGIC: &[u8; 8] = b"DYBKEYED";
const VERSION: u16 = 1;
const BLOCK_HEADER: usize = 9;
const ZLIB_METHOD: u8 = 0x08;
/// Smallest encoded key: name length, ndim and the two object sizes.
const MIN_KEY_LEN: usize = 2 + 1 + 4 + 4;

/// Largest uncompressed block.
pub const MAX_BLOCK: usize = 1 << 20;

fn put_le24(buf: &mut BytesMut, v: usize) {
    buf.put_u8((v & 0xFF) as u8);
    buf.put_u8(((v >> 8) & 0xFF) as u8);
    buf.put_u8(((v >> 16) & 0xFF) as u8);
}

fn read_le24(b: &[u8]) -> usize {
    b[0] as usize | ((b[1] as usize) << 8) | ((b[2] as usize) << 16)
}

fn u32_len(len: usize, what: &str) -> Result<u32, FormatError> {
    u32::try_from(len).map_err(|_| FormatError::Name(format!("{what} of {len} bytes exceeds 4 GiB")))
}

/// Compress `raw` into ZL blocks.
pub fn compress(raw: &[u8]) -> Result<Vec<u8>, FormatError> {
    let mut out = BytesMut::with_capacity(raw.len() / 2 + BLOCK_HEADER);
    for chunk in raw.chunks(MAX_BLOCK) {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(chunk)?;
        let compressed = encoder.finish()?;
        if compressed.len() > 0xFF_FFFF {
            return Err(FormatError::Name(format!(
                "compressed block of {} bytes does not fit a 24-bit size",
                compressed.len()
            )));
        }
        out.put_slice(b"ZL");
        out.put_u8(ZLIB_METHOD);
        put_le24(&mut out, compressed.len());
        put_le24(&mut out, chunk.len());
        out.put_slice(&compressed);
    }
    Ok(out.to_vec())
}

/// Decompress ZL blocks into exactly `expected_len` bytes.
pub fn decompress(src: &[u8], expected_len: usize, origin: &Path) -> Result<Vec<u8>, FormatError> {
    let mut out = Vec::new();
    let mut offset = 0;

    while out.len() < expected_len && offset + BLOCK_HEADER <= src.len() {
        let tag = &src[offset..offset + 2];
        let c_size = read_le24(&src[offset + 3..offset + 6]);
        let u_size = read_le24(&src[offset + 6..offset + 9]);
        offset += BLOCK_HEADER;

        if tag != b"ZL" {
            return Err(malformed(
                "keyed",
                origin,
                format!("unsupported compression tag {:?}", String::from_utf8_lossy(tag)),
            ));
        }
        let end = offset + c_size;
        if end > src.len() {
            return Err(malformed(
                "keyed",
                origin,
                format!("block claims {c_size} bytes but only {} remain", src.len() - offset),
            ));
        }

        out.reserve(u_size);
        let mut block = Vec::with_capacity(u_size);
        ZlibDecoder::new(&src[offset..end])
            .read_to_end(&mut block)
            .map_err(|e| malformed("keyed", origin, format!("zlib: {e}")))?;
        if block.len() != u_size {
            return Err(malformed(
                "keyed",
                origin,
                format!("expected {u_size} uncompressed bytes, got {}", block.len()),
            ));
        }
        out.extend_from_slice(&block);
        offset = end;
    }

    if out.len() != expected_len {
        return Err(malformed(
            "keyed",
            origin,
            format!("total decompressed length {} != expected {expected_len}", out.len()),
        ));
    }
    Ok(out)
}

pub fn save(path: &Path, arrays: &[(PathKey, Array)]) -> Result<(), FormatError> {
    let mut buf = BytesMut::new();
    buf.put_slice(MAGIC);
    buf.put_u16_le(VERSION);
    buf.put_u32_le(u32::try_from(arrays.len()).map_err(|_| {
        FormatError::Name(format!("{} arrays do not fit a u32 key count", arrays.len()))
    })?);

    for (key, array) in arrays {
        let name = to_slash_name(key);
        let Ok(name_len) = u16::try_from(name.len()) else {
            return Err(FormatError::Name(format!("name '{name}' is too long")));
        };
        buf.put_u16_le(name_len);
        buf.put_slice(name.as_bytes());

        let Ok(ndim) = u8::try_from(array.ndim()) else {
            return Err(FormatError::Name(format!("'{key}' has too many dimensions")));
        };
        buf.put_u8(ndim);
        for &d in array.shape() {
            buf.put_u64_le(d as u64);
        }

        let mut raw = Vec::with_capacity(array.len() * 8);
        for v in array.data() {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        let stored = compress(&raw)?;
        buf.put_u32_le(u32_len(raw.len(), &format!("'{key}' object"))?);
        buf.put_u32_le(u32_len(stored.len(), &format!("'{key}' stored object"))?);
        buf.put_slice(&stored);
    }

    fs::write(path, &buf)?;
    Ok(())
}

pub fn load(path: &Path) -> Result<Vec<(PathKey, Array)>, FormatError> {
    let bytes = fs::read(path)?;
    let mut cur = bytes.as_slice();

    let need = |cur: &[u8], n: usize, what: &str| -> Result<(), FormatError> {
        if cur.remaining() < n {
            return Err(malformed("keyed", path, format!("truncated {what}")));
        }
        Ok(())
    };

    need(cur, MAGIC.len() + 6, "header")?;
    if &cur[..MAGIC.len()] != MAGIC {
        return Err(malformed("keyed", path, "bad magic"));
    }
    cur.advance(MAGIC.len());
    let version = cur.get_u16_le();
    if version > VERSION {
        return Err(malformed("keyed", path, format!("unsupported version {version}")));
    }
    let n_keys = cur.get_u32_le() as usize;

    let mut out = Vec::with_capacity(n_keys.min(cur.remaining() / MIN_KEY_LEN));
    for _ in 0..n_keys {
        need(cur, 2, "key name")?;
        let name_len = cur.get_u16_le() as usize;
        need(cur, name_len, "key name")?;
        let name = std::str::from_utf8(&cur[..name_len])
            .map_err(|_| malformed("keyed", path, "key name is not UTF-8"))?;
        let key = from_slash_name(name)?;
        cur.advance(name_len);

        need(cur, 1, "shape")?;
        let ndim = cur.get_u8() as usize;
        need(cur, ndim * 8, "shape")?;
        let shape: Vec<usize> = (0..ndim).map(|_| cur.get_u64_le() as usize).collect();

        need(cur, 8, "object sizes")?;
        let obj_len = cur.get_u32_le() as usize;
        let stored_len = cur.get_u32_le() as usize;
        need(cur, stored_len, "object payload")?;
        let raw = decompress(&cur[..stored_len], obj_len, path)?;
        cur.advance(stored_len);

        if raw.len() % 8 != 0 {
            return Err(malformed("keyed", path, format!("'{key}' payload is not f64 aligned")));
        }
        let data: Vec<f64> = raw
            .chunks_exact(8)
            .map(|c| {
                let mut le = [0u8; 8];
                le.copy_from_slice(c);
                f64::from_le_bytes(le)
            })
            .collect();
        let array =
            Array::new(shape, data).map_err(|e| malformed("keyed", path, e.to_string()))?;
        out.push((key, array));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn le24() {
        let mut buf = BytesMut::new();
        put_le24(&mut buf, 0x12_3456);
        assert_eq!(&buf[..], &[0x56, 0x34, 0x12]);
        assert_eq!(read_le24(&buf), 0x12_3456);
    }

    #[test]
    fn blocks_split_large_payloads() {
        let raw: Vec<u8> = (0..(MAX_BLOCK * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let stored = compress(&raw).unwrap();
        assert_eq!(&stored[..2], b"ZL");
        assert_eq!(decompress(&stored, raw.len(), Path::new("mem")).unwrap(), raw);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let stored = compress(b"abcdefgh").unwrap();
        assert!(decompress(&stored, 9, Path::new("mem")).is_err());
        assert!(decompress(&stored[..stored.len() - 1], 8, Path::new("mem")).is_err());
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn object_lengths_fit_u32() {
        assert_eq!(u32_len(8, "object").unwrap(), 8);
        assert!(matches!(u32_len(u32::MAX as usize + 1, "object"), Err(FormatError::Name(_))));
    }

    #[test]
    fn huge_key_count_is_truncation_not_allocation() {
        let path = std::env::temp_dir()
            .join(format!("dyb_keyed_count_{}.dybk", std::process::id()));
        let mut buf = BytesMut::new();
        buf.put_slice(MAGIC);
        buf.put_u16_le(VERSION);
        buf.put_u32_le(u32::MAX);
        fs::write(&path, &buf).unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, FormatError::Malformed { .. }), "{err}");
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn empty_payload_has_no_blocks() {
        assert!(compress(&[]).unwrap().is_empty());
        assert!(decompress(&[], 0, Path::new("mem")).unwrap().is_empty());
    }
}
