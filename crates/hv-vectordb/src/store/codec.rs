//! Binary vector file: the per-field dump of every live index entry.
//!
//! Layout (little endian):
//! `magic[4] | version u32 | dimension u32 | count u64 | [row u64 | f32 * dimension] * count | crc32 u32`
//! The trailing checksum covers every preceding byte.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use hv_core::RowId;

use crate::error::{Result, VectorDbError};

const MAGIC: &[u8; 4] = b"HVVF";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

pub fn encode_vectors(dimension: usize, entries: &[(RowId, Vec<f32>)]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_LEN + entries.len() * (8 + dimension * 4) + 4);
    buf.write_all(MAGIC)?;
    buf.write_u32::<LittleEndian>(VERSION)?;
    buf.write_u32::<LittleEndian>(dimension as u32)?;
    buf.write_u64::<LittleEndian>(entries.len() as u64)?;
    for (row, vector) in entries {
        if vector.len() != dimension {
            return Err(VectorDbError::Storage(format!(
                "row {row} has {} components, expected {dimension}",
                vector.len()
            )));
        }
        buf.write_u64::<LittleEndian>(*row)?;
        for &x in vector {
            buf.write_f32::<LittleEndian>(x)?;
        }
    }
    let crc = crc32fast::hash(&buf);
    buf.write_u32::<LittleEndian>(crc)?;
    Ok(buf)
}

/// Returns the dimension and the entries, verifying magic, version and checksum.
pub fn decode_vectors(bytes: &[u8]) -> Result<(usize, Vec<(RowId, Vec<f32>)>)> {
    if bytes.len() < HEADER_LEN + 4 {
        return Err(VectorDbError::Storage("vector file truncated".into()));
    }
    let (body, footer) = bytes.split_at(bytes.len() - 4);
    let expected = Cursor::new(footer).read_u32::<LittleEndian>()?;
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(VectorDbError::Storage(format!(
            "vector file checksum mismatch: stored {expected:08x}, computed {actual:08x}"
        )));
    }

    let mut cursor = Cursor::new(body);
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(VectorDbError::Storage("not a vector file".into()));
    }
    let version = cursor.read_u32::<LittleEndian>()?;
    if version != VERSION {
        return Err(VectorDbError::Storage(format!("unsupported vector file version {version}")));
    }
    let dimension = cursor.read_u32::<LittleEndian>()? as usize;
    let count = cursor.read_u64::<LittleEndian>()?;
    let expected_len = usize::try_from(count)
        .ok()
        .and_then(|count| dimension.checked_mul(4)?.checked_add(8)?.checked_mul(count))
        .and_then(|rows| rows.checked_add(HEADER_LEN))
        .ok_or_else(|| {
            VectorDbError::Storage(format!("vector file header overflows: {count} rows of dimension {dimension}"))
        })?;
    if body.len() != expected_len {
        return Err(VectorDbError::Storage(format!(
            "vector file holds {} bytes, header implies {expected_len}",
            body.len()
        )));
    }

    let mut entries = Vec::new();
    for _ in 0..count {
        let row = cursor.read_u64::<LittleEndian>()?;
        let mut vector = vec![0f32; dimension];
        cursor.read_f32_into::<LittleEndian>(&mut vector)?;
        entries.push((row, vector));
    }
    Ok((dimension, entries))
}
