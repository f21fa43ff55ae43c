//! Frame header and the page codec.
//!
//! Layout on disk, repeated until end-of-file:
//! [ magic: u32 ][ version: u16 ][ codec: u8 ][ reserved: u8 ]
//! [ uncompressed_len: u32 ][ compressed_len: u32 ][ tuple_count: u32 ]
//! [ checksum: 32 bytes ][ payload bytes … ]
//!
//! The checksum is computed over (header || payload) using blake3. The
//! payload is the schema-driven tuple encoding: little-endian fixed width
//! for scalars, u16 length prefix for strings. This module is the only code
//! that touches bytes.

use riffle_core::schema::{DataType, Schema};
use riffle_core::types::{Tuple, Value};

use super::Codec;
use crate::error::{Error, Result};

pub const MAGIC: u32 = 0x4C464652; // "RFFL"
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 4 + 2 + 1 + 1 + 4 + 4 + 4;
pub const CHECKSUM_LEN: usize = 32;

/// Upper bound on a single frame; anything larger means corruption.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FrameHeader {
    pub magic: u32,
    pub version: u16,
    pub codec: Codec,
    pub uncompressed_len: u32,
    pub compressed_len: u32,
    pub tuple_count: u32,
}

impl FrameHeader {
    pub fn new(codec: Codec, uncompressed_len: u32, compressed_len: u32, tuple_count: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            codec,
            uncompressed_len,
            compressed_len,
            tuple_count,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(&self.magic.to_le_bytes());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(self.codec as u8);
        out.push(0u8); // reserved
        out.extend_from_slice(&self.uncompressed_len.to_le_bytes());
        out.extend_from_slice(&self.compressed_len.to_le_bytes());
        out.extend_from_slice(&self.tuple_count.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Storage("short frame header".into()));
        }
        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        let codec = Codec::from_u8(bytes[6])?;
        // bytes[7] reserved
        let uncompressed_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let compressed_len = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let tuple_count = u32::from_le_bytes(bytes[16..20].try_into().unwrap());

        if magic != MAGIC || version != VERSION {
            return Err(Error::Storage("bad magic/version".into()));
        }
        if uncompressed_len > MAX_FRAME_LEN || compressed_len > MAX_FRAME_LEN {
            return Err(Error::Storage(format!(
                "frame length out of range: {uncompressed_len}/{compressed_len}"
            )));
        }

        Ok(Self {
            magic,
            version,
            codec,
            uncompressed_len,
            compressed_len,
            tuple_count,
        })
    }
}

/// Encode tuples under `schema` into the flat payload format.
pub fn encode_tuples(schema: &Schema, tuples: &[Tuple]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(schema.tuple_size() * tuples.len());
    for tuple in tuples {
        if tuple.arity() != schema.arity() {
            return Err(Error::Codec(format!(
                "tuple arity {} does not match schema arity {}",
                tuple.arity(),
                schema.arity()
            )));
        }
        for (field, value) in schema.fields.iter().zip(tuple.values()) {
            match (field.data_type, value) {
                (DataType::Int32, Value::Int(v)) => out.extend_from_slice(&v.to_le_bytes()),
                (DataType::Float32, Value::Float(v)) => {
                    out.extend_from_slice(&v.to_bits().to_le_bytes())
                }
                (DataType::Utf8, Value::Str(s)) => {
                    let len = u16::try_from(s.len()).map_err(|_| {
                        Error::Codec(format!("string too long for field '{}'", field.name))
                    })?;
                    out.extend_from_slice(&len.to_le_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
                (dt, v) => {
                    return Err(Error::Codec(format!(
                        "value tag {:?} does not match {:?} for field '{}'",
                        v.data_type(),
                        dt,
                        field.name
                    )))
                }
            }
        }
    }
    Ok(out)
}

/// Decode `tuple_count` tuples from a payload produced by [`encode_tuples`].
pub fn decode_tuples(schema: &Schema, tuple_count: usize, bytes: &[u8]) -> Result<Vec<Tuple>> {
    let mut tuples = Vec::with_capacity(tuple_count);
    let mut pos = 0usize;
    for _ in 0..tuple_count {
        let mut values = Vec::with_capacity(schema.arity());
        for field in &schema.fields {
            match field.data_type {
                DataType::Int32 => {
                    let raw = take(bytes, &mut pos, 4)?;
                    values.push(Value::Int(i32::from_le_bytes(raw.try_into().unwrap())));
                }
                DataType::Float32 => {
                    let raw = take(bytes, &mut pos, 4)?;
                    values.push(Value::Float(f32::from_bits(u32::from_le_bytes(
                        raw.try_into().unwrap(),
                    ))));
                }
                DataType::Utf8 => {
                    let raw = take(bytes, &mut pos, 2)?;
                    let len = u16::from_le_bytes(raw.try_into().unwrap()) as usize;
                    let raw = take(bytes, &mut pos, len)?;
                    let s = std::str::from_utf8(raw)
                        .map_err(|e| Error::Codec(format!("invalid utf8: {e}")))?;
                    values.push(Value::Str(s.to_string()));
                }
            }
        }
        tuples.push(Tuple::new(values));
    }
    if pos != bytes.len() {
        return Err(Error::Codec(format!(
            "trailing bytes in frame payload: {} of {}",
            bytes.len() - pos,
            bytes.len()
        )));
    }
    Ok(tuples)
}

fn take<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| Error::Codec("truncated frame payload".into()))?;
    let out = &bytes[*pos..end];
    *pos = end;
    Ok(out)
}
