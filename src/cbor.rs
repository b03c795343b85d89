//! CBOR encoding and decoding of [`CborValue`] trees.
//!
//! Maps keep their keys as an ordered structure and tags are preserved as
//! explicit tag/value pairs, so sub-claim codecs see the exact wire shape.

use crate::error::Error;
use crate::header::{CborValue, HeaderMap};
use minicbor::data::{Tag, Type};
use minicbor::{Decoder, Encoder};
use std::collections::BTreeMap;

/// Encode a value to CBOR bytes
pub fn encode_value(value: &CborValue) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);
    encode_cbor_value(value, &mut enc)?;
    Ok(buf)
}

/// Encode an integer-keyed map to CBOR bytes
pub fn encode_map(map: &HeaderMap) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);
    encode_map_direct(map, &mut enc)?;
    Ok(buf)
}

/// Encode a CBOR value directly to the encoder
pub(crate) fn encode_cbor_value(
    value: &CborValue,
    enc: &mut Encoder<&mut Vec<u8>>,
) -> Result<(), Error> {
    match value {
        CborValue::Integer(i) => {
            enc.i64(*i)?;
        }
        CborValue::Float(f) => {
            enc.f64(*f)?;
        }
        CborValue::Bytes(b) => {
            enc.bytes(b)?;
        }
        CborValue::Text(s) => {
            enc.str(s)?;
        }
        CborValue::Bool(b) => {
            enc.bool(*b)?;
        }
        CborValue::Map(nested_map) => {
            encode_map_direct(nested_map, enc)?;
        }
        CborValue::TextMap(nested_map) => {
            enc.map(nested_map.len() as u64)?;
            for (key, value) in nested_map {
                enc.str(key)?;
                encode_cbor_value(value, enc)?;
            }
        }
        CborValue::Array(arr) => {
            enc.array(arr.len() as u64)?;
            for item in arr {
                encode_cbor_value(item, enc)?;
            }
        }
        CborValue::Tag(tag, inner) => {
            enc.tag(Tag::new(*tag))?;
            encode_cbor_value(inner, enc)?;
        }
        CborValue::Null => {
            enc.null()?;
        }
    }
    Ok(())
}

pub(crate) fn encode_map_direct(
    map: &HeaderMap,
    enc: &mut Encoder<&mut Vec<u8>>,
) -> Result<(), Error> {
    enc.map(map.len() as u64)?;

    for (key, value) in map {
        enc.i32(*key)?;
        encode_cbor_value(value, enc)?;
    }

    Ok(())
}

/// Decode a single CBOR value from bytes
pub fn decode_value(bytes: &[u8]) -> Result<CborValue, Error> {
    let mut dec = Decoder::new(bytes);
    decode_cbor_value(&mut dec)
}

/// Decode an integer-keyed map from CBOR bytes
pub fn decode_map(bytes: &[u8]) -> Result<HeaderMap, Error> {
    match decode_value(bytes)? {
        CborValue::Map(map) => Ok(map),
        other => Err(Error::InvalidFormat(format!(
            "Expected integer-keyed map, got {}",
            other.type_name()
        ))),
    }
}

/// Deepest array/map/tag nesting accepted on decode
const MAX_DEPTH: usize = 16;

/// Decode the next CBOR value from the decoder
pub(crate) fn decode_cbor_value(dec: &mut Decoder<'_>) -> Result<CborValue, Error> {
    decode_nested(dec, 0)
}

fn decode_nested(dec: &mut Decoder<'_>, depth: usize) -> Result<CborValue, Error> {
    if depth > MAX_DEPTH {
        return Err(Error::InvalidFormat("CBOR nesting too deep".to_string()));
    }
    let datatype = dec.datatype()?;

    let value = match datatype {
        Type::U8 | Type::U16 | Type::U32 | Type::I8 | Type::I16 | Type::I32 | Type::I64 => {
            CborValue::Integer(dec.i64()?)
        }
        Type::U64 => {
            let u = dec.u64()?;
            let i = i64::try_from(u)
                .map_err(|_| Error::InvalidFormat(format!("Integer out of range: {u}")))?;
            CborValue::Integer(i)
        }
        Type::Int => {
            return Err(Error::InvalidFormat(
                "Integer out of 64-bit range".to_string(),
            ))
        }
        Type::F16 | Type::F32 | Type::F64 => CborValue::Float(dec.f64()?),
        Type::Bytes => CborValue::Bytes(dec.bytes()?.to_vec()),
        Type::String => CborValue::Text(dec.str()?.to_string()),
        Type::Bool => CborValue::Bool(dec.bool()?),
        Type::Null => {
            dec.null()?;
            CborValue::Null
        }
        Type::Array => decode_array(dec, depth + 1)?,
        Type::Map => decode_map_direct(dec, depth + 1)?,
        Type::Tag => {
            let tag = dec.tag()?;
            let inner = decode_nested(dec, depth + 1)?;
            CborValue::Tag(tag.as_u64(), Box::new(inner))
        }
        other => {
            return Err(Error::InvalidFormat(format!(
                "Unsupported CBOR type: {other:?}"
            )))
        }
    };

    Ok(value)
}

/// Decode a CBOR array
fn decode_array(dec: &mut Decoder<'_>, depth: usize) -> Result<CborValue, Error> {
    let array_len = dec.array()?.ok_or_else(|| {
        Error::InvalidFormat("Indefinite-length arrays are not supported".to_string())
    })?;
    let mut array = Vec::with_capacity(array_len.min(64) as usize);

    for _ in 0..array_len {
        array.push(decode_nested(dec, depth)?);
    }

    Ok(CborValue::Array(array))
}

/// Decode a CBOR map; the first key decides between integer and text keys
fn decode_map_direct(dec: &mut Decoder<'_>, depth: usize) -> Result<CborValue, Error> {
    let map_len = dec.map()?.ok_or_else(|| {
        Error::InvalidFormat("Indefinite-length maps are not supported".to_string())
    })?;

    if map_len == 0 {
        return Ok(CborValue::Map(BTreeMap::new()));
    }

    if dec.datatype()? == Type::String {
        let mut map = BTreeMap::new();
        for _ in 0..map_len {
            let key = dec.str()?.to_string();
            let value = decode_nested(dec, depth)?;
            map.insert(key, value);
        }
        return Ok(CborValue::TextMap(map));
    }

    let mut map = HeaderMap::new();
    for _ in 0..map_len {
        let key = dec.i32()?;
        let value = decode_nested(dec, depth)?;
        map.insert(key, value);
    }

    Ok(CborValue::Map(map))
}
