//! Generic CBOR value tree.
//!
//! COSE headers, CWT claims and the certificate payload are all decoded
//! into one [`CborValue`] representation; typed views (claims, certificate
//! entries) read from it instead of keeping their own copies.
//!
//! Decoding is strict:
//! - Rejects indefinite-length arrays, maps, byte and text strings.
//! - Rejects integers outside the `i64` range.
//! - Rejects trailing bytes after the top-level item.
//! - Limits nesting depth.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use minicbor::data::{Tag, Type};
use minicbor::{Decoder, Encoder};

use crate::error::VerifyError;

const MAX_DEPTH: usize = 32;

/// A decoded CBOR data item.
#[derive(Debug, Clone, PartialEq)]
pub enum CborValue {
    /// `null` or `undefined`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer in `i64` range.
    Integer(i64),
    /// Half, single or double precision float.
    Float(f64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// UTF-8 text string.
    Text(String),
    /// Array.
    Array(Vec<CborValue>),
    /// Map, in wire order.
    Map(Vec<(CborValue, CborValue)>),
    /// Tagged item.
    Tagged(u64, Box<CborValue>),
}

impl CborValue {
    /// Decode exactly one data item from `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, VerifyError> {
        if bytes.is_empty() {
            return Err(VerifyError::decode("empty CBOR input"));
        }
        let mut dec = Decoder::new(bytes);
        let value = Self::decode_from(&mut dec)?;
        if dec.position() != bytes.len() {
            return Err(VerifyError::decode("trailing bytes after CBOR item"));
        }
        Ok(value)
    }

    /// Decode one data item at the decoder's position.
    pub fn decode_from(dec: &mut Decoder<'_>) -> Result<Self, VerifyError> {
        decode_item(dec, 0).map_err(VerifyError::decode)
    }

    /// Encode this value as definite-length CBOR.
    pub fn to_vec(&self) -> Result<Vec<u8>, VerifyError> {
        let mut enc = Encoder::new(Vec::new());
        encode_item(self, &mut enc).map_err(|e| VerifyError::decode(e.to_string()))?;
        Ok(enc.into_writer())
    }

    /// Strip any number of enclosing tags.
    #[must_use]
    pub fn untagged(&self) -> &Self {
        let mut value = self;
        while let Self::Tagged(_, inner) = value {
            value = inner;
        }
        value
    }

    /// Look up a text key in a map.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.entries()?
            .iter()
            .find(|(k, _)| matches!(k.untagged(), Self::Text(t) if t == key))
            .map(|(_, v)| v.untagged())
    }

    /// Look up an integer key in a map.
    #[must_use]
    pub fn get_int(&self, key: i64) -> Option<&Self> {
        self.entries()?
            .iter()
            .find(|(k, _)| matches!(k.untagged(), Self::Integer(i) if *i == key))
            .map(|(_, v)| v.untagged())
    }

    /// Map entries, if this is a map.
    #[must_use]
    pub fn entries(&self) -> Option<&[(Self, Self)]> {
        match self.untagged() {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Array items, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self.untagged() {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Text content, if this is a text string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self.untagged() {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Byte content, if this is a byte string.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self.untagged() {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Integer value, if this is an integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self.untagged() {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value; integers widen to `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self.untagged() {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Convert to JSON for rule evaluation and display.
    ///
    /// Byte strings become standard base64 text, integer map keys become
    /// their decimal string, and tags are dropped.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Bytes(b) => Value::String(STANDARD.encode(b)),
            Self::Text(s) => Value::String(s.clone()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (json_key(k), v.to_json()))
                    .collect(),
            ),
            Self::Tagged(_, inner) => inner.to_json(),
        }
    }
}

fn json_key(key: &CborValue) -> String {
    match key.untagged() {
        CborValue::Text(s) => s.clone(),
        CborValue::Integer(i) => i.to_string(),
        other => other.to_json().to_string(),
    }
}

fn decode_item(dec: &mut Decoder<'_>, depth: usize) -> Result<CborValue, String> {
    if depth > MAX_DEPTH {
        return Err("CBOR nesting too deep".to_string());
    }

    match dec.datatype().map_err(|e| e.to_string())? {
        Type::Null => {
            dec.null().map_err(|e| e.to_string())?;
            Ok(CborValue::Null)
        }
        Type::Undefined => {
            dec.undefined().map_err(|e| e.to_string())?;
            Ok(CborValue::Null)
        }
        Type::Bool => Ok(CborValue::Bool(dec.bool().map_err(|e| e.to_string())?)),
        Type::U8
        | Type::U16
        | Type::U32
        | Type::U64
        | Type::I8
        | Type::I16
        | Type::I32
        | Type::I64 => {
            let i = dec
                .i64()
                .map_err(|e| format!("integer out of range: {e}"))?;
            Ok(CborValue::Integer(i))
        }
        Type::F16 => Ok(CborValue::Float(f64::from(
            dec.f16().map_err(|e| e.to_string())?,
        ))),
        Type::F32 => Ok(CborValue::Float(f64::from(
            dec.f32().map_err(|e| e.to_string())?,
        ))),
        Type::F64 => Ok(CborValue::Float(dec.f64().map_err(|e| e.to_string())?)),
        Type::Bytes => Ok(CborValue::Bytes(
            dec.bytes().map_err(|e| e.to_string())?.to_vec(),
        )),
        Type::String => Ok(CborValue::Text(
            dec.str().map_err(|e| e.to_string())?.to_string(),
        )),
        Type::Array => {
            let len = dec
                .array()
                .map_err(|e| format!("failed to read array: {e}"))?
                .ok_or_else(|| "indefinite-length arrays are not supported".to_string())?;
            let mut items = Vec::with_capacity(len.min(256) as usize);
            for _ in 0..len {
                items.push(decode_item(dec, depth + 1)?);
            }
            Ok(CborValue::Array(items))
        }
        Type::Map => {
            let len = dec
                .map()
                .map_err(|e| format!("failed to read map: {e}"))?
                .ok_or_else(|| "indefinite-length maps are not supported".to_string())?;
            let mut entries = Vec::with_capacity(len.min(256) as usize);
            for _ in 0..len {
                let key = decode_item(dec, depth + 1)?;
                let value = decode_item(dec, depth + 1)?;
                entries.push((key, value));
            }
            Ok(CborValue::Map(entries))
        }
        Type::Tag => {
            let tag = dec.tag().map_err(|e| e.to_string())?;
            let inner = decode_item(dec, depth + 1)?;
            Ok(CborValue::Tagged(tag.as_u64(), Box::new(inner)))
        }
        other => Err(format!("unsupported CBOR type: {other:?}")),
    }
}

fn encode_item(
    value: &CborValue,
    enc: &mut Encoder<Vec<u8>>,
) -> Result<(), minicbor::encode::Error<std::convert::Infallible>> {
    match value {
        CborValue::Null => {
            enc.null()?;
        }
        CborValue::Bool(b) => {
            enc.bool(*b)?;
        }
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
        CborValue::Array(items) => {
            enc.array(items.len() as u64)?;
            for item in items {
                encode_item(item, enc)?;
            }
        }
        CborValue::Map(entries) => {
            enc.map(entries.len() as u64)?;
            for (k, v) in entries {
                encode_item(k, enc)?;
                encode_item(v, enc)?;
            }
        }
        CborValue::Tagged(tag, inner) => {
            enc.tag(Tag::new(*tag))?;
            encode_item(inner, enc)?;
        }
    }
    Ok(())
}

/// Build a text-keyed map from `(key, value)` pairs.
#[must_use]
pub fn text_map<I>(entries: I) -> CborValue
where
    I: IntoIterator<Item = (&'static str, CborValue)>,
{
    CborValue::Map(
        entries
            .into_iter()
            .map(|(k, v)| (CborValue::Text(k.to_string()), v))
            .collect(),
    )
}

impl From<&str> for CborValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i64> for CborValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}
