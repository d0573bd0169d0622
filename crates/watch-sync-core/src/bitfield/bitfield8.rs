use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::{Read, Write};
use super::BitfieldError;

/// zlib level used when encoding; decoding accepts any level
const COMPRESSION_LEVEL: u32 = 6;

/// Growable bit array backed by bytes, least significant bit first.
///
/// Bit `i` lives in `bytes[i / 8]` at position `i % 8`. The text form is
/// base64 (standard alphabet, padded) of the zlib-compressed bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BitField8 {
    length: usize,
    values: Vec<u8>,
}

fn bytes_for(length: usize) -> usize {
    length.div_ceil(8)
}

impl BitField8 {
    /// All-false plane of `length` bits
    pub fn new(length: usize) -> Self {
        Self {
            length,
            values: vec![0; bytes_for(length)],
        }
    }

    /// Plane over existing bytes. A `length` of 0 means `values.len() * 8`.
    pub fn with_values(mut values: Vec<u8>, length: usize) -> Self {
        let length = if length == 0 { values.len() * 8 } else { length };
        let needed = bytes_for(length);
        if needed > values.len() {
            values.resize(needed, 0);
        }
        Self { length, values }
    }

    /// Decode the text form, sizing the plane from `length` (0 = from payload)
    pub fn from_encoded(encoded: &str, length: usize) -> Result<Self, BitfieldError> {
        let packed = STANDARD.decode(encoded.trim())?;
        let mut decoder = ZlibDecoder::new(&packed[..]);
        let mut values = Vec::new();
        decoder.read_to_end(&mut values)?;
        Ok(Self::with_values(values, length))
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.values
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.values
    }

    /// Out-of-range reads are false
    pub fn get(&self, i: usize) -> bool {
        self.values
            .get(i / 8)
            .map(|byte| (byte >> (i % 8)) & 1 != 0)
            .unwrap_or(false)
    }

    /// Setting past the end grows the store; the length then covers every byte
    pub fn set(&mut self, i: usize, value: bool) {
        let index = i / 8;
        if index >= self.values.len() {
            self.values.resize(index + 1, 0);
            self.length = self.values.len() * 8;
        }

        let mask = 1u8 << (i % 8);
        if value {
            self.values[index] |= mask;
        } else {
            self.values[index] &= !mask;
        }
    }

    pub fn first_index_of(&self, value: bool) -> Option<usize> {
        (0..self.length).find(|&i| self.get(i) == value)
    }

    pub fn last_index_of(&self, value: bool) -> Option<usize> {
        (0..self.length).rev().find(|&i| self.get(i) == value)
    }

    pub fn encode(&self) -> Result<String, BitfieldError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(COMPRESSION_LEVEL));
        encoder.write_all(&self.values)?;
        let packed = encoder.finish()?;
        Ok(STANDARD.encode(packed))
    }
}

impl fmt::Display for BitField8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.encode().map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl Serialize for BitField8 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = self.encode().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for BitField8 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Self::from_encoded(&encoded, 0).map_err(serde::de::Error::custom)
    }
}
