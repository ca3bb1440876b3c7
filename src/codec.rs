/*
 * Copyright 2024 Google LLC
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Logic for reading and writing the Protocol Buffers wire format.

use std::sync::atomic::{AtomicU32, Ordering};

use bytes::BufMut;

/// A varint never occupies more than ten bytes.
const MAX_VARINT_LEN: usize = 10;
/// Field numbers are limited to 29 bits on the wire.
const MAX_TAG: u64 = (1 << 29) - 1;

type Result<T, E = MalformedEncoding> = std::result::Result<T, E>;

/// How a field's payload is laid out on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
}

impl WireType {
    fn new(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::Varint),
            1 => Some(Self::Fixed64),
            2 => Some(Self::LengthDelimited),
            5 => Some(Self::Fixed32),
            _ => None,
        }
    }

    const fn discriminant(self) -> u64 {
        match self {
            Self::Varint => 0,
            Self::Fixed64 => 1,
            Self::LengthDelimited => 2,
            Self::Fixed32 => 5,
        }
    }
}

/// An error encountered while decoding wire-format bytes.
///
/// Decoding surfaces these to the immediate caller; whether to retry
/// with fresh bytes is the caller's call.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum MalformedEncoding {
    #[error("input ended in the middle of a varint")]
    TruncatedVarint,
    #[error("varint occupies more than ten bytes")]
    VarintOverflow,
    #[error("invalid field tag {0}")]
    InvalidTag(u64),
    #[error("field tag {tag} carries unsupported wire type {wire_type}")]
    InvalidWireType { tag: u32, wire_type: u64 },
    #[error("field length {declared} exceeds the {available} remaining bytes")]
    TruncatedField { declared: usize, available: usize },
    #[error("`{field}` payload is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
}

/// Cursor over an encoded message.
///
/// Reads never advance past the end of the buffer; every primitive
/// reports truncation instead.
pub struct WireReader<'buf> {
    buf: &'buf [u8],
    offset: usize,
}

impl<'buf> WireReader<'buf> {
    pub fn new(buf: &'buf [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.offset < self.buf.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// Current position from the start of the buffer.
    #[inline]
    pub fn position(&self) -> usize {
        self.offset
    }

    /// The bytes consumed since `start`, verbatim.
    #[inline]
    pub fn consumed_since(&self, start: usize) -> &'buf [u8] {
        &self.buf[start..self.offset]
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for count in 0..MAX_VARINT_LEN {
            let Some(&byte) = self.buf.get(self.offset) else {
                return Err(MalformedEncoding::TruncatedVarint);
            };
            self.offset += 1;
            value |= u64::from(byte & 0x7f) << (count * 7);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }

        Err(MalformedEncoding::VarintOverflow)
    }

    /// Reads a field key, splitting it into tag and wire type.
    pub fn read_key(&mut self) -> Result<(u32, WireType)> {
        let key = self.read_varint()?;
        let tag = key >> 3;
        if tag == 0 || tag > MAX_TAG {
            return Err(MalformedEncoding::InvalidTag(tag));
        }

        let wire_type = WireType::new(key & 0x07).ok_or(MalformedEncoding::InvalidWireType {
            tag: tag as u32,
            wire_type: key & 0x07,
        })?;

        Ok((tag as u32, wire_type))
    }

    /// Reads a length prefix and returns the payload it delimits.
    pub fn read_length_delimited(&mut self) -> Result<&'buf [u8]> {
        let declared = self.read_varint()? as usize;
        let available = self.remaining();
        if declared > available {
            return Err(MalformedEncoding::TruncatedField {
                declared,
                available,
            });
        }

        let start = self.offset;
        self.offset += declared;
        Ok(&self.buf[start..self.offset])
    }

    /// Consumes a value of the given wire type without interpreting it.
    pub fn skip_value(&mut self, wire_type: WireType) -> Result<()> {
        match wire_type {
            WireType::Varint => self.read_varint().map(drop),
            WireType::Fixed64 => self.advance(8),
            WireType::LengthDelimited => self.read_length_delimited().map(drop),
            WireType::Fixed32 => self.advance(4),
        }
    }

    fn advance(&mut self, len: usize) -> Result<()> {
        let available = self.remaining();
        if len > available {
            return Err(MalformedEncoding::TruncatedField {
                declared: len,
                available,
            });
        }

        self.offset += len;
        Ok(())
    }
}

pub fn put_varint(buf: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8(value as u8 | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

pub fn put_key(buf: &mut impl BufMut, tag: u32, wire_type: WireType) {
    put_varint(buf, u64::from(tag) << 3 | wire_type.discriminant());
}

/// Writes a length-delimited string field.
pub fn put_string(buf: &mut impl BufMut, tag: u32, value: &str) {
    put_key(buf, tag, WireType::LengthDelimited);
    put_varint(buf, value.len() as u64);
    buf.put_slice(value.as_bytes());
}

pub const fn varint_len(value: u64) -> usize {
    ((u64::BITS - (value | 1).leading_zeros() + 6) / 7) as usize
}

pub const fn key_len(tag: u32) -> usize {
    varint_len((tag as u64) << 3)
}

/// Encoded length of a string field, key included.
pub fn string_len(tag: u32, value: &str) -> usize {
    key_len(tag) + varint_len(value.len() as u64) + value.len()
}

/// Memoized serialized length of a message instance.
///
/// This is runtime bookkeeping, not message data: clones start out
/// empty and equality of the owning message must ignore it. Relaxed
/// ordering suffices since a stale read only costs a recomputation.
#[derive(Debug, Default)]
pub(crate) struct CachedSize(AtomicU32);

impl CachedSize {
    const UNSET: u32 = 0;

    pub(crate) fn get_or_compute(&self, compute: impl FnOnce() -> usize) -> usize {
        match self.0.load(Ordering::Relaxed) {
            Self::UNSET => {
                let len = compute();
                // Lengths beyond u32 range are simply not cached.
                if let Ok(stored) = u32::try_from(len + 1) {
                    self.0.store(stored, Ordering::Relaxed);
                }
                len
            }
            stored => stored as usize - 1,
        }
    }

    pub(crate) fn invalidate(&self) {
        self.0.store(Self::UNSET, Ordering::Relaxed);
    }
}

impl Clone for CachedSize {
    fn clone(&self) -> Self {
        Self::default()
    }
}
