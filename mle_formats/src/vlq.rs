//! Variable-length integers: seven value bits per byte, least significant
//! group first, `0x80` set on every byte except the last.

use std::io::{Read, Write};

use crate::error::{FormatError, IoContext, Result};

const CONTINUATION: u8 = 0x80;
const VALUE_MASK: u8 = 0x7f;

/// Longest encoding of a `u64` (ten 7-bit groups).
pub const MAX_LEN: usize = 10;

pub fn encode_u64(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value as u8) & VALUE_MASK;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | CONTINUATION);
    }
}

pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Decode one value from the front of `bytes`, returning it with the number
/// of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    for (index, &byte) in bytes.iter().enumerate() {
        let shift = 7 * index as u32;
        let group = u64::from(byte & VALUE_MASK);
        if shift >= 64 || (shift > 0 && group >> (64 - shift) != 0) {
            return Err(FormatError::VlqOverflow { bits: 64 });
        }
        value |= group << shift;
        if byte & CONTINUATION == 0 {
            return Ok((value, index + 1));
        }
    }
    Err(FormatError::Truncated {
        offset: bytes.len(),
        needed: 1,
    })
}

pub fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let mut byte = [0u8; 1];
        reader
            .read_exact(&mut byte)
            .io_context("reading variable-length integer")?;
        value |= u64::from(byte[0] & VALUE_MASK) << shift;
        if value > u64::from(u32::MAX) {
            return Err(FormatError::VlqOverflow { bits: 32 });
        }
        if byte[0] & CONTINUATION == 0 {
            return Ok(value as u32);
        }
        shift += 7;
        if shift >= 35 {
            return Err(FormatError::VlqOverflow { bits: 32 });
        }
    }
}

pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<()> {
    let mut buf = Vec::with_capacity(5);
    encode_u64(u64::from(value), &mut buf);
    writer
        .write_all(&buf)
        .io_context("writing variable-length integer")
}
