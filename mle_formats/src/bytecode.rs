//! Opcode streams embedded in group and set chunks.
//!
//! Opcodes occupy the byte range `0x80..=0x8e`. Operands are either fixed
//! 32-bit values in the container byte order or "indices": big-endian groups
//! of seven bits with the high bit clear, terminated by the next opcode.

use std::convert::TryFrom;
use std::fmt;

use crate::chunk::ByteFormat;
use crate::error::{FormatError, Result};
use crate::vlq;

const OPCODE_BIT: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    BeginActorSet = 0x80,
    CreateActor = 0x81,
    SetSet = 0x82,
    BindRole = 0x83,
    ParentRole = 0x84,
    ChildRole = 0x85,
    SetPropertyOffset = 0x86,
    SetPropertyLength = 0x87,
    CopyProperty = 0x88,
    CopyMediaRef = 0x89,
    EndActorGroup = 0x8a,
    CopyDynamicProperty = 0x8b,
    CopyArrayProperty = 0x8c,
    CreateSet = 0x8d,
    EndSet = 0x8e,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Opcode::BeginActorSet => "beginActorSet",
            Opcode::CreateActor => "createActor",
            Opcode::SetSet => "setSet",
            Opcode::BindRole => "bindRole",
            Opcode::ParentRole => "parentRole",
            Opcode::ChildRole => "childRole",
            Opcode::SetPropertyOffset => "setPropertyOffset",
            Opcode::SetPropertyLength => "setPropertyLength",
            Opcode::CopyProperty => "copyProperty",
            Opcode::CopyMediaRef => "copyMediaRef",
            Opcode::EndActorGroup => "endActorGroup",
            Opcode::CopyDynamicProperty => "copyDynamicProperty",
            Opcode::CopyArrayProperty => "copyArrayProperty",
            Opcode::CreateSet => "createSet",
            Opcode::EndSet => "endSet",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x80 => Ok(Self::BeginActorSet),
            0x81 => Ok(Self::CreateActor),
            0x82 => Ok(Self::SetSet),
            0x83 => Ok(Self::BindRole),
            0x84 => Ok(Self::ParentRole),
            0x85 => Ok(Self::ChildRole),
            0x86 => Ok(Self::SetPropertyOffset),
            0x87 => Ok(Self::SetPropertyLength),
            0x88 => Ok(Self::CopyProperty),
            0x89 => Ok(Self::CopyMediaRef),
            0x8a => Ok(Self::EndActorGroup),
            0x8b => Ok(Self::CopyDynamicProperty),
            0x8c => Ok(Self::CopyArrayProperty),
            0x8d => Ok(Self::CreateSet),
            0x8e => Ok(Self::EndSet),
            _ => Err(()),
        }
    }
}

/// Read position within one chunk's decoded payload.
#[derive(Debug, Clone)]
pub struct ChunkCursor<'a> {
    stream: &'a [u8],
    offset: usize,
    format: ByteFormat,
}

impl<'a> ChunkCursor<'a> {
    pub fn new(stream: &'a [u8], format: ByteFormat) -> Self {
        Self {
            stream,
            offset: 0,
            format,
        }
    }

    pub fn byte_format(&self) -> ByteFormat {
        self.format
    }

    pub fn position(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.stream.len() - self.offset
    }

    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.stream.len()
    }

    pub fn next_byte(&mut self) -> Result<u8> {
        let byte = *self
            .stream
            .get(self.offset)
            .ok_or(FormatError::Truncated {
                offset: self.offset,
                needed: 1,
            })?;
        self.offset += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        if len > available {
            return Err(FormatError::Truncated {
                offset: self.offset,
                needed: len - available,
            });
        }
        let slice = &self.stream[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(self
            .format
            .u32_from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Decode an index operand. The opcode byte that ends it is left unread.
    pub fn read_index(&mut self) -> Result<u32> {
        let start = self.offset;
        let mut value = 0u32;
        loop {
            let byte = self.next_byte()?;
            if byte & OPCODE_BIT != 0 {
                self.offset -= 1;
                return Ok(value);
            }
            if value > (i32::MAX as u32) >> 7 {
                return Err(FormatError::IndexOverflow { offset: start });
            }
            value = (value << 7) | u32::from(byte);
        }
    }
}

/// Append `value` as an index operand: most significant group first.
pub fn encode_index(value: u32, out: &mut Vec<u8>) {
    let groups = vlq::encoded_len(u64::from(value));
    for group in (0..groups).rev() {
        out.push(((value >> (7 * group)) & 0x7f) as u8);
    }
}

/// Builds opcode streams for mastering tools and fixtures.
#[derive(Debug, Clone)]
pub struct Assembler {
    format: ByteFormat,
    stream: Vec<u8>,
}

impl Assembler {
    pub fn new(format: ByteFormat) -> Self {
        Self {
            format,
            stream: Vec::new(),
        }
    }

    fn op(&mut self, opcode: Opcode) -> &mut Self {
        self.stream.push(opcode as u8);
        self
    }

    fn index(&mut self, value: u32) -> &mut Self {
        encode_index(value, &mut self.stream);
        self
    }

    fn word(&mut self, value: u32) -> &mut Self {
        let bytes = self.format.u32_to_bytes(value);
        self.stream.extend_from_slice(&bytes);
        self
    }

    pub fn create_actor(&mut self, type_index: u32) -> &mut Self {
        self.op(Opcode::CreateActor).index(type_index)
    }

    pub fn set_set(&mut self, set_index: u32) -> &mut Self {
        self.op(Opcode::SetSet).index(set_index)
    }

    pub fn bind_role(&mut self, role_type: u32) -> &mut Self {
        self.op(Opcode::BindRole).index(role_type)
    }

    pub fn parent_role(&mut self, slot: u32) -> &mut Self {
        self.op(Opcode::ParentRole).index(slot)
    }

    pub fn child_role(&mut self, slot: u32) -> &mut Self {
        self.op(Opcode::ChildRole).index(slot)
    }

    pub fn set_property_offset(&mut self, property: u32) -> &mut Self {
        self.op(Opcode::SetPropertyOffset).index(property)
    }

    pub fn set_property_length(&mut self, length: u32) -> &mut Self {
        self.op(Opcode::SetPropertyLength).index(length)
    }

    /// Raw bytes; their count must match the preceding property length.
    pub fn copy_property(&mut self, data: &[u8]) -> &mut Self {
        self.op(Opcode::CopyProperty);
        self.stream.extend_from_slice(data);
        self
    }

    pub fn copy_dynamic_property(&mut self, data: &[u8]) -> &mut Self {
        self.op(Opcode::CopyDynamicProperty).word(data.len() as u32);
        self.stream.extend_from_slice(data);
        self
    }

    /// `data` holds `count` elements of the preceding property length.
    pub fn copy_array_property(&mut self, count: u32, data: &[u8]) -> &mut Self {
        self.op(Opcode::CopyArrayProperty).word(count);
        self.stream.extend_from_slice(data);
        self
    }

    pub fn copy_media_ref(&mut self, media_index: u32) -> &mut Self {
        self.op(Opcode::CopyMediaRef).index(media_index)
    }

    pub fn create_set(&mut self, type_index: u32) -> &mut Self {
        self.op(Opcode::CreateSet).index(type_index)
    }

    pub fn end_actor_group(&mut self) -> &mut Self {
        self.op(Opcode::EndActorGroup)
    }

    pub fn end_set(&mut self) -> &mut Self {
        self.op(Opcode::EndSet)
    }

    /// Append a byte verbatim, e.g. to produce deliberately corrupt streams.
    pub fn raw(&mut self, byte: u8) -> &mut Self {
        self.stream.push(byte);
        self
    }

    pub fn stream(&self) -> &[u8] {
        &self.stream
    }

    /// Payload of a `grp ` chunk: group type, actor count, then the stream.
    pub fn group_payload(&self, group_type: u32, actor_count: u32) -> Vec<u8> {
        let mut payload = self.format.u32_to_bytes(group_type).to_vec();
        encode_index(actor_count, &mut payload);
        payload.extend_from_slice(&self.stream);
        payload
    }

    /// Payload of a `set ` chunk, which carries no type prefix.
    pub fn set_payload(&self) -> Vec<u8> {
        self.stream.clone()
    }
}
