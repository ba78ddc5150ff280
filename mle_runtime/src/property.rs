use mle_formats::{ByteFormat, FormatError, vlq};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Unknown,
    MediaRef,
}

/// Raw property bytes copied out of a byte-code stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Property {
    pub kind: PropertyType,
    pub data: Vec<u8>,
}

impl Property {
    pub fn new(kind: PropertyType, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    pub fn unknown(data: Vec<u8>) -> Self {
        Self::new(PropertyType::Unknown, data)
    }

    /// Media references travel as the decimal text of their index.
    pub fn media_ref(index: u32) -> Self {
        Self::new(PropertyType::MediaRef, index.to_string().into_bytes())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn media_ref_index(&self) -> Option<u32> {
        if self.kind != PropertyType::MediaRef {
            return None;
        }
        std::str::from_utf8(&self.data).ok()?.parse().ok()
    }

    pub fn reader(&self, format: ByteFormat) -> PropertyReader<'_> {
        PropertyReader::new(&self.data, format)
    }
}

/// `count` fixed-width elements packed back to back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyArray {
    pub element_size: u32,
    pub count: u32,
    pub data: Vec<u8>,
}

impl PropertyArray {
    pub fn element(&self, index: u32) -> Option<&[u8]> {
        if index >= self.count || self.element_size == 0 {
            return None;
        }
        let size = self.element_size as usize;
        let start = index as usize * size;
        self.data.get(start..start + size)
    }

    pub fn elements(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(self.element_size.max(1) as usize)
    }
}

#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("unknown property {0}")]
    Unknown(String),
    #[error("property {name}: {reason}")]
    Invalid { name: String, reason: String },
    #[error(transparent)]
    Decode(#[from] FormatError),
}

/// Typed decoding of property payloads.
#[derive(Debug, Clone)]
pub struct PropertyReader<'a> {
    data: &'a [u8],
    offset: usize,
    format: ByteFormat,
}

impl<'a> PropertyReader<'a> {
    pub fn new(data: &'a [u8], format: ByteFormat) -> Self {
        Self {
            data,
            offset: 0,
            format,
        }
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        let rest = self.remaining();
        if rest.len() < len {
            return Err(FormatError::Truncated {
                offset: self.offset,
                needed: len - rest.len(),
            });
        }
        self.offset += len;
        Ok(&rest[..len])
    }

    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        let bytes = self.take(4)?;
        Ok(self
            .format
            .u32_from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, FormatError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_f32(&mut self) -> Result<f32, FormatError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_vlq(&mut self) -> Result<u64, FormatError> {
        let (value, used) = vlq::decode_u64(self.remaining())?;
        self.offset += used;
        Ok(value)
    }

    /// A VLQ byte count followed by UTF-8 text.
    pub fn read_string(&mut self) -> Result<String, FormatError> {
        let len = self.read_vlq()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_ref_properties_hold_decimal_text() {
        let property = Property::media_ref(42);
        assert_eq!(property.data, b"42".to_vec());
        assert_eq!(property.len(), 2);
        assert_eq!(property.media_ref_index(), Some(42));
        assert_eq!(Property::unknown(b"42".to_vec()).media_ref_index(), None);
    }

    #[test]
    fn reader_decodes_mixed_payloads() {
        let mut data = Vec::new();
        data.extend_from_slice(&7u32.to_le_bytes());
        data.extend_from_slice(&1.5f32.to_bits().to_le_bytes());
        vlq::encode_u64(5, &mut data);
        data.extend_from_slice(b"hello");
        let property = Property::unknown(data);

        let mut reader = property.reader(ByteFormat::LittleEndian);
        assert_eq!(reader.read_u32().unwrap(), 7);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert_eq!(reader.read_string().unwrap(), "hello");
        assert!(reader.remaining().is_empty());
        assert!(reader.read_u32().is_err());
    }

    #[test]
    fn array_elements_split_on_element_size() {
        let array = PropertyArray {
            element_size: 2,
            count: 3,
            data: vec![1, 2, 3, 4, 5, 6],
        };
        assert_eq!(array.element(1), Some(&[3u8, 4][..]));
        assert_eq!(array.element(3), None);
        assert_eq!(array.elements().count(), 3);
    }
}
