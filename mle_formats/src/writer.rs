//! In-memory Playprint builder used by mastering tools and fixtures.

use crate::chunk::{
    ByteFormat, FORM_MLRT, FORM_MRFL, TAG_GRP, TAG_HDR, TAG_INFO, TAG_LIST, TAG_MREF, TAG_SCN,
    TAG_SET, TAG_TOC, Tag,
};
use crate::playprint::{DppHeader, MediaRefChunk};

#[derive(Debug, Clone)]
pub struct PlayprintWriter {
    format: ByteFormat,
    header: DppHeader,
    /// Fully encoded chunks, headers and padding included.
    sections: Vec<Vec<u8>>,
}

impl PlayprintWriter {
    pub fn new(format: ByteFormat, header: DppHeader) -> Self {
        Self {
            format,
            header,
            sections: Vec::new(),
        }
    }

    pub fn byte_format(&self) -> ByteFormat {
        self.format
    }

    fn word(&self, out: &mut Vec<u8>, value: u32) {
        out.extend_from_slice(&self.format.u32_to_bytes(value));
    }

    fn chunk(&self, tag: Tag, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(payload.len() + 9);
        self.word(&mut out, tag.0);
        self.word(&mut out, payload.len() as u32);
        out.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn form_chunk(&self, tag: Tag, form: Tag, children: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(children.len() + 12);
        self.word(&mut out, tag.0);
        self.word(&mut out, children.len() as u32);
        self.word(&mut out, form.0);
        out.extend_from_slice(children);
        out
    }

    fn push(&mut self, encoded: Vec<u8>) -> u32 {
        self.sections.push(encoded);
        (self.sections.len() - 1) as u32
    }

    /// Add a `grp ` chunk, see [`crate::bytecode::Assembler::group_payload`].
    pub fn add_group(&mut self, payload: Vec<u8>) -> u32 {
        let encoded = self.chunk(TAG_GRP, &payload);
        self.push(encoded)
    }

    pub fn add_set(&mut self, payload: Vec<u8>) -> u32 {
        let encoded = self.chunk(TAG_SET, &payload);
        self.push(encoded)
    }

    pub fn add_scene(&mut self, scene_type: u32, groups: &[u32]) -> u32 {
        let mut payload = Vec::with_capacity(8 + groups.len() * 4);
        self.word(&mut payload, scene_type);
        self.word(&mut payload, groups.len() as u32);
        for &group in groups {
            self.word(&mut payload, group);
        }
        let encoded = self.chunk(TAG_SCN, &payload);
        self.push(encoded)
    }

    pub fn add_media_list(&mut self, flags: u32, type_index: u32, media: &[MediaRefChunk]) -> u32 {
        let mut info = Vec::with_capacity(12);
        self.word(&mut info, flags);
        self.word(&mut info, type_index);
        self.word(&mut info, media.len() as u32);
        let mut children = self.chunk(TAG_INFO, &info);

        for entry in media {
            let mut payload = Vec::with_capacity(12 + entry.data.len());
            self.word(&mut payload, entry.flags);
            self.word(&mut payload, entry.media_type);
            self.word(&mut payload, entry.data.len() as u32);
            payload.extend_from_slice(&entry.data);
            children.extend(self.chunk(TAG_MREF, &payload));
        }

        let encoded = self.form_chunk(TAG_LIST, FORM_MRFL, &children);
        self.push(encoded)
    }

    /// Add an arbitrary chunk; it still receives a TOC entry.
    pub fn add_raw(&mut self, tag: Tag, payload: &[u8]) -> u32 {
        let encoded = self.chunk(tag, payload);
        self.push(encoded)
    }

    /// Lay out form, header, TOC and sections. TOC labels equal their index.
    pub fn finish(self) -> Vec<u8> {
        let mut header = Vec::with_capacity(8);
        self.word(&mut header, self.header.version);
        self.word(&mut header, self.header.date);
        let header = self.chunk(TAG_HDR, &header);

        let toc_len = 8 + 4 + 8 * self.sections.len();
        let mut offset = 12 + header.len() + toc_len;
        let mut toc = Vec::with_capacity(toc_len - 8);
        self.word(&mut toc, self.sections.len() as u32);
        for (index, section) in self.sections.iter().enumerate() {
            self.word(&mut toc, index as u32);
            self.word(&mut toc, offset as u32);
            offset += section.len();
        }
        let toc = self.chunk(TAG_TOC, &toc);

        let mut children = header;
        children.extend(toc);
        for section in &self.sections {
            children.extend_from_slice(section);
        }
        self.form_chunk(self.format.form_tag(), FORM_MLRT, &children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_payloads_are_padded_before_the_next_sibling() {
        let mut writer = PlayprintWriter::new(ByteFormat::BigEndian, DppHeader { version: 1, date: 0 });
        writer.add_raw(Tag::new(b"odd "), &[1, 2, 3, 4, 5]);
        writer.add_raw(Tag::new(b"next"), &[]);
        let bytes = writer.finish();

        // form(12) + hdr(16) + toc(8 + 4 + 16)
        let first = 12 + 16 + 28;
        assert_eq!(&bytes[first..first + 4], b"odd ");
        let payload = first + 8;
        assert_eq!(bytes[payload + 5], 0);
        assert_eq!(&bytes[payload + 6..payload + 10], b"next");
        assert_eq!(bytes.len() % 2, 0);
    }

    #[test]
    fn little_endian_output_stores_tags_as_integers() {
        let writer = PlayprintWriter::new(ByteFormat::LittleEndian, DppHeader { version: 1, date: 0 });
        let bytes = writer.finish();
        assert_eq!(&bytes[0..4], b"ELPP");
        assert_eq!(&bytes[8..12], b"TRLM");
        assert_eq!(&bytes[12..16], b" rdh");
    }
}
