use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, LittleEndian, NativeEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use serde::{Serialize, Serializer};

use crate::error::{FormatError, IoContext, Result};

/// Four-character chunk code packed into a comparable integer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub u32);

impl Tag {
    pub const fn new(code: &[u8; 4]) -> Self {
        Tag(u32::from_be_bytes(*code))
    }

    pub const fn from_chars(c0: u8, c1: u8, c2: u8, c3: u8) -> Self {
        Tag((c0 as u32) << 24 | (c1 as u32) << 16 | (c2 as u32) << 8 | c3 as u32)
    }

    pub const fn bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Printable form of the code; bytes outside printable ASCII become `.`.
    pub fn as_string(self) -> String {
        self.bytes()
            .iter()
            .map(|&b| {
                if b.is_ascii_graphic() || b == b' ' {
                    b as char
                } else {
                    '.'
                }
            })
            .collect()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.as_string())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({self})")
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_string())
    }
}

pub const TAG_PPBE: Tag = Tag::new(b"PPBE");
pub const TAG_PPLE: Tag = Tag::new(b"PPLE");
pub const TAG_LIST: Tag = Tag::new(b"LIST");
pub const TAG_BLANK: Tag = Tag::new(b"    ");
pub const TAG_HDR: Tag = Tag::new(b"hdr ");
pub const TAG_TOC: Tag = Tag::new(b"toc ");
pub const TAG_GRP: Tag = Tag::new(b"grp ");
pub const TAG_SET: Tag = Tag::new(b"set ");
pub const TAG_SCN: Tag = Tag::new(b"scn ");
pub const TAG_INFO: Tag = Tag::new(b"info");
pub const TAG_MREF: Tag = Tag::new(b"mref");

/// Form carried by the top-level Playprint chunk.
pub const FORM_MLRT: Tag = Tag::new(b"MLRT");
/// Form of the `LIST` wrapping one media reference.
pub const FORM_MRFL: Tag = Tag::new(b"MRFL");

fn is_form_tag(tag: Tag) -> bool {
    tag == TAG_PPBE || tag == TAG_PPLE || tag == TAG_LIST
}

/// Byte order of every multi-byte value in a Playprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ByteFormat {
    BigEndian,
    LittleEndian,
}

impl ByteFormat {
    pub fn host() -> Self {
        if cfg!(target_endian = "big") {
            ByteFormat::BigEndian
        } else {
            ByteFormat::LittleEndian
        }
    }

    /// Top-level tag announcing this byte order.
    pub fn form_tag(self) -> Tag {
        match self {
            ByteFormat::BigEndian => TAG_PPBE,
            ByteFormat::LittleEndian => TAG_PPLE,
        }
    }

    pub fn u32_from_bytes(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteFormat::BigEndian => u32::from_be_bytes(bytes),
            ByteFormat::LittleEndian => u32::from_le_bytes(bytes),
        }
    }

    pub fn u32_to_bytes(self, value: u32) -> [u8; 4] {
        match self {
            ByteFormat::BigEndian => value.to_be_bytes(),
            ByteFormat::LittleEndian => value.to_le_bytes(),
        }
    }

    pub fn write_u32<W: Write>(self, writer: &mut W, value: u32) -> io::Result<()> {
        match self {
            ByteFormat::BigEndian => writer.write_u32::<BigEndian>(value),
            ByteFormat::LittleEndian => writer.write_u32::<LittleEndian>(value),
        }
    }
}

pub fn swap_u32(value: u32) -> u32 {
    value.swap_bytes()
}

pub fn swap_u16(value: u16) -> u16 {
    value.swap_bytes()
}

/// Inspect the leading tag of a Playprint to learn its byte order.
///
/// The tag is stored as an integer in the file's own order, so a
/// little-endian Playprint starts with the bytes `ELPP`. The reader position
/// is left untouched.
pub fn detect_format<R: Read + Seek>(reader: &mut R) -> Result<ByteFormat> {
    let saved = reader
        .stream_position()
        .io_context("capturing stream position")?;
    reader
        .seek(SeekFrom::Start(0))
        .io_context("seeking to Playprint start")?;
    let raw = reader
        .read_u32::<BigEndian>()
        .io_context("reading Playprint form tag")?;
    reader
        .seek(SeekFrom::Start(saved))
        .io_context("restoring stream position")?;

    let tag = Tag(raw);
    if tag == TAG_PPBE {
        Ok(ByteFormat::BigEndian)
    } else if tag == Tag(swap_u32(TAG_PPLE.0)) {
        Ok(ByteFormat::LittleEndian)
    } else {
        Err(FormatError::UnknownForm(tag))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub tag: Tag,
    pub size: u32,
}

impl Chunk {
    /// Payload size including the pad byte that follows odd payloads.
    pub fn padded_size(&self) -> u64 {
        u64::from(self.size) + u64::from(self.size & 1)
    }
}

/// Location of a chunk produced by [`Navigator::descend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkInfo {
    pub chunk: Chunk,
    /// Form code for `PPBE`/`PPLE`/`LIST` chunks, blank otherwise.
    pub form: Tag,
    /// Byte offset of the payload (after the form code, when present).
    pub offset: u64,
    pub flags: u32,
}

impl ChunkInfo {
    pub fn is_form(&self) -> bool {
        is_form_tag(self.chunk.tag)
    }

    pub fn header_len(&self) -> u64 {
        if self.is_form() { 12 } else { 8 }
    }

    /// Offset of the first byte after the padded payload.
    pub fn end(&self) -> u64 {
        self.offset + self.chunk.padded_size()
    }
}

/// How [`Navigator::descend`] locates the chunk it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descend {
    /// Read the chunk header at the current position.
    Next,
    /// Scan the parent's payload for a chunk with this tag.
    Chunk(Tag),
    /// Scan the parent's payload for a `LIST` carrying this form.
    List(Tag),
    /// Require the top-level `PPBE`/`PPLE` chunk to carry this form.
    Form(Tag),
}

/// Recursive-descent reader over nested `(tag, size, [form], payload)` chunks.
#[derive(Debug)]
pub struct Navigator<R> {
    reader: R,
    format: ByteFormat,
    swap_read: bool,
}

impl<R: Read + Seek> Navigator<R> {
    pub fn new(reader: R, format: ByteFormat) -> Self {
        Self {
            reader,
            format,
            swap_read: format != ByteFormat::host(),
        }
    }

    pub fn byte_format(&self) -> ByteFormat {
        self.format
    }

    /// Whether values read from the file need swapping to host order.
    pub fn swap_read(&self) -> bool {
        self.swap_read
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    pub fn position(&mut self) -> Result<u64> {
        self.reader
            .stream_position()
            .io_context("querying stream position")
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.reader
            .seek(SeekFrom::Start(offset))
            .io_context("seeking within Playprint")?;
        Ok(())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let raw = self
            .reader
            .read_u32::<NativeEndian>()
            .io_context("reading 32-bit value")?;
        Ok(if self.swap_read { swap_u32(raw) } else { raw })
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let raw = self
            .reader
            .read_u16::<NativeEndian>()
            .io_context("reading 16-bit value")?;
        Ok(if self.swap_read { swap_u16(raw) } else { raw })
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).io_context("reading chunk payload")
    }

    /// Fail with `Truncated` unless `len` bytes exist from `offset` onwards.
    /// The stream position is left unchanged.
    pub fn ensure_available(&mut self, offset: u64, len: u64) -> Result<()> {
        let saved = self.position()?;
        let end = self
            .reader
            .seek(SeekFrom::End(0))
            .io_context("measuring stream length")?;
        self.seek_to(saved)?;
        let wanted = offset.saturating_add(len);
        if wanted > end {
            return Err(FormatError::Truncated {
                offset: end as usize,
                needed: (wanted - end) as usize,
            });
        }
        Ok(())
    }

    /// Read the whole payload of `info`, regardless of the current position.
    pub fn read_payload(&mut self, info: &ChunkInfo) -> Result<Vec<u8>> {
        self.ensure_available(info.offset, u64::from(info.chunk.size))?;
        self.seek_to(info.offset)?;
        let mut payload = vec![0u8; info.chunk.size as usize];
        self.read_exact(&mut payload)?;
        Ok(payload)
    }

    fn read_chunk(&mut self) -> Result<ChunkInfo> {
        let start = self.position()?;
        let tag = Tag(self.read_u32()?);
        let size = self.read_u32()?;
        let (form, header_len) = if is_form_tag(tag) {
            (Tag(self.read_u32()?), 12)
        } else {
            (TAG_BLANK, 8)
        };
        Ok(ChunkInfo {
            chunk: Chunk { tag, size },
            form,
            offset: start + header_len,
            flags: 0,
        })
    }

    fn scan<F>(&mut self, parent: &ChunkInfo, wanted: Tag, matches: F) -> Result<ChunkInfo>
    where
        F: Fn(&ChunkInfo) -> bool,
    {
        let limit = parent.offset + u64::from(parent.chunk.size);
        let mut cursor = parent.offset;
        self.seek_to(cursor)?;

        while cursor + 8 <= limit {
            let info = self.read_chunk()?;
            if info.offset + u64::from(info.chunk.size) > limit {
                // Child claims more bytes than the parent holds.
                break;
            }
            if matches(&info) {
                return Ok(info);
            }
            cursor = info.end();
            self.seek_to(cursor)?;
        }

        Err(FormatError::ChunkNotFound {
            wanted,
            parent: parent.chunk.tag,
        })
    }

    /// Locate a chunk and leave the stream at the start of its payload.
    ///
    /// Every successful call must be paired with [`Navigator::ascend`];
    /// [`Navigator::scoped`] does the pairing automatically.
    pub fn descend(&mut self, mode: Descend, parent: Option<&ChunkInfo>) -> Result<ChunkInfo> {
        let info = match mode {
            Descend::Next => self.read_chunk()?,
            Descend::Chunk(tag) => {
                let parent = parent.ok_or(FormatError::MissingParent)?;
                self.scan(parent, tag, |info| info.chunk.tag == tag)?
            }
            Descend::List(form) => {
                let parent = parent.ok_or(FormatError::MissingParent)?;
                self.scan(parent, form, |info| {
                    info.chunk.tag == TAG_LIST && info.form == form
                })?
            }
            Descend::Form(form) => {
                if parent.is_some() {
                    return Err(FormatError::UnexpectedParent);
                }
                self.seek_to(0)?;
                let info = self.read_chunk()?;
                let expected = self.format.form_tag();
                if info.chunk.tag != expected {
                    return Err(FormatError::UnknownForm(info.chunk.tag));
                }
                if info.form != form {
                    return Err(FormatError::ChunkNotFound {
                        wanted: form,
                        parent: expected,
                    });
                }
                info
            }
        };
        debug!(
            "descend {} form {} size {} payload @ {:#x}",
            info.chunk.tag, info.form, info.chunk.size, info.offset
        );
        Ok(info)
    }

    /// Seek just past the padded chunk, however much of it was consumed.
    pub fn ascend(&mut self, info: &ChunkInfo) -> Result<()> {
        self.seek_to(info.end())
    }

    /// Descend, run `body`, then ascend even if `body` failed.
    pub fn scoped<T, E, F>(&mut self, mode: Descend, parent: Option<&ChunkInfo>, body: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self, &ChunkInfo) -> Result<T, E>,
        E: From<FormatError>,
    {
        let info = self.descend(mode, parent)?;
        let outcome = body(self, &info);
        let ascended = self.ascend(&info);
        let value = outcome?;
        ascended?;
        Ok(value)
    }
}
