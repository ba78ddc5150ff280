use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use log::debug;
use memmap2::{Mmap, MmapOptions};
use serde::Serialize;

use crate::chunk::{
    ByteFormat, ChunkInfo, Descend, FORM_MLRT, FORM_MRFL, Navigator, TAG_GRP, TAG_HDR, TAG_INFO,
    TAG_LIST, TAG_MREF, TAG_SCN, TAG_SET, TAG_TOC, Tag, detect_format,
};
use crate::error::{FormatError, IoContext, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DppHeader {
    pub version: u32,
    pub date: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TocEntry {
    pub label: u32,
    /// Absolute offset of the entry's chunk header.
    pub offset: u32,
}

/// Fixed-capacity, append-only table of contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toc {
    reserved: usize,
    entries: Vec<TocEntry>,
}

impl Toc {
    pub fn with_capacity(reserved: usize) -> Result<Self> {
        if reserved == 0 {
            return Err(FormatError::EmptyToc);
        }
        Ok(Self {
            reserved,
            entries: Vec::with_capacity(reserved),
        })
    }

    /// Append an entry and return its index.
    pub fn add(&mut self, label: u32, offset: u32) -> Result<u32> {
        if self.entries.len() >= self.reserved {
            return Err(FormatError::TocOverflow {
                reserved: self.reserved,
            });
        }
        self.entries.push(TocEntry { label, offset });
        Ok((self.entries.len() - 1) as u32)
    }

    pub fn offset(&self, index: u32) -> Result<u32> {
        let entry = self
            .entries
            .get(index as usize)
            .ok_or(FormatError::TocIndex {
                index,
                used: self.entries.len(),
            })?;
        if entry.offset == 0 {
            return Err(FormatError::InvalidTocOffset { index });
        }
        Ok(entry.offset)
    }

    pub fn entries(&self) -> &[TocEntry] {
        &self.entries
    }

    pub fn reserved(&self) -> usize {
        self.reserved
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Contents of the `info` chunk opening a media reference list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaRefInfo {
    pub flags: u32,
    pub type_index: u32,
    pub count: u32,
}

/// One `mref` chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaRefChunk {
    pub flags: u32,
    pub media_type: u32,
    pub data: Vec<u8>,
}

impl MediaRefChunk {
    /// External references carry a filename instead of inline media.
    pub fn is_external(&self) -> bool {
        self.flags == 0
    }

    pub fn filename(&self) -> Option<&str> {
        if self.is_external() {
            std::str::from_utf8(&self.data).ok()
        } else {
            None
        }
    }
}

/// Reader for a Playprint container.
///
/// Section reads are strictly descend, decode, ascend, so a failed decode
/// never leaves the stream inside a chunk.
#[derive(Debug)]
pub struct Playprint<R> {
    nav: Navigator<R>,
    path: Option<PathBuf>,
    form: Option<ChunkInfo>,
    header: Option<DppHeader>,
    toc: Option<Toc>,
    pending_toc: Option<Toc>,
    mref_list: Option<ChunkInfo>,
}

impl Playprint<Cursor<Mmap>> {
    /// Memory-map a Playprint file and read its header and TOC.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf).io_context("opening Playprint")?;
        let mmap = unsafe { MmapOptions::new().map(&file) }.io_context("memory-mapping Playprint")?;
        let mut playprint = Self::load(Cursor::new(mmap))?;
        playprint.path = Some(path_buf);
        Ok(playprint)
    }
}

impl<R: Read + Seek> Playprint<R> {
    /// Wrap a reader, detecting the byte format from the leading tag.
    pub fn new(mut reader: R) -> Result<Self> {
        let format = detect_format(&mut reader)?;
        debug!("Playprint byte format {format:?}");
        Ok(Self {
            nav: Navigator::new(reader, format),
            path: None,
            form: None,
            header: None,
            toc: None,
            pending_toc: None,
            mref_list: None,
        })
    }

    /// Open the container and consume its header and TOC.
    pub fn load(reader: R) -> Result<Self> {
        let mut playprint = Self::new(reader)?;
        playprint.begin()?;
        playprint.read_header()?;
        playprint.read_toc()?;
        Ok(playprint)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn byte_format(&self) -> ByteFormat {
        self.nav.byte_format()
    }

    pub fn header(&self) -> Option<DppHeader> {
        self.header
    }

    pub fn toc(&self) -> Option<&Toc> {
        self.toc.as_ref()
    }

    /// Descend into the top-level `MLRT` form.
    pub fn begin(&mut self) -> Result<()> {
        let form = self.nav.descend(Descend::Form(FORM_MLRT), None)?;
        self.form = Some(form);
        Ok(())
    }

    /// Leave the top-level form and hand back the underlying reader.
    pub fn end(mut self) -> Result<R> {
        let form = self.form.take().ok_or(FormatError::NotStarted)?;
        self.nav.ascend(&form)?;
        Ok(self.nav.into_inner())
    }

    fn form(&self) -> Result<ChunkInfo> {
        self.form.ok_or(FormatError::NotStarted)
    }

    fn expect_next(&mut self, expected: Tag) -> Result<ChunkInfo> {
        let info = self.nav.descend(Descend::Next, None)?;
        if info.chunk.tag != expected {
            self.nav.ascend(&info)?;
            return Err(FormatError::UnexpectedChunk {
                expected,
                found: info.chunk.tag,
            });
        }
        Ok(info)
    }

    pub fn read_header(&mut self) -> Result<DppHeader> {
        self.form()?;
        let info = self.expect_next(TAG_HDR)?;
        let decoded = self.decode_header();
        self.nav.ascend(&info)?;
        let header = decoded?;
        debug!("header version {} date {}", header.version, header.date);
        self.header = Some(header);
        Ok(header)
    }

    pub fn begin_toc(&mut self, reserved: usize) -> Result<()> {
        self.pending_toc = Some(Toc::with_capacity(reserved)?);
        Ok(())
    }

    pub fn add_toc_entry(&mut self, label: u32, offset: u32) -> Result<u32> {
        self.pending_toc
            .as_mut()
            .ok_or(FormatError::TocUnavailable)?
            .add(label, offset)
    }

    /// Install the TOC built since [`Playprint::begin_toc`] and return its size.
    pub fn end_toc(&mut self) -> Result<usize> {
        let toc = self.pending_toc.take().ok_or(FormatError::TocUnavailable)?;
        let used = toc.len();
        self.toc = Some(toc);
        Ok(used)
    }

    pub fn read_toc(&mut self) -> Result<usize> {
        self.form()?;
        let info = self.expect_next(TAG_TOC)?;
        let decoded = self.decode_toc(&info);
        self.nav.ascend(&info)?;
        let used = decoded?;
        debug!("toc holds {used} entries");
        Ok(used)
    }

    pub fn toc_offset(&self, index: u32) -> Result<u32> {
        self.toc
            .as_ref()
            .ok_or(FormatError::TocUnavailable)?
            .offset(index)
    }

    pub fn goto(&mut self, offset: u64) -> Result<()> {
        self.nav.seek_to(offset)
    }

    pub fn position(&mut self) -> Result<u64> {
        self.nav.position()
    }

    fn read_section<T, E, F>(&mut self, tag: Tag, f: F) -> Result<T, E>
    where
        F: FnOnce(&[u8]) -> Result<T, E>,
        E: From<FormatError>,
    {
        let form = self.form()?;
        let limit = form.offset + u64::from(form.chunk.size);
        loop {
            if self.nav.position()? + 8 > limit {
                return Err(FormatError::ChunkNotFound {
                    wanted: tag,
                    parent: form.chunk.tag,
                }
                .into());
            }
            let info = self.nav.descend(Descend::Next, None)?;
            if info.chunk.tag != tag {
                self.nav.ascend(&info)?;
                continue;
            }
            let payload = self.nav.read_payload(&info);
            self.nav.ascend(&info)?;
            return f(&payload?);
        }
    }

    /// Hand the payload of the next `grp ` chunk to `f`.
    pub fn read_group<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&[u8]) -> Result<T, E>,
        E: From<FormatError>,
    {
        self.read_section(TAG_GRP, f)
    }

    pub fn read_scene<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&[u8]) -> Result<T, E>,
        E: From<FormatError>,
    {
        self.read_section(TAG_SCN, f)
    }

    pub fn read_set<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&[u8]) -> Result<T, E>,
        E: From<FormatError>,
    {
        self.read_section(TAG_SET, f)
    }

    /// Read the chunk a TOC entry points at, checking its tag.
    pub fn read_chunk_at(&mut self, index: u32, expected: Tag) -> Result<Vec<u8>> {
        let offset = self.toc_offset(index)?;
        self.goto(u64::from(offset))?;
        let info = self.expect_next(expected)?;
        let payload = self.nav.read_payload(&info);
        self.nav.ascend(&info)?;
        payload
    }

    /// Enter the `LIST 'MRFL'` at the current position and read its `info`.
    pub fn begin_mref(&mut self) -> Result<MediaRefInfo> {
        let list = self.expect_next(TAG_LIST)?;
        if list.form != FORM_MRFL {
            self.nav.ascend(&list)?;
            return Err(FormatError::UnexpectedChunk {
                expected: FORM_MRFL,
                found: list.form,
            });
        }
        self.mref_list = Some(list);

        let info_chunk = self.nav.descend(Descend::Chunk(TAG_INFO), Some(&list))?;
        let decoded = self.decode_mref_info();
        self.nav.ascend(&info_chunk)?;
        decoded
    }

    /// Read the next `mref` chunk of the open media reference list.
    pub fn read_media(&mut self) -> Result<MediaRefChunk> {
        let list = self.mref_list.ok_or(FormatError::MissingParent)?;
        let limit = list.offset + u64::from(list.chunk.size);
        if self.nav.position()? + 8 > limit {
            return Err(FormatError::ChunkNotFound {
                wanted: TAG_MREF,
                parent: FORM_MRFL,
            });
        }
        let info = self.expect_next(TAG_MREF)?;
        let decoded = self.decode_media(&info);
        self.nav.ascend(&info)?;
        decoded
    }

    pub fn end_mref(&mut self) -> Result<()> {
        let list = self.mref_list.take().ok_or(FormatError::MissingParent)?;
        self.nav.ascend(&list)
    }

    /// Run `f` between [`Playprint::begin_mref`] and [`Playprint::end_mref`].
    pub fn with_media_list<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self, MediaRefInfo) -> Result<T, E>,
        E: From<FormatError>,
    {
        let info = match self.begin_mref() {
            Ok(info) => info,
            Err(err) => {
                if let Some(list) = self.mref_list.take() {
                    self.nav.ascend(&list)?;
                }
                return Err(err.into());
            }
        };
        let outcome = f(self, info);
        self.end_mref()?;
        outcome
    }

    fn decode_header(&mut self) -> Result<DppHeader> {
        Ok(DppHeader {
            version: self.nav.read_u32()?,
            date: self.nav.read_u32()?,
        })
    }

    fn decode_toc(&mut self, info: &ChunkInfo) -> Result<usize> {
        let count = self.nav.read_u32()?;
        let room = u64::from(info.chunk.size.saturating_sub(4)) / 8;
        if u64::from(count) > room {
            return Err(FormatError::Truncated {
                offset: info.offset as usize + 4,
                needed: ((u64::from(count) - room) * 8) as usize,
            });
        }
        self.begin_toc(count as usize)?;
        for _ in 0..count {
            let label = self.nav.read_u32()?;
            let offset = self.nav.read_u32()?;
            self.add_toc_entry(label, offset)?;
        }
        self.end_toc()
    }

    fn decode_mref_info(&mut self) -> Result<MediaRefInfo> {
        Ok(MediaRefInfo {
            flags: self.nav.read_u32()?,
            type_index: self.nav.read_u32()?,
            count: self.nav.read_u32()?,
        })
    }

    fn decode_media(&mut self, info: &ChunkInfo) -> Result<MediaRefChunk> {
        let flags = self.nav.read_u32()?;
        let media_type = self.nav.read_u32()?;
        let size = self.nav.read_u32()?;
        let available = info.chunk.size.saturating_sub(12);
        if size > available {
            return Err(FormatError::Truncated {
                offset: info.offset as usize + 12,
                needed: (size - available) as usize,
            });
        }
        let start = info.offset + 12;
        self.nav.ensure_available(start, u64::from(size))?;
        let mut data = vec![0u8; size as usize];
        self.nav.read_exact(&mut data)?;
        Ok(MediaRefChunk {
            flags,
            media_type,
            data,
        })
    }

    /// Direct children of the top-level form, in file order.
    pub fn top_level_chunks(&mut self) -> Result<Vec<ChunkInfo>> {
        let form = self.form()?;
        let saved = self.nav.position()?;
        let limit = form.offset + u64::from(form.chunk.size);
        let mut chunks = Vec::new();
        self.nav.seek_to(form.offset)?;
        while self.nav.position()? + 8 <= limit {
            let info = self.nav.descend(Descend::Next, None)?;
            self.nav.ascend(&info)?;
            chunks.push(info);
        }
        self.nav.seek_to(saved)?;
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Assembler;
    use crate::writer::PlayprintWriter;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample(format: ByteFormat) -> Vec<u8> {
        let mut writer = PlayprintWriter::new(format, DppHeader { version: 1, date: 20_240_101 });
        let mut asm = Assembler::new(format);
        asm.create_actor(0).end_actor_group();
        writer.add_group(asm.group_payload(0, 1));
        writer.add_scene(3, &[0]);
        writer.add_media_list(
            1,
            2,
            &[MediaRefChunk {
                flags: 0,
                media_type: 5,
                data: b"intro.rgb".to_vec(),
            }],
        );
        writer.finish()
    }

    #[test]
    fn loads_header_and_toc() {
        let mut playprint = Playprint::load(Cursor::new(sample(ByteFormat::BigEndian))).unwrap();
        assert_eq!(playprint.byte_format(), ByteFormat::BigEndian);
        assert_eq!(playprint.header(), Some(DppHeader { version: 1, date: 20_240_101 }));
        let toc = playprint.toc().unwrap();
        assert_eq!(toc.len(), 3);
        assert_eq!(toc.entries()[2].label, 2);

        let payload = playprint.read_chunk_at(0, TAG_GRP).unwrap();
        assert_eq!(&payload[..4], &[0, 0, 0, 0]);
        let err = playprint.read_chunk_at(0, TAG_SCN).unwrap_err();
        assert!(matches!(err, FormatError::UnexpectedChunk { .. }));
    }

    #[test]
    fn little_endian_files_read_the_same_values() {
        let mut playprint = Playprint::load(Cursor::new(sample(ByteFormat::LittleEndian))).unwrap();
        assert_eq!(playprint.byte_format(), ByteFormat::LittleEndian);
        assert_eq!(playprint.header().map(|h| h.version), Some(1));
        let scene = playprint.read_chunk_at(1, TAG_SCN).unwrap();
        assert_eq!(&scene[..4], &3u32.to_le_bytes());
    }

    #[test]
    fn sequential_section_reads_skip_other_chunks() {
        let mut playprint = Playprint::load(Cursor::new(sample(ByteFormat::BigEndian))).unwrap();
        let len = playprint
            .read_scene(|payload| Ok::<_, FormatError>(payload.len()))
            .unwrap();
        assert_eq!(len, 4 + 4 + 4);
        let err = playprint
            .read_group(|_| Ok::<_, FormatError>(()))
            .unwrap_err();
        assert!(matches!(err, FormatError::ChunkNotFound { .. }));
    }

    #[test]
    fn media_list_yields_info_and_entries() {
        let mut playprint = Playprint::load(Cursor::new(sample(ByteFormat::BigEndian))).unwrap();
        let offset = playprint.toc_offset(2).unwrap();
        playprint.goto(u64::from(offset)).unwrap();
        let (info, media) = playprint
            .with_media_list(|pp, info| {
                let media = pp.read_media()?;
                Ok::<_, FormatError>((info, media))
            })
            .unwrap();
        assert_eq!(info, MediaRefInfo { flags: 1, type_index: 2, count: 1 });
        assert!(media.is_external());
        assert_eq!(media.filename(), Some("intro.rgb"));
        assert_eq!(media.media_type, 5);
    }

    #[test]
    fn toc_bounds_are_enforced() {
        let mut toc = Toc::with_capacity(1).unwrap();
        assert_eq!(toc.add(0, 0).unwrap(), 0);
        assert!(matches!(toc.add(1, 40), Err(FormatError::TocOverflow { reserved: 1 })));
        assert!(matches!(toc.offset(0), Err(FormatError::InvalidTocOffset { index: 0 })));
        assert!(matches!(toc.offset(1), Err(FormatError::TocIndex { index: 1, used: 1 })));
        assert!(matches!(Toc::with_capacity(0), Err(FormatError::EmptyToc)));
    }

    #[test]
    fn open_maps_file_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&sample(ByteFormat::BigEndian)).unwrap();
        let mut playprint = Playprint::open(file.path()).unwrap();
        assert_eq!(playprint.path(), Some(file.path()));
        let tags: Vec<Tag> = playprint
            .top_level_chunks()
            .unwrap()
            .iter()
            .map(|info| info.chunk.tag)
            .collect();
        assert_eq!(tags, vec![TAG_HDR, TAG_TOC, TAG_GRP, TAG_SCN, TAG_LIST]);
        let reader = playprint.end().unwrap();
        assert_eq!(reader.position() as usize, reader.get_ref().len());
    }

    #[test]
    fn sequential_reads_visit_group_set_and_scene() {
        let format = ByteFormat::BigEndian;
        let mut writer = PlayprintWriter::new(format, DppHeader { version: 1, date: 0 });
        let mut group = Assembler::new(format);
        group.create_actor(0).end_actor_group();
        writer.add_group(group.group_payload(0, 1));
        let mut set = Assembler::new(format);
        set.create_set(2).end_set();
        writer.add_set(set.set_payload());
        writer.add_scene(0, &[0]);

        let mut playprint = Playprint::load(Cursor::new(writer.finish())).unwrap();
        let group_len = playprint
            .read_group(|payload| Ok::<_, FormatError>(payload.len()))
            .unwrap();
        assert_eq!(group_len, 4 + 1 + 3);
        let set_payload = playprint
            .read_set(|payload| Ok::<_, FormatError>(payload.to_vec()))
            .unwrap();
        assert_eq!(set_payload, vec![0x8d, 0x02, 0x8e]);
        let err = playprint
            .read_set(|_| Ok::<_, FormatError>(()))
            .unwrap_err();
        assert!(matches!(err, FormatError::ChunkNotFound { .. }));
    }

    #[test]
    fn toc_count_beyond_chunk_is_truncated() {
        let mut children = Vec::new();
        children.extend_from_slice(b"hdr ");
        children.extend_from_slice(&8u32.to_be_bytes());
        children.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 0]);
        children.extend_from_slice(b"toc ");
        children.extend_from_slice(&4u32.to_be_bytes());
        children.extend_from_slice(&u32::MAX.to_be_bytes());
        let mut data = Vec::new();
        data.extend_from_slice(b"PPBE");
        data.extend_from_slice(&(children.len() as u32).to_be_bytes());
        data.extend_from_slice(b"MLRT");
        data.extend(children);

        let err = Playprint::load(Cursor::new(data)).unwrap_err();
        assert!(matches!(err, FormatError::Truncated { offset: 40, .. }));
    }

    #[test]
    fn rejects_foreign_containers() {
        let err = Playprint::new(Cursor::new(b"RIFF\0\0\0\x04WAVE".to_vec())).unwrap_err();
        assert!(matches!(err, FormatError::UnknownForm(_)));
    }
}
