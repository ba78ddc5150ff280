pub mod bytecode;
pub mod chunk;
pub mod error;
pub mod playprint;
pub mod vlq;
pub mod writer;

pub use bytecode::{Assembler, ChunkCursor, Opcode, encode_index};
pub use chunk::{ByteFormat, Chunk, ChunkInfo, Descend, Navigator, Tag, detect_format};
pub use error::{FormatError, IoContext, Result};
pub use playprint::{DppHeader, MediaRefChunk, MediaRefInfo, Playprint, Toc, TocEntry};
pub use writer::PlayprintWriter;
