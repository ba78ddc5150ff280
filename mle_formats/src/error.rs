use std::io;

use thiserror::Error;

use crate::chunk::Tag;

/// Everything that can go wrong while reading a Playprint or replaying one
/// of its byte-code chunks.
///
/// I/O failures from the underlying source are folded in here as well, so
/// callers only ever deal with one taxonomy for malformed input.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("i/o failure while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("unknown Playprint form tag {0}")]
    UnknownForm(Tag),
    #[error("chunk {wanted} not found inside {parent}")]
    ChunkNotFound { wanted: Tag, parent: Tag },
    #[error("expected {expected} chunk, found {found}")]
    UnexpectedChunk { expected: Tag, found: Tag },
    #[error("descend mode requires a parent chunk")]
    MissingParent,
    #[error("top-level form search must not be given a parent chunk")]
    UnexpectedParent,
    #[error("Playprint has not been opened with begin()")]
    NotStarted,
    #[error("TOC must reserve at least one entry")]
    EmptyToc,
    #[error("TOC is unavailable")]
    TocUnavailable,
    #[error("reserved TOC entries are full ({reserved})")]
    TocOverflow { reserved: usize },
    #[error("TOC index {index} out of range ({used} entries)")]
    TocIndex { index: u32, used: usize },
    #[error("TOC entry {index} has an invalid offset")]
    InvalidTocOffset { index: u32 },
    #[error("stream truncated at offset {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },
    #[error("variable-length value overflows {bits} bits")]
    VlqOverflow { bits: u32 },
    #[error("invalid index in byte-code stream at offset {offset}")]
    IndexOverflow { offset: usize },
    #[error("invalid opcode {opcode:#04x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("opcode {opcode:#04x} is not allowed in a {context} chunk")]
    OpcodeNotAllowed { opcode: u8, context: &'static str },
    #[error("no actor is currently active")]
    NoActiveActor,
    #[error("no set is pending for role binding")]
    NoPendingSet,
    #[error("no set is currently active")]
    NoActiveSet,
    #[error("child role attachment without a parent role")]
    NoParentRole,
    #[error("actor slot {slot} out of range ({count} actors)")]
    ActorSlot { slot: u32, count: usize },
    #[error("chunk declares {declared} actors but creates more")]
    ActorOverflow { declared: usize },
    #[error("role of actor slot {slot} is already attached")]
    RoleAlreadyAttached { slot: u32 },
    #[error("actor slot {slot} cannot be its own parent")]
    SelfParent { slot: u32 },
    #[error("actors {parent} and {child} must share a common set to have a parent/child relationship")]
    SetMismatch { parent: u32, child: u32 },
    #[error("actor slot {slot} has no role")]
    MissingRole { slot: u32 },
    #[error("{table} index {index} out of range ({len} entries)")]
    TableIndex {
        table: &'static str,
        index: u32,
        len: usize,
    },
    #[error("no property selected before copy")]
    NoPropertyName,
    #[error("property array of {count} x {element_size} bytes overflows")]
    PropertySizeOverflow { count: u32, element_size: u32 },
    #[error("unable to set property {name}: {reason}")]
    PropertyRejected { name: String, reason: String },
    #[error("set {index} was not created by its set chunk")]
    SetNotCreated { index: u32 },
    #[error("unable to attach roles: {0}")]
    AttachRejected(String),
}

pub type Result<T, E = FormatError> = std::result::Result<T, E>;

/// Attach a short description of the failed step to raw I/O errors.
pub trait IoContext<T> {
    fn io_context(self, context: &'static str) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context(self, context: &'static str) -> Result<T> {
        self.map_err(|source| FormatError::Io { context, source })
    }
}
