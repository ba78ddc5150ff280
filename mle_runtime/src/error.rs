use std::fmt;

use mle_formats::FormatError;
use serde::Serialize;
use thiserror::Error;

/// Family of classes a factory table constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassKind {
    Actor,
    Role,
    Set,
    Group,
    Scene,
    MediaRef,
}

impl fmt::Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClassKind::Actor => "actor",
            ClassKind::Role => "role",
            ClassKind::Set => "set",
            ClassKind::Group => "group",
            ClassKind::Scene => "scene",
            ClassKind::MediaRef => "media reference",
        })
    }
}

#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("{kind} class index {index} out of range ({len} classes)")]
    ClassIndex {
        kind: ClassKind,
        index: u32,
        len: usize,
    },
    #[error("{kind} class {name} has no registered constructor")]
    Unbound { kind: ClassKind, name: String },
    #[error("initialising {class} failed: {reason}")]
    Init { class: String, reason: String },
    #[error("media reference {class} rejected media: {reason}")]
    MediaRejected { class: String, reason: String },
    #[error("title tables do not name a boot scene")]
    NoBootScene,
}

/// Failure of a group, scene, set or media reference load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Construction(#[from] ConstructionError),
}

pub type LoadResult<T> = Result<T, LoadError>;
