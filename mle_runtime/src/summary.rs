//! Serializable snapshots of a loaded object graph.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::object::{ActorRecord, Group, MediaRef, Scene};
use crate::registry::SetSlot;
use crate::stock::{PropertyBag, PropertyBagActor, StageSet, StockMediaRef};

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub toc_entries: usize,
    pub groups: Vec<GroupSummary>,
    pub scenes: Vec<SceneSummary>,
    pub sets: Vec<SetSummary>,
    pub media_refs: Vec<MediaRefSummary>,
}

impl LoadSummary {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write load summary: {}", path.display()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertySummary {
    pub name: String,
    pub kind: String,
    pub len: usize,
    /// Lowercase hex of the first bytes of the value.
    pub preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActorSummary {
    pub id: u64,
    pub class: String,
    pub type_index: u32,
    pub role: Option<String>,
    pub set: Option<u32>,
    pub properties: Vec<PropertySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub toc_index: Option<u32>,
    pub class: String,
    pub actors: Vec<ActorSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneSummary {
    pub toc_index: u32,
    pub class: String,
    pub groups: Vec<GroupSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetSummary {
    pub index: usize,
    pub name: String,
    pub chunk: u32,
    pub class: Option<String>,
    pub attachments: usize,
    pub properties: Vec<PropertySummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaSummary {
    pub flags: u32,
    pub len: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaRefSummary {
    pub toc_index: u32,
    pub class: String,
    pub media: Vec<MediaSummary>,
}

const PREVIEW_BYTES: usize = 16;

fn preview(data: &[u8]) -> String {
    data.iter()
        .take(PREVIEW_BYTES)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn bag_properties(bag: &PropertyBag) -> Vec<PropertySummary> {
    let mut out: Vec<PropertySummary> = bag
        .values
        .iter()
        .map(|(name, value)| PropertySummary {
            name: name.clone(),
            kind: format!("{:?}", value.kind),
            len: value.len(),
            preview: preview(&value.data),
        })
        .collect();
    out.extend(bag.arrays.iter().map(|(name, array)| PropertySummary {
        name: name.clone(),
        kind: format!("array[{}x{}]", array.count, array.element_size),
        len: array.data.len(),
        preview: preview(&array.data),
    }));
    out
}

pub fn summarize_actor(record: &ActorRecord) -> ActorSummary {
    let properties = record
        .actor
        .as_any()
        .downcast_ref::<PropertyBagActor>()
        .map(|actor| bag_properties(&actor.properties))
        .unwrap_or_default();
    ActorSummary {
        id: record.id.0,
        class: record.actor.class_name().to_string(),
        type_index: record.type_index,
        role: record.role.as_ref().map(|role| role.class_name().to_string()),
        set: record.set.as_ref().map(|binding| binding.index),
        properties,
    }
}

pub fn summarize_group(toc_index: Option<u32>, group: &dyn Group) -> GroupSummary {
    GroupSummary {
        toc_index,
        class: group.class_name().to_string(),
        actors: group.members().iter().map(summarize_actor).collect(),
    }
}

pub fn summarize_scene(toc_index: u32, scene: &dyn Scene) -> SceneSummary {
    SceneSummary {
        toc_index,
        class: scene.class_name().to_string(),
        groups: scene
            .groups()
            .iter()
            .map(|group| summarize_group(None, group.as_ref()))
            .collect(),
    }
}

pub fn summarize_set(index: usize, slot: &SetSlot) -> SetSummary {
    let mut summary = SetSummary {
        index,
        name: slot.name.clone(),
        chunk: slot.chunk,
        class: None,
        attachments: 0,
        properties: Vec::new(),
    };
    if let Some(set) = &slot.set {
        let set = set.borrow();
        summary.class = Some(set.class_name().to_string());
        if let Some(stage) = set.as_any().downcast_ref::<StageSet>() {
            summary.attachments = stage.attachments.len();
            summary.properties = bag_properties(&stage.properties);
        }
    }
    summary
}

pub fn summarize_media_ref(toc_index: u32, media_ref: &dyn MediaRef) -> MediaRefSummary {
    let media = media_ref
        .as_any()
        .downcast_ref::<StockMediaRef>()
        .map(|stock| {
            stock
                .media
                .iter()
                .map(|entry| MediaSummary {
                    flags: entry.flags,
                    len: entry.data.len(),
                })
                .collect()
        })
        .unwrap_or_default();
    MediaRefSummary {
        toc_index,
        class: media_ref.class_name().to_string(),
        media,
    }
}
