use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use mle_formats::FormatError;
use serde::{Deserialize, Serialize};

use crate::error::{ClassKind, ConstructionError};
use crate::object::{Actor, ActorRef, Group, MediaRef, ObjectId, Role, SceneHandle, SetHandle};

/// Index-driven factories the loader builds objects through.
pub trait ClassRegistry: fmt::Debug {
    fn create_actor(&self, type_index: u32) -> Result<Box<dyn Actor>, ConstructionError>;

    fn create_role(
        &self,
        type_index: u32,
        actor: ActorRef,
        set: &SetHandle,
    ) -> Result<Box<dyn Role>, ConstructionError>;

    fn create_set(&self, type_index: u32) -> Result<SetHandle, ConstructionError>;

    fn create_group(&self, type_index: u32) -> Result<Box<dyn Group>, ConstructionError>;

    fn create_scene(&self, type_index: u32) -> Result<SceneHandle, ConstructionError>;

    fn create_media_ref(&self, type_index: u32) -> Result<Box<dyn MediaRef>, ConstructionError>;

    fn actor_properties(&self) -> &[String];

    fn set_properties(&self) -> &[String];

    fn actor_property_name(&self, index: u32) -> Option<&str> {
        self.actor_properties()
            .get(index as usize)
            .map(String::as_str)
    }

    fn set_property_name(&self, index: u32) -> Option<&str> {
        self.set_properties().get(index as usize).map(String::as_str)
    }

    fn boot_scene(&self) -> Option<u32>;

    /// Fresh set table for one title run.
    fn set_table(&self) -> SetTable;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntry {
    pub name: String,
    /// Catalog key; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor: Option<String>,
}

impl ClassEntry {
    pub fn constructor_key(&self) -> &str {
        self.constructor.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub class: String,
    pub property: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetEntry {
    pub name: String,
    /// TOC index of the set's chunk.
    pub chunk: u32,
}

/// Title tables as produced by the mastering tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleManifest {
    pub actor_classes: Vec<ClassEntry>,
    pub role_classes: Vec<ClassEntry>,
    pub set_classes: Vec<ClassEntry>,
    pub group_classes: Vec<ClassEntry>,
    pub scene_classes: Vec<ClassEntry>,
    pub media_ref_classes: Vec<ClassEntry>,
    pub actor_properties: Vec<PropertyEntry>,
    pub set_properties: Vec<PropertyEntry>,
    pub sets: Vec<SetEntry>,
    pub boot_scene: Option<u32>,
}

impl TitleManifest {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read title manifest: {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("failed to parse title manifest: {}", path.display()))
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn write_json_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write title manifest: {}", path.display()))
    }
}

pub type ActorCtor = fn(&str) -> Box<dyn Actor>;
pub type RoleCtor = fn(&str, ActorRef, &SetHandle) -> Box<dyn Role>;
pub type SetCtor = fn(&str) -> SetHandle;
pub type GroupCtor = fn(&str) -> Box<dyn Group>;
pub type SceneCtor = fn(&str) -> SceneHandle;
pub type MediaRefCtor = fn(&str) -> Box<dyn MediaRef>;

/// Compile-time constructors keyed by class name.
#[derive(Debug, Default, Clone)]
pub struct ConstructorCatalog {
    actors: HashMap<String, ActorCtor>,
    roles: HashMap<String, RoleCtor>,
    sets: HashMap<String, SetCtor>,
    groups: HashMap<String, GroupCtor>,
    scenes: HashMap<String, SceneCtor>,
    media_refs: HashMap<String, MediaRefCtor>,
}

impl ConstructorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_actor(mut self, name: &str, ctor: ActorCtor) -> Self {
        self.actors.insert(name.to_string(), ctor);
        self
    }

    pub fn with_role(mut self, name: &str, ctor: RoleCtor) -> Self {
        self.roles.insert(name.to_string(), ctor);
        self
    }

    pub fn with_set(mut self, name: &str, ctor: SetCtor) -> Self {
        self.sets.insert(name.to_string(), ctor);
        self
    }

    pub fn with_group(mut self, name: &str, ctor: GroupCtor) -> Self {
        self.groups.insert(name.to_string(), ctor);
        self
    }

    pub fn with_scene(mut self, name: &str, ctor: SceneCtor) -> Self {
        self.scenes.insert(name.to_string(), ctor);
        self
    }

    pub fn with_media_ref(mut self, name: &str, ctor: MediaRefCtor) -> Self {
        self.media_refs.insert(name.to_string(), ctor);
        self
    }
}

fn resolve<'a, C: Copy>(
    kind: ClassKind,
    classes: &'a [ClassEntry],
    ctors: &HashMap<String, C>,
    index: u32,
) -> Result<(&'a str, C), ConstructionError> {
    let entry = classes
        .get(index as usize)
        .ok_or(ConstructionError::ClassIndex {
            kind,
            index,
            len: classes.len(),
        })?;
    let ctor = ctors
        .get(entry.constructor_key())
        .copied()
        .ok_or_else(|| ConstructionError::Unbound {
            kind,
            name: entry.name.clone(),
        })?;
    Ok((entry.name.as_str(), ctor))
}

/// Manifest-driven [`ClassRegistry`].
#[derive(Debug, Clone)]
pub struct Tables {
    manifest: TitleManifest,
    actor_properties: Vec<String>,
    set_properties: Vec<String>,
    catalog: ConstructorCatalog,
}

impl Tables {
    pub fn from_manifest(manifest: TitleManifest, catalog: ConstructorCatalog) -> Self {
        let actor_properties = manifest
            .actor_properties
            .iter()
            .map(|entry| entry.property.clone())
            .collect();
        let set_properties = manifest
            .set_properties
            .iter()
            .map(|entry| entry.property.clone())
            .collect();
        Self {
            manifest,
            actor_properties,
            set_properties,
            catalog,
        }
    }

    pub fn manifest(&self) -> &TitleManifest {
        &self.manifest
    }
}

impl ClassRegistry for Tables {
    fn create_actor(&self, type_index: u32) -> Result<Box<dyn Actor>, ConstructionError> {
        let (name, ctor) = resolve(
            ClassKind::Actor,
            &self.manifest.actor_classes,
            &self.catalog.actors,
            type_index,
        )?;
        Ok(ctor(name))
    }

    fn create_role(
        &self,
        type_index: u32,
        actor: ActorRef,
        set: &SetHandle,
    ) -> Result<Box<dyn Role>, ConstructionError> {
        let (name, ctor) = resolve(
            ClassKind::Role,
            &self.manifest.role_classes,
            &self.catalog.roles,
            type_index,
        )?;
        Ok(ctor(name, actor, set))
    }

    fn create_set(&self, type_index: u32) -> Result<SetHandle, ConstructionError> {
        let (name, ctor) = resolve(
            ClassKind::Set,
            &self.manifest.set_classes,
            &self.catalog.sets,
            type_index,
        )?;
        Ok(ctor(name))
    }

    fn create_group(&self, type_index: u32) -> Result<Box<dyn Group>, ConstructionError> {
        let (name, ctor) = resolve(
            ClassKind::Group,
            &self.manifest.group_classes,
            &self.catalog.groups,
            type_index,
        )?;
        Ok(ctor(name))
    }

    fn create_scene(&self, type_index: u32) -> Result<SceneHandle, ConstructionError> {
        let (name, ctor) = resolve(
            ClassKind::Scene,
            &self.manifest.scene_classes,
            &self.catalog.scenes,
            type_index,
        )?;
        Ok(ctor(name))
    }

    fn create_media_ref(&self, type_index: u32) -> Result<Box<dyn MediaRef>, ConstructionError> {
        let (name, ctor) = resolve(
            ClassKind::MediaRef,
            &self.manifest.media_ref_classes,
            &self.catalog.media_refs,
            type_index,
        )?;
        Ok(ctor(name))
    }

    fn actor_properties(&self) -> &[String] {
        &self.actor_properties
    }

    fn set_properties(&self) -> &[String] {
        &self.set_properties
    }

    fn boot_scene(&self) -> Option<u32> {
        self.manifest.boot_scene
    }

    fn set_table(&self) -> SetTable {
        SetTable::new(&self.manifest.sets)
    }
}

#[derive(Debug)]
pub struct SetSlot {
    pub name: String,
    pub chunk: u32,
    pub set: Option<SetHandle>,
}

/// Sets known to the title, cached once their chunk has been replayed.
#[derive(Debug, Default)]
pub struct SetTable {
    slots: Vec<SetSlot>,
}

impl SetTable {
    pub fn new(entries: &[SetEntry]) -> Self {
        Self {
            slots: entries
                .iter()
                .map(|entry| SetSlot {
                    name: entry.name.clone(),
                    chunk: entry.chunk,
                    set: None,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: u32) -> Result<&SetSlot, FormatError> {
        self.slots
            .get(index as usize)
            .ok_or(FormatError::TableIndex {
                table: "set",
                index,
                len: self.slots.len(),
            })
    }

    pub fn cached(&self, index: u32) -> Option<SetHandle> {
        self.slots
            .get(index as usize)
            .and_then(|slot| slot.set.clone())
    }

    pub fn install(&mut self, index: u32, set: SetHandle) -> Result<(), FormatError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or(FormatError::TableIndex {
                table: "set",
                index,
                len,
            })?;
        slot.set = Some(set);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SetSlot> {
        self.slots.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredObject {
    pub id: ObjectId,
    pub type_index: u32,
    pub class: String,
}

/// Observer log of every actor created during a title run.
#[derive(Debug, Default, Serialize)]
pub struct ObjectRegistry {
    next_id: u64,
    objects: Vec<RegisteredObject>,
}

impl ObjectRegistry {
    pub fn register(&mut self, type_index: u32, class: &str) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.push(RegisteredObject {
            id,
            type_index,
            class: class.to_string(),
        });
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<&RegisteredObject> {
        self.objects.iter().find(|object| object.id == id)
    }

    pub fn objects(&self) -> &[RegisteredObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
