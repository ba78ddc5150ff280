//! General-purpose classes for titles that only need the object graph,
//! such as the `mle_load` inspector.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::ConstructionError;
use crate::object::{
    Actor, ActorRecord, ActorRef, AttachError, Group, InitContext, MediaRef, ObjectId,
    PropertyTarget, Role, Scene, SceneHandle, Set, SetHandle,
};
use crate::property::{Property, PropertyArray, PropertyError};
use crate::registry::ConstructorCatalog;

/// Named bags of raw property values.
#[derive(Debug, Default, Clone)]
pub struct PropertyBag {
    pub values: BTreeMap<String, Property>,
    pub arrays: BTreeMap<String, PropertyArray>,
}

impl PropertyTarget for PropertyBag {
    fn set_property(&mut self, name: &str, value: Property) -> Result<(), PropertyError> {
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    fn set_property_array(
        &mut self,
        name: &str,
        value: PropertyArray,
    ) -> Result<(), PropertyError> {
        self.arrays.insert(name.to_string(), value);
        Ok(())
    }
}

#[derive(Debug)]
pub struct PropertyBagActor {
    class: String,
    pub properties: PropertyBag,
    /// Class of the set that was current when `init` ran.
    pub init_set: Option<String>,
    pub initialized: bool,
}

impl PropertyBagActor {
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            properties: PropertyBag::default(),
            init_set: None,
            initialized: false,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.values.get(name)
    }
}

impl PropertyTarget for PropertyBagActor {
    fn set_property(&mut self, name: &str, value: Property) -> Result<(), PropertyError> {
        self.properties.set_property(name, value)
    }

    fn set_property_array(
        &mut self,
        name: &str,
        value: PropertyArray,
    ) -> Result<(), PropertyError> {
        self.properties.set_property_array(name, value)
    }
}

impl Actor for PropertyBagActor {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn init(&mut self, ctx: &InitContext) -> Result<(), ConstructionError> {
        self.init_set = ctx
            .set
            .as_ref()
            .map(|set| set.borrow().class_name().to_string());
        self.initialized = true;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct StockRole {
    class: String,
    actor: ActorRef,
    pub set_class: String,
}

impl StockRole {
    pub fn new(class: &str, actor: ActorRef, set: &SetHandle) -> Self {
        Self {
            class: class.to_string(),
            actor,
            set_class: set.borrow().class_name().to_string(),
        }
    }
}

impl Role for StockRole {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn actor(&self) -> ActorRef {
        self.actor
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// One role hung on a set, under `parent` or directly on the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub parent: Option<ObjectId>,
    pub child: ObjectId,
}

#[derive(Debug)]
pub struct StageSet {
    class: String,
    pub properties: PropertyBag,
    pub attachments: Vec<Attachment>,
    pub init_count: u32,
}

impl StageSet {
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            properties: PropertyBag::default(),
            attachments: Vec::new(),
            init_count: 0,
        }
    }
}

impl PropertyTarget for StageSet {
    fn set_property(&mut self, name: &str, value: Property) -> Result<(), PropertyError> {
        self.properties.set_property(name, value)
    }

    fn set_property_array(
        &mut self,
        name: &str,
        value: PropertyArray,
    ) -> Result<(), PropertyError> {
        self.properties.set_property_array(name, value)
    }
}

impl Set for StageSet {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn attach_roles(
        &mut self,
        parent: Option<&mut dyn Role>,
        child: &mut dyn Role,
    ) -> Result<(), AttachError> {
        let child = child.actor().id;
        if self.attachments.iter().any(|a| a.child == child) {
            return Err(AttachError(format!("actor {child} is already on stage")));
        }
        self.attachments.push(Attachment {
            parent: parent.map(|role| role.actor().id),
            child,
        });
        Ok(())
    }

    fn init(&mut self, _ctx: &InitContext) -> Result<(), ConstructionError> {
        self.init_count += 1;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct StockGroup {
    class: String,
    members: Vec<ActorRecord>,
    pub initialized: bool,
}

impl StockGroup {
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            members: Vec::new(),
            initialized: false,
        }
    }
}

impl Group for StockGroup {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn add(&mut self, record: ActorRecord) {
        self.members.push(record);
    }

    fn members(&self) -> &[ActorRecord] {
        &self.members
    }

    fn init(&mut self, _ctx: &InitContext) -> Result<(), ConstructionError> {
        self.initialized = true;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
pub struct StockScene {
    class: String,
    groups: Vec<Box<dyn Group>>,
    pub initialized: bool,
}

impl StockScene {
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            groups: Vec::new(),
            initialized: false,
        }
    }
}

impl Scene for StockScene {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn add_group(&mut self, group: Box<dyn Group>) {
        self.groups.push(group);
    }

    fn groups(&self) -> &[Box<dyn Group>] {
        &self.groups
    }

    fn init(&mut self, _ctx: &InitContext) -> Result<(), ConstructionError> {
        self.initialized = true;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredMedia {
    pub flags: u32,
    pub data: Vec<u8>,
}

#[derive(Debug)]
pub struct StockMediaRef {
    class: String,
    pub media: Vec<RegisteredMedia>,
}

impl StockMediaRef {
    pub fn new(class: &str) -> Self {
        Self {
            class: class.to_string(),
            media: Vec::new(),
        }
    }
}

impl MediaRef for StockMediaRef {
    fn class_name(&self) -> &str {
        &self.class
    }

    fn register_media(&mut self, flags: u32, data: Vec<u8>) -> Result<(), ConstructionError> {
        self.media.push(RegisteredMedia { flags, data });
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Constructors for every stock class, keyed by type name.
pub fn catalog() -> ConstructorCatalog {
    ConstructorCatalog::new()
        .with_actor("PropertyBagActor", |class| {
            Box::new(PropertyBagActor::new(class))
        })
        .with_role("StockRole", |class, actor, set| {
            Box::new(StockRole::new(class, actor, set))
        })
        .with_set("StageSet", |class| -> SetHandle {
            Rc::new(RefCell::new(StageSet::new(class)))
        })
        .with_group("StockGroup", |class| Box::new(StockGroup::new(class)))
        .with_scene("StockScene", |class| -> SceneHandle {
            Rc::new(RefCell::new(StockScene::new(class)))
        })
        .with_media_ref("StockMediaRef", |class| {
            Box::new(StockMediaRef::new(class))
        })
}
