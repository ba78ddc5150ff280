//! Contracts between the loader and the classes a title plugs into it.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;
use thiserror::Error;

use crate::error::ConstructionError;
use crate::property::{Property, PropertyArray, PropertyError};

pub type SetHandle = Rc<RefCell<dyn Set>>;
pub type SceneHandle = Rc<RefCell<dyn Scene>>;

/// Stable identity handed out by the object registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a role knows about the actor it presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActorRef {
    pub id: ObjectId,
    pub type_index: u32,
    /// Creation order within the owning group.
    pub slot: u32,
}

/// Globals visible to `init`: the set owning the object and the scene
/// being loaded. An object is never handed a context naming itself.
#[derive(Debug, Clone, Default)]
pub struct InitContext {
    pub set: Option<SetHandle>,
    pub scene: Option<SceneHandle>,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct AttachError(pub String);

pub trait PropertyTarget {
    fn set_property(&mut self, name: &str, value: Property) -> Result<(), PropertyError>;

    fn set_property_array(&mut self, name: &str, value: PropertyArray)
        -> Result<(), PropertyError>;
}

pub trait Actor: PropertyTarget + fmt::Debug {
    fn class_name(&self) -> &str;

    fn init(&mut self, _ctx: &InitContext) -> Result<(), ConstructionError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

pub trait Role: fmt::Debug {
    fn class_name(&self) -> &str;

    fn actor(&self) -> ActorRef;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Policy object deciding how roles hang together.
pub trait Set: PropertyTarget + fmt::Debug {
    fn class_name(&self) -> &str;

    /// Attach `child` under `parent`, or directly to the set when `parent`
    /// is `None`.
    fn attach_roles(
        &mut self,
        parent: Option<&mut dyn Role>,
        child: &mut dyn Role,
    ) -> Result<(), AttachError>;

    fn init(&mut self, _ctx: &InitContext) -> Result<(), ConstructionError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

pub trait Group: fmt::Debug {
    fn class_name(&self) -> &str;

    fn add(&mut self, record: ActorRecord);

    fn members(&self) -> &[ActorRecord];

    fn init(&mut self, _ctx: &InitContext) -> Result<(), ConstructionError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

pub trait Scene: fmt::Debug {
    fn class_name(&self) -> &str;

    fn add_group(&mut self, group: Box<dyn Group>);

    fn groups(&self) -> &[Box<dyn Group>];

    fn init(&mut self, _ctx: &InitContext) -> Result<(), ConstructionError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
}

pub trait MediaRef: fmt::Debug {
    fn class_name(&self) -> &str;

    fn register_media(&mut self, flags: u32, data: Vec<u8>) -> Result<(), ConstructionError>;

    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone)]
pub struct SetBinding {
    /// Index into the title's set table.
    pub index: u32,
    pub handle: SetHandle,
}

/// One actor created by a group chunk, with what was bound to it.
#[derive(Debug)]
pub struct ActorRecord {
    pub id: ObjectId,
    pub type_index: u32,
    pub actor: Box<dyn Actor>,
    pub role: Option<Box<dyn Role>>,
    pub set: Option<SetBinding>,
}

impl ActorRecord {
    pub fn set_handle(&self) -> Option<&SetHandle> {
        self.set.as_ref().map(|binding| &binding.handle)
    }
}
