//! Loader that turns Playprint chunks into a live actor/role/set graph.

pub mod actor_gc;
pub mod context;
pub mod error;
pub mod loader;
pub mod object;
pub mod property;
pub mod registry;
pub mod stock;
pub mod summary;

pub use actor_gc::{ChunkKind, GroupContext, GroupHost};
pub use context::{LoadContext, Scope};
pub use error::{ClassKind, ConstructionError, LoadError, LoadResult};
pub use loader::Loader;
pub use object::{
    Actor, ActorRecord, ActorRef, AttachError, Group, InitContext, MediaRef, ObjectId,
    PropertyTarget, Role, Scene, SceneHandle, Set, SetBinding, SetHandle,
};
pub use property::{Property, PropertyArray, PropertyError, PropertyReader, PropertyType};
pub use registry::{
    ClassEntry, ClassRegistry, ConstructorCatalog, ObjectRegistry, PropertyEntry, SetEntry,
    SetTable, Tables, TitleManifest,
};
pub use summary::LoadSummary;
