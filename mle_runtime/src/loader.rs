use std::io::{Read, Seek};
use std::rc::Rc;

use log::debug;
use mle_formats::chunk::{TAG_GRP, TAG_SCN, TAG_SET};
use mle_formats::{ChunkCursor, FormatError, Playprint};

use crate::actor_gc::{GroupContext, GroupHost};
use crate::context::LoadContext;
use crate::error::{ConstructionError, LoadResult};
use crate::object::{Actor, Group, InitContext, MediaRef, ObjectId, SceneHandle, SetHandle};
use crate::registry::{ClassRegistry, ObjectRegistry, SetTable};

/// Turns TOC entries of an opened Playprint into live objects.
#[derive(Debug)]
pub struct Loader<R> {
    playprint: Playprint<R>,
    registry: Rc<dyn ClassRegistry>,
    sets: SetTable,
    objects: ObjectRegistry,
    context: Rc<LoadContext>,
}

impl<R: Read + Seek> Loader<R> {
    /// `playprint` must already have its header and TOC read.
    pub fn new(playprint: Playprint<R>, registry: Rc<dyn ClassRegistry>) -> Self {
        let sets = registry.set_table();
        Self {
            playprint,
            registry,
            sets,
            objects: ObjectRegistry::default(),
            context: LoadContext::new(),
        }
    }

    pub fn playprint(&self) -> &Playprint<R> {
        &self.playprint
    }

    pub fn playprint_mut(&mut self) -> &mut Playprint<R> {
        &mut self.playprint
    }

    pub fn into_playprint(self) -> Playprint<R> {
        self.playprint
    }

    pub fn registry(&self) -> &Rc<dyn ClassRegistry> {
        &self.registry
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    pub fn sets(&self) -> &SetTable {
        &self.sets
    }

    pub fn context(&self) -> &Rc<LoadContext> {
        &self.context
    }

    /// Load the group chunk at `toc_index` and initialise its actors.
    pub fn load_group(&mut self, toc_index: u32) -> LoadResult<Box<dyn Group>> {
        debug!("loading group from TOC entry {toc_index}");
        let payload = self.playprint.read_chunk_at(toc_index, TAG_GRP)?;
        let mut cursor = ChunkCursor::new(&payload, self.playprint.byte_format());

        let group_type = cursor.read_u32()?;
        let mut group = self.registry.create_group(group_type)?;
        let actor_count = cursor.read_index()? as usize;

        let mut gc = GroupContext::for_group(Rc::clone(&self.registry), actor_count);
        gc.parse_stream(&mut cursor, self)?;

        for mut record in gc.into_records() {
            {
                let _scope = self.context.enter_set(record.set_handle().cloned());
                record.actor.init(&self.context.init_context())?;
            }
            group.add(record);
        }
        group.init(&self.context.init_context())?;
        debug!(
            "group {} from TOC entry {toc_index} holds {} actors",
            group.class_name(),
            group.members().len()
        );
        Ok(group)
    }

    /// Load the scene chunk at `toc_index` together with all of its groups.
    pub fn load_scene(&mut self, toc_index: u32) -> LoadResult<SceneHandle> {
        debug!("loading scene from TOC entry {toc_index}");
        let payload = self.playprint.read_chunk_at(toc_index, TAG_SCN)?;
        let mut cursor = ChunkCursor::new(&payload, self.playprint.byte_format());

        let scene_type = cursor.read_u32()?;
        let scene = self.registry.create_scene(scene_type)?;
        let _scope = self.context.enter_scene(Some(Rc::clone(&scene)));

        let count = cursor.read_u32()?;
        for _ in 0..count {
            let group_index = cursor.read_u32()?;
            let group = self.load_group(group_index)?;
            scene.borrow_mut().add_group(group);
        }

        let ctx = InitContext {
            set: self.context.current_set(),
            scene: None,
        };
        scene.borrow_mut().init(&ctx)?;
        debug!("scene from TOC entry {toc_index} holds {count} groups");
        Ok(scene)
    }

    pub fn load_boot_scene(&mut self) -> LoadResult<SceneHandle> {
        let boot = self
            .registry
            .boot_scene()
            .ok_or(ConstructionError::NoBootScene)?;
        self.load_scene(boot)
    }

    /// Return the set at `set_index`, replaying its chunk the first time.
    pub fn load_set(&mut self, set_index: u32) -> LoadResult<SetHandle> {
        let chunk = self.sets.slot(set_index)?.chunk;
        if let Some(set) = self.sets.cached(set_index) {
            return Ok(set);
        }

        debug!("loading set {set_index} from TOC entry {chunk}");
        let saved = self.playprint.position()?;
        let replayed = self.replay_set_chunk(chunk);
        self.playprint.goto(saved)?;
        let set = match replayed? {
            Some((created, set)) if created == set_index => set,
            _ => return Err(FormatError::SetNotCreated { index: set_index }.into()),
        };

        let ctx = InitContext {
            set: None,
            scene: self.context.current_scene(),
        };
        set.borrow_mut().init(&ctx)?;
        // Only a fully built set is cached; a failed load can be retried.
        self.sets.install(set_index, Rc::clone(&set))?;
        Ok(set)
    }

    fn replay_set_chunk(&mut self, toc_index: u32) -> LoadResult<Option<(u32, SetHandle)>> {
        let payload = self.playprint.read_chunk_at(toc_index, TAG_SET)?;
        let mut cursor = ChunkCursor::new(&payload, self.playprint.byte_format());
        let mut gc = GroupContext::for_set(Rc::clone(&self.registry));
        gc.parse_stream(&mut cursor, self)?;
        Ok(gc.created_set())
    }

    /// Build the media reference whose `LIST 'MRFL'` sits at `toc_index`.
    pub fn load_media_ref(&mut self, toc_index: u32) -> LoadResult<Box<dyn MediaRef>> {
        let offset = self.playprint.toc_offset(toc_index)?;
        self.playprint.goto(u64::from(offset))?;
        let registry = Rc::clone(&self.registry);
        let media_ref = self.playprint.with_media_list(|playprint, info| {
            let mut media_ref = registry.create_media_ref(info.type_index)?;
            for _ in 0..info.count {
                let media = playprint.read_media()?;
                media_ref.register_media(media.flags, media.data)?;
            }
            LoadResult::Ok(media_ref)
        })?;
        debug!(
            "media reference {} from TOC entry {toc_index}",
            media_ref.class_name()
        );
        Ok(media_ref)
    }
}

impl<R: Read + Seek> GroupHost for Loader<R> {
    fn load_set(&mut self, index: u32) -> LoadResult<SetHandle> {
        Loader::load_set(self, index)
    }

    fn register_actor(&mut self, type_index: u32, actor: &dyn Actor) -> ObjectId {
        self.objects.register(type_index, actor.class_name())
    }
}
