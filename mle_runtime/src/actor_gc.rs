//! Replays the byte code of one group or set chunk against a class registry.

use std::rc::Rc;

use log::{debug, trace};
use mle_formats::{ChunkCursor, FormatError, Opcode};

use crate::error::LoadResult;
use crate::object::{Actor, ActorRecord, ActorRef, ObjectId, Role, SetBinding, SetHandle};
use crate::property::{Property, PropertyArray};
use crate::registry::ClassRegistry;

/// Services the interpreter needs from whoever drives it.
pub trait GroupHost {
    /// Return the set at `index`, replaying its chunk on first use.
    fn load_set(&mut self, index: u32) -> LoadResult<SetHandle>;

    fn register_actor(&mut self, type_index: u32, actor: &dyn Actor) -> ObjectId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Group,
    Set,
}

impl ChunkKind {
    fn label(self) -> &'static str {
        match self {
            ChunkKind::Group => "group",
            ChunkKind::Set => "set",
        }
    }
}

#[derive(Debug)]
struct Slot {
    record: ActorRecord,
    attached: bool,
}

/// Operand state carried between opcodes.
#[derive(Debug, Default)]
struct Registers {
    pending_set: Option<u32>,
    parent: Option<u32>,
    property: Option<String>,
    length: u32,
}

enum Assignment {
    Single(Property),
    Array(PropertyArray),
}

#[derive(Debug)]
pub struct GroupContext {
    registry: Rc<dyn ClassRegistry>,
    kind: ChunkKind,
    declared: usize,
    slots: Vec<Slot>,
    set: Option<(u32, SetHandle)>,
}

impl GroupContext {
    pub fn for_group(registry: Rc<dyn ClassRegistry>, actor_count: usize) -> Self {
        Self {
            registry,
            kind: ChunkKind::Group,
            declared: actor_count,
            slots: Vec::with_capacity(actor_count),
            set: None,
        }
    }

    pub fn for_set(registry: Rc<dyn ClassRegistry>) -> Self {
        Self {
            registry,
            kind: ChunkKind::Set,
            declared: 0,
            slots: Vec::new(),
            set: None,
        }
    }

    pub fn kind(&self) -> ChunkKind {
        self.kind
    }

    pub fn records(&self) -> impl Iterator<Item = &ActorRecord> {
        self.slots.iter().map(|slot| &slot.record)
    }

    /// Roles created but not yet attached to a parent or their set.
    pub fn unattached_roles(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.record.role.is_some() && !slot.attached)
            .count()
    }

    /// Set created by this chunk's `createSet`, with its table index.
    pub fn created_set(&self) -> Option<(u32, SetHandle)> {
        self.set.clone()
    }

    pub fn into_records(self) -> Vec<ActorRecord> {
        self.slots.into_iter().map(|slot| slot.record).collect()
    }

    /// Run every opcode left in `cursor`, then perform the last-call
    /// attachment pass for group chunks.
    pub fn parse_stream(
        &mut self,
        cursor: &mut ChunkCursor<'_>,
        host: &mut dyn GroupHost,
    ) -> LoadResult<()> {
        let mut regs = Registers::default();

        while !cursor.is_exhausted() {
            let offset = cursor.position();
            let byte = cursor.next_byte()?;
            let opcode = Opcode::try_from(byte).map_err(|()| FormatError::InvalidOpcode {
                opcode: byte,
                offset,
            })?;
            self.step(opcode, cursor, host, &mut regs)?;
            trace!("{offset:>6} {byte:02x} {opcode}");
        }

        if self.kind == ChunkKind::Group {
            self.last_call()?;
        }
        Ok(())
    }

    fn step(
        &mut self,
        opcode: Opcode,
        cursor: &mut ChunkCursor<'_>,
        host: &mut dyn GroupHost,
        regs: &mut Registers,
    ) -> LoadResult<()> {
        match opcode {
            Opcode::CreateActor => {
                if self.kind == ChunkKind::Set {
                    return Err(FormatError::OpcodeNotAllowed {
                        opcode: opcode as u8,
                        context: self.kind.label(),
                    }
                    .into());
                }
                let type_index = cursor.read_index()?;
                if self.slots.len() >= self.declared {
                    return Err(FormatError::ActorOverflow {
                        declared: self.declared,
                    }
                    .into());
                }
                let actor = self.registry.create_actor(type_index)?;
                let id = host.register_actor(type_index, actor.as_ref());
                trace!("actor {id} of type {type_index} in slot {}", self.slots.len());
                self.slots.push(Slot {
                    record: ActorRecord {
                        id,
                        type_index,
                        actor,
                        role: None,
                        set: None,
                    },
                    attached: false,
                });
                regs.pending_set = None;
                regs.parent = None;
            }
            Opcode::SetSet => {
                regs.pending_set = Some(cursor.read_index()?);
            }
            Opcode::BindRole => {
                let slot_index = self
                    .slots
                    .len()
                    .checked_sub(1)
                    .ok_or(FormatError::NoActiveActor)?;
                let set_index = regs.pending_set.ok_or(FormatError::NoPendingSet)?;
                let role_type = cursor.read_index()?;
                let set = host.load_set(set_index)?;

                let slot = &mut self.slots[slot_index];
                let actor = ActorRef {
                    id: slot.record.id,
                    type_index: slot.record.type_index,
                    slot: slot_index as u32,
                };
                let role = self.registry.create_role(role_type, actor, &set)?;
                slot.record.role = Some(role);
                slot.record.set = Some(SetBinding {
                    index: set_index,
                    handle: set,
                });
            }
            Opcode::ParentRole => {
                regs.parent = Some(cursor.read_index()?);
            }
            Opcode::ChildRole => {
                let child = cursor.read_index()?;
                let parent = regs.parent.ok_or(FormatError::NoParentRole)?;
                self.attach_child(parent, child)?;
                regs.parent = None;
            }
            Opcode::SetPropertyOffset => {
                let index = cursor.read_index()?;
                let registry = &self.registry;
                let (table, name, len) = match self.kind {
                    ChunkKind::Group => (
                        "actor property",
                        registry.actor_property_name(index),
                        registry.actor_properties().len(),
                    ),
                    ChunkKind::Set => (
                        "set property",
                        registry.set_property_name(index),
                        registry.set_properties().len(),
                    ),
                };
                let name = name.ok_or(FormatError::TableIndex { table, index, len })?;
                regs.property = Some(name.to_string());
            }
            Opcode::SetPropertyLength => {
                regs.length = cursor.read_index()?;
            }
            Opcode::CopyProperty => {
                let data = cursor.read_bytes(regs.length as usize)?.to_vec();
                self.assign(regs, Assignment::Single(Property::unknown(data)))?;
            }
            Opcode::CopyDynamicProperty => {
                let length = cursor.read_u32()?;
                let data = cursor.read_bytes(length as usize)?.to_vec();
                self.assign(regs, Assignment::Single(Property::unknown(data)))?;
            }
            Opcode::CopyArrayProperty => {
                let count = cursor.read_u32()?;
                let total = count
                    .checked_mul(regs.length)
                    .ok_or(FormatError::PropertySizeOverflow {
                        count,
                        element_size: regs.length,
                    })?;
                let data = cursor.read_bytes(total as usize)?.to_vec();
                let array = PropertyArray {
                    element_size: regs.length,
                    count,
                    data,
                };
                self.assign(regs, Assignment::Array(array))?;
            }
            Opcode::CopyMediaRef => {
                let index = cursor.read_index()?;
                self.assign(regs, Assignment::Single(Property::media_ref(index)))?;
            }
            Opcode::CreateSet => {
                let type_index = cursor.read_index()?;
                let set = self.registry.create_set(type_index)?;
                debug!("created set {type_index} ({})", set.borrow().class_name());
                self.set = Some((type_index, set));
            }
            Opcode::EndActorGroup | Opcode::EndSet => {}
            // Superseded by role bindings; never valid in a stream.
            Opcode::BeginActorSet => {
                return Err(FormatError::InvalidOpcode {
                    opcode: opcode as u8,
                    offset: cursor.position() - 1,
                }
                .into());
            }
        }
        Ok(())
    }

    fn attach_child(&mut self, parent: u32, child: u32) -> LoadResult<()> {
        let count = self.slots.len();
        for slot in [parent, child] {
            if slot as usize >= count {
                return Err(FormatError::ActorSlot { slot, count }.into());
            }
        }
        if parent == child {
            return Err(FormatError::SelfParent { slot: child }.into());
        }
        if self.slots[child as usize].attached {
            return Err(FormatError::RoleAlreadyAttached { slot: child }.into());
        }
        let set = self.slots[parent as usize]
            .record
            .set_handle()
            .cloned()
            .ok_or(FormatError::NoActiveSet)?;
        let shared = self.slots[child as usize]
            .record
            .set_handle()
            .is_some_and(|handle| Rc::ptr_eq(handle, &set));
        if !shared {
            return Err(FormatError::SetMismatch { parent, child }.into());
        }

        let (parent_slot, child_slot) = pair_mut(&mut self.slots, parent as usize, child as usize);
        let parent_role: &mut dyn Role = parent_slot
            .record
            .role
            .as_deref_mut()
            .ok_or(FormatError::MissingRole { slot: parent })?;
        let child_role: &mut dyn Role = child_slot
            .record
            .role
            .as_deref_mut()
            .ok_or(FormatError::MissingRole { slot: child })?;
        set.borrow_mut()
            .attach_roles(Some(parent_role), child_role)
            .map_err(|err| FormatError::AttachRejected(err.to_string()))?;
        child_slot.attached = true;
        trace!("attached slot {child} under slot {parent}");
        Ok(())
    }

    fn assign(&mut self, regs: &Registers, value: Assignment) -> LoadResult<()> {
        let name = regs.property.as_deref().ok_or(FormatError::NoPropertyName)?;
        let outcome = match self.kind {
            ChunkKind::Group => {
                let slot = self.slots.last_mut().ok_or(FormatError::NoActiveActor)?;
                match value {
                    Assignment::Single(property) => slot.record.actor.set_property(name, property),
                    Assignment::Array(array) => slot.record.actor.set_property_array(name, array),
                }
            }
            ChunkKind::Set => {
                let (_, set) = self.set.as_ref().ok_or(FormatError::NoActiveSet)?;
                let mut set = set.borrow_mut();
                match value {
                    Assignment::Single(property) => set.set_property(name, property),
                    Assignment::Array(array) => set.set_property_array(name, array),
                }
            }
        };
        outcome.map_err(|err| {
            FormatError::PropertyRejected {
                name: name.to_string(),
                reason: err.to_string(),
            }
            .into()
        })
    }

    /// Hand every role that was never parented to its own set.
    fn last_call(&mut self) -> LoadResult<()> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Slot { record, attached } = slot;
            if *attached {
                continue;
            }
            let (Some(role), Some(binding)) = (record.role.as_deref_mut(), record.set.as_ref())
            else {
                continue;
            };
            let role: &mut dyn Role = role;
            binding
                .handle
                .borrow_mut()
                .attach_roles(None, role)
                .map_err(|err| FormatError::AttachRejected(err.to_string()))?;
            *attached = true;
            trace!("last call attached slot {index}");
        }
        Ok(())
    }
}

fn pair_mut<T>(items: &mut [T], first: usize, second: usize) -> (&mut T, &mut T) {
    if first < second {
        let (head, tail) = items.split_at_mut(second);
        (&mut head[first], &mut tail[0])
    } else {
        let (head, tail) = items.split_at_mut(first);
        (&mut tail[0], &mut head[second])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::registry::{ClassEntry, ObjectRegistry, PropertyEntry, SetEntry, SetTable, Tables, TitleManifest};
    use crate::stock::{self, PropertyBagActor, StageSet};
    use mle_formats::{Assembler, ByteFormat};

    fn class(name: &str) -> ClassEntry {
        ClassEntry {
            name: name.to_string(),
            constructor: None,
        }
    }

    fn tables() -> Rc<dyn ClassRegistry> {
        let manifest = TitleManifest {
            actor_classes: vec![class("PropertyBagActor")],
            role_classes: vec![class("StockRole")],
            set_classes: vec![class("StageSet"), class("StageSet")],
            actor_properties: vec![
                PropertyEntry {
                    class: "PropertyBagActor".into(),
                    property: "position".into(),
                },
                PropertyEntry {
                    class: "PropertyBagActor".into(),
                    property: "image".into(),
                },
            ],
            set_properties: vec![PropertyEntry {
                class: "StageSet".into(),
                property: "backdrop".into(),
            }],
            sets: vec![
                SetEntry {
                    name: "stage".into(),
                    chunk: 0,
                },
                SetEntry {
                    name: "overlay".into(),
                    chunk: 1,
                },
            ],
            ..TitleManifest::default()
        };
        Rc::new(Tables::from_manifest(manifest, stock::catalog()))
    }

    /// Creates sets directly from the registry instead of replaying chunks.
    struct TestHost {
        registry: Rc<dyn ClassRegistry>,
        sets: SetTable,
        objects: ObjectRegistry,
    }

    impl TestHost {
        fn new(registry: Rc<dyn ClassRegistry>) -> Self {
            let sets = registry.set_table();
            Self {
                registry,
                sets,
                objects: ObjectRegistry::default(),
            }
        }
    }

    impl GroupHost for TestHost {
        fn load_set(&mut self, index: u32) -> LoadResult<SetHandle> {
            self.sets.slot(index)?;
            if let Some(set) = self.sets.cached(index) {
                return Ok(set);
            }
            let set = self.registry.create_set(index)?;
            self.sets.install(index, Rc::clone(&set))?;
            Ok(set)
        }

        fn register_actor(&mut self, type_index: u32, actor: &dyn Actor) -> ObjectId {
            self.objects.register(type_index, actor.class_name())
        }
    }

    fn run_group(stream: &[u8], count: usize) -> (LoadResult<()>, GroupContext, TestHost) {
        let registry = tables();
        let mut host = TestHost::new(Rc::clone(&registry));
        let mut gc = GroupContext::for_group(registry, count);
        let mut cursor = ChunkCursor::new(stream, ByteFormat::BigEndian);
        let outcome = gc.parse_stream(&mut cursor, &mut host);
        (outcome, gc, host)
    }

    fn bag(record: &ActorRecord) -> &PropertyBagActor {
        record
            .actor
            .as_any()
            .downcast_ref::<PropertyBagActor>()
            .unwrap()
    }

    #[test]
    fn copies_fixed_length_property_onto_actor() {
        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0)
            .set_property_offset(0)
            .set_property_length(4)
            .copy_property(&[1, 2, 3, 4])
            .end_actor_group();
        let (outcome, gc, host) = run_group(asm.stream(), 1);
        outcome.unwrap();

        let records = gc.into_records();
        assert_eq!(records.len(), 1);
        let property = bag(&records[0]).property("position").unwrap();
        assert_eq!(property.data, vec![1, 2, 3, 4]);
        assert_eq!(host.objects.len(), 1);
    }

    #[test]
    fn dynamic_array_and_media_properties() {
        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0)
            .set_property_offset(0)
            .copy_dynamic_property(b"abc")
            .set_property_length(2)
            .copy_array_property(3, &[1, 1, 2, 2, 3, 3])
            .set_property_offset(1)
            .copy_media_ref(12)
            .end_actor_group();
        let (outcome, gc, _) = run_group(asm.stream(), 1);
        outcome.unwrap();

        let records = gc.into_records();
        let actor = bag(&records[0]);
        assert_eq!(actor.property("position").unwrap().data, b"abc".to_vec());
        let array = &actor.properties.arrays["position"];
        assert_eq!((array.element_size, array.count), (2, 3));
        assert_eq!(actor.property("image").unwrap().media_ref_index(), Some(12));
    }

    #[test]
    fn child_role_attaches_under_parent_and_last_call_covers_the_rest() {
        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0)
            .set_set(0)
            .bind_role(0)
            .create_actor(0)
            .set_set(0)
            .bind_role(0)
            .parent_role(0)
            .child_role(1)
            .end_actor_group();
        let (outcome, gc, host) = run_group(asm.stream(), 2);
        outcome.unwrap();
        assert_eq!(gc.unattached_roles(), 0);

        let set = host.sets.cached(0).unwrap();
        let set = set.borrow();
        let stage = set.as_any().downcast_ref::<StageSet>().unwrap();
        let records: Vec<_> = gc.records().collect();
        assert_eq!(stage.attachments.len(), 2);
        assert_eq!(stage.attachments[0].parent, Some(records[0].id));
        assert_eq!(stage.attachments[0].child, records[1].id);
        assert_eq!(stage.attachments[1].parent, None);
        assert_eq!(stage.attachments[1].child, records[0].id);
    }

    #[test]
    fn child_role_rejects_actors_on_different_sets() {
        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0)
            .set_set(0)
            .bind_role(0)
            .create_actor(0)
            .set_set(1)
            .bind_role(0)
            .parent_role(0)
            .child_role(1)
            .end_actor_group();
        let (outcome, _, _) = run_group(asm.stream(), 2);
        assert!(matches!(
            outcome,
            Err(LoadError::Format(FormatError::SetMismatch { parent: 0, child: 1 }))
        ));
    }

    #[test]
    fn child_role_checks_slots_and_roles() {
        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0).child_role(0).end_actor_group();
        let (outcome, _, _) = run_group(asm.stream(), 1);
        assert!(matches!(
            outcome,
            Err(LoadError::Format(FormatError::NoParentRole))
        ));

        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0).parent_role(0).child_role(4).end_actor_group();
        let (outcome, _, _) = run_group(asm.stream(), 1);
        assert!(matches!(
            outcome,
            Err(LoadError::Format(FormatError::ActorSlot { slot: 4, count: 1 }))
        ));

        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0)
            .create_actor(0)
            .parent_role(0)
            .child_role(1)
            .end_actor_group();
        let (outcome, _, _) = run_group(asm.stream(), 2);
        assert!(matches!(
            outcome,
            Err(LoadError::Format(FormatError::NoActiveSet))
        ));
    }

    #[test]
    fn child_role_attaches_a_child_only_once() {
        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0)
            .set_set(0)
            .bind_role(0)
            .create_actor(0)
            .set_set(0)
            .bind_role(0)
            .parent_role(0)
            .child_role(1)
            .parent_role(0)
            .child_role(1)
            .end_actor_group();
        let (outcome, _, host) = run_group(asm.stream(), 2);
        assert!(matches!(
            outcome,
            Err(LoadError::Format(FormatError::RoleAlreadyAttached { slot: 1 }))
        ));
        let set = host.sets.cached(0).unwrap();
        let set = set.borrow();
        let stage = set.as_any().downcast_ref::<StageSet>().unwrap();
        assert_eq!(stage.attachments.len(), 1);
    }

    #[test]
    fn child_role_rejects_its_own_parent() {
        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0)
            .set_set(0)
            .bind_role(0)
            .parent_role(0)
            .child_role(0)
            .end_actor_group();
        let (outcome, _, _) = run_group(asm.stream(), 1);
        assert!(matches!(
            outcome,
            Err(LoadError::Format(FormatError::SelfParent { slot: 0 }))
        ));
    }

    #[test]
    fn bind_role_requires_actor_and_pending_set() {
        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.set_set(0).bind_role(0).end_actor_group();
        let (outcome, _, _) = run_group(asm.stream(), 0);
        assert!(matches!(
            outcome,
            Err(LoadError::Format(FormatError::NoActiveActor))
        ));

        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0).bind_role(0).end_actor_group();
        let (outcome, _, _) = run_group(asm.stream(), 1);
        assert!(matches!(
            outcome,
            Err(LoadError::Format(FormatError::NoPendingSet))
        ));
    }

    #[test]
    fn reserved_and_unknown_opcodes_are_invalid() {
        for byte in [0x80u8, 0x8f, 0xff] {
            let mut asm = Assembler::new(ByteFormat::BigEndian);
            asm.create_actor(0).raw(byte);
            let (outcome, _, _) = run_group(asm.stream(), 1);
            assert!(
                matches!(
                    outcome,
                    Err(LoadError::Format(FormatError::InvalidOpcode { opcode, offset: 2 })) if opcode == byte
                ),
                "opcode {byte:#04x}"
            );
        }
    }

    #[test]
    fn creating_more_actors_than_declared_fails() {
        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0).create_actor(0).end_actor_group();
        let (outcome, _, _) = run_group(asm.stream(), 1);
        assert!(matches!(
            outcome,
            Err(LoadError::Format(FormatError::ActorOverflow { declared: 1 }))
        ));
    }

    #[test]
    fn property_copy_needs_a_name() {
        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0)
            .set_property_length(1)
            .copy_property(&[9]);
        let (outcome, _, _) = run_group(asm.stream(), 1);
        assert!(matches!(
            outcome,
            Err(LoadError::Format(FormatError::NoPropertyName))
        ));

        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0).set_property_offset(7).end_actor_group();
        let (outcome, _, _) = run_group(asm.stream(), 1);
        assert!(matches!(
            outcome,
            Err(LoadError::Format(FormatError::TableIndex {
                table: "actor property",
                index: 7,
                len: 2,
            }))
        ));

        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_set(0).set_property_offset(1).end_set();
        let stream = asm.set_payload();
        let registry = tables();
        let mut host = TestHost::new(Rc::clone(&registry));
        let mut gc = GroupContext::for_set(registry);
        let mut cursor = ChunkCursor::new(&stream, ByteFormat::BigEndian);
        let outcome = gc.parse_stream(&mut cursor, &mut host);
        assert!(matches!(
            outcome,
            Err(LoadError::Format(FormatError::TableIndex {
                table: "set property",
                index: 1,
                len: 1,
            }))
        ));
    }

    #[test]
    fn set_chunks_create_and_fill_their_set() {
        let registry = tables();
        let mut host = TestHost::new(Rc::clone(&registry));
        let mut asm = Assembler::new(ByteFormat::LittleEndian);
        asm.create_set(1)
            .set_property_offset(0)
            .copy_dynamic_property(b"sky")
            .end_set();
        let stream = asm.set_payload();
        let mut cursor = ChunkCursor::new(&stream, ByteFormat::LittleEndian);
        let mut gc = GroupContext::for_set(registry);
        gc.parse_stream(&mut cursor, &mut host).unwrap();

        let (index, set) = gc.created_set().unwrap();
        assert_eq!(index, 1);
        assert!(host.sets.cached(1).is_none());
        let set = set.borrow();
        let stage = set.as_any().downcast_ref::<StageSet>().unwrap();
        assert_eq!(stage.properties.values["backdrop"].data, b"sky".to_vec());
    }

    #[test]
    fn set_chunks_reject_actor_creation() {
        let registry = tables();
        let mut host = TestHost::new(Rc::clone(&registry));
        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0);
        let stream = asm.set_payload();
        let mut cursor = ChunkCursor::new(&stream, ByteFormat::BigEndian);
        let mut gc = GroupContext::for_set(registry);
        let outcome = gc.parse_stream(&mut cursor, &mut host);
        assert!(matches!(
            outcome,
            Err(LoadError::Format(FormatError::OpcodeNotAllowed { opcode: 0x81, context: "set" }))
        ));
    }

    #[test]
    fn replaying_twice_builds_the_same_graph() {
        let mut asm = Assembler::new(ByteFormat::BigEndian);
        asm.create_actor(0)
            .set_set(0)
            .bind_role(0)
            .set_property_offset(0)
            .set_property_length(2)
            .copy_property(&[5, 6])
            .create_actor(0)
            .set_set(0)
            .bind_role(0)
            .create_actor(0)
            .set_set(0)
            .bind_role(0)
            .parent_role(0)
            .child_role(2)
            .end_actor_group();

        let shape = |gc: &GroupContext, host: &TestHost| {
            let set = host.sets.cached(0).unwrap();
            let set = set.borrow();
            let stage = set.as_any().downcast_ref::<StageSet>().unwrap();
            let slot_of = |id| gc.records().position(|r| r.id == id);
            let edges: Vec<_> = stage
                .attachments
                .iter()
                .map(|a| (a.parent.and_then(|p| slot_of(p)), slot_of(a.child)))
                .collect();
            (gc.records().count(), edges)
        };

        let (first, gc_a, host_a) = run_group(asm.stream(), 3);
        let (second, gc_b, host_b) = run_group(asm.stream(), 3);
        first.unwrap();
        second.unwrap();
        assert_eq!(shape(&gc_a, &host_a), shape(&gc_b, &host_b));
        assert_eq!(shape(&gc_a, &host_a).1.len(), 3);
    }
}
