use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use crate::object::{InitContext, SceneHandle, SetHandle};

/// A "current object" slot.
#[derive(Debug)]
pub struct Current<T> {
    slot: RefCell<Option<T>>,
}

impl<T> Default for Current<T> {
    fn default() -> Self {
        Self {
            slot: RefCell::new(None),
        }
    }
}

impl<T: Clone> Current<T> {
    pub fn get(&self) -> Option<T> {
        self.slot.borrow().clone()
    }

    fn replace(&self, value: Option<T>) -> Option<T> {
        self.slot.replace(value)
    }
}

/// The current set and scene seen by objects while a load is in flight.
#[derive(Debug, Default)]
pub struct LoadContext {
    set: Current<SetHandle>,
    scene: Current<SceneHandle>,
}

fn set_slot(context: &LoadContext) -> &Current<SetHandle> {
    &context.set
}

fn scene_slot(context: &LoadContext) -> &Current<SceneHandle> {
    &context.scene
}

impl LoadContext {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn current_set(&self) -> Option<SetHandle> {
        self.set.get()
    }

    pub fn current_scene(&self) -> Option<SceneHandle> {
        self.scene.get()
    }

    /// Make `set` current until the returned guard drops.
    pub fn enter_set(self: &Rc<Self>, set: Option<SetHandle>) -> Scope<SetHandle> {
        trace!("entering set scope (set present: {})", set.is_some());
        Scope::enter(Rc::clone(self), set_slot, set)
    }

    pub fn enter_scene(self: &Rc<Self>, scene: Option<SceneHandle>) -> Scope<SceneHandle> {
        trace!("entering scene scope (scene present: {})", scene.is_some());
        Scope::enter(Rc::clone(self), scene_slot, scene)
    }

    pub fn init_context(&self) -> InitContext {
        InitContext {
            set: self.current_set(),
            scene: self.current_scene(),
        }
    }
}

/// Restores the previous occupant of a [`LoadContext`] slot on drop.
#[must_use = "the slot is restored as soon as the scope is dropped"]
pub struct Scope<T: Clone> {
    context: Rc<LoadContext>,
    slot: fn(&LoadContext) -> &Current<T>,
    previous: Option<T>,
}

impl<T: Clone> Scope<T> {
    fn enter(context: Rc<LoadContext>, slot: fn(&LoadContext) -> &Current<T>, value: Option<T>) -> Self {
        let previous = slot(&context).replace(value);
        Self {
            context,
            slot,
            previous,
        }
    }
}

impl<T: Clone> Drop for Scope<T> {
    fn drop(&mut self) {
        (self.slot)(&self.context).replace(self.previous.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::{StageSet, StockScene};

    fn stage(name: &str) -> SetHandle {
        Rc::new(RefCell::new(StageSet::new(name)))
    }

    #[test]
    fn scopes_nest_and_restore() {
        let context = LoadContext::new();
        let outer = stage("outer");
        let inner = stage("inner");

        let outer_scope = context.enter_set(Some(outer.clone()));
        {
            let _inner_scope = context.enter_set(Some(inner.clone()));
            assert!(Rc::ptr_eq(&context.current_set().unwrap(), &inner));
        }
        assert!(Rc::ptr_eq(&context.current_set().unwrap(), &outer));
        drop(outer_scope);
        assert!(context.current_set().is_none());
    }

    #[test]
    fn scope_restores_on_error_path() {
        fn failing(context: &Rc<LoadContext>) -> Result<(), String> {
            let scene: SceneHandle = Rc::new(RefCell::new(StockScene::new("intro")));
            let _scope = context.enter_scene(Some(scene));
            assert!(context.current_scene().is_some());
            Err("boom".to_string())
        }

        let context = LoadContext::new();
        assert!(failing(&context).is_err());
        assert!(context.current_scene().is_none());
        assert!(context.init_context().scene.is_none());
    }
}
