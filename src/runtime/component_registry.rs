//! Component registry and identifiers.

use crate::core::component::Component;

/// Stable identifier for a component owned by a single `TuiRuntime` instance.
///
/// IDs are unique within a runtime instance and never reused.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ComponentId(usize);

impl ComponentId {
    pub fn raw(self) -> usize {
        self.0
    }
}

#[derive(Default)]
pub struct ComponentRegistry {
    entries: Vec<Box<dyn Component>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_boxed(&mut self, component: Box<dyn Component>) -> ComponentId {
        self.entries.push(component);
        ComponentId(self.entries.len() - 1)
    }

    pub fn get_mut(&mut self, id: ComponentId) -> Option<&mut Box<dyn Component>> {
        self.entries.get_mut(id.raw())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
