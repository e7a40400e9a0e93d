//! Frames are the vertices of the graph: a unique name, a stable identifier
//! and a list of opaque payload items.

use std::any::Any;
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// Opaque payload attached to a frame. Handles are shared: the same item may
/// be referenced outside the graph and is not exclusively owned by the frame.
pub type ItemHandle = Rc<dyn Any>;

/// A named spatial reference frame.
#[derive(Clone)]
pub struct Frame {
    name: String,
    uuid: Uuid,
    items: Vec<ItemHandle>,
}

impl Frame {
    pub fn new(name: impl Into<String>) -> Self {
        Frame {
            name: name.into(),
            uuid: Uuid::new_v4(),
            items: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier assigned at creation, stable for the lifetime of the frame.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Append an item to the frame. The graph does not interpret items.
    pub fn add_item(&mut self, item: ItemHandle) {
        self.items.push(item);
    }

    /// Remove and return the item at `index`, or `None` if out of range.
    pub fn remove_item(&mut self, index: usize) -> Option<ItemHandle> {
        if index < self.items.len() {
            Some(self.items.remove(index))
        } else {
            None
        }
    }

    pub fn items(&self) -> &[ItemHandle] {
        &self.items
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("name", &self.name)
            .field("uuid", &self.uuid)
            .field("items", &self.items.len())
            .finish()
    }
}
