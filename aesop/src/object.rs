use std::ops::Range;
use std::sync::Arc;

use crate::Thunk;

/// A live instance of a program.
#[derive(Debug)]
pub struct Object {
    index: usize,
    program_id: u32,
    thunk: Arc<Thunk>,
    /// Static variables of every class in the chain, root class first.
    pub statics: Vec<u8>,
}

impl Object {
    pub fn new(index: usize, program_id: u32, thunk: Arc<Thunk>) -> Self {
        thunk.acquire();
        let statics = vec![0; thunk.object_statics_size()];
        Self {
            index,
            program_id,
            thunk,
            statics,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn program_id(&self) -> u32 {
        self.program_id
    }

    pub fn thunk(&self) -> &Arc<Thunk> {
        &self.thunk
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        self.thunk.release();
    }
}

/// Fixed-capacity table of objects indexed by slot.
#[derive(Debug)]
pub struct ObjectTable {
    slots: Vec<Option<Object>>,
}

impl ObjectTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, index: usize) -> Option<&Object> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Object> {
        self.slots.get_mut(index)?.as_mut()
    }

    pub fn is_occupied(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Place `object` at its own index. Returns the previous occupant.
    pub fn insert(&mut self, object: Object) -> Option<Object> {
        let index = object.index;
        self.slots.get_mut(index)?.replace(object)
    }

    pub fn remove(&mut self, index: usize) -> Option<Object> {
        self.slots.get_mut(index)?.take()
    }

    /// First empty slot in `range`.
    pub fn find_free(&self, range: Range<usize>) -> Option<usize> {
        let end = range.end.min(self.slots.len());
        (range.start..end).find(|&i| self.slots[i].is_none())
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.slots.iter().flatten()
    }
}
