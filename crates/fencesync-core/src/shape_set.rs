//! Ordered, owning collection of fence shapes.

use crate::shapes::FenceShape;
use thiserror::Error;

/// Errors from index-based access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShapeSetError {
    #[error("index {index} out of range for {len} shapes")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Notifications raised by a `ShapeSet`, drained by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetEvent {
    CountChanged(usize),
    DirtyChanged(bool),
}

/// Ordered list of shapes with per-shape and aggregate dirty tracking.
///
/// Shape mutation goes through [`ShapeSet::edit`] so the set can notice a
/// shape turning dirty and re-raise it as an aggregate notification.
#[derive(Debug, Clone)]
pub struct ShapeSet<T: FenceShape> {
    items: Vec<T>,
    dirty: bool,
    events: Vec<SetEvent>,
}

impl<T: FenceShape> Default for ShapeSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: FenceShape> ShapeSet<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            dirty: false,
            events: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Aggregate dirty flag: membership changed or a shape turned dirty.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn append(&mut self, shape: T) {
        self.items.push(shape);
        self.count_changed();
    }

    /// Remove and return the shape at `index`.
    pub fn remove_at(&mut self, index: usize) -> Result<T, ShapeSetError> {
        if index >= self.items.len() {
            return Err(ShapeSetError::IndexOutOfRange {
                index,
                len: self.items.len(),
            });
        }
        let shape = self.items.remove(index);
        self.count_changed();
        Ok(shape)
    }

    /// Drop every shape.
    pub fn clear(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.items.clear();
        self.count_changed();
    }

    /// Run `f` on the shape at `index`.
    ///
    /// If the shape was clean before and dirty afterwards the aggregate
    /// dirty flag is raised.
    pub fn edit<R>(&mut self, index: usize, f: impl FnOnce(&mut T) -> R) -> Result<R, ShapeSetError> {
        let len = self.items.len();
        let shape = self
            .items
            .get_mut(index)
            .ok_or(ShapeSetError::IndexOutOfRange { index, len })?;
        let was_dirty = shape.is_dirty();
        let result = f(shape);
        if !was_dirty && shape.is_dirty() {
            self.set_dirty(true);
        }
        Ok(result)
    }

    /// Set the aggregate flag. Clearing also clears every contained shape.
    pub fn set_all_dirty(&mut self, dirty: bool) {
        if !dirty {
            for shape in &mut self.items {
                shape.set_dirty(false);
            }
        }
        self.set_dirty(dirty);
    }

    pub fn clear_interactive(&mut self) {
        for shape in &mut self.items {
            shape.set_interactive(false);
        }
    }

    /// Take queued notifications.
    pub fn drain_events(&mut self) -> Vec<SetEvent> {
        std::mem::take(&mut self.events)
    }

    fn set_dirty(&mut self, dirty: bool) {
        if self.dirty != dirty {
            self.dirty = dirty;
            self.events.push(SetEvent::DirtyChanged(dirty));
        }
    }

    fn count_changed(&mut self) {
        self.events.push(SetEvent::CountChanged(self.items.len()));
        self.set_dirty(true);
    }
}

impl<'a, T: FenceShape> IntoIterator for &'a ShapeSet<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
