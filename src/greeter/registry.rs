//! Slab-backed handler registry.
//!
//! Maps completion tags to live call handlers with O(1) insert, lookup, and
//! remove. The tag handed to the transport is the slab key; the dispatcher
//! removes the entry on a handler's terminal transition, so a stale tag can
//! never reach a disposed handler.

use crate::greeter::completion::Tag;
use crate::greeter::handler::CallHandler;
use slab::Slab;

/// Registry of live call handlers.
pub struct HandlerRegistry {
    handlers: Slab<CallHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Slab::new(),
        }
    }

    /// Insert a handler, returning the tag that identifies it in completions.
    pub fn insert(&mut self, handler: CallHandler) -> Tag {
        Tag(self.handlers.insert(handler))
    }

    /// Get an immutable reference to a handler.
    pub fn get(&self, tag: Tag) -> Option<&CallHandler> {
        self.handlers.get(tag.0)
    }

    /// Get a mutable reference to a handler.
    pub fn get_mut(&mut self, tag: Tag) -> Option<&mut CallHandler> {
        self.handlers.get_mut(tag.0)
    }

    /// Remove a handler. Returns `None` if the tag was already disposed.
    pub fn remove(&mut self, tag: Tag) -> Option<CallHandler> {
        self.handlers.try_remove(tag.0)
    }

    /// Check if a handler exists for the tag.
    pub fn contains(&self, tag: Tag) -> bool {
        self.handlers.contains(tag.0)
    }

    /// Number of live handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Number of handlers armed and waiting for a request.
    pub fn armed_count(&self) -> usize {
        self.handlers.iter().filter(|(_, h)| h.is_armed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_lookup_remove() {
        let mut registry = HandlerRegistry::new();

        let t1 = registry.insert(CallHandler::new());
        let t2 = registry.insert(CallHandler::new());
        assert_ne!(t1, t2);
        assert_eq!(registry.len(), 2);

        assert!(registry.contains(t1));
        assert!(registry.get(t1).is_some());

        assert!(registry.remove(t1).is_some());
        assert!(!registry.contains(t1));
        assert!(registry.get(t1).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_double_remove_is_none() {
        let mut registry = HandlerRegistry::new();

        let tag = registry.insert(CallHandler::new());
        assert!(registry.remove(tag).is_some());
        assert!(registry.remove(tag).is_none());
    }

    #[test]
    fn test_armed_count() {
        let mut registry = HandlerRegistry::new();

        let t1 = registry.insert(CallHandler::new());
        let _t2 = registry.insert(CallHandler::new());
        assert_eq!(registry.armed_count(), 0);

        if let Some(h) = registry.get_mut(t1) {
            h.arm();
        }
        assert_eq!(registry.armed_count(), 1);
    }
}
