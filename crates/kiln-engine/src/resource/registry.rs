use std::collections::HashMap;

use crate::error::{Error, ResourceKind, Result};

use super::Id;

struct Slot<T> {
    generation: u32,
    entry: Option<(String, T)>,
}

/// Slot arena keyed by unique names.
pub struct Registry<T> {
    kind: ResourceKind,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    names: HashMap<String, Id<T>>,
}

impl<T> Registry<T> {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            slots: Vec::new(),
            free: Vec::new(),
            names: HashMap::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Registers `value` under `name`.
    ///
    /// Fails with `DuplicateName` if the name is taken; the registry is left
    /// untouched in that case.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Result<Id<T>> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(Error::DuplicateName { kind: self.kind, name });
        }

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some((name.clone(), value));
                Id::new(index, slot.generation)
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some((name.clone(), value)),
                });
                Id::new(index, 0)
            }
        };

        self.names.insert(name, id);
        Ok(id)
    }

    /// Removes the resource behind `id`, returning it with its name.
    ///
    /// The slot generation is bumped so `id` (and copies of it) go stale.
    pub fn remove(&mut self, id: Id<T>) -> Option<(String, T)> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let (name, value) = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index());
        self.names.remove(&name);
        Some((name, value))
    }

    pub fn remove_by_name(&mut self, name: &str) -> Option<(String, T)> {
        let id = self.lookup(name)?;
        self.remove(id)
    }

    #[inline]
    pub fn lookup(&self, name: &str) -> Option<Id<T>> {
        self.names.get(name).copied()
    }

    /// Looks up `name`, mapping absence to `NotFound`.
    pub fn require(&self, name: &str) -> Result<Id<T>> {
        self.lookup(name).ok_or_else(|| Error::not_found(self.kind, name))
    }

    #[inline]
    pub fn contains(&self, id: Id<T>) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: Id<T>) -> Option<&T> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.entry.as_ref().map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.entry.as_mut().map(|(_, v)| v)
    }

    pub fn name(&self, id: Id<T>) -> Option<&str> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.entry.as_ref().map(|(n, _)| n.as_str())
    }

    /// Iterates live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &str, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.entry
                .as_ref()
                .map(|(n, v)| (Id::new(i as u32, slot.generation), n.as_str(), v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg() -> Registry<u32> {
        Registry::new(ResourceKind::Texture)
    }

    #[test]
    fn duplicate_name_rejected_and_first_kept() {
        let mut r = reg();
        let a = r.insert("a", 1).unwrap();
        let err = r.insert("a", 2).unwrap_err();
        assert!(matches!(err, Error::DuplicateName { kind: ResourceKind::Texture, .. }));
        assert_eq!(r.get(a), Some(&1));
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn stale_id_does_not_alias_reused_slot() {
        let mut r = reg();
        let a = r.insert("a", 1).unwrap();
        assert_eq!(r.remove(a), Some(("a".to_string(), 1)));
        let b = r.insert("b", 2).unwrap();
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(r.get(a).is_none());
        assert_eq!(r.get(b), Some(&2));
        assert!(r.remove(a).is_none());
    }

    #[test]
    fn name_freed_after_remove() {
        let mut r = reg();
        r.insert("a", 1).unwrap();
        r.remove_by_name("a");
        assert!(r.lookup("a").is_none());
        assert!(r.insert("a", 3).is_ok());
    }

    #[test]
    fn iter_skips_removed() {
        let mut r = reg();
        r.insert("a", 1).unwrap();
        let b = r.insert("b", 2).unwrap();
        r.insert("c", 3).unwrap();
        r.remove(b);
        let names: Vec<&str> = r.iter().map(|(_, n, _)| n).collect();
        assert_eq!(names, ["a", "c"]);
    }
}
