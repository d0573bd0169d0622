use std::collections::hash_set;
use std::collections::HashSet;
use std::hash::Hash;

/// Membership set used for include lists and already-watched keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Set<T: Eq + Hash> {
    items: HashSet<T>,
}

impl<T: Eq + Hash> Default for Set<T> {
    fn default() -> Self {
        Self {
            items: HashSet::new(),
        }
    }
}

impl<T: Eq + Hash> Set<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the item was not present yet
    pub fn add(&mut self, item: T) -> bool {
        self.items.insert(item)
    }

    pub fn has<Q>(&self, item: &Q) -> bool
    where
        T: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.items.contains(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> hash_set::Iter<'_, T> {
        self.items.iter()
    }

    /// Add every item of `other`
    pub fn extend_from(&mut self, other: Set<T>) {
        self.items.extend(other.items);
    }
}

impl<T: Eq + Hash + Clone> Set<T> {
    pub fn union(&self, other: &Set<T>) -> Set<T> {
        self.items.union(&other.items).cloned().collect()
    }

    pub fn intersection(&self, other: &Set<T>) -> Set<T> {
        self.items.intersection(&other.items).cloned().collect()
    }
}

impl<T: Eq + Hash> FromIterator<T> for Set<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<T: Eq + Hash> Extend<T> for Set<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<T: Eq + Hash> IntoIterator for Set<T> {
    type Item = T;
    type IntoIter = hash_set::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
