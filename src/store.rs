//! Observable state cells
//!
//! `Store<T>` keeps the current value behind an `Arc` and notifies
//! subscribers through a `tokio::sync::watch` channel. Values are replaced,
//! never mutated in place, so `Arc::ptr_eq` tells observers whether anything
//! changed.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug)]
pub struct Store<T> {
    sender: watch::Sender<Arc<T>>,
}

impl<T> Store<T> {
    pub fn new(initial: T) -> Self {
        let (sender, _) = watch::channel(Arc::new(initial));
        Self { sender }
    }

    /// Current value, shared.
    pub fn get(&self) -> Arc<T> {
        self.sender.borrow().clone()
    }

    pub fn set(&self, value: T) {
        self.sender.send_replace(Arc::new(value));
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<T>> {
        self.sender.subscribe()
    }
}

impl<T: Clone> Store<T> {
    /// Clone the current value, apply `f`, publish the result.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Arc<T> {
        let mut next = (*self.get()).clone();
        f(&mut next);
        let next = Arc::new(next);
        self.sender.send_replace(next.clone());
        next
    }
}

/// Return a new set with `item` flipped. The input is left untouched.
pub fn toggle_set_item<T>(set: &HashSet<T>, item: &T) -> HashSet<T>
where
    T: Eq + Hash + Clone,
{
    let mut next = set.clone();
    if !next.remove(item) {
        next.insert(item.clone());
    }
    next
}

/// Selected entity ids, e.g. rows ticked in a table.
#[derive(Debug)]
pub struct SelectionSet<Id> {
    store: Store<HashSet<Id>>,
}

impl<Id> SelectionSet<Id>
where
    Id: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            store: Store::new(HashSet::new()),
        }
    }

    pub fn ids(&self) -> Arc<HashSet<Id>> {
        self.store.get()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.store.get().contains(id)
    }

    pub fn len(&self) -> usize {
        self.store.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.get().is_empty()
    }

    pub fn toggle(&self, id: &Id) {
        let next = toggle_set_item(&self.store.get(), id);
        self.store.set(next);
    }

    pub fn select_all(&self, ids: impl IntoIterator<Item = Id>) {
        self.store.set(ids.into_iter().collect());
    }

    pub fn clear(&self) {
        self.store.set(HashSet::new());
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<HashSet<Id>>> {
        self.store.subscribe()
    }
}

impl<Id> Default for SelectionSet<Id>
where
    Id: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_twice_is_identity_and_input_untouched() {
        let original: HashSet<i64> = [1, 2].into_iter().collect();

        let added = toggle_set_item(&original, &3);
        assert!(added.contains(&3));
        assert_eq!(original.len(), 2);

        let back = toggle_set_item(&added, &3);
        assert_eq!(back, original);

        let removed = toggle_set_item(&original, &1);
        assert!(!removed.contains(&1));
        assert!(original.contains(&1));
    }

    #[test]
    fn test_update_publishes_a_new_value() {
        let store = Store::new(vec![1]);
        let before = store.get();
        let after = store.update(|v| v.push(2));

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(*before, vec![1]);
        assert_eq!(*store.get(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_subscribers_are_notified() {
        let store = Store::new(0);
        let mut rx = store.subscribe();
        store.set(5);
        rx.changed().await.unwrap();
        assert_eq!(**rx.borrow(), 5);
    }

    #[test]
    fn test_selection_set() {
        let selection = SelectionSet::new();
        selection.toggle(&10i64);
        selection.toggle(&11);
        assert_eq!(selection.len(), 2);

        let snapshot = selection.ids();
        selection.toggle(&10);
        assert!(!selection.contains(&10));
        assert!(snapshot.contains(&10));

        selection.select_all([1, 2, 3]);
        assert_eq!(selection.len(), 3);
        selection.clear();
        assert!(selection.is_empty());
    }
}
