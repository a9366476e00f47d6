//! Copy-on-commit collection: the sole cross-thread handoff for collector
//! and process/context state. Writers stage mutations; `commit` publishes an
//! immutable snapshot; `foreach` iterates that snapshot without ever
//! blocking a concurrent writer.

use std::sync::{Arc, Mutex, RwLock};

/// `dirty` tracks "a mutation has been staged since the last commit"
/// separately from `items.is_empty()` — a `remove` that legitimately empties
/// the staged list must still commit, and must not be re-seeded from the
/// (stale) published snapshot by a later `append`/`remove` in the same cycle.
struct Staged<T> {
    items: Vec<T>,
    dirty: bool,
}

pub struct SafeList<T> {
    staged: Mutex<Staged<T>>,
    published: RwLock<Arc<Vec<T>>>,
}

impl<T: Clone> SafeList<T> {
    pub fn new() -> Self {
        Self {
            staged: Mutex::new(Staged { items: Vec::new(), dirty: false }),
            published: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Stage an item for addition. Not visible to `foreach` until `commit`.
    pub fn append(&self, item: T) {
        let mut staged = self.staged.lock().unwrap();
        if !staged.dirty {
            staged.items = self.published.read().unwrap().as_ref().clone();
        }
        staged.items.push(item);
        staged.dirty = true;
    }

    /// Stage removal of every item matching `predicate`. Not visible to
    /// `foreach` until `commit`.
    pub fn remove<F>(&self, predicate: F)
    where
        F: Fn(&T) -> bool,
    {
        let mut staged = self.staged.lock().unwrap();
        if !staged.dirty {
            staged.items = self.published.read().unwrap().as_ref().clone();
        }
        staged.items.retain(|item| !predicate(item));
        staged.dirty = true;
    }

    /// Atomically publish every staged mutation. A no-op only when nothing
    /// has been staged since the last commit, not merely when the staged
    /// list happens to be empty.
    pub fn commit(&self) {
        let mut staged = self.staged.lock().unwrap();
        if !staged.dirty {
            return;
        }
        let next = std::mem::take(&mut staged.items);
        staged.dirty = false;
        *self.published.write().unwrap() = Arc::new(next);
    }

    /// Iterate the last published snapshot. Never observes a half-built
    /// `append`/`remove` that hasn't been `commit`-ted.
    pub fn foreach<F>(&self, mut f: F)
    where
        F: FnMut(&T),
    {
        let snapshot = self.published.read().unwrap().clone();
        for item in snapshot.iter() {
            f(item);
        }
    }

    pub fn snapshot(&self) -> Arc<Vec<T>> {
        self.published.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.published.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find<F>(&self, predicate: F) -> Option<T>
    where
        F: Fn(&T) -> bool,
    {
        self.published
            .read()
            .unwrap()
            .iter()
            .find(|item| predicate(item))
            .cloned()
    }
}

impl<T: Clone> Default for SafeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_commit_is_visible() {
        let list: SafeList<i32> = SafeList::new();
        list.append(1);
        assert_eq!(list.len(), 0);
        list.commit();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn remove_then_commit_hides_item() {
        let list: SafeList<i32> = SafeList::new();
        list.append(1);
        list.append(2);
        list.commit();
        list.remove(|x| *x == 1);
        list.commit();
        let mut seen = Vec::new();
        list.foreach(|x| seen.push(*x));
        assert_eq!(seen, vec![2]);
    }

    #[test]
    fn foreach_sees_stable_snapshot_during_concurrent_append() {
        let list: SafeList<i32> = SafeList::new();
        for i in 0..10 {
            list.append(i);
        }
        list.commit();

        let snapshot = list.snapshot();
        list.append(99);
        list.commit();

        assert_eq!(snapshot.len(), 10);
        assert_eq!(list.len(), 11);
    }
}
