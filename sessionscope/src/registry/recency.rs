//! Most-recently-used ordering with O(1) removal and promotion.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// A doubly linked list stored in a slab, indexed by key.
///
/// The head is the most recently used entry.
#[derive(Debug)]
pub(crate) struct RecencyList<K, V> {
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K: Copy + Eq + Hash, V> RecencyList<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Appends as the least recently used entry. Returns false if the key is
    /// already present.
    pub(crate) fn push_back(&mut self, key: K, value: V) -> bool {
        if self.contains(&key) {
            return false;
        }
        let node = Node {
            key,
            value,
            prev: self.tail,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        match self.tail {
            Some(tail) => self.node_mut(tail).next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.index.insert(key, slot);
        true
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.index.remove(key)?;
        self.unlink(slot);
        let node = self.slots[slot].take()?;
        self.free.push(slot);
        Some(node.value)
    }

    /// Promotes an entry to most recently used. Returns false if absent.
    pub(crate) fn move_to_front(&mut self, key: &K) -> bool {
        let Some(&slot) = self.index.get(key) else {
            return false;
        };
        if self.head == Some(slot) {
            return true;
        }
        self.unlink(slot);
        let old_head = self.head;
        {
            let node = self.node_mut(slot);
            node.prev = None;
            node.next = old_head;
        }
        if let Some(head) = old_head {
            self.node_mut(head).prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
        true
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.index.clear();
        self.head = None;
        self.tail = None;
    }

    /// Iterates from most to least recently used.
    pub(crate) fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let node = self.node_mut(slot);
            (node.prev.take(), node.next.take())
        };
        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => self.tail = prev,
        }
    }

    fn node_mut(&mut self, slot: usize) -> &mut Node<K, V> {
        match self.slots[slot].as_mut() {
            Some(node) => node,
            None => unreachable!("recency index points at a free slot"),
        }
    }
}

pub(crate) struct Iter<'a, K, V> {
    list: &'a RecencyList<K, V>,
    cursor: Option<usize>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.slots[self.cursor?].as_ref()?;
        self.cursor = node.next;
        Some((&node.key, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keys(list: &RecencyList<u32, &'static str>) -> Vec<u32> {
        list.iter().map(|(k, _)| *k).collect()
    }

    #[test]
    fn test_push_back_appends_as_least_recent() {
        let mut list = RecencyList::new();
        assert!(list.push_back(1, "a"));
        assert!(list.push_back(2, "b"));
        assert!(!list.push_back(1, "dup"));
        assert_eq!(keys(&list), vec![1, 2]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_move_to_front() {
        let mut list = RecencyList::new();
        for k in 1..=4 {
            list.push_back(k, "x");
        }
        assert!(list.move_to_front(&3));
        assert_eq!(keys(&list), vec![3, 1, 2, 4]);
        assert!(list.move_to_front(&4));
        assert_eq!(keys(&list), vec![4, 3, 1, 2]);
        assert!(list.move_to_front(&4));
        assert!(!list.move_to_front(&9));
    }

    #[test]
    fn test_remove_relinks_and_reuses_slots() {
        let mut list = RecencyList::new();
        for k in 1..=3 {
            list.push_back(k, "x");
        }
        assert_eq!(list.remove(&2), Some("x"));
        assert_eq!(list.remove(&2), None);
        assert_eq!(keys(&list), vec![1, 3]);

        list.remove(&1);
        list.remove(&3);
        assert_eq!(keys(&list), Vec::<u32>::new());

        list.push_back(7, "y");
        list.push_back(8, "z");
        list.move_to_front(&8);
        assert_eq!(keys(&list), vec![8, 7]);
        assert_eq!(list.slots.len(), 3);
    }
}
