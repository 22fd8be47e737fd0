//! Entry table with an insertion-order eviction list
//!
//! Nodes live in a slab and are chained into a doubly linked list through
//! their slab indices: head is the next eviction candidate, tail the most
//! recently inserted (or hot) entry.

use slab::Slab;
use std::collections::HashMap;
use std::hash::Hash;

/// Raw payload state of a cached entry
#[derive(Debug, PartialEq, Eq)]
pub enum Payload<R> {
    /// Loader result; `None` when the key has no icon
    Raw(Option<R>),

    /// Handed to the controlling thread for conversion
    Taken,
}

struct Node<K, R> {
    key: K,
    payload: Payload<R>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Capped cache table. Not synchronized; wrap it in a mutex to share.
pub struct Buffer<K, R> {
    index: HashMap<K, usize>,
    nodes: Slab<Node<K, R>>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K: Eq + Hash + Clone, R> Buffer<K, R> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            nodes: Slab::new(),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Insert a loaded payload at the back of the eviction list.
    ///
    /// Returns `false` and keeps the existing entry if `key` is present.
    pub fn insert(&mut self, key: K, raw: Option<R>) -> bool {
        if self.index.contains_key(&key) {
            return false;
        }

        let idx = self.nodes.insert(Node {
            key: key.clone(),
            payload: Payload::Raw(raw),
            prev: None,
            next: None,
        });
        self.link_back(idx);
        self.index.insert(key, idx);
        true
    }

    /// Move an entry to the back of the eviction list
    pub fn mark_hot(&mut self, key: &K) -> bool {
        match self.index.get(key) {
            Some(&idx) => {
                self.unlink(idx);
                self.link_back(idx);
                true
            }
            None => false,
        }
    }

    /// Take the raw payload for conversion.
    ///
    /// Returns `None` if the key is absent or its payload was already taken.
    pub fn take_raw(&mut self, key: &K) -> Option<Option<R>> {
        let idx = *self.index.get(key)?;
        match std::mem::replace(&mut self.nodes[idx].payload, Payload::Taken) {
            Payload::Raw(raw) => Some(raw),
            Payload::Taken => None,
        }
    }

    /// Remove the earliest inserted entry
    pub fn pop_front(&mut self) -> Option<(K, Payload<R>)> {
        let idx = self.head?;
        self.unlink(idx);
        let node = self.nodes.remove(idx);
        self.index.remove(&node.key);
        Some((node.key, node.payload))
    }

    /// Keys from next-to-evict to most recent
    pub fn keys_in_eviction_order(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = &self.nodes[idx];
            keys.push(node.key.clone());
            cursor = node.next;
        }
        keys
    }

    fn link_back(&mut self, idx: usize) {
        self.nodes[idx].prev = self.tail;
        self.nodes[idx].next = None;
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = &self.nodes[idx];
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
    }
}

impl<K: Eq + Hash + Clone, R> Default for Buffer<K, R> {
    fn default() -> Self {
        Self::new()
    }
}
