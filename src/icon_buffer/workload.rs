//! LIFO work list shared with the icon worker

use parking_lot::{Condvar, Mutex};

struct State<K> {
    items: Vec<K>,
    stopped: bool,
}

/// Keys waiting to be resolved, most recently requested first
pub struct WorkLoad<K> {
    state: Mutex<State<K>>,
    new_work: Condvar,
}

impl<K> WorkLoad<K> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: Vec::new(),
                stopped: false,
            }),
            new_work: Condvar::new(),
        }
    }

    /// Replace the pending keys. The last key is extracted first.
    pub fn set(&self, keys: Vec<K>) {
        self.state.lock().items = keys;
        self.new_work.notify_all();
    }

    /// Queue one key ahead of everything already pending
    pub fn add(&self, key: K) {
        self.state.lock().items.push(key);
        self.new_work.notify_all();
    }

    /// Block until a key is available. Returns `None` once stopped.
    pub fn extract_next(&self) -> Option<K> {
        let mut state = self.state.lock();
        loop {
            if state.stopped {
                return None;
            }
            if let Some(key) = state.items.pop() {
                return Some(key);
            }
            self.new_work.wait(&mut state);
        }
    }

    /// Wake all waiters and make every later `extract_next` return `None`
    pub fn stop(&self) {
        self.state.lock().stopped = true;
        self.new_work.notify_all();
    }

    /// Number of pending keys
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K> Default for WorkLoad<K> {
    fn default() -> Self {
        Self::new()
    }
}
