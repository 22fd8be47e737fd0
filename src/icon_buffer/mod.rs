//! Bounded icon cache filled by one background loader thread
//!
//! ```text
//!   controlling thread                        icon-loader thread
//! ┌──────────────────────┐  set_workload/add  ┌─────────────────────┐
//! │ IconBuffer           │ ─────────────────► │ WorkLoad (LIFO)     │
//! │  retrieve(): convert │                    │  extract_next()     │
//! │  limit_size(): evict │                    │  IconLoader::load() │
//! │  display payloads    │ ◄───────────────── │  insert raw payload │
//! └──────────────────────┘   Buffer (mutex)   └─────────────────────┘
//! ```
//!
//! Raw payloads cross threads; display payloads never do. They are produced
//! by the converter closure inside [`IconBuffer::retrieve`] and dropped in
//! [`IconBuffer::limit_size`] or when the handle is dropped. The handle is
//! `!Send`, so both always happen on the thread that created it.
//! [`IconProbe`] gives other threads a membership check without payload
//! access.

mod buffer;
mod workload;

pub use buffer::{Buffer, Payload};
pub use workload::WorkLoad;

use crate::config::IconBufferConfig;
use crate::error::WorkerError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

/// Requested icon size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IconSize {
    Small,
    Medium,
    Large,
}

impl IconSize {
    /// Edge length in pixels
    pub fn pixels(self) -> u32 {
        match self {
            IconSize::Small => 16,
            IconSize::Medium => 48,
            IconSize::Large => 128,
        }
    }
}

/// Resolves the raw icon for a path. Runs on the loader thread.
pub trait IconLoader: Send + 'static {
    /// Thread-safe payload handed to the controlling thread
    type Raw: Send + 'static;

    type Error: fmt::Display;

    fn load(&self, path: &Path, size: IconSize) -> Result<Self::Raw, Self::Error>;
}

type SharedBuffer<R> = Arc<Mutex<Buffer<PathBuf, R>>>;

/// Thread-safe membership check into an [`IconBuffer`]
pub struct IconProbe<R> {
    buffer: SharedBuffer<R>,
}

impl<R> IconProbe<R> {
    /// Whether an icon (or a "no icon" result) is cached for `path`
    pub fn has_icon(&self, path: &Path) -> bool {
        self.buffer.lock().contains(&path.to_path_buf())
    }
}

impl<R> Clone for IconProbe<R> {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

/// Controlling-thread handle of the icon cache.
///
/// `D` is the display-ready form produced by `convert`. A key whose loader
/// call failed is converted from `None`.
pub struct IconBuffer<L: IconLoader, D, F> {
    workload: Arc<WorkLoad<PathBuf>>,
    buffer: SharedBuffer<L::Raw>,
    worker: Option<JoinHandle<()>>,

    convert: F,
    displays: HashMap<PathBuf, D>,

    capacity: usize,
    icon_size: IconSize,

    // pins display payloads to the creating thread
    _not_send: PhantomData<*const ()>,
}

impl<L, D, F> IconBuffer<L, D, F>
where
    L: IconLoader,
    F: FnMut(Option<L::Raw>) -> D,
{
    /// Start the loader thread
    pub fn new(loader: L, config: IconBufferConfig, convert: F) -> Result<Self, WorkerError> {
        let workload = Arc::new(WorkLoad::new());
        let buffer: SharedBuffer<L::Raw> = Arc::new(Mutex::new(Buffer::new()));
        let icon_size = config.icon_size;

        let worker = {
            let workload = Arc::clone(&workload);
            let buffer = Arc::clone(&buffer);
            thread::Builder::new()
                .name("icon-loader".into())
                .spawn(move || loader_loop(loader, icon_size, workload, buffer))
                .map_err(|e| WorkerError::InitFailed {
                    name: "icon-loader".into(),
                    reason: e.to_string(),
                })?
        };

        Ok(Self {
            workload,
            buffer,
            worker: Some(worker),
            convert,
            displays: HashMap::new(),
            capacity: config.capacity,
            icon_size,
            _not_send: PhantomData,
        })
    }

    /// Replace the pending keys; the last one is loaded first.
    /// Evicts down to capacity afterwards.
    pub fn set_workload(&mut self, keys: Vec<PathBuf>) {
        self.workload.set(keys);
        self.limit_size();
    }

    /// Load `path` before everything already pending
    pub fn add(&self, path: PathBuf) {
        self.workload.add(path);
    }

    pub fn has_icon(&self, path: &Path) -> bool {
        self.buffer.lock().contains(&path.to_path_buf())
    }

    /// Membership handle usable from any thread
    pub fn probe(&self) -> IconProbe<L::Raw> {
        IconProbe {
            buffer: Arc::clone(&self.buffer),
        }
    }

    /// Get the display payload for `path`.
    ///
    /// A cached entry is marked hot and converted on first access. A missing
    /// entry is queued with [`add`](Self::add) and `None` is returned.
    pub fn retrieve(&mut self, path: &Path) -> Option<&D> {
        let key = path.to_path_buf();

        let raw = {
            let mut buffer = self.buffer.lock();
            if !buffer.mark_hot(&key) {
                drop(buffer);
                self.workload.add(key);
                return None;
            }
            buffer.take_raw(&key)
        };

        if let Some(raw) = raw {
            trace!(path = %path.display(), "Converting icon");
            let display = (self.convert)(raw);
            self.displays.insert(key.clone(), display);
        }

        let display = self.displays.get(&key);
        debug_assert!(display.is_some(), "converted icon missing for cached key");
        display
    }

    /// Evict the earliest inserted entries until at most `capacity` remain
    pub fn limit_size(&mut self) {
        let evicted: Vec<_> = {
            let mut buffer = self.buffer.lock();
            let excess = buffer.len().saturating_sub(self.capacity);
            (0..excess).filter_map(|_| buffer.pop_front()).collect()
        };

        if !evicted.is_empty() {
            trace!(count = evicted.len(), "Evicting icons");
        }
        for (key, _raw) in evicted {
            self.displays.remove(&key);
        }
    }

    /// Number of cached entries, converted or not
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn icon_size(&self) -> IconSize {
        self.icon_size
    }
}

impl<L: IconLoader, D, F> Drop for IconBuffer<L, D, F> {
    fn drop(&mut self) {
        self.workload.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Icon loader thread panicked");
            }
        }
    }
}

fn loader_loop<L: IconLoader>(
    loader: L,
    size: IconSize,
    workload: Arc<WorkLoad<PathBuf>>,
    buffer: SharedBuffer<L::Raw>,
) {
    debug!("Icon loader started");

    while let Some(path) = workload.extract_next() {
        if buffer.lock().contains(&path) {
            continue;
        }

        let raw = match loader.load(&path, size) {
            Ok(raw) => Some(raw),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No icon");
                None
            }
        };

        buffer.lock().insert(path, raw);
    }

    debug!("Icon loader shutting down");
}
