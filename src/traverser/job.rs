//! Traversal task kinds
//!
//! All kinds share one [`Job`] type so they can travel through a single
//! scheduler; the output enum mirrors the operation enum.

use super::enumerator::{DirListing, Enumerator, ItemInfo, LinkTarget, SymlinkInfo};
use crate::error::EnumError;
use crate::scheduler::Job;
use std::path::PathBuf;
use std::sync::Arc;

/// Handle of a callback stored on the controlling thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub(crate) usize);

/// Routing metadata carried with every traversal task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TravContext {
    /// Set for item-level operations; errors are reported per item
    pub error_item: Option<String>,

    /// Retries made so far
    pub retry_count: usize,

    /// Callback receiving the results
    pub callback: CallbackId,
}

impl TravContext {
    pub(crate) fn folder(callback: CallbackId) -> Self {
        Self {
            error_item: None,
            retry_count: 0,
            callback,
        }
    }

    pub(crate) fn item(callback: CallbackId, name: String) -> Self {
        Self {
            error_item: Some(name),
            retry_count: 0,
            callback,
        }
    }
}

/// Operation performed by a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TravOp {
    /// List a directory
    ListDir(PathBuf),

    /// Resolve the target of a symlink
    ResolveSymlink(SymlinkInfo),

    /// Look up a single item that failed during a listing
    StatItem(PathBuf),
}

/// Value produced by a successful [`TravOp`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TravOutput {
    Listing(DirListing),
    Link(LinkTarget),
    Item(ItemInfo),
}

/// A traversal operation bound to its enumerator
pub struct TravJob<E> {
    fs: Arc<E>,
    pub op: TravOp,
}

impl<E> TravJob<E> {
    pub fn new(fs: Arc<E>, op: TravOp) -> Self {
        Self { fs, op }
    }
}

impl<E: Enumerator> Job for TravJob<E> {
    type Output = TravOutput;
    type Error = EnumError;

    fn run(&self) -> Result<TravOutput, EnumError> {
        match &self.op {
            TravOp::ListDir(dir) => self.fs.enumerate(dir).map(TravOutput::Listing),
            TravOp::ResolveSymlink(link) => {
                self.fs.resolve_symlink(&link.path).map(TravOutput::Link)
            }
            TravOp::StatItem(path) => self.fs.stat_item(path).map(TravOutput::Item),
        }
    }
}
