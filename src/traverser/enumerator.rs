//! Enumeration collaborator and the local filesystem implementation
//!
//! The traverser only needs a `readdir`-like capability. Anything that can
//! list a directory, resolve a symlink and stat a single item can back a
//! traversal: local disks, SFTP, cloud storage.

use crate::error::{EnumError, EnumResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A regular file (or a followed symlink to one)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Name within the parent directory
    pub name: String,

    /// Full path
    pub path: PathBuf,

    /// Size in bytes
    pub size: u64,

    /// Last modification time, if available
    pub modified: Option<SystemTime>,

    /// Reached by following a symlink
    pub followed_link: bool,
}

/// A directory (or a followed symlink to one)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    pub name: String,
    pub path: PathBuf,
    pub followed_link: bool,
}

/// A symbolic link, not yet followed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkInfo {
    pub name: String,
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
}

/// An entry whose details could not be read during a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub name: String,
    pub path: PathBuf,
    pub error: EnumError,
}

/// Contents of one directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirListing {
    pub folders: Vec<FolderInfo>,
    pub files: Vec<FileInfo>,
    pub symlinks: Vec<SymlinkInfo>,

    /// Entries that failed individually; the rest of the listing is valid
    pub failed: Vec<ItemFailure>,
}

impl DirListing {
    /// Total number of entries, failed ones included
    pub fn len(&self) -> usize {
        self.folders.len() + self.files.len() + self.symlinks.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a symlink points to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    File {
        size: u64,
        modified: Option<SystemTime>,
    },
    Folder,
}

/// A single item looked up by path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemInfo {
    File(FileInfo),
    Folder(FolderInfo),
    Symlink(SymlinkInfo),
}

/// Directory enumeration capability used by the traverser.
///
/// Called from worker threads, hence `Send + Sync`.
pub trait Enumerator: Send + Sync + 'static {
    /// List the direct children of `dir`
    fn enumerate(&self, dir: &Path) -> EnumResult<DirListing>;

    /// Determine what the symlink at `link` points to
    fn resolve_symlink(&self, link: &Path) -> EnumResult<LinkTarget>;

    /// Look up one item without following symlinks
    fn stat_item(&self, path: &Path) -> EnumResult<ItemInfo>;
}

/// Enumerator backed by `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    fn item_from_metadata(name: String, path: PathBuf, meta: &fs::Metadata) -> ItemInfo {
        let file_type = meta.file_type();
        if file_type.is_symlink() {
            ItemInfo::Symlink(SymlinkInfo {
                name,
                path,
                modified: meta.modified().ok(),
            })
        } else if file_type.is_dir() {
            ItemInfo::Folder(FolderInfo {
                name,
                path,
                followed_link: false,
            })
        } else {
            ItemInfo::File(FileInfo {
                name,
                path,
                size: meta.len(),
                modified: meta.modified().ok(),
                followed_link: false,
            })
        }
    }
}

impl Enumerator for LocalFs {
    fn enumerate(&self, dir: &Path) -> EnumResult<DirListing> {
        let entries = fs::read_dir(dir).map_err(|e| EnumError::read_dir(dir, e))?;
        let mut listing = DirListing::default();

        for entry in entries {
            let entry = entry.map_err(|e| EnumError::read_dir(dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();

            // does not follow symlinks
            match entry.metadata() {
                Ok(meta) => match Self::item_from_metadata(name, path, &meta) {
                    ItemInfo::File(file) => listing.files.push(file),
                    ItemInfo::Folder(folder) => listing.folders.push(folder),
                    ItemInfo::Symlink(link) => listing.symlinks.push(link),
                },
                Err(e) => {
                    let error = EnumError::stat(&path, e);
                    listing.failed.push(ItemFailure { name, path, error });
                }
            }
        }

        Ok(listing)
    }

    fn resolve_symlink(&self, link: &Path) -> EnumResult<LinkTarget> {
        let meta = fs::metadata(link).map_err(|e| EnumError::read_link(link, e))?;
        if meta.is_dir() {
            Ok(LinkTarget::Folder)
        } else {
            Ok(LinkTarget::File {
                size: meta.len(),
                modified: meta.modified().ok(),
            })
        }
    }

    fn stat_item(&self, path: &Path) -> EnumResult<ItemInfo> {
        let meta = fs::symlink_metadata(path).map_err(|e| EnumError::stat(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::item_from_metadata(name, path.to_path_buf(), &meta))
    }
}
