//! Integration tests for syncscan
//!
//! Traversal scenarios use an in-memory enumerator for failure injection and
//! `tempfile` directories for the local filesystem backend.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use syncscan::config::IconBufferConfig;
use syncscan::error::{CallbackResult, EnumError, EnumResult};
use syncscan::estimator::SlidingWindowEstimator;
use syncscan::icon_buffer::{IconBuffer, IconLoader, IconSize, WorkLoad};
use syncscan::scheduler::{Collect, Job, Task, TaskScheduler};
use syncscan::traverser::{
    traverse_folders, DirListing, Enumerator, ErrorInfo, FileInfo, FolderInfo, HandleError,
    HandleLink, ItemFailure, ItemInfo, LinkTarget, LocalFs, RetryPolicy, SymlinkInfo,
    TraverserCallback,
};
use tempfile::tempdir;

// ----------------------------------------------------------------------------
// Traversal fixtures
// ----------------------------------------------------------------------------

/// In-memory tree where selected paths fail a number of times first
struct FlakyFs {
    dirs: HashMap<PathBuf, DirListing>,
    links: HashMap<PathBuf, LinkTarget>,
    items: HashMap<PathBuf, ItemInfo>,
    failures_left: Mutex<HashMap<PathBuf, usize>>,
    calls: Mutex<HashMap<PathBuf, usize>>,
}

impl FlakyFs {
    fn new() -> Self {
        Self {
            dirs: HashMap::new(),
            links: HashMap::new(),
            items: HashMap::new(),
            failures_left: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Add a symlink `name` to the listing of `dir`
    fn link(mut self, dir: &str, name: &str, target: LinkTarget) -> Self {
        let path = Path::new(dir).join(name);
        let listing = self.dirs.entry(PathBuf::from(dir)).or_default();
        listing.symlinks.push(SymlinkInfo {
            name: name.to_string(),
            path: path.clone(),
            modified: None,
        });
        self.links.insert(path, target);
        self
    }

    /// Add an entry to `dir` whose details fail during the listing but
    /// resolve to `item` when looked up on its own
    fn unreadable(mut self, dir: &str, name: &str, item: ItemInfo) -> Self {
        let path = Path::new(dir).join(name);
        let listing = self.dirs.entry(PathBuf::from(dir)).or_default();
        listing.failed.push(ItemFailure {
            name: name.to_string(),
            path: path.clone(),
            error: EnumError::Busy { path: path.clone() },
        });
        self.items.insert(path, item);
        self
    }

    /// Count the call and fail while failures remain for `path`
    fn attempt(&self, path: &Path) -> EnumResult<()> {
        *self.calls.lock().unwrap().entry(path.to_path_buf()).or_default() += 1;

        if let Some(left) = self.failures_left.lock().unwrap().get_mut(path) {
            if *left > 0 {
                *left -= 1;
                return Err(EnumError::Busy {
                    path: path.to_path_buf(),
                });
            }
        }
        Ok(())
    }

    fn dir(mut self, path: &str, folders: &[&str], files: &[&str]) -> Self {
        let path = PathBuf::from(path);
        let listing = DirListing {
            folders: folders
                .iter()
                .map(|name| FolderInfo {
                    name: name.to_string(),
                    path: path.join(name),
                    followed_link: false,
                })
                .collect(),
            files: files
                .iter()
                .map(|name| FileInfo {
                    name: name.to_string(),
                    path: path.join(name),
                    size: 100,
                    modified: None,
                    followed_link: false,
                })
                .collect(),
            ..Default::default()
        };
        self.dirs.insert(path, listing);
        self
    }

    fn failing(self, path: &str, times: usize) -> Self {
        self.failures_left
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), times);
        self
    }

    fn calls(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(Path::new(path))
            .copied()
            .unwrap_or(0)
    }
}

impl Enumerator for FlakyFs {
    fn enumerate(&self, dir: &Path) -> EnumResult<DirListing> {
        self.attempt(dir)?;
        self.dirs.get(dir).cloned().ok_or_else(|| EnumError::NotFound {
            path: dir.to_path_buf(),
        })
    }

    fn resolve_symlink(&self, link: &Path) -> EnumResult<LinkTarget> {
        self.attempt(link)?;
        self.links.get(link).cloned().ok_or_else(|| EnumError::NotFound {
            path: link.to_path_buf(),
        })
    }

    fn stat_item(&self, path: &Path) -> EnumResult<ItemInfo> {
        self.attempt(path)?;
        self.items.get(path).cloned().ok_or_else(|| EnumError::NotFound {
            path: path.to_path_buf(),
        })
    }
}

#[derive(Default)]
struct Log {
    files: Vec<PathBuf>,
    folders: Vec<PathBuf>,
    symlinks: Vec<PathBuf>,
    dir_error_retries: Vec<usize>,
    item_errors: Vec<(String, usize)>,
}

/// Records everything and answers errors with a retry policy
struct Recorder {
    log: Rc<RefCell<Log>>,
    policy: RetryPolicy,
    follow: HandleLink,
}

impl Recorder {
    fn root(policy: RetryPolicy) -> (Rc<RefCell<Log>>, Box<dyn TraverserCallback>) {
        let log = Rc::new(RefCell::new(Log::default()));
        let recorder = Recorder {
            log: Rc::clone(&log),
            policy,
            follow: HandleLink::Follow,
        };
        (log, Box::new(recorder))
    }
}

impl TraverserCallback for Recorder {
    fn on_file(&mut self, file: &FileInfo) -> CallbackResult<()> {
        self.log.borrow_mut().files.push(file.path.clone());
        Ok(())
    }

    fn on_symlink(&mut self, link: &SymlinkInfo) -> CallbackResult<HandleLink> {
        self.log.borrow_mut().symlinks.push(link.path.clone());
        Ok(self.follow)
    }

    fn on_folder(
        &mut self,
        folder: &FolderInfo,
    ) -> CallbackResult<Option<Box<dyn TraverserCallback>>> {
        self.log.borrow_mut().folders.push(folder.path.clone());
        Ok(Some(Box::new(Recorder {
            log: Rc::clone(&self.log),
            policy: self.policy,
            follow: self.follow,
        })))
    }

    fn report_dir_error(&mut self, error: &ErrorInfo) -> CallbackResult<HandleError> {
        self.log.borrow_mut().dir_error_retries.push(error.retry_number);
        Ok(self.policy.decide(error))
    }

    fn report_item_error(
        &mut self,
        error: &ErrorInfo,
        item_name: &str,
    ) -> CallbackResult<HandleError> {
        self.log
            .borrow_mut()
            .item_errors
            .push((item_name.to_string(), error.retry_number));
        Ok(self.policy.decide(error))
    }
}

fn sorted(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.sort();
    paths
}

// ----------------------------------------------------------------------------
// Traversal
// ----------------------------------------------------------------------------

#[test]
fn test_busy_directory_is_retried_until_listed() {
    let fs = Arc::new(
        FlakyFs::new()
            .dir("/root", &["d1"], &["f1"])
            .dir("/root/d1", &[], &["f2"])
            .failing("/root/d1", 2),
    );

    let (log, callback) = Recorder::root(RetryPolicy::default());
    let stats = traverse_folders(
        Arc::clone(&fs),
        vec![(PathBuf::from("/root"), callback)],
        4,
    )
    .unwrap();

    let log = log.borrow();
    assert_eq!(log.dir_error_retries, vec![0, 1]);
    assert_eq!(
        sorted(log.files.clone()),
        vec![PathBuf::from("/root/d1/f2"), PathBuf::from("/root/f1")]
    );
    assert_eq!(log.folders, vec![PathBuf::from("/root/d1")]);

    assert_eq!(fs.calls("/root/d1"), 3);
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.tasks_submitted, 4);
    assert_eq!(stats.errors_ignored, 0);
}

#[test]
fn test_retry_count_sequence_then_ignore() {
    const RETRIES: usize = 3;

    // never recovers
    let fs = Arc::new(FlakyFs::new().dir("/r", &[], &[]).failing("/r", usize::MAX));

    let (log, callback) = Recorder::root(RetryPolicy::new(RETRIES));
    let stats = traverse_folders(Arc::clone(&fs), vec![(PathBuf::from("/r"), callback)], 2)
        .unwrap();

    assert_eq!(fs.calls("/r"), RETRIES + 1);
    assert_eq!(log.borrow().dir_error_retries, (0..=RETRIES).collect::<Vec<_>>());
    assert_eq!(stats.errors_ignored, 1);
    assert!(log.borrow().files.is_empty());
}

#[test]
fn test_wide_tree_every_directory_listed_once() {
    let mut fs = FlakyFs::new();
    let subdirs: Vec<String> = (0..50).map(|i| format!("d{}", i)).collect();
    let names: Vec<&str> = subdirs.iter().map(String::as_str).collect();
    fs = fs.dir("/w", &names, &[]);
    for name in &names {
        let path = format!("/w/{}", name);
        fs = fs.dir(&path, &[], &["a", "b"]);
    }
    let fs = Arc::new(fs.failing("/w/d7", 1).failing("/w/d33", 2));

    let (log, callback) = Recorder::root(RetryPolicy::default());
    let stats =
        traverse_folders(Arc::clone(&fs), vec![(PathBuf::from("/w"), callback)], 8).unwrap();

    assert_eq!(log.borrow().files.len(), 100);
    assert_eq!(log.borrow().folders.len(), 50);
    assert_eq!(stats.retries, 3);
    assert_eq!(stats.tasks_submitted, 51 + 3);
}

#[test]
fn test_unreadable_entry_is_looked_up_again_on_retry() {
    let recovered = FileInfo {
        name: "x".to_string(),
        path: PathBuf::from("/r/x"),
        size: 7,
        modified: None,
        followed_link: false,
    };
    let fs = Arc::new(
        FlakyFs::new()
            .dir("/r", &[], &["f1"])
            .unreadable("/r", "x", ItemInfo::File(recovered))
            .failing("/r/x", 1),
    );

    let (log, callback) = Recorder::root(RetryPolicy::new(5));
    let stats =
        traverse_folders(Arc::clone(&fs), vec![(PathBuf::from("/r"), callback)], 3).unwrap();

    let log = log.borrow();
    // 0 from the listing itself, 1 from the first single-item lookup
    assert_eq!(
        log.item_errors,
        vec![("x".to_string(), 0), ("x".to_string(), 1)]
    );
    assert_eq!(
        sorted(log.files.clone()),
        vec![PathBuf::from("/r/f1"), PathBuf::from("/r/x")]
    );
    assert!(log.dir_error_retries.is_empty());

    assert_eq!(fs.calls("/r/x"), 2);
    assert_eq!(stats.tasks_submitted, 3);
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.errors_ignored, 0);
}

#[test]
fn test_unreadable_entry_ignored_after_policy_limit() {
    let folder = FolderInfo {
        name: "x".to_string(),
        path: PathBuf::from("/r/x"),
        followed_link: false,
    };
    let fs = Arc::new(
        FlakyFs::new()
            .dir("/r", &[], &[])
            .unreadable("/r", "x", ItemInfo::Folder(folder))
            .failing("/r/x", usize::MAX),
    );

    let (log, callback) = Recorder::root(RetryPolicy::new(2));
    let stats =
        traverse_folders(Arc::clone(&fs), vec![(PathBuf::from("/r"), callback)], 2).unwrap();

    let retries: Vec<usize> = log.borrow().item_errors.iter().map(|(_, n)| *n).collect();
    assert_eq!(retries, vec![0, 1, 2]);
    assert!(log.borrow().folders.is_empty());
    assert_eq!(fs.calls("/r/x"), 2);
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.errors_ignored, 1);
}

#[test]
fn test_link_resolution_is_retried_until_resolved() {
    let fs = Arc::new(
        FlakyFs::new()
            .dir("/r", &[], &[])
            .dir("/r/m", &[], &["g"])
            .link(
                "/r",
                "l",
                LinkTarget::File {
                    size: 42,
                    modified: None,
                },
            )
            .link("/r", "m", LinkTarget::Folder)
            .failing("/r/l", 2),
    );

    let (log, callback) = Recorder::root(RetryPolicy::new(5));
    let stats =
        traverse_folders(Arc::clone(&fs), vec![(PathBuf::from("/r"), callback)], 3).unwrap();

    let log = log.borrow();
    assert_eq!(
        log.item_errors,
        vec![("l".to_string(), 0), ("l".to_string(), 1)]
    );
    assert_eq!(
        sorted(log.symlinks.clone()),
        vec![PathBuf::from("/r/l"), PathBuf::from("/r/m")]
    );
    assert_eq!(
        sorted(log.files.clone()),
        vec![PathBuf::from("/r/l"), PathBuf::from("/r/m/g")]
    );
    assert_eq!(log.folders, vec![PathBuf::from("/r/m")]);

    assert_eq!(fs.calls("/r/l"), 3);
    // list /r, resolve l three times, resolve m, list /r/m
    assert_eq!(stats.tasks_submitted, 6);
    assert_eq!(stats.retries, 2);
    assert_eq!(stats.errors_ignored, 0);
}

#[test]
fn test_local_filesystem_traversal() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("top.txt"), b"12345").unwrap();
    fs::create_dir_all(root.join("a/b/c")).unwrap();
    fs::write(root.join("a/one.bin"), [0u8; 10]).unwrap();
    fs::write(root.join("a/b/c/deep.bin"), [0u8; 20]).unwrap();
    fs::create_dir(root.join("empty")).unwrap();

    let (log, callback) = Recorder::root(RetryPolicy::ignore_all());
    traverse_folders(Arc::new(LocalFs), vec![(root.to_path_buf(), callback)], 3).unwrap();

    let log = log.borrow();
    assert_eq!(
        sorted(log.files.clone()),
        vec![
            root.join("a/b/c/deep.bin"),
            root.join("a/one.bin"),
            root.join("top.txt"),
        ]
    );
    assert_eq!(
        sorted(log.folders.clone()),
        vec![root.join("a"), root.join("a/b"), root.join("a/b/c"), root.join("empty")]
    );
    assert!(log.dir_error_retries.is_empty());
}

#[cfg(unix)]
#[test]
fn test_followed_links_are_reported_as_targets() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    let outside = dir.path().join("outside");
    fs::create_dir_all(&root).unwrap();
    fs::create_dir_all(&outside).unwrap();
    fs::write(outside.join("inner.txt"), b"abc").unwrap();
    fs::write(dir.path().join("file.txt"), b"abcdef").unwrap();

    std::os::unix::fs::symlink(&outside, root.join("dir_link")).unwrap();
    std::os::unix::fs::symlink(dir.path().join("file.txt"), root.join("file_link")).unwrap();
    std::os::unix::fs::symlink(dir.path().join("missing"), root.join("dangling")).unwrap();

    let (log, callback) = Recorder::root(RetryPolicy::ignore_all());
    let stats =
        traverse_folders(Arc::new(LocalFs), vec![(root.clone(), callback)], 2).unwrap();

    let log = log.borrow();
    assert_eq!(log.symlinks.len(), 3);
    assert_eq!(
        sorted(log.files.clone()),
        vec![root.join("dir_link/inner.txt"), root.join("file_link")]
    );
    assert_eq!(log.folders, vec![root.join("dir_link")]);
    assert_eq!(log.item_errors, vec![("dangling".to_string(), 0)]);
    assert_eq!(stats.errors_ignored, 1);
}

// ----------------------------------------------------------------------------
// Scheduler
// ----------------------------------------------------------------------------

/// Fails on its first run when `flaky` is set
struct Flaky {
    id: usize,
    flaky: bool,
    runs: Arc<AtomicUsize>,
}

impl Job for Flaky {
    type Output = usize;
    type Error = usize;

    fn run(&self) -> Result<usize, usize> {
        let total = self.runs.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_micros((total % 7) as u64 * 50));
        if self.flaky {
            Err(self.id)
        } else {
            Ok(self.id)
        }
    }
}

#[test]
fn test_scheduler_yields_one_outcome_per_submission() {
    let runs = Arc::new(AtomicUsize::new(0));
    let scheduler = TaskScheduler::new("p1", 6).unwrap();

    for id in 0..200 {
        let job = Flaky {
            id,
            flaky: id % 2 == 0,
            runs: Arc::clone(&runs),
        };
        scheduler.submit(Task::new(0u32, job));
    }

    let mut submitted = 200;
    let mut outcomes = 0;
    let mut succeeded = Vec::new();
    let mut batch = Vec::new();
    while scheduler.collect_results(&mut batch) == Collect::HaveResults {
        for result in batch.drain(..) {
            outcomes += 1;
            match result.outcome {
                Ok(id) => succeeded.push(id),
                Err(_) => {
                    let mut task = result.task;
                    task.job.flaky = false;
                    task.context += 1;
                    submitted += 1;
                    scheduler.submit(task);
                }
            }
        }
    }

    assert_eq!(outcomes, submitted);
    assert_eq!(submitted, 300);
    assert_eq!(runs.load(Ordering::SeqCst), 300);
    succeeded.sort_unstable();
    assert_eq!(succeeded, (0..200).collect::<Vec<_>>());
    assert_eq!(scheduler.pending(), 0);
}

// ----------------------------------------------------------------------------
// Estimator
// ----------------------------------------------------------------------------

#[test]
fn test_remaining_time_uses_trailing_window() {
    let mut est = SlidingWindowEstimator::with_window(Duration::from_millis(5000));
    for step in 0..=6u64 {
        est.add_sample(Duration::from_millis(step * 1000), step, step * 1000);
    }

    let remaining = est.remaining_time(2000.0).unwrap();
    assert!((remaining - 2.0).abs() < 1e-9);
}

#[test]
fn test_remaining_time_ignores_slow_start() {
    let mut est = SlidingWindowEstimator::with_window(Duration::from_millis(5000));
    let mut bytes = 0;
    for step in 0..=10u64 {
        // 100 B/s for the first 4 seconds, 1000 B/s afterwards
        if step > 0 {
            bytes += if step <= 4 { 100 } else { 1000 };
        }
        est.add_sample(Duration::from_secs(step), step, bytes);
    }

    let remaining = est.remaining_time(2000.0).unwrap();
    assert!((remaining - 2.0).abs() < 1e-9);

    let throughput = est.throughput().unwrap();
    assert!((throughput.bytes_per_sec - 1000.0).abs() < 1e-9);
}

// ----------------------------------------------------------------------------
// Icon buffer
// ----------------------------------------------------------------------------

#[test]
fn test_workload_pops_most_recent_first() {
    let work = WorkLoad::new();
    work.set(vec!["a", "b", "c"]);
    assert_eq!(work.extract_next(), Some("c"));
    assert_eq!(work.extract_next(), Some("b"));
    assert_eq!(work.extract_next(), Some("a"));
}

struct SlowLoader {
    loads: Arc<AtomicUsize>,
}

impl IconLoader for SlowLoader {
    type Raw = Vec<u8>;
    type Error = String;

    fn load(&self, path: &Path, size: IconSize) -> Result<Vec<u8>, String> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1));
        let n = size.pixels() as usize;
        Ok(path.to_string_lossy().bytes().cycle().take(n).collect())
    }
}

fn wait_until(cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_icon_buffer_stays_within_capacity() {
    let loads = Arc::new(AtomicUsize::new(0));
    let loader = SlowLoader {
        loads: Arc::clone(&loads),
    };
    let config = IconBufferConfig::new(4, IconSize::Small).unwrap();
    let mut icons = IconBuffer::new(loader, config, |raw: Option<Vec<u8>>| {
        raw.map(|bytes| bytes.len()).unwrap_or(0)
    })
    .unwrap();

    let keys: Vec<PathBuf> = (0..10).map(|i| PathBuf::from(format!("/k{}", i))).collect();
    icons.set_workload(keys.clone());
    wait_until(|| keys.iter().all(|k| icons.has_icon(k)));

    // loaded last-to-first, so /k9 is the oldest entry
    assert_eq!(icons.retrieve(&keys[9]), Some(&16));

    icons.limit_size();
    assert!(icons.len() <= icons.capacity());
    assert!(icons.has_icon(&keys[9]));
    for key in &keys[0..3] {
        assert!(icons.has_icon(key));
    }
    for key in &keys[3..9] {
        assert!(!icons.has_icon(key));
    }
    assert_eq!(loads.load(Ordering::SeqCst), 10);

    // evicted keys are reloaded on demand
    assert_eq!(icons.retrieve(&keys[5]), None);
    wait_until(|| icons.has_icon(&keys[5]));
    assert_eq!(icons.retrieve(&keys[5]), Some(&16));
}
