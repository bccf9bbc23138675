//! Archive mode: files landing in a watched directory are moved into an
//! archive directory once fully written, then rotated.

pub mod watcher;

use crate::backup::relocate::move_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::retention::{RetentionPolicy, RetentionRotator, RotationReport};
use crate::backup::shutdown::Shutdown;
use crate::backup::stable::StableFileDetector;
use crate::backup::validate::{validate_dir_exist, validate_dir_exist_or_created};
use bon::Builder;
use crossbeam_channel::select;
use getset::{CopyGetters, Getters};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use validator::{Validate, ValidationError};
use watcher::ChangeWatcher;

/// One watched landing directory and the archive it feeds.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters, CopyGetters)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = validate_distinct_directories))]
pub struct WatchSpec {
    #[validate(custom(function = validate_dir_exist))]
    #[getset(get = "pub")]
    #[builder(into)]
    watch_directory: PathBuf,
    #[validate(custom(function = validate_dir_exist_or_created))]
    #[getset(get = "pub")]
    #[builder(into)]
    archive_directory: PathBuf,
    #[validate(range(min = 1))]
    #[getset(get_copy = "pub")]
    keep_latest: usize,
    #[serde(default)]
    #[getset(get_copy = "pub")]
    #[builder(default)]
    retention_policy: RetentionPolicy,
    #[serde(default)]
    #[validate(nested)]
    #[getset(get_copy = "pub")]
    #[builder(default)]
    stability: StableFileDetector,
}

fn validate_distinct_directories(spec: &WatchSpec) -> std::result::Result<(), ValidationError> {
    let canonical = |p: &Path| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    if canonical(&spec.watch_directory) == canonical(&spec.archive_directory) {
        return Err(ValidationError::new("SameDirectory")
            .with_message("watch_directory and archive_directory must differ".into()));
    }
    Ok(())
}

/// One lock per archive directory, shared by every unit writing into it.
#[derive(Debug, Default, Clone)]
pub struct ArchiveLocks {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl ArchiveLocks {
    pub fn for_directory<P: AsRef<Path>>(&self, dir: P) -> Arc<Mutex<()>> {
        let dir = dir.as_ref();
        let key = std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        self.locks.lock().entry(key).or_default().clone()
    }
}

/// Processing of arrivals for a single [`WatchSpec`].
#[derive(Debug)]
pub struct ArchiveUnit<'a> {
    spec: &'a WatchSpec,
    lock: Arc<Mutex<()>>,
}

impl<'a> ArchiveUnit<'a> {
    pub fn new(spec: &'a WatchSpec, locks: &ArchiveLocks) -> Self {
        Self {
            spec,
            lock: locks.for_directory(&spec.archive_directory),
        }
    }

    /// Waits for `path` to be fully written, moves it into the archive
    /// directory and rotates its base name. Returns `None` for directories.
    ///
    /// An arrival never replaces an archived file: when its name is taken it
    /// enters the archive under the next free number of its base name.
    pub fn handle_arrival(&self, path: &Path, shutdown: &Shutdown) -> Result<Option<RotationReport>> {
        if !path.is_file() {
            tracing::debug!("Ignoring {path:?}, not a file");
            return Ok(None);
        }
        tracing::info!("New file detected: {path:?}");

        let size = self.spec.stability.wait_until_stable(path, shutdown)?;
        tracing::info!("Upload complete: {path:?} ({size} bytes)");

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::from(std::io::Error::other(format!("{path:?} has no UTF-8 file name"))))?;
        let rotator = RetentionRotator::new(
            &self.spec.archive_directory,
            self.spec.keep_latest,
            self.spec.retention_policy,
        );

        let _guard = self.lock.lock();
        let archived_name = rotator.vacant_name(file_name)?;
        if archived_name != file_name {
            tracing::warn!("{file_name} is already archived, storing arrival as {archived_name}");
        }
        let destination = self.spec.archive_directory.join(&archived_name);
        move_path(path, &destination)?;
        tracing::info!("Moved {path:?} to {destination:?}");

        let report = rotator.rotate(file_name).inspect_err(|_| {
            tracing::error!(
                "Archive directory {:?} consistency at risk after failed rotation",
                self.spec.archive_directory
            )
        })?;
        Ok(Some(report))
    }
}

/// Handles arrivals from `watcher` one at a time until shutdown.
///
/// Failures are logged per file and never end the lane.
pub fn run_watch_lane(unit: &ArchiveUnit, watcher: &ChangeWatcher, shutdown: &Shutdown) -> Result<()> {
    let span = tracing::info_span!("watch", dir = ?watcher.directory());
    let _entered = span.enter();

    loop {
        select! {
            recv(watcher.arrivals()) -> arrival => {
                let Ok(path) = arrival else {
                    tracing::warn!("Watcher channel closed");
                    return Ok(());
                };
                match unit.handle_arrival(&path, shutdown) {
                    Ok(_) => {}
                    Err(e) if e.is_cancelled() => {
                        tracing::info!("Abandoned {path:?} on shutdown");
                        return Ok(());
                    }
                    Err(e) => tracing::error!("Processing {path:?} failed:\n{e}"),
                }
            }
            recv(shutdown.receiver()) -> _ => {
                tracing::info!("Lane stopped");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::shutdown;
    use filetime::{set_file_mtime, FileTime};
    use itertools::Itertools;
    use std::time::Duration;
    use tempfile::TempDir;

    fn spec(watch: &Path, archive: &Path, keep_latest: usize) -> WatchSpec {
        WatchSpec::builder()
            .watch_directory(watch)
            .archive_directory(archive)
            .keep_latest(keep_latest)
            .stability(
                StableFileDetector::builder()
                    .poll_interval(Duration::from_millis(5))
                    .stability_window(Duration::from_millis(20))
                    .timeout(Duration::from_secs(10))
                    .build(),
            )
            .build()
    }

    fn names(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .sorted()
            .collect()
    }

    fn arrive(dir: &Path, name: &str, content: &str, mtime: i64) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
        path
    }

    #[test]
    fn test_three_arrivals_keep_two() {
        let dir = TempDir::new().unwrap();
        let (watch, archive) = (dir.path().join("in"), dir.path().join("out"));
        std::fs::create_dir_all(&watch).unwrap();
        std::fs::create_dir_all(&archive).unwrap();
        let spec = spec(&watch, &archive, 2);
        let unit = ArchiveUnit::new(&spec, &ArchiveLocks::default());
        let (_trigger, shutdown) = shutdown::channel();

        for (i, content) in ["first", "second", "third"].iter().enumerate() {
            let path = arrive(&watch, "db.sql", content, 1_000 + i as i64);
            unit.handle_arrival(&path, &shutdown).unwrap();
        }

        assert_eq!(names(&archive), vec!["db.1.sql", "db.2.sql"]);
        assert_eq!(std::fs::read_to_string(archive.join("db.1.sql")).unwrap(), "third");
        assert_eq!(std::fs::read_to_string(archive.join("db.2.sql")).unwrap(), "second");
        assert!(names(&watch).is_empty());
    }

    fn contents(dir: &Path) -> Vec<(String, String)> {
        names(dir)
            .into_iter()
            .map(|n| {
                let content = std::fs::read_to_string(dir.join(&n)).unwrap();
                (n, content)
            })
            .collect()
    }

    #[test]
    fn test_flat_retention_keeps_every_arrival_up_to_keep_latest() {
        let dir = TempDir::new().unwrap();
        let (watch, archive) = (dir.path().join("in"), dir.path().join("out"));
        std::fs::create_dir_all(&watch).unwrap();
        std::fs::create_dir_all(&archive).unwrap();
        let mut spec = spec(&watch, &archive, 3);
        spec.retention_policy = RetentionPolicy::FlatRetention;
        let unit = ArchiveUnit::new(&spec, &ArchiveLocks::default());
        let (_trigger, shutdown) = shutdown::channel();

        for (i, content) in ["v0", "v1", "v2"].iter().enumerate() {
            let path = arrive(&watch, "db.sql", content, 1_000 + i as i64);
            unit.handle_arrival(&path, &shutdown).unwrap();
        }
        assert_eq!(
            contents(&archive),
            vec![
                ("db.1.sql".to_string(), "v1".to_string()),
                ("db.2.sql".to_string(), "v2".to_string()),
                ("db.sql".to_string(), "v0".to_string()),
            ]
        );

        let path = arrive(&watch, "db.sql", "v3", 1_003);
        let report = unit.handle_arrival(&path, &shutdown).unwrap().unwrap();
        assert_eq!(report.deleted, vec![archive.join("db.sql")]);
        assert!(report.renamed.is_empty());
        assert_eq!(names(&archive), vec!["db.1.sql", "db.2.sql", "db.3.sql"]);
        assert_eq!(std::fs::read_to_string(archive.join("db.3.sql")).unwrap(), "v3");
    }

    #[test]
    fn test_rotated_looking_arrival_does_not_replace_backup() {
        let dir = TempDir::new().unwrap();
        let (watch, archive) = (dir.path().join("in"), dir.path().join("out"));
        std::fs::create_dir_all(&watch).unwrap();
        std::fs::create_dir_all(&archive).unwrap();
        let spec = spec(&watch, &archive, 3);
        let unit = ArchiveUnit::new(&spec, &ArchiveLocks::default());
        let (_trigger, shutdown) = shutdown::channel();

        for (i, (name, content)) in [("db.sql", "v0"), ("db.sql", "v1"), ("db.1.sql", "v2")]
            .iter()
            .enumerate()
        {
            let path = arrive(&watch, name, content, 1_000 + i as i64);
            unit.handle_arrival(&path, &shutdown).unwrap();
        }

        let kept = contents(&archive).into_iter().map(|(_, c)| c).sorted().collect_vec();
        assert_eq!(kept, vec!["v0", "v1", "v2"]);
        assert_eq!(std::fs::read_to_string(archive.join("db.2.sql")).unwrap(), "v0");
        assert!(names(&watch).is_empty());
    }

    #[test]
    fn test_leftover_bare_name_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let (watch, archive) = (dir.path().join("in"), dir.path().join("out"));
        std::fs::create_dir_all(&watch).unwrap();
        std::fs::create_dir_all(&archive).unwrap();
        arrive(&archive, "db.sql", "stranded", 500);
        let spec = spec(&watch, &archive, 2);
        let (_trigger, shutdown) = shutdown::channel();

        let path = arrive(&watch, "db.sql", "fresh", 1_000);
        ArchiveUnit::new(&spec, &ArchiveLocks::default())
            .handle_arrival(&path, &shutdown)
            .unwrap();

        assert_eq!(
            contents(&archive),
            vec![
                ("db.1.sql".to_string(), "fresh".to_string()),
                ("db.2.sql".to_string(), "stranded".to_string()),
            ]
        );
    }

    #[test]
    fn test_directory_arrival_ignored() {
        let dir = TempDir::new().unwrap();
        let (watch, archive) = (dir.path().join("in"), dir.path().join("out"));
        std::fs::create_dir_all(watch.join("sub")).unwrap();
        std::fs::create_dir_all(&archive).unwrap();
        let spec = spec(&watch, &archive, 2);
        let (_trigger, shutdown) = shutdown::channel();

        let res = ArchiveUnit::new(&spec, &ArchiveLocks::default())
            .handle_arrival(&watch.join("sub"), &shutdown)
            .unwrap();

        assert!(res.is_none());
        assert!(names(&archive).is_empty());
    }

    #[test]
    fn test_vanished_file_is_error() {
        let dir = TempDir::new().unwrap();
        let (watch, archive) = (dir.path().join("in"), dir.path().join("out"));
        std::fs::create_dir_all(&watch).unwrap();
        std::fs::create_dir_all(&archive).unwrap();
        let mut spec = spec(&watch, &archive, 2);
        spec.stability = StableFileDetector::builder()
            .poll_interval(Duration::from_millis(5))
            .stability_window(Duration::from_secs(5))
            .build();
        let (_trigger, shutdown) = shutdown::channel();
        let path = arrive(&watch, "db.sql", "x", 1_000);

        let remove = path.clone();
        let remover = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            std::fs::remove_file(remove).unwrap();
        });
        let res = ArchiveUnit::new(&spec, &ArchiveLocks::default()).handle_arrival(&path, &shutdown);
        remover.join().unwrap();

        assert!(res.is_err());
        assert!(names(&archive).is_empty());
    }

    #[test]
    fn test_locks_shared_per_directory() {
        let dir = TempDir::new().unwrap();
        let locks = ArchiveLocks::default();
        let a = locks.for_directory(dir.path());
        let b = locks.for_directory(dir.path().join("."));
        let c = locks.for_directory(dir.path().join("other"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_same_directories_invalid() {
        let dir = TempDir::new().unwrap();
        let s = WatchSpec::builder()
            .watch_directory(dir.path())
            .archive_directory(dir.path())
            .keep_latest(1)
            .build();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_keep_latest_zero_invalid() {
        let dir = TempDir::new().unwrap();
        let s = WatchSpec::builder()
            .watch_directory(dir.path())
            .archive_directory(dir.path().join("out"))
            .keep_latest(0)
            .build();
        let errors = s.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("keep_latest"));
    }

    #[test]
    fn test_lane_archives_watched_arrivals() {
        let dir = TempDir::new().unwrap();
        let (watch, archive) = (dir.path().join("in"), dir.path().join("out"));
        std::fs::create_dir_all(&watch).unwrap();
        std::fs::create_dir_all(&archive).unwrap();
        let spec = spec(&watch, &archive, 3);
        let unit = ArchiveUnit::new(&spec, &ArchiveLocks::default());
        let watcher = ChangeWatcher::new(&watch).unwrap();
        let (trigger, shutdown) = shutdown::channel();

        std::thread::scope(|s| {
            let lane = s.spawn(|| run_watch_lane(&unit, &watcher, &shutdown));
            std::fs::write(watch.join("report.csv"), "a,b").unwrap();

            let deadline = std::time::Instant::now() + Duration::from_secs(10);
            while !archive.join("report.1.csv").exists() && std::time::Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            trigger.trigger();
            assert!(lane.join().unwrap().is_ok());
        });

        assert_eq!(names(&archive), vec!["report.1.csv"]);
    }
}
