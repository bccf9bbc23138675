//! Retention for archived files sharing a base name.
//!
//! Backups of `db.sql` live next to each other as `db.1.sql`, `db.2.sql`, ...
//! (or as a bare `db.sql`). [`RetentionRotator`] trims them to `keep_latest`
//! and, under [`RetentionPolicy::NumberedRotation`], renumbers the survivors so
//! the newest is always `.1`.

use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithDebugObjectAndFnName, WithMsg};
use function_name::named;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Keep the newest `keep_latest` files and rename them `.1` (newest) to `.k`.
    #[default]
    NumberedRotation,
    /// Keep the newest `keep_latest` files under their current names.
    FlatRetention,
}

/// `<stem><ext>` split of an archived file name, e.g. `db` + `.sql`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseName {
    stem: String,
    ext: String,
}

impl BaseName {
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let path = Path::new(file_name);
        let stem = path.file_stem()?.to_str()?.to_string();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        Some(Self { stem, ext })
    }

    /// Name carrying rotation number `n`.
    pub fn numbered(&self, n: u64) -> String {
        format!("{}.{}{}", self.stem, n, self.ext)
    }

    /// `Some(None)` for the bare name, `Some(Some(n))` for `<stem>.<n><ext>`.
    fn parse_suffix(&self, file_name: &str) -> Option<Option<u64>> {
        let middle = file_name.strip_suffix(self.ext.as_str())?;
        if middle == self.stem {
            return Some(None);
        }
        let digits = middle.strip_prefix(self.stem.as_str())?.strip_prefix('.')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Some)
    }
}

impl Display for BaseName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.stem, self.ext)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupFile {
    pub path: PathBuf,
    pub suffix: Option<u64>,
    pub modified: SystemTime,
}

impl BackupFile {
    fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub deleted: Vec<PathBuf>,
    pub renamed: Vec<(PathBuf, PathBuf)>,
}

#[derive(Debug, Clone)]
pub struct RetentionRotator<'a> {
    archive_dir: &'a Path,
    keep_latest: usize,
    policy: RetentionPolicy,
}

static STAGING_SUFFIX: &str = ".rotating";

impl<'a> RetentionRotator<'a> {
    pub fn new(archive_dir: &'a Path, keep_latest: usize, policy: RetentionPolicy) -> Self {
        Self {
            archive_dir,
            keep_latest: keep_latest.max(1),
            policy,
        }
    }

    /// Backups of `base` in the archive directory, newest first.
    ///
    /// Ties on modification time put the bare name first, then ascending
    /// rotation numbers.
    pub fn list_backups(&self, base: &BaseName) -> Result<Vec<BackupFile>> {
        let mut backups = Vec::new();
        for entry in std::fs::read_dir(self.archive_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(suffix) = entry.file_name().to_str().and_then(|n| base.parse_suffix(n)) else {
                continue;
            };
            backups.push(BackupFile {
                path: entry.path(),
                suffix,
                modified: entry.metadata()?.modified()?,
            });
        }

        Ok(backups
            .into_iter()
            .sorted_by_key(|b| (Reverse(b.modified), b.suffix.is_some(), b.suffix))
            .collect())
    }

    /// Applies the retention policy to the backups sharing `file_name`'s base
    /// name. The file itself is expected to already be in the archive
    /// directory and counts towards `keep_latest`.
    ///
    /// An error leaves the directory in whatever state the failing step
    /// reached.
    #[named]
    pub fn rotate(&self, file_name: &str) -> Result<RotationReport> {
        let base = base_name_of(file_name)?;
        let mut report = RotationReport::default();

        self.delete_overflow(&base, &mut report)
            .and_then(|_| match self.policy {
                RetentionPolicy::NumberedRotation => self.renumber(&base, &mut report),
                RetentionPolicy::FlatRetention => Ok(()),
            })
            .with_msg(format!(
                "Rotation of {base} in {:?} aborted, directory may be partially renumbered",
                self.archive_dir
            ))
            .with_debug_object_and_fn_name(self.clone_owned(), function_path!())?;

        Ok(report)
    }

    /// Name under which `file_name` can enter the archive directory without
    /// replacing anything: `file_name` itself when free, otherwise the first
    /// free `<stem>.<n><ext>` above every number its base name already uses.
    pub fn vacant_name(&self, file_name: &str) -> Result<String> {
        if !occupied(&self.archive_dir.join(file_name))? {
            return Ok(file_name.to_string());
        }
        let base = base_name_of(file_name)?;
        let mut n = self
            .list_backups(&base)?
            .iter()
            .filter_map(|b| b.suffix)
            .max()
            .unwrap_or(0)
            + 1;
        while occupied(&self.archive_dir.join(base.numbered(n)))? {
            n += 1;
        }
        Ok(base.numbered(n))
    }

    fn delete_overflow(&self, base: &BaseName, report: &mut RotationReport) -> Result<()> {
        for overflow in self.list_backups(base)?.into_iter().skip(self.keep_latest) {
            std::fs::remove_file(&overflow.path)?;
            tracing::info!("Deleted old backup: {:?}", overflow.path);
            report.deleted.push(overflow.path);
        }
        Ok(())
    }

    fn renumber(&self, base: &BaseName, report: &mut RotationReport) -> Result<()> {
        let plan = self
            .list_backups(base)?
            .into_iter()
            .enumerate()
            .map(|(rank, b)| (self.archive_dir.join(base.numbered(rank as u64 + 1)), b))
            .filter(|(dst, b)| &b.path != dst)
            .collect_vec();

        // Stage everything first so no target name can still be occupied by a
        // file that has yet to move.
        let mut staged = Vec::with_capacity(plan.len());
        for (dst, backup) in plan {
            let staging = self.archive_dir.join(format!(
                ".{}{STAGING_SUFFIX}",
                backup.file_name().unwrap_or_default()
            ));
            std::fs::rename(&backup.path, &staging)?;
            staged.push((backup.path, staging, dst));
        }
        for (src, staging, dst) in staged {
            std::fs::rename(&staging, &dst)?;
            tracing::info!("Rotated {src:?} to {dst:?}");
            report.renamed.push((src, dst));
        }
        Ok(())
    }

    fn clone_owned(&self) -> (PathBuf, usize, RetentionPolicy) {
        (self.archive_dir.to_path_buf(), self.keep_latest, self.policy)
    }
}

fn base_name_of(file_name: &str) -> Result<BaseName> {
    BaseName::from_file_name(file_name).ok_or_else(|| {
        Error::from(std::io::Error::other(format!(
            "{file_name:?} has no usable base name"
        )))
    })
}

fn occupied(path: &Path) -> Result<bool> {
    match path.symlink_metadata() {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
