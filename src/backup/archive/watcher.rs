use crate::backup::result_error::result::Result;
use crossbeam_channel::{unbounded, Receiver};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};

/// Non-recursive watch on one directory yielding newly arrived paths.
///
/// An arrival is a created entry or one renamed into the directory. The
/// receiver keeps yielding until the watcher is dropped.
pub struct ChangeWatcher {
    directory: PathBuf,
    _watcher: RecommendedWatcher,
    arrivals: Receiver<PathBuf>,
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

impl ChangeWatcher {
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        let (tx, arrivals) = unbounded();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for path in arrived_paths(event) {
                    tracing::trace!("Arrival event for {path:?}");
                    let _ = tx.send(path);
                }
            }
            Err(e) => tracing::error!("Watch error: {e}"),
        })?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        tracing::info!("Watching directory: {directory:?}");

        Ok(Self {
            directory,
            _watcher: watcher,
            arrivals,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn arrivals(&self) -> &Receiver<PathBuf> {
        &self.arrivals
    }
}

fn arrived_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => event.paths,
        // Both-mode renames carry [from, to]; only the destination arrived.
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.into_iter().last().into_iter().collect()
        }
        _ => Vec::new(),
    }
}
