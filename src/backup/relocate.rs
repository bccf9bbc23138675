use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use std::io::ErrorKind;
use std::path::Path;
use walkdir::WalkDir;

/// Moves a file or directory tree to `dst`, which must not exist yet.
///
/// Tries a rename first and falls back to copy-then-delete when `src` and
/// `dst` live on different filesystems.
pub fn move_path<P1: AsRef<Path>, P2: AsRef<Path>>(src: P1, dst: P2) -> Result<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    refuse_existing(dst)
        .and_then(|_| match std::fs::rename(src, dst) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                tracing::debug!("{src:?} and {dst:?} are on different devices, copying");
                copy_then_remove(src, dst)
            }
            Err(e) => Err(e.into()),
        })
        .with_msg(format!("Move {src:?} to {dst:?} failed"))
}

fn refuse_existing(dst: &Path) -> Result<()> {
    match dst.symlink_metadata() {
        Ok(_) => Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("{dst:?} already exists"),
        )
        .into()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn copy_then_remove(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        for entry in WalkDir::new(src) {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(src)
                .map_err(std::io::Error::other)?;
            let target = dst.join(relative);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)?;
            } else {
                std::fs::copy(entry.path(), &target)?;
            }
        }
        std::fs::remove_dir_all(src)?;
    } else {
        std::fs::copy(src, dst)?;
        std::fs::remove_file(src)?;
    }
    Ok(())
}
