use crate::backup::compress::{CompressorBuilder, CompressorConfig};
use crate::backup::finish::Finish;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use std::fs::File;
use std::io::{BufWriter, IntoInnerError};
use std::path::Path;

/// Writes `src` (file or directory tree) as a tar archive through
/// `compressor` into the new file `out`.
///
/// The archive holds a single top-level entry named after `src`.
pub fn create_compressed_tar<P1: AsRef<Path>, P2: AsRef<Path>>(
    src: P1,
    out: P2,
    compressor: &CompressorConfig,
) -> Result<()> {
    let (src, out) = (src.as_ref(), out.as_ref());
    let entry_name = src
        .file_name()
        .ok_or_else(|| Error::from(std::io::Error::other(format!("{src:?} has no file name"))))?;

    let mut writer = File::create_new(out)
        .map(BufWriter::new)
        .map_err(Error::from)
        .and_then(|f| compressor.build_compressor(f))
        .map(BufWriter::new)
        .map(tar::Builder::new)?;
    writer.follow_symlinks(true);

    if src.is_dir() {
        writer.append_dir_all(entry_name, src)?;
    } else {
        writer.append_path_with_name(src, entry_name)?;
    }

    writer
        .into_inner()?
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .finish()?
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .sync_all()?;

    Ok(())
}

/// Same as [`create_compressed_tar`] but removes a partially written `out` on
/// failure.
pub fn create_compressed_tar_or_clean<P1: AsRef<Path>, P2: AsRef<Path>>(
    src: P1,
    out: P2,
    compressor: &CompressorConfig,
) -> Result<()> {
    let out = out.as_ref();
    let existed = out.exists();
    create_compressed_tar(src.as_ref(), out, compressor).map_err(|mut e| {
        if !existed && out.exists() {
            if let Err(e2) = std::fs::remove_file(out) {
                e = e.chain(e2.into())
            }
        }
        e.with_msg(format!("Archiving {:?} into {out:?} failed", src.as_ref()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::compress::xz::XzConfig;
    use std::io::Read;
    use tempfile::TempDir;

    fn entries(archive: &Path, xz: bool) -> Vec<(String, String)> {
        let file = File::open(archive).unwrap();
        let reader: Box<dyn Read> = if xz {
            Box::new(liblzma::read::XzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let mut archive = tar::Archive::new(reader);
        let mut out = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            out.push((path, content));
        }
        out.sort();
        out
    }

    #[test]
    fn test_directory_into_xz_tar() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("dump");
        std::fs::create_dir_all(src.join("tables")).unwrap();
        std::fs::write(src.join("schema.sql"), "create").unwrap();
        std::fs::write(src.join("tables/users.csv"), "id,name").unwrap();
        let out = dir.path().join("dump.tar.xz");

        create_compressed_tar(&src, &out, &CompressorConfig::Xz(XzConfig::default())).unwrap();

        assert_eq!(
            entries(&out, true),
            vec![
                ("dump/schema.sql".to_string(), "create".to_string()),
                ("dump/tables/users.csv".to_string(), "id,name".to_string()),
            ]
        );
    }

    #[test]
    fn test_single_file_plain_tar() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("db.sql");
        std::fs::write(&src, "insert").unwrap();
        let out = dir.path().join("db.tar");

        create_compressed_tar(&src, &out, &CompressorConfig::None).unwrap();

        assert_eq!(
            entries(&out, false),
            vec![("db.sql".to_string(), "insert".to_string())]
        );
    }

    #[test]
    fn test_missing_source_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.tar.xz");

        let res = create_compressed_tar_or_clean(
            dir.path().join("missing"),
            &out,
            &CompressorConfig::default(),
        );

        assert!(res.is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_existing_output_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("db.sql");
        std::fs::write(&src, "insert").unwrap();
        let out = dir.path().join("db.tar");
        std::fs::write(&out, "keep").unwrap();

        assert!(create_compressed_tar(&src, &out, &CompressorConfig::None).is_err());
        assert_eq!(std::fs::read_to_string(out).unwrap(), "keep");
    }
}
