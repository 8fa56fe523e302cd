//! Fixture archive handling: extraction, layout normalization, and the
//! non-empty check. Everything here is blocking; callers run it on the
//! blocking pool.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::domain::{ArchiveFormat, ErrorKind, PipelineError};

fn extract_err(archive: &Path, reason: impl ToString) -> PipelineError {
    PipelineError::Extract {
        archive: archive.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn io_err(context: String, source: std::io::Error) -> PipelineError {
    PipelineError::io(ErrorKind::Fetch, context, source)
}

/// Unpack `archive` into `dest` (created if missing). Existing files are
/// overwritten; entries escaping `dest` are rejected.
pub fn extract(archive: &Path, format: ArchiveFormat, dest: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(dest).map_err(|e| io_err(format!("creating {}", dest.display()), e))?;
    let file = File::open(archive).map_err(|e| extract_err(archive, e))?;
    match format {
        ArchiveFormat::Zip => {
            let mut zip = zip::ZipArchive::new(file).map_err(|e| extract_err(archive, e))?;
            zip.extract(dest).map_err(|e| extract_err(archive, e))?;
        }
        ArchiveFormat::TarGz => unpack_tar(archive, GzDecoder::new(file), dest)?,
        ArchiveFormat::Tar => unpack_tar(archive, file, dest)?,
    }
    debug!(archive = %archive.display(), dest = %dest.display(), "archive extracted");
    Ok(())
}

fn unpack_tar<R: Read>(archive: &Path, reader: R, dest: &Path) -> Result<(), PipelineError> {
    let mut tar = tar::Archive::new(reader);
    tar.set_overwrite(true);
    for entry in tar.entries().map_err(|e| extract_err(archive, e))? {
        let mut entry = entry.map_err(|e| extract_err(archive, e))?;
        let unpacked = entry.unpack_in(dest).map_err(|e| extract_err(archive, e))?;
        if !unpacked {
            let name = entry
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return Err(extract_err(
                archive,
                format!("entry `{name}` escapes the destination"),
            ));
        }
    }
    Ok(())
}

/// Move every entry of `dest/sub` up into `dest` and remove `dest/sub`.
///
/// Entries already present in `dest` are replaced, so a second run over the
/// same directory ends in the same layout.
pub fn flatten(dest: &Path, sub: &str) -> Result<(), PipelineError> {
    let inner = dest.join(sub);
    if !inner.is_dir() {
        return Err(extract_err(
            &inner,
            format!("expected directory `{sub}` after extraction"),
        ));
    }

    // the sub-directory may contain an entry with its own name
    let staging = dest.join(format!(".{sub}.flatten"));
    if staging.exists() {
        remove_path(&staging)?;
    }
    fs::rename(&inner, &staging)
        .map_err(|e| io_err(format!("moving {}", inner.display()), e))?;

    let entries =
        fs::read_dir(&staging).map_err(|e| io_err(format!("reading {}", staging.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(format!("reading {}", staging.display()), e))?;
        let target = dest.join(entry.file_name());
        if fs::symlink_metadata(&target).is_ok() {
            remove_path(&target)?;
        }
        fs::rename(entry.path(), &target)
            .map_err(|e| io_err(format!("moving {}", entry.path().display()), e))?;
    }
    fs::remove_dir(&staging).map_err(|e| io_err(format!("removing {}", staging.display()), e))
}

fn remove_path(path: &Path) -> Result<(), PipelineError> {
    let meta =
        fs::symlink_metadata(path).map_err(|e| io_err(format!("inspecting {}", path.display()), e))?;
    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| io_err(format!("removing {}", path.display()), e))
}

/// `dir` のエントリ数。存在しない・空のディレクトリはエラー
pub fn ensure_populated(dir: &Path) -> Result<usize, PipelineError> {
    let entries = fs::read_dir(dir).map_err(|_| PipelineError::FixtureMissing(dir.to_path_buf()))?;
    let count = entries.filter_map(Result::ok).count();
    if count == 0 {
        return Err(PipelineError::FixtureMissing(dir.to_path_buf()));
    }
    Ok(count)
}

/// File names directly inside `dir`, sorted.
pub fn list_dir(dir: &Path) -> Vec<PathBuf> {
    let mut names: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| PathBuf::from(e.file_name()))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
