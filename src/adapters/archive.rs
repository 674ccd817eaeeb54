//! Packs the batch output folders into the downloadable zip.

use crate::error::PackagingError;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Recursively zip `root` into `archive`. Entries keep their path relative
/// to `root`'s parent, so `root = .../outputs` yields `outputs/<video>/...`.
pub async fn package_dir(root: &Path, archive: &Path) -> Result<PathBuf, PackagingError> {
    let root = root.to_path_buf();
    let archive = archive.to_path_buf();

    tokio::task::spawn_blocking(move || write_zip(&root, &archive).map(|_| archive))
        .await
        .map_err(|e| PackagingError::Join(e.to_string()))?
}

fn write_zip(root: &Path, archive: &Path) -> Result<usize, PackagingError> {
    let base = root.parent().unwrap_or(root);
    let mut zip = ZipWriter::new(BufWriter::new(File::create(archive)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut files = 0;

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(base)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        // zip entry names always use forward slashes
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if entry.file_type().is_dir() {
            if !name.is_empty() {
                zip.add_directory(name, options)?;
            }
            continue;
        }

        zip.start_file(name, options)?;
        io::copy(&mut File::open(entry.path())?, &mut zip)?;
        files += 1;
    }

    zip.finish()?;
    info!(archive = %archive.display(), files, "archive written");
    Ok(files)
}
