//! Zip container for checkpoint directories

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ChainError, Result};

/// Pack the contents of `root` (not `root` itself) into a new archive at `output`.
///
/// `output` must not exist. A half-written archive is removed before the error is returned.
pub fn create_archive(root: &Path, output: &Path) -> Result<()> {
    let file = match OpenOptions::new().write(true).create_new(true).open(output) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(ChainError::AlreadyExists(output.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    if let Err(e) = write_entries(root, file) {
        if let Err(cleanup) = fs::remove_file(output) {
            warn!(path = %output.display(), error = %cleanup, "Failed to remove partial archive");
        }
        return Err(e);
    }
    debug!(root = %root.display(), archive = %output.display(), "Archive written");
    Ok(())
}

/// Entries of 4 GiB and up need zip64 headers.
fn needs_zip64(len: u64) -> bool {
    len >= u32::MAX as u64
}

fn write_entries(root: &Path, file: File) -> Result<()> {
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let mut name = relative.to_string_lossy().replace('\\', "/");
        if entry.file_type().is_dir() {
            if !name.ends_with('/') {
                name.push('/');
            }
            writer.add_directory(name, options)?;
        } else {
            let len = entry.metadata().map_err(io::Error::from)?.len();
            writer.start_file(name, options.large_file(needs_zip64(len)))?;
            let mut input = File::open(path)?;
            io::copy(&mut input, &mut writer)?;
        }
    }

    let file = writer.finish()?;
    file.sync_all()?;
    Ok(())
}

/// Unpack `archive` into the existing directory `dest`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)?;
    // entries with absolute or parent-relative names are rejected by extract
    zip.extract(dest)?;
    debug!(archive = %archive.display(), dest = %dest.display(), entries = zip.len(), "Archive extracted");
    Ok(())
}
